use std::io::Read;

use vmvec::{GrowthStrategy, SizingPolicy, VecConfig, VirtualVec, align::mib};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect the mapping with `pmap -x <pid>` or
/// `/proc/<pid>/smaps` and watch the resident size follow the committed size.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

fn print_state<T>(
  label: &str,
  vec: &VirtualVec<T>,
) {
  println!(
    "[{}] PID = {}, base = {:?}, len = {}, capacity = {}, committed = {} KiB, reserved = {} KiB",
    label,
    std::process::id(),
    vec.as_ptr(),
    vec.len(),
    vec.capacity(),
    vec.committed_bytes() / 1024,
    vec.reserved_bytes() / 1024,
  );
}

fn main() -> Result<(), vmvec::VecError> {
  // --------------------------------------------------------------------
  // 1) Reserve 64 MiB of address space. No page is backed yet.
  // --------------------------------------------------------------------
  let mut values = VirtualVec::<u64>::with_policy(SizingPolicy::FixedBytes(mib(64)))?;
  println!("\n[1] Reserved room for {} u64", values.reserve_ceiling());
  print_state("reserved", &values);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) One push commits exactly one page.
  // --------------------------------------------------------------------
  values.push(0xDEADBEEF)?;
  let base = values.as_ptr();
  println!("\n[2] Pushed one u64 = 0x{:X}", values[0]);
  print_state("first page", &values);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) Fill 8 MiB. The base address must not move.
  // --------------------------------------------------------------------
  for i in 1..(mib(8) / 8) as u64 {
    values.push(i)?;
  }
  println!("\n[3] Filled 8 MiB, base unchanged? {}", values.as_ptr() == base);
  print_state("8 MiB", &values);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Erase the middle half. Pages stay committed.
  // --------------------------------------------------------------------
  let quarter = values.len() / 4;
  values.erase_range(quarter..quarter * 3);
  println!("\n[4] Erased the middle half, element {} is now {}", quarter, values[quarter]);
  print_state("after erase", &values);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) Run into the ceiling. The array refuses instead of moving.
  // --------------------------------------------------------------------
  let ceiling = values.reserve_ceiling();
  match values.resize(ceiling + 1, 0) {
    Ok(()) => println!("\n[5] Unexpectedly grew past the ceiling"),
    Err(err) => println!("\n[5] Growth past the ceiling refused: {err}"),
  }
  print_state("ceiling", &values);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 6) Commit ahead: every growth step commits 16 extra pages.
  // --------------------------------------------------------------------
  let config = VecConfig::new(SizingPolicy::FixedBytes(mib(64))).growth(GrowthStrategy::Ahead(16));
  let mut ahead = VirtualVec::<u8>::with_config(config)?;
  ahead.push(1)?;
  println!("\n[6] One byte with Ahead(16) growth");
  print_state("ahead", &ahead);
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 7) End of demo.
  //
  //    Dropping the arrays releases both reservations to the OS.
  // --------------------------------------------------------------------
  drop(ahead);
  drop(values);
  println!("\n[7] End of example. Both reservations were released.");

  Ok(())
}
