/// Rounds `value` up to the next multiple of `to`.
///
/// Values that are already a multiple of `to` are returned unchanged.
///
/// # Examples
///
/// ```rust
/// use vmvec::align_up;
///
/// assert_eq!(align_up!(10, 4), 12);
/// assert_eq!(align_up!(4000, 4096), 4096);
/// assert_eq!(align_up!(4096, 4096), 4096);
/// assert_eq!(align_up!(4097, 4096), 8192);
/// ```
#[macro_export]
macro_rules! align_up {
  ($value:expr, $to:expr) => {{
    let value: usize = $value;
    let to: usize = $to;
    value + (to - value % to) % to
  }};
}

/// Like [`align_up!`] but returns `None` when the result does not fit in a `usize`.
pub const fn checked_align_up(
  bytes: usize,
  page_size: usize,
) -> Option<usize> {
  assert!(page_size != 0, "page size must be non-zero");

  bytes.checked_add((page_size - bytes % page_size) % page_size)
}

/// Number of whole pages needed to hold `bytes`.
pub const fn page_count(
  bytes: usize,
  page_size: usize,
) -> usize {
  assert!(page_size != 0, "page size must be non-zero");

  // `bytes / page_size` rounded up, without the overflow of aligning first.
  bytes / page_size + (bytes % page_size != 0) as usize
}

/// Whole pages that must be added to `committed` bytes so that `requested` bytes fit.
///
/// Returns zero when the committed range already covers the request.
pub const fn growth_pages(
  requested: usize,
  committed: usize,
  page_size: usize,
) -> usize {
  if requested <= committed {
    return 0;
  }

  page_count(requested - committed, page_size)
}

pub const fn kib(n: usize) -> usize {
  n * 1024
}

pub const fn mib(n: usize) -> usize {
  kib(n) * 1024
}

pub const fn gib(n: usize) -> usize {
  mib(n) * 1024
}
