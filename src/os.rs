use std::{fs, ptr::NonNull, sync::OnceLock};

use libc::{c_int, c_void};
use log::{debug, trace};

use crate::{align::mib, error::ProviderError, provider::MemoryProvider};

/// [`MemoryProvider`] backed by the unix virtual-memory calls.
///
/// ```text
///   reserve  ── mmap(PROT_NONE, MAP_PRIVATE | MAP_ANONYMOUS | MAP_NORESERVE)
///   commit   ── mprotect(PROT_READ | PROT_WRITE)
///   decommit ── madvise(MADV_DONTNEED) + mprotect(PROT_NONE)
///   release  ── munmap
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OsMemory;

#[cfg(any(target_os = "linux", target_os = "android"))]
const RESERVE_FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const RESERVE_FLAGS: c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;

const DEFAULT_LARGE_PAGE: usize = mib(2);

impl OsMemory {
  pub const fn new() -> Self {
    Self
  }

  fn regular_page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

    *PAGE_SIZE.get_or_init(|| {
      let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
      if size <= 0 { 4096 } else { size as usize }
    })
  }

  fn large_page_size() -> usize {
    static LARGE_PAGE_SIZE: OnceLock<usize> = OnceLock::new();

    *LARGE_PAGE_SIZE.get_or_init(|| {
      if cfg!(any(target_os = "linux", target_os = "android")) {
        fs::read_to_string("/proc/meminfo")
          .ok()
          .and_then(|info| parse_huge_page_size(&info))
          .unwrap_or(DEFAULT_LARGE_PAGE)
      } else {
        Self::regular_page_size()
      }
    })
  }
}

/// Extracts the `Hugepagesize:` line of `/proc/meminfo`, which is reported in kB.
fn parse_huge_page_size(meminfo: &str) -> Option<usize> {
  let line = meminfo.lines().find(|line| line.starts_with("Hugepagesize:"))?;
  let kb = line
    .trim_start_matches("Hugepagesize:")
    .trim()
    .trim_end_matches("kB")
    .trim()
    .parse::<usize>()
    .ok()?;

  kb.checked_mul(1024).filter(|bytes| *bytes > 0)
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn large_page_flags() -> Result<c_int, ProviderError> {
  Ok(libc::MAP_HUGETLB)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn large_page_flags() -> Result<c_int, ProviderError> {
  Err(ProviderError::Unsupported("large pages"))
}

impl MemoryProvider for OsMemory {
  fn page_size(
    &self,
    large_pages: bool,
  ) -> usize {
    if large_pages {
      Self::large_page_size()
    } else {
      Self::regular_page_size()
    }
  }

  fn installed_ram(&self) -> Result<usize, ProviderError> {
    let (pages, size) = unsafe { (libc::sysconf(libc::_SC_PHYS_PAGES), libc::sysconf(libc::_SC_PAGESIZE)) };

    if pages <= 0 || size <= 0 {
      return Err(ProviderError::Unsupported("installed RAM query"));
    }

    (pages as usize)
      .checked_mul(size as usize)
      .ok_or(ProviderError::Unsupported("installed RAM exceeds the address space"))
  }

  fn reserve(
    &self,
    len: usize,
    page_size: usize,
    hint: Option<NonNull<u8>>,
    commit: bool,
    large_pages: bool,
  ) -> Result<NonNull<u8>, ProviderError> {
    debug_assert!(len > 0 && len % page_size == 0, "reservation of {len} bytes is not page aligned");

    let mut flags = RESERVE_FLAGS;
    if large_pages {
      flags |= large_page_flags()?;
    }

    let prot = if commit {
      libc::PROT_READ | libc::PROT_WRITE
    } else {
      libc::PROT_NONE
    };

    let addr = hint.map_or(std::ptr::null_mut(), |hint| hint.as_ptr().cast::<c_void>());

    let address = unsafe { libc::mmap(addr, len, prot, flags, -1, 0) };
    if address == libc::MAP_FAILED {
      return Err(ProviderError::last_os_error("mmap"));
    }

    debug!("reserved {len} bytes at {address:?} (commit = {commit}, large pages = {large_pages})");

    NonNull::new(address.cast::<u8>()).ok_or(ProviderError::Unsupported("mmap returned a null mapping"))
  }

  unsafe fn commit(
    &self,
    base: NonNull<u8>,
    offset: usize,
    len: usize,
  ) -> Result<NonNull<u8>, ProviderError> {
    unsafe {
      let start = base.add(offset);

      if libc::mprotect(start.as_ptr().cast(), len, libc::PROT_READ | libc::PROT_WRITE) != 0 {
        return Err(ProviderError::last_os_error("mprotect"));
      }

      trace!("committed {len} bytes at {start:?}");

      Ok(start)
    }
  }

  unsafe fn decommit(
    &self,
    addr: NonNull<u8>,
    len: usize,
  ) -> Result<(), ProviderError> {
    unsafe {
      if libc::madvise(addr.as_ptr().cast(), len, libc::MADV_DONTNEED) != 0 {
        return Err(ProviderError::last_os_error("madvise"));
      }

      if libc::mprotect(addr.as_ptr().cast(), len, libc::PROT_NONE) != 0 {
        return Err(ProviderError::last_os_error("mprotect"));
      }

      trace!("decommitted {len} bytes at {addr:?}");

      Ok(())
    }
  }

  unsafe fn release(
    &self,
    addr: NonNull<u8>,
    len: usize,
  ) -> Result<(), ProviderError> {
    unsafe {
      if libc::munmap(addr.as_ptr().cast(), len) != 0 {
        return Err(ProviderError::last_os_error("munmap"));
      }

      debug!("released {len} bytes at {addr:?}");

      Ok(())
    }
  }
}
