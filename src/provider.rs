use std::ptr::NonNull;

use crate::error::ProviderError;

/// Virtual-memory primitives consumed by [`VirtualVec`](crate::VirtualVec).
///
/// A provider hands out one contiguous reservation per call to [`reserve`](Self::reserve)
/// and lets the caller back sub-ranges of it with physical memory.
///
/// ```text
///   reserve ──► commit ──► use ──► decommit ──► release
///      │          │                    │           │
///      │          │                    │           └── whole range back to the OS
///      │          │                    └── drop physical backing, keep addresses
///      │          └── back [offset, offset + len) with memory
///      └── claim address space, nothing backed
/// ```
///
/// All lengths and offsets passed to a provider are multiples of the page size
/// the caller obtained from [`page_size`](Self::page_size). Passing anything else
/// is a programming error.
pub trait MemoryProvider {
  /// Page granularity of reserve/commit/decommit, regular or large.
  fn page_size(
    &self,
    large_pages: bool,
  ) -> usize;

  /// Total physical memory installed in the machine, in bytes.
  fn installed_ram(&self) -> Result<usize, ProviderError>;

  /// Reserves `len` bytes of address space.
  ///
  /// With `commit` the whole range is also backed by memory in the same call,
  /// which is the only way large pages can be obtained.
  fn reserve(
    &self,
    len: usize,
    page_size: usize,
    hint: Option<NonNull<u8>>,
    commit: bool,
    large_pages: bool,
  ) -> Result<NonNull<u8>, ProviderError>;

  /// Backs `[base + offset, base + offset + len)` with memory and returns its start.
  ///
  /// # Safety
  ///
  /// `base` must come from [`reserve`](Self::reserve) on this provider, the range
  /// must lie inside that reservation and must not be committed yet.
  unsafe fn commit(
    &self,
    base: NonNull<u8>,
    offset: usize,
    len: usize,
  ) -> Result<NonNull<u8>, ProviderError>;

  /// Drops the physical backing of a committed range but keeps it reserved.
  ///
  /// # Safety
  ///
  /// The range must be inside a live reservation and nothing may read or write
  /// it until it is committed again.
  unsafe fn decommit(
    &self,
    addr: NonNull<u8>,
    len: usize,
  ) -> Result<(), ProviderError>;

  /// Returns a whole reservation, committed pages included, to the OS.
  ///
  /// # Safety
  ///
  /// `addr` and `len` must describe exactly one reservation made by this provider,
  /// and it must be released at most once.
  unsafe fn release(
    &self,
    addr: NonNull<u8>,
    len: usize,
  ) -> Result<(), ProviderError>;
}

impl<P: MemoryProvider + ?Sized> MemoryProvider for &P {
  fn page_size(
    &self,
    large_pages: bool,
  ) -> usize {
    (**self).page_size(large_pages)
  }

  fn installed_ram(&self) -> Result<usize, ProviderError> {
    (**self).installed_ram()
  }

  fn reserve(
    &self,
    len: usize,
    page_size: usize,
    hint: Option<NonNull<u8>>,
    commit: bool,
    large_pages: bool,
  ) -> Result<NonNull<u8>, ProviderError> {
    (**self).reserve(len, page_size, hint, commit, large_pages)
  }

  unsafe fn commit(
    &self,
    base: NonNull<u8>,
    offset: usize,
    len: usize,
  ) -> Result<NonNull<u8>, ProviderError> {
    unsafe { (**self).commit(base, offset, len) }
  }

  unsafe fn decommit(
    &self,
    addr: NonNull<u8>,
    len: usize,
  ) -> Result<(), ProviderError> {
    unsafe { (**self).decommit(addr, len) }
  }

  unsafe fn release(
    &self,
    addr: NonNull<u8>,
    len: usize,
  ) -> Result<(), ProviderError> {
    unsafe { (**self).release(addr, len) }
  }
}
