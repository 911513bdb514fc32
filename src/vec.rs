use std::{
  fmt, iter,
  marker::PhantomData,
  mem,
  ops::{Deref, DerefMut, Range},
  ptr::{self, NonNull},
  slice,
};

use log::{debug, trace, warn};

use crate::{
  align::{checked_align_up, growth_pages},
  config::{SizingPolicy, VecConfig},
  cursor::{Access, Const, Cursor, CursorMut, Mut, RawCursor, RevCursor},
  error::{ProviderError, Result, VecError},
  os::OsMemory,
  provider::MemoryProvider,
};

/// A growable array living in one virtual-memory reservation.
///
/// The whole reservation is claimed at construction and pages are committed
/// as the array grows, so the base address never changes: appending never
/// moves elements and never invalidates references obtained through raw
/// pointers or cursors.
///
/// ```text
///   base
///    │
///    ▼
///    ┌────────────────────┬──────────────┬───────────────────────────────┐
///    │   live elements    │  committed   │    reserved, not committed    │
///    │   [0, len)         │  uninit      │    (touching it faults)       │
///    └────────────────────┴──────────────┴───────────────────────────────┘
///    0                   len         capacity()               reserve_ceiling()
/// ```
///
/// The reservation is a hard ceiling: growing past
/// [`reserve_ceiling`](Self::reserve_ceiling) fails with
/// [`VecError::CeilingExceeded`] instead of re-allocating.
///
/// # Examples
///
/// ```rust
/// use vmvec::{SizingPolicy, VirtualVec};
///
/// let mut values = VirtualVec::with_policy(SizingPolicy::ElementCount(10)).unwrap();
/// for i in 0..10 {
///   values.push(i).unwrap();
/// }
///
/// let base = values.as_ptr();
/// assert_eq!(values.len(), 10);
/// assert_eq!(values[9], 9);
/// assert!(values.capacity() <= values.reserve_ceiling());
///
/// values.erase_range(2..4);
/// assert_eq!(values.as_ptr(), base);
/// assert_eq!(values[2], 4);
/// ```
pub struct VirtualVec<T, P: MemoryProvider = OsMemory> {
  base: NonNull<T>,
  len: usize,
  committed_pages: usize,
  reserved_pages: usize,
  page_size: usize,
  config: VecConfig,
  provider: P,
  _owns: PhantomData<T>,
}

// The array owns its elements exclusively; the raw base pointer is an implementation detail.
unsafe impl<T: Send, P: MemoryProvider + Send> Send for VirtualVec<T, P> {}
unsafe impl<T: Sync, P: MemoryProvider + Sync> Sync for VirtualVec<T, P> {}

impl<T> VirtualVec<T> {
  /// Reserves the installed RAM size, see [`SizingPolicy::RAM`].
  pub fn new() -> Result<Self> {
    Self::with_config(VecConfig::default())
  }

  pub fn with_policy(policy: SizingPolicy) -> Result<Self> {
    Self::with_config(VecConfig::new(policy))
  }

  pub fn with_config(config: VecConfig) -> Result<Self> {
    Self::with_provider(config, OsMemory)
  }

  pub fn from_slice(
    config: VecConfig,
    values: &[T],
  ) -> Result<Self>
  where
    T: Clone,
  {
    let mut vec = Self::with_config(config)?;
    vec.extend_from_slice(values)?;
    Ok(vec)
  }

  /// `count` clones of `value`.
  pub fn from_elem(
    config: VecConfig,
    count: usize,
    value: T,
  ) -> Result<Self>
  where
    T: Clone,
  {
    let mut vec = Self::with_config(config)?;
    vec.resize(count, value)?;
    Ok(vec)
  }

  /// `count` default-constructed elements.
  pub fn with_len(
    config: VecConfig,
    count: usize,
  ) -> Result<Self>
  where
    T: Default,
  {
    let mut vec = Self::with_config(config)?;
    vec.resize_default(count)?;
    Ok(vec)
  }

  pub fn try_from_iter<I: IntoIterator<Item = T>>(
    config: VecConfig,
    iter: I,
  ) -> Result<Self> {
    let mut vec = Self::with_config(config)?;
    vec.try_extend(iter)?;
    Ok(vec)
  }
}

impl<T, P: MemoryProvider> VirtualVec<T, P> {
  const ELEMENT_SIZE: usize = mem::size_of::<T>();

  /// Makes the one reservation this array will ever own.
  ///
  /// Fails with [`VecError::InvalidConfig`] when the configuration cannot be
  /// resolved to a usable size and with [`VecError::Reserve`] when the
  /// provider refuses the reservation. Either way no array exists.
  pub fn with_provider(
    config: VecConfig,
    provider: P,
  ) -> Result<Self> {
    if Self::ELEMENT_SIZE == 0 {
      return Err(VecError::InvalidConfig(
        "zero-sized element types cannot be stored".into(),
      ));
    }

    let page_size = provider.page_size(config.large_pages);
    if page_size == 0 {
      return Err(VecError::InvalidConfig("memory provider reported a zero page size".into()));
    }

    if mem::align_of::<T>() > page_size {
      return Err(VecError::InvalidConfig(format!(
        "element alignment {} exceeds the page size {page_size}",
        mem::align_of::<T>()
      )));
    }

    let requested = config
      .policy
      .target_bytes(Self::ELEMENT_SIZE, || provider.installed_ram())?;

    let bytes = checked_align_up(requested, page_size)
      .filter(|bytes| *bytes <= isize::MAX as usize)
      .ok_or_else(|| VecError::InvalidConfig(format!("{:?} overflows the address space", config.policy)))?;

    if bytes < Self::ELEMENT_SIZE {
      return Err(VecError::InvalidConfig(format!(
        "{bytes} reserved bytes cannot hold a {}-byte element",
        Self::ELEMENT_SIZE
      )));
    }

    let commit = config.commits_up_front();

    let base = provider
      .reserve(bytes, page_size, None, commit, config.large_pages)
      .map_err(|source| VecError::Reserve { bytes, source })?;

    let reserved_pages = bytes / page_size;

    debug!(
      "reserved {reserved_pages} pages of {page_size} bytes at {base:?} for {} elements",
      bytes / Self::ELEMENT_SIZE
    );

    Ok(Self {
      base: base.cast(),
      len: 0,
      committed_pages: if commit { reserved_pages } else { 0 },
      reserved_pages,
      page_size,
      config,
      provider,
      _owns: PhantomData,
    })
  }

  /// An array owning no memory: the state left behind by [`take`](Self::take).
  fn detached(
    provider: P,
    page_size: usize,
    config: VecConfig,
  ) -> Self {
    Self {
      base: NonNull::dangling(),
      len: 0,
      committed_pages: 0,
      reserved_pages: 0,
      page_size,
      config,
      provider,
      _owns: PhantomData,
    }
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  /// Elements that fit in committed memory.
  pub fn capacity(&self) -> usize {
    self.committed_bytes() / Self::ELEMENT_SIZE
  }

  /// Elements that fit in the whole reservation. Fixed for the array's lifetime.
  pub fn reserve_ceiling(&self) -> usize {
    self.reserved_bytes() / Self::ELEMENT_SIZE
  }

  pub fn committed_bytes(&self) -> usize {
    self.committed_pages * self.page_size
  }

  pub fn reserved_bytes(&self) -> usize {
    self.reserved_pages * self.page_size
  }

  pub fn page_size(&self) -> usize {
    self.page_size
  }

  pub fn installed_ram(&self) -> Result<usize, ProviderError> {
    self.provider.installed_ram()
  }

  pub fn provider(&self) -> &P {
    &self.provider
  }

  pub fn config(&self) -> &VecConfig {
    &self.config
  }

  /// Whether the array still owns a reservation, i.e. it was not [`take`](Self::take)n from.
  pub fn is_attached(&self) -> bool {
    self.reserved_pages != 0
  }

  /// Base of the elements, or null when the array is empty.
  ///
  /// The base itself is valid from construction on; null only tells callers
  /// there is nothing to read.
  pub fn as_ptr(&self) -> *const T {
    if self.is_empty() {
      ptr::null()
    } else {
      self.base.as_ptr()
    }
  }

  pub fn as_mut_ptr(&mut self) -> *mut T {
    if self.is_empty() {
      ptr::null_mut()
    } else {
      self.base.as_ptr()
    }
  }

  pub fn as_slice(&self) -> &[T] {
    unsafe { slice::from_raw_parts(self.base.as_ptr(), self.len) }
  }

  pub fn as_mut_slice(&mut self) -> &mut [T] {
    unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.len) }
  }

  fn slot(
    &self,
    index: usize,
  ) -> *mut T {
    debug_assert!(index <= self.reserve_ceiling());

    unsafe { self.base.as_ptr().add(index) }
  }

  /// Commits pages until `count` elements fit.
  fn grow_to(
    &mut self,
    count: usize,
  ) -> Result<()> {
    if count <= self.capacity() {
      return Ok(());
    }

    let reserve = self.reserve_ceiling();
    if count > reserve {
      return Err(VecError::CeilingExceeded {
        requested: count,
        reserve,
      });
    }

    // count <= reserve, so the product fits inside the reservation.
    let needed = growth_pages(count * Self::ELEMENT_SIZE, self.committed_bytes(), self.page_size);
    let available = self.reserved_pages - self.committed_pages;
    let pages = self.config.growth.pages_to_commit(needed, available);
    let bytes = pages * self.page_size;

    unsafe {
      self
        .provider
        .commit(self.base.cast(), self.committed_bytes(), bytes)
        .map_err(|source| VecError::Commit { bytes, source })?;
    }

    self.committed_pages += pages;

    debug!(
      "committed {pages} pages, {} of {} pages in use",
      self.committed_pages, self.reserved_pages
    );

    Ok(())
  }

  /// Makes sure `count` elements fit in committed memory.
  ///
  /// Commits whole pages as needed and does nothing when the capacity already
  /// suffices. `count` beyond [`reserve_ceiling`](Self::reserve_ceiling) fails
  /// with [`VecError::CeilingExceeded`].
  pub fn reserve_at_least(
    &mut self,
    count: usize,
  ) -> Result<()> {
    self.grow_to(count)
  }

  fn grow_by(
    &mut self,
    additional: usize,
  ) -> Result<()> {
    let count = self
      .len
      .checked_add(additional)
      .ok_or(VecError::CeilingExceeded {
        requested: usize::MAX,
        reserve: self.reserve_ceiling(),
      })?;

    self.grow_to(count)
  }

  /// Element `index`, or [`VecError::OutOfRange`] past the live elements.
  pub fn try_index(
    &self,
    index: usize,
  ) -> Result<&T> {
    self.as_slice().get(index).ok_or(VecError::OutOfRange {
      index,
      len: self.len,
    })
  }

  pub fn try_index_mut(
    &mut self,
    index: usize,
  ) -> Result<&mut T> {
    let len = self.len;
    self
      .as_mut_slice()
      .get_mut(index)
      .ok_or(VecError::OutOfRange { index, len })
  }

  /// Element `index`, or `default` when it is out of range.
  pub fn at<'a>(
    &'a self,
    index: usize,
    default: &'a T,
  ) -> &'a T {
    self.as_slice().get(index).unwrap_or(default)
  }

  pub fn front(&self) -> Result<&T> {
    self.try_index(0)
  }

  pub fn front_mut(&mut self) -> Result<&mut T> {
    self.try_index_mut(0)
  }

  pub fn back(&self) -> Result<&T> {
    self.try_index(self.len.saturating_sub(1))
  }

  pub fn back_mut(&mut self) -> Result<&mut T> {
    self.try_index_mut(self.len.saturating_sub(1))
  }

  /// Appends `value`, committing one more page when the array is full.
  ///
  /// On failure nothing changes: neither the elements nor the committed pages.
  pub fn push(
    &mut self,
    value: T,
  ) -> Result<()> {
    self.emplace_back(|| value).map(|_| ())
  }

  /// Appends the value built by `make`, which only runs once there is room for it.
  pub fn emplace_back(
    &mut self,
    make: impl FnOnce() -> T,
  ) -> Result<&mut T> {
    self.grow_by(1)?;

    let slot = self.slot(self.len);
    unsafe { ptr::write(slot, make()) };
    self.len += 1;

    Ok(unsafe { &mut *slot })
  }

  /// Drops the last element.
  ///
  /// # Panics
  ///
  /// Panics when the array is empty.
  pub fn remove_last(&mut self) {
    assert!(!self.is_empty(), "remove_last on an empty VirtualVec");

    self.len -= 1;
    unsafe { ptr::drop_in_place(self.slot(self.len)) };
  }

  pub fn pop(&mut self) -> Option<T> {
    if self.is_empty() {
      return None;
    }

    self.len -= 1;
    Some(unsafe { ptr::read(self.slot(self.len)) })
  }

  /// Inserts `value` at `index`, shifting the tail one slot to the right.
  ///
  /// When the array is empty `index` is ignored and the value is appended.
  ///
  /// # Panics
  ///
  /// Panics when the array is non-empty and `index > len`.
  pub fn insert(
    &mut self,
    index: usize,
    value: T,
  ) -> Result<CursorMut<T>> {
    self.emplace(index, || value)
  }

  /// Cursor flavour of [`insert`](Self::insert).
  pub fn insert_at(
    &mut self,
    position: Cursor<T>,
    value: T,
  ) -> Result<CursorMut<T>> {
    self.emplace_at(position, || value)
  }

  /// Builds an element at `index` with `make`, shifting the tail right.
  ///
  /// `make` runs after the capacity check, so a failed commit never calls it.
  /// When the array is empty `index` is ignored and the value is appended.
  ///
  /// # Panics
  ///
  /// Panics when the array is non-empty and `index > len`.
  pub fn emplace(
    &mut self,
    index: usize,
    make: impl FnOnce() -> T,
  ) -> Result<CursorMut<T>> {
    let index = if self.is_empty() { 0 } else { index };

    assert!(
      index <= self.len,
      "insertion index {index} out of bounds for length {}",
      self.len
    );

    self.grow_by(1)?;

    let value = make();

    unsafe {
      let slot = self.slot(index);
      // Overlapping move of the tail, last element first.
      ptr::copy(slot, slot.add(1), self.len - index);
      ptr::write(slot, value);
    }
    self.len += 1;

    trace!("inserted at {index}, length {}", self.len);

    Ok(self.cursor_mut(index))
  }

  /// Cursor flavour of [`emplace`](Self::emplace).
  ///
  /// # Panics
  ///
  /// Panics when the array is non-empty and `position` lies outside `[begin, end]`.
  pub fn emplace_at(
    &mut self,
    position: Cursor<T>,
    make: impl FnOnce() -> T,
  ) -> Result<CursorMut<T>> {
    let index = if self.is_empty() {
      0
    } else {
      self.position_index(position)
    };

    self.emplace(index, make)
  }

  /// Inserts `count` clones of `value` at `position`.
  ///
  /// Commits room for all of them in one step before shifting, since the gap
  /// may span several pages. Returns a cursor to the first inserted element.
  /// When the array is empty the position is ignored.
  ///
  /// # Panics
  ///
  /// Panics when the array is non-empty and `position` lies outside `[begin, end]`.
  pub fn insert_n(
    &mut self,
    position: Cursor<T>,
    count: usize,
    value: &T,
  ) -> Result<CursorMut<T>>
  where
    T: Clone,
  {
    let index = if self.is_empty() {
      0
    } else {
      self.position_index(position)
    };

    if count == 0 {
      return Ok(self.cursor_mut(index));
    }

    self.grow_by(count)?;

    let base = self.base.as_ptr();
    let tail = self.len - index;

    unsafe {
      ptr::copy(base.add(index), base.add(index + count), tail);
    }

    // Until the guard drops, `len` only covers the head: a panicking clone leaks
    // nothing and double-drops nothing.
    self.len = index;
    let mut gap = Gap {
      base,
      len: &mut self.len,
      index,
      filled: 0,
      width: count,
      tail,
    };

    while gap.filled < count {
      unsafe { ptr::write(base.add(index + gap.filled), value.clone()) };
      gap.filled += 1;
    }
    drop(gap);

    trace!("inserted {count} copies at {index}, length {}", self.len);

    Ok(self.cursor_mut(index))
  }

  /// Drops `[first, last)` and shifts the tail left to close the gap.
  ///
  /// Returns a cursor to the element that followed `last`, i.e. `first` after
  /// the erase. An empty range changes nothing and returns `last`.
  ///
  /// # Panics
  ///
  /// Panics unless `begin <= first <= last <= end`.
  pub fn erase(
    &mut self,
    first: Cursor<T>,
    last: Cursor<T>,
  ) -> CursorMut<T> {
    assert!(first <= last, "erase range is reversed");

    let start = self.position_index(first);
    let end = self.position_index(last);

    self.erase_range(start..end)
  }

  /// Drops the element at `position`.
  ///
  /// # Panics
  ///
  /// Panics unless `begin <= position < end`.
  pub fn erase_at(
    &mut self,
    position: Cursor<T>,
  ) -> CursorMut<T> {
    assert!(position < self.cend(), "erase position is end() or beyond");

    self.erase(position, position + 1)
  }

  /// Index flavour of [`erase`](Self::erase).
  ///
  /// # Panics
  ///
  /// Panics unless `range.start <= range.end <= len`.
  pub fn erase_range(
    &mut self,
    range: Range<usize>,
  ) -> CursorMut<T> {
    let Range { start, end } = range;
    let old_len = self.len;

    assert!(
      start <= end && end <= old_len,
      "erase range {start}..{end} out of bounds for length {old_len}"
    );

    if start == end {
      return self.cursor_mut(end);
    }

    let base = self.base.as_ptr();

    // The guard closes the gap even when a destructor panics.
    self.len = start;
    let close = CloseGap {
      base,
      len: &mut self.len,
      start,
      end,
      old_len,
    };

    unsafe {
      ptr::drop_in_place(ptr::slice_from_raw_parts_mut(base.add(start), end - start));
    }
    drop(close);

    trace!("erased {start}..{end}, length {}", self.len);

    self.cursor_mut(start)
  }

  /// Removes and returns element `index`, shifting the tail left.
  ///
  /// # Panics
  ///
  /// Panics when `index >= len`.
  pub fn remove(
    &mut self,
    index: usize,
  ) -> T {
    assert!(
      index < self.len,
      "removal index {index} out of bounds for length {}",
      self.len
    );

    unsafe {
      let slot = self.slot(index);
      let value = ptr::read(slot);
      ptr::copy(slot.add(1), slot, self.len - index - 1);
      self.len -= 1;
      value
    }
  }

  /// Drops every element from `new_len` on. Capacity is untouched.
  pub fn truncate(
    &mut self,
    new_len: usize,
  ) {
    if new_len >= self.len {
      return;
    }

    let tail = ptr::slice_from_raw_parts_mut(self.slot(new_len), self.len - new_len);
    self.len = new_len;

    unsafe { ptr::drop_in_place(tail) };
  }

  /// Drops all elements. Committed pages stay committed.
  pub fn clear(&mut self) {
    self.truncate(0);
  }

  /// Appends every value of `values`. Capacity must already cover them.
  fn fill_from(
    &mut self,
    values: impl Iterator<Item = T>,
  ) {
    let base = self.base.as_ptr();
    let capacity = self.capacity();
    let start = self.len;
    let mut len = SetLenOnDrop {
      len: &mut self.len,
      local_len: start,
    };

    for value in values {
      debug_assert!(len.local_len < capacity);

      unsafe { ptr::write(base.add(len.local_len), value) };
      len.local_len += 1;
    }
  }

  /// Shrinks to `new_len`, or grows to it with clones of `value`.
  pub fn resize(
    &mut self,
    new_len: usize,
    value: T,
  ) -> Result<()>
  where
    T: Clone,
  {
    if new_len <= self.len {
      self.truncate(new_len);
      return Ok(());
    }

    self.grow_to(new_len)?;

    let added = new_len - self.len;
    self.fill_from(iter::repeat_n(value, added));

    Ok(())
  }

  /// Shrinks to `new_len`, or grows to it with `T::default()`.
  ///
  /// Only available for `T: Default`:
  ///
  /// ```compile_fail
  /// use vmvec::{SizingPolicy, VirtualVec};
  ///
  /// struct NoDefault(u8);
  ///
  /// if let Ok(mut values) = VirtualVec::<NoDefault>::with_policy(SizingPolicy::ElementCount(4)) {
  ///   let _ = values.resize_default(2);
  /// }
  /// ```
  pub fn resize_default(
    &mut self,
    new_len: usize,
  ) -> Result<()>
  where
    T: Default,
  {
    if new_len <= self.len {
      self.truncate(new_len);
      return Ok(());
    }

    self.grow_to(new_len)?;
    self.fill_from(iter::repeat_with(T::default).take(new_len - self.len));

    Ok(())
  }

  pub fn extend_from_slice(
    &mut self,
    values: &[T],
  ) -> Result<()>
  where
    T: Clone,
  {
    self.grow_by(values.len())?;
    self.fill_from(values.iter().cloned());

    Ok(())
  }

  /// Appends every item of `iter`, stopping at the first failed commit.
  ///
  /// Room for the iterator's lower size bound is committed up front, so an
  /// iterator that can never fit fails before anything is appended.
  pub fn try_extend<I: IntoIterator<Item = T>>(
    &mut self,
    iter: I,
  ) -> Result<()> {
    let iter = iter.into_iter();
    self.grow_by(iter.size_hint().0)?;

    for value in iter {
      self.push(value)?;
    }

    Ok(())
  }

  /// Replaces the contents with clones of `values`.
  ///
  /// Room is committed before the old elements are dropped, so a failure
  /// leaves the array as it was.
  pub fn assign_from_slice(
    &mut self,
    values: &[T],
  ) -> Result<()>
  where
    T: Clone,
  {
    self.grow_to(values.len())?;
    self.clear();
    self.extend_from_slice(values)
  }

  /// Moves the whole array out, leaving `self` detached: no elements, no
  /// capacity, no reservation and a null [`as_ptr`](Self::as_ptr).
  ///
  /// The returned array keeps the original base address.
  pub fn take(&mut self) -> Self
  where
    P: Clone,
  {
    let detached = Self::detached(self.provider.clone(), self.page_size, self.config);
    mem::replace(self, detached)
  }

  /// Exchanges the contents of two arrays without touching element memory.
  pub fn swap(
    &mut self,
    other: &mut Self,
  ) {
    mem::swap(self, other);
  }

  /// A deep copy in a fresh reservation of the same size and configuration.
  ///
  /// This is the only way to copy an array; there is no `Clone` impl because
  /// every copy costs a new reservation.
  pub fn try_clone(&self) -> Result<Self>
  where
    T: Clone,
    P: Clone,
  {
    if !self.is_attached() {
      return Ok(Self::detached(self.provider.clone(), self.page_size, self.config));
    }

    let config = VecConfig {
      policy: SizingPolicy::FixedBytes(self.reserved_bytes()),
      ..self.config
    };

    let mut copy = Self::with_provider(config, self.provider.clone())?;
    copy.extend_from_slice(self.as_slice())?;

    Ok(copy)
  }

  fn cursor_mut(
    &self,
    index: usize,
  ) -> CursorMut<T> {
    CursorMut::new(self.slot(index))
  }

  /// Index of a cursor in `[begin, end]`.
  fn position_index(
    &self,
    position: Cursor<T>,
  ) -> usize {
    let offset = position - self.cbegin();

    assert!(
      offset >= 0 && offset as usize <= self.len,
      "cursor {position:?} outside [begin, end] of length {}",
      self.len
    );

    offset as usize
  }

  pub fn begin(&mut self) -> CursorMut<T> {
    self.cursor_mut(0)
  }

  pub fn end(&mut self) -> CursorMut<T> {
    self.cursor_mut(self.len)
  }

  pub fn cbegin(&self) -> Cursor<T> {
    Cursor::new(self.slot(0))
  }

  pub fn cend(&self) -> Cursor<T> {
    Cursor::new(self.slot(self.len))
  }

  pub fn rbegin(&mut self) -> RevCursor<T, Mut> {
    RevCursor::new(self.end())
  }

  pub fn rend(&mut self) -> RevCursor<T, Mut> {
    RevCursor::new(self.begin())
  }

  pub fn crbegin(&self) -> RevCursor<T, Const> {
    RevCursor::new(self.cend())
  }

  pub fn crend(&self) -> RevCursor<T, Const> {
    RevCursor::new(self.cbegin())
  }

  /// Cursor at `index`, which may be `len` (the end position).
  pub fn cursor_at(
    &self,
    index: usize,
  ) -> Result<Cursor<T>> {
    if index > self.len {
      return Err(VecError::OutOfRange {
        index,
        len: self.len,
      });
    }

    Ok(Cursor::new(self.slot(index)))
  }

  /// Index of `position`, or `None` when it lies outside `[begin, end]`.
  pub fn index_of<M: Access>(
    &self,
    position: RawCursor<T, M>,
  ) -> Option<usize> {
    let offset = position - self.cbegin();

    (offset >= 0 && offset as usize <= self.len).then_some(offset as usize)
  }

  /// The element under `position`, or `None` when it is not a live element.
  pub fn get_at<M: Access>(
    &self,
    position: RawCursor<T, M>,
  ) -> Option<&T> {
    self.index_of(position).and_then(|index| self.as_slice().get(index))
  }
}

/// Writes the final length back even if filling panics halfway.
struct SetLenOnDrop<'a> {
  len: &'a mut usize,
  local_len: usize,
}

impl Drop for SetLenOnDrop<'_> {
  fn drop(&mut self) {
    *self.len = self.local_len;
  }
}

/// A hole of `width` slots opened at `index` with `tail` elements parked after it.
///
/// On drop the tail is moved back against the `filled` slots and the length
/// is restored, so a half-filled hole never exposes uninitialised slots.
struct Gap<'a, T> {
  base: *mut T,
  len: &'a mut usize,
  index: usize,
  filled: usize,
  width: usize,
  tail: usize,
}

impl<T> Drop for Gap<'_, T> {
  fn drop(&mut self) {
    unsafe {
      if self.filled != self.width {
        ptr::copy(
          self.base.add(self.index + self.width),
          self.base.add(self.index + self.filled),
          self.tail,
        );
      }
    }

    *self.len = self.index + self.filled + self.tail;
  }
}

/// Moves `[end, old_len)` down to `start` and fixes the length.
struct CloseGap<'a, T> {
  base: *mut T,
  len: &'a mut usize,
  start: usize,
  end: usize,
  old_len: usize,
}

impl<T> Drop for CloseGap<'_, T> {
  fn drop(&mut self) {
    if self.end != self.old_len {
      unsafe {
        ptr::copy(self.base.add(self.end), self.base.add(self.start), self.old_len - self.end);
      }
    }

    *self.len = self.old_len - (self.end - self.start);
  }
}

/// Hands a reservation back to its provider on drop, also while elements unwind.
struct Release<'a, P: MemoryProvider> {
  provider: &'a P,
  base: NonNull<u8>,
  bytes: usize,
}

impl<P: MemoryProvider> Drop for Release<'_, P> {
  fn drop(&mut self) {
    if let Err(err) = unsafe { self.provider.release(self.base, self.bytes) } {
      warn!("failed to release {} reserved bytes: {err}", self.bytes);
    }
  }
}

impl<T, P: MemoryProvider> Drop for VirtualVec<T, P> {
  fn drop(&mut self) {
    if !self.is_attached() {
      return;
    }

    let _release = Release {
      provider: &self.provider,
      base: self.base.cast(),
      bytes: self.reserved_bytes(),
    };

    unsafe {
      ptr::drop_in_place(ptr::slice_from_raw_parts_mut(self.base.as_ptr(), self.len));
    }
  }
}

impl<T, P: MemoryProvider> Deref for VirtualVec<T, P> {
  type Target = [T];

  fn deref(&self) -> &[T] {
    self.as_slice()
  }
}

impl<T, P: MemoryProvider> DerefMut for VirtualVec<T, P> {
  fn deref_mut(&mut self) -> &mut [T] {
    self.as_mut_slice()
  }
}

impl<T, P: MemoryProvider> AsRef<[T]> for VirtualVec<T, P> {
  fn as_ref(&self) -> &[T] {
    self.as_slice()
  }
}

impl<T, P: MemoryProvider> AsMut<[T]> for VirtualVec<T, P> {
  fn as_mut(&mut self) -> &mut [T] {
    self.as_mut_slice()
  }
}

impl<'a, T, P: MemoryProvider> IntoIterator for &'a VirtualVec<T, P> {
  type Item = &'a T;
  type IntoIter = slice::Iter<'a, T>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}

impl<'a, T, P: MemoryProvider> IntoIterator for &'a mut VirtualVec<T, P> {
  type Item = &'a mut T;
  type IntoIter = slice::IterMut<'a, T>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter_mut()
  }
}

impl<T: fmt::Debug, P: MemoryProvider> fmt::Debug for VirtualVec<T, P> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_list().entries(self.iter()).finish()
  }
}

impl<T: PartialEq, P: MemoryProvider, Q: MemoryProvider> PartialEq<VirtualVec<T, Q>> for VirtualVec<T, P> {
  fn eq(
    &self,
    other: &VirtualVec<T, Q>,
  ) -> bool {
    self.as_slice() == other.as_slice()
  }
}

impl<T: Eq, P: MemoryProvider> Eq for VirtualVec<T, P> {}

impl<T: PartialEq, P: MemoryProvider> PartialEq<[T]> for VirtualVec<T, P> {
  fn eq(
    &self,
    other: &[T],
  ) -> bool {
    self.as_slice() == other
  }
}

impl<T: PartialEq, P: MemoryProvider> PartialEq<&[T]> for VirtualVec<T, P> {
  fn eq(
    &self,
    other: &&[T],
  ) -> bool {
    self.as_slice() == *other
  }
}

impl<T: PartialEq, P: MemoryProvider, const N: usize> PartialEq<[T; N]> for VirtualVec<T, P> {
  fn eq(
    &self,
    other: &[T; N],
  ) -> bool {
    self.as_slice() == other.as_slice()
  }
}

#[cfg(test)]
mod tests {
  use std::{
    cell::Cell,
    panic::{self, AssertUnwindSafe},
    ptr::NonNull,
    rc::Rc,
  };

  use super::*;
  use crate::config::GrowthStrategy;

  fn page() -> usize {
    OsMemory.page_size(false)
  }

  fn ints(count: usize) -> VirtualVec<i32> {
    VirtualVec::with_policy(SizingPolicy::ElementCount(count)).unwrap()
  }

  fn assert_ordering<T, P: MemoryProvider>(vec: &VirtualVec<T, P>) {
    assert!(vec.len() <= vec.capacity());
    assert!(vec.capacity() <= vec.reserve_ceiling());
  }

  /// Counts live instances; every clone and construction bumps, every drop decrements.
  #[derive(Debug)]
  struct Tracked {
    value: u32,
    live: Rc<Cell<isize>>,
    drops: Rc<Cell<usize>>,
  }

  impl Tracked {
    fn new(
      value: u32,
      live: &Rc<Cell<isize>>,
      drops: &Rc<Cell<usize>>,
    ) -> Self {
      live.set(live.get() + 1);
      Self {
        value,
        live: live.clone(),
        drops: drops.clone(),
      }
    }
  }

  impl Clone for Tracked {
    fn clone(&self) -> Self {
      Self::new(self.value, &self.live, &self.drops)
    }
  }

  impl Drop for Tracked {
    fn drop(&mut self) {
      self.live.set(self.live.get() - 1);
      self.drops.set(self.drops.get() + 1);
    }
  }

  /// Clones fine until `budget` runs out, then panics.
  #[derive(Debug)]
  struct Brittle {
    value: u32,
    budget: Rc<Cell<usize>>,
    live: Rc<Cell<isize>>,
  }

  impl Brittle {
    fn new(
      value: u32,
      budget: &Rc<Cell<usize>>,
      live: &Rc<Cell<isize>>,
    ) -> Self {
      live.set(live.get() + 1);
      Self {
        value,
        budget: budget.clone(),
        live: live.clone(),
      }
    }
  }

  impl Clone for Brittle {
    fn clone(&self) -> Self {
      let left = self.budget.get();
      if left == 0 {
        panic!("clone budget exhausted");
      }
      self.budget.set(left - 1);
      Self::new(self.value, &self.budget, &self.live)
    }
  }

  impl Drop for Brittle {
    fn drop(&mut self) {
      self.live.set(self.live.get() - 1);
    }
  }

  /// Delegates to the OS but refuses commits once `commits_left` hits zero.
  #[derive(Default)]
  struct Flaky {
    commits_left: Cell<usize>,
    commits: Cell<usize>,
    releases: Cell<usize>,
  }

  impl Flaky {
    fn allowing(commits: usize) -> Self {
      let flaky = Self::default();
      flaky.commits_left.set(commits);
      flaky
    }
  }

  impl MemoryProvider for Flaky {
    fn page_size(
      &self,
      large_pages: bool,
    ) -> usize {
      OsMemory.page_size(large_pages)
    }

    fn installed_ram(&self) -> Result<usize, ProviderError> {
      Err(ProviderError::Unsupported("installed RAM query"))
    }

    fn reserve(
      &self,
      len: usize,
      page_size: usize,
      hint: Option<NonNull<u8>>,
      commit: bool,
      large_pages: bool,
    ) -> Result<NonNull<u8>, ProviderError> {
      OsMemory.reserve(len, page_size, hint, commit, large_pages)
    }

    unsafe fn commit(
      &self,
      base: NonNull<u8>,
      offset: usize,
      len: usize,
    ) -> Result<NonNull<u8>, ProviderError> {
      let left = self.commits_left.get();
      if left == 0 {
        return Err(ProviderError::Exhausted {
          op: "commit",
          source: std::io::Error::from_raw_os_error(libc::ENOMEM),
        });
      }
      self.commits_left.set(left - 1);
      self.commits.set(self.commits.get() + 1);

      unsafe { OsMemory.commit(base, offset, len) }
    }

    unsafe fn decommit(
      &self,
      addr: NonNull<u8>,
      len: usize,
    ) -> Result<(), ProviderError> {
      unsafe { OsMemory.decommit(addr, len) }
    }

    unsafe fn release(
      &self,
      addr: NonNull<u8>,
      len: usize,
    ) -> Result<(), ProviderError> {
      self.releases.set(self.releases.get() + 1);
      unsafe { OsMemory.release(addr, len) }
    }
  }

  #[test]
  fn test_basic_growth() {
    let mut vec = ints(10);

    for i in 0..10 {
      vec.push(i).unwrap();
    }

    assert_eq!(vec.len(), 10);
    assert!(!vec.as_ptr().is_null());
    assert_eq!(vec[0], 0);
    assert_eq!(vec[9], 9);
    assert_ordering(&vec);
  }

  #[test]
  fn test_construction_reserves_whole_pages() {
    let vec = ints(10);

    assert_eq!(vec.len(), 0);
    assert_eq!(vec.capacity(), 0);
    assert_eq!(vec.reserved_bytes(), page());
    assert_eq!(vec.reserve_ceiling(), page() / 4);
    assert!(vec.as_ptr().is_null());
    assert_eq!(vec.cbegin(), vec.cend());
  }

  #[test]
  fn test_default_policy_reserves_installed_ram() {
    let vec = VirtualVec::<u64>::new().unwrap();
    let ram = vec.installed_ram().unwrap();

    assert_eq!(vec.reserved_bytes(), crate::align_up!(ram, vec.page_size()));
    assert_eq!(vec.capacity(), 0);
  }

  #[test]
  fn test_push_commits_one_page_at_a_time() {
    let mut vec = VirtualVec::<u64>::with_policy(SizingPolicy::FixedBytes(page() * 4)).unwrap();
    let per_page = page() / 8;

    vec.push(1).unwrap();
    assert_eq!(vec.capacity(), per_page);

    for i in 1..per_page as u64 {
      vec.push(i).unwrap();
    }
    assert_eq!(vec.capacity(), per_page);

    vec.push(0).unwrap();
    assert_eq!(vec.capacity(), per_page * 2);
  }

  #[test]
  fn test_address_stability() {
    let mut vec = VirtualVec::<u32>::with_policy(SizingPolicy::FixedBytes(page() * 16)).unwrap();
    vec.push(0).unwrap();

    let base = vec.as_ptr();
    let first = vec.cbegin();

    for i in 1..vec.reserve_ceiling() as u32 {
      vec.push(i).unwrap();
      assert_eq!(vec.as_ptr(), base);
    }

    assert_eq!(vec.cbegin(), first);
    assert_eq!(unsafe { *first.get() }, 0);
  }

  #[test]
  fn test_ceiling_enforcement() {
    let bytes = page() * 2;
    let mut vec = VirtualVec::<u32>::with_policy(SizingPolicy::FixedBytes(bytes)).unwrap();

    for i in 0..(bytes / 4) as u32 {
      vec.push(i).unwrap();
    }

    let (len, capacity) = (vec.len(), vec.capacity());
    let err = vec.push(7).unwrap_err();

    assert!(err.is_alloc_failure());
    assert!(matches!(err, VecError::CeilingExceeded { .. }));
    assert_eq!(vec.len(), len);
    assert_eq!(vec.capacity(), capacity);
    assert_eq!(vec.reserve_ceiling(), bytes / 4);
  }

  #[test]
  fn test_reserve_at_least() {
    let mut vec = VirtualVec::<u64>::with_policy(SizingPolicy::FixedBytes(page() * 8)).unwrap();
    let per_page = page() / 8;

    vec.reserve_at_least(per_page * 3 + 1).unwrap();
    assert_eq!(vec.capacity(), per_page * 4);

    vec.reserve_at_least(5).unwrap();
    assert_eq!(vec.capacity(), per_page * 4);

    let err = vec.reserve_at_least(per_page * 8 + 1).unwrap_err();
    assert!(err.is_alloc_failure());
    assert_eq!(vec.capacity(), per_page * 4);
    assert_eq!(vec.len(), 0);
  }

  #[test]
  fn test_growth_ahead() {
    let config = VecConfig::new(SizingPolicy::FixedBytes(page() * 4)).growth(GrowthStrategy::Ahead(2));
    let mut vec = VirtualVec::<u8>::with_config(config).unwrap();

    vec.push(1).unwrap();
    assert_eq!(vec.committed_bytes(), page() * 3);

    vec.reserve_at_least(page() * 3 + 1).unwrap();
    assert_eq!(vec.committed_bytes(), page() * 4);
  }

  #[test]
  fn test_commit_with_reserve() {
    let config = VecConfig::new(SizingPolicy::ElementCount(100)).commit_with_reserve(true);
    let mut vec = VirtualVec::<u16>::with_config(config).unwrap();

    assert_eq!(vec.capacity(), vec.reserve_ceiling());

    vec.resize(vec.reserve_ceiling(), 3).unwrap();
    assert!(vec.push(4).unwrap_err().is_alloc_failure());
  }

  #[test]
  fn test_large_pages_commit_everything() {
    let config = VecConfig::new(SizingPolicy::FixedBytes(1)).large_pages(true);

    // Hosts without configured huge pages refuse the reservation.
    match VirtualVec::<u8>::with_config(config) {
      Ok(vec) => {
        assert_eq!(vec.page_size(), OsMemory.page_size(true));
        assert_eq!(vec.capacity(), vec.reserve_ceiling());
      }
      Err(err) => assert!(err.is_alloc_failure()),
    }
  }

  #[test]
  fn test_invalid_configs() {
    let zero = VirtualVec::<u8>::with_policy(SizingPolicy::FixedBytes(0)).unwrap_err();
    assert!(zero.is_invalid_config());

    let unit = VirtualVec::<()>::with_policy(SizingPolicy::ElementCount(4)).unwrap_err();
    assert!(unit.is_invalid_config());

    let overflow = VirtualVec::<u64>::with_policy(SizingPolicy::ElementCount(usize::MAX / 4)).unwrap_err();
    assert!(overflow.is_invalid_config());

    let ram = VirtualVec::<u8, Flaky>::with_provider(VecConfig::default(), Flaky::default()).unwrap_err();
    assert!(ram.is_invalid_config());
  }

  #[test]
  fn test_oversized_element_is_rejected() {
    #[derive(Debug)]
    #[repr(align(4194304))]
    struct Huge(u8);

    let err = VirtualVec::<Huge>::with_policy(SizingPolicy::ElementCount(1)).unwrap_err();
    assert!(err.is_invalid_config());
  }

  #[test]
  fn test_reservation_failure() {
    let absurd = (isize::MAX as usize / page()) * page();

    let err = VirtualVec::<u8>::with_policy(SizingPolicy::FixedBytes(absurd)).unwrap_err();

    assert!(matches!(err, VecError::Reserve { .. }));
    assert!(err.is_alloc_failure());
  }

  #[test]
  fn test_commit_failure_is_atomic() {
    let flaky = Flaky::allowing(1);
    let config = VecConfig::new(SizingPolicy::FixedBytes(page() * 4));
    let mut vec = VirtualVec::<u64, &Flaky>::with_provider(config, &flaky).unwrap();
    let per_page = page() / 8;

    for i in 0..per_page as u64 {
      vec.push(i).unwrap();
    }

    let built = Cell::new(false);
    let err = vec
      .emplace_back(|| {
        built.set(true);
        0
      })
      .unwrap_err();

    assert!(matches!(err, VecError::Commit { .. }));
    assert!(err.is_alloc_failure());
    assert!(!built.get());
    assert_eq!(vec.len(), per_page);
    assert_eq!(vec.capacity(), per_page);

    let err = vec.insert(0, 99).unwrap_err();
    assert!(err.is_alloc_failure());
    assert_eq!(vec[0], 0);
    assert_eq!(vec.len(), per_page);

    let position = vec.cbegin() + 1;
    assert!(matches!(vec.insert_n(position, 3, &7), Err(VecError::Commit { .. })));

    assert!(matches!(vec.resize(per_page + 1, 7), Err(VecError::Commit { .. })));

    assert!(matches!(vec.reserve_at_least(per_page * 2), Err(VecError::Commit { .. })));

    let expected: Vec<u64> = (0..per_page as u64).collect();
    assert_eq!(vec, expected.as_slice());
    assert_eq!(vec.capacity(), per_page);
    assert_eq!(vec.reserve_ceiling(), per_page * 4);

    drop(vec);
    assert_eq!(flaky.commits.get(), 1);
    assert_eq!(flaky.releases.get(), 1);
  }

  #[test]
  fn test_indexed_access() {
    let vec = VirtualVec::from_slice(VecConfig::new(SizingPolicy::ElementCount(8)), &[5, 6, 7]).unwrap();

    assert_eq!(*vec.try_index(2).unwrap(), 7);
    assert!(matches!(vec.try_index(3), Err(VecError::OutOfRange { index: 3, len: 3 })));

    // Committed but unconstructed slots are never exposed.
    assert!(vec.capacity() > 3);
    assert!(vec.try_index(4).unwrap_err().is_out_of_range());

    let fallback = -1;
    assert_eq!(*vec.at(1, &fallback), 6);
    assert_eq!(*vec.at(100, &fallback), -1);

    assert_eq!(*vec.front().unwrap(), 5);
    assert_eq!(*vec.back().unwrap(), 7);
  }

  #[test]
  fn test_front_back_on_empty() {
    let mut vec = ints(4);

    assert!(vec.front().unwrap_err().is_out_of_range());
    assert!(matches!(vec.back(), Err(VecError::OutOfRange { index: 0, len: 0 })));
    assert_eq!(vec.back().unwrap_err().to_string(), "index 0 out of range for length 0");
    assert!(vec.back_mut().is_err());
    assert_eq!(vec.pop(), None);
  }

  #[test]
  #[should_panic(expected = "remove_last on an empty VirtualVec")]
  fn test_remove_last_on_empty_panics() {
    ints(4).remove_last();
  }

  #[test]
  fn test_remove_last_and_pop() {
    let mut vec = ints(8);
    vec.extend_from_slice(&[1, 2, 3]).unwrap();

    vec.remove_last();
    assert_eq!(vec, [1, 2]);

    assert_eq!(vec.pop(), Some(2));
    assert_eq!(vec, [1]);
  }

  #[test]
  fn test_insert_shifts_tail() {
    let mut vec = VirtualVec::from_slice(VecConfig::new(SizingPolicy::ElementCount(16)), &[0, 1, 2, 3]).unwrap();

    let cursor = vec.insert(2, 9).unwrap();

    assert_eq!(unsafe { *cursor.get() }, 9);
    assert_eq!(vec, [0, 1, 9, 2, 3]);

    let end = vec.cend();
    vec.insert_at(end, 10).unwrap();
    assert_eq!(vec, [0, 1, 9, 2, 3, 10]);

    let begin = vec.cbegin();
    vec.emplace_at(begin, || -1).unwrap();
    assert_eq!(vec, [-1, 0, 1, 9, 2, 3, 10]);
  }

  #[test]
  fn test_insert_into_empty_ignores_position() {
    let mut vec = ints(8);

    let cursor = vec.insert(42, 7).unwrap();

    assert_eq!(vec, [7]);
    assert_eq!(cursor, vec.begin());
  }

  #[test]
  #[should_panic(expected = "out of bounds")]
  fn test_insert_past_end_panics() {
    let mut vec = ints(8);
    vec.push(1).unwrap();

    let _ = vec.insert(2, 3);
  }

  #[test]
  fn test_insert_crosses_page_boundary() {
    let mut vec = VirtualVec::<u32>::with_policy(SizingPolicy::FixedBytes(page() * 2)).unwrap();
    let per_page = page() / 4;

    for i in 0..per_page as u32 {
      vec.push(i).unwrap();
    }
    assert_eq!(vec.capacity(), per_page);

    vec.insert(0, u32::MAX).unwrap();

    assert_eq!(vec.capacity(), per_page * 2);
    assert_eq!(vec[0], u32::MAX);
    assert_eq!(vec[per_page], per_page as u32 - 1);
  }

  #[test]
  fn test_insert_n() {
    let mut vec = VirtualVec::<u64>::with_policy(SizingPolicy::FixedBytes(page() * 8)).unwrap();
    vec.extend_from_slice(&[1, 2, 3]).unwrap();

    // Wider than a page: committed in one step.
    let count = page() / 8 * 2;
    let position = vec.cbegin() + 1;
    let cursor = vec.insert_n(position, count, &0).unwrap();

    assert_eq!(vec.index_of(cursor), Some(1));
    assert_eq!(vec.len(), count + 3);
    assert_eq!(vec[0], 1);
    assert!(vec[1..=count].iter().all(|value| *value == 0));
    assert_eq!(vec[count + 1], 2);
    assert_eq!(vec[count + 2], 3);

    let len = vec.len();
    let end = vec.cend();
    vec.insert_n(end, 0, &9).unwrap();
    assert_eq!(vec.len(), len);
  }

  #[test]
  fn test_insert_n_panicking_clone_keeps_array_consistent() {
    let budget = Rc::new(Cell::new(usize::MAX));
    let live = Rc::new(Cell::new(0));

    let mut vec = VirtualVec::<Brittle>::with_policy(SizingPolicy::ElementCount(64)).unwrap();
    for i in 0..4 {
      vec.push(Brittle::new(i, &budget, &live)).unwrap();
    }

    let filler = Brittle::new(100, &budget, &live);
    budget.set(2);

    let position = vec.cbegin() + 1;
    let result = panic::catch_unwind(AssertUnwindSafe(|| vec.insert_n(position, 5, &filler)));
    assert!(result.is_err());

    let values: Vec<u32> = vec.iter().map(|item| item.value).collect();
    assert_eq!(values, vec![0, 100, 100, 1, 2, 3]);

    drop(vec);
    drop(filler);
    assert_eq!(live.get(), 0);
  }

  #[test]
  fn test_erase_gap_close() {
    let mut vec = VirtualVec::from_slice(VecConfig::new(SizingPolicy::ElementCount(16)), &[1, 2, 0, 0, 3, 4, 5, 6]).unwrap();
    let capacity = vec.capacity();

    let first = vec.cbegin() + 2;
    let last = vec.cbegin() + 4;
    let next = vec.erase(first, last);

    assert_eq!(vec, [1, 2, 3, 4, 5, 6]);
    assert_eq!(vec.capacity(), capacity);
    assert_eq!(unsafe { *next.get() }, 3);
  }

  #[test]
  fn test_erase_edges() {
    let mut vec = VirtualVec::from_slice(VecConfig::new(SizingPolicy::ElementCount(16)), &[1, 2, 3, 4]).unwrap();

    let at = vec.cbegin() + 1;
    let next = vec.erase(at, at);
    assert_eq!(next, at);
    assert_eq!(vec.len(), 4);

    let last = vec.cend() - 1;
    let next = vec.erase_at(last);
    assert_eq!(next, vec.end());
    assert_eq!(vec, [1, 2, 3]);

    let begin = vec.cbegin();
    vec.erase_at(begin);
    assert_eq!(vec, [2, 3]);

    let (begin, end) = (vec.cbegin(), vec.cend());
    vec.erase(begin, end);
    assert!(vec.is_empty());
  }

  #[test]
  #[should_panic(expected = "erase range is reversed")]
  fn test_erase_reversed_range_panics() {
    let mut vec = VirtualVec::from_slice(VecConfig::new(SizingPolicy::ElementCount(4)), &[1, 2]).unwrap();
    let (begin, end) = (vec.cbegin(), vec.cend());

    vec.erase(end, begin);
  }

  #[test]
  #[should_panic(expected = "outside [begin, end]")]
  fn test_erase_past_end_panics() {
    let mut vec = VirtualVec::from_slice(VecConfig::new(SizingPolicy::ElementCount(4)), &[1, 2]).unwrap();
    let begin = vec.cbegin();
    let beyond = vec.cend() + 1;

    vec.erase(begin, beyond);
  }

  #[test]
  fn test_erase_drops_exactly_the_range() {
    let live = Rc::new(Cell::new(0));
    let drops = Rc::new(Cell::new(0));

    let mut vec = VirtualVec::<Tracked>::with_policy(SizingPolicy::ElementCount(16)).unwrap();
    for i in 0..6 {
      vec.push(Tracked::new(i, &live, &drops)).unwrap();
    }

    vec.erase_range(1..4);

    assert_eq!(drops.get(), 3);
    let values: Vec<u32> = vec.iter().map(|item| item.value).collect();
    assert_eq!(values, vec![0, 4, 5]);

    let removed = vec.remove(1);
    assert_eq!(removed.value, 4);
    assert_eq!(drops.get(), 3);
    drop(removed);

    assert_eq!(vec.len(), 2);
    assert_eq!(vec[1].value, 5);
  }

  #[test]
  fn test_clear_keeps_capacity() {
    let live = Rc::new(Cell::new(0));
    let drops = Rc::new(Cell::new(0));

    let mut vec = VirtualVec::<Tracked>::with_policy(SizingPolicy::ElementCount(32)).unwrap();
    for i in 0..10 {
      vec.push(Tracked::new(i, &live, &drops)).unwrap();
    }
    let capacity = vec.capacity();

    vec.clear();

    assert!(vec.is_empty());
    assert_eq!(vec.capacity(), capacity);
    assert_eq!(live.get(), 0);
    assert_eq!(drops.get(), 10);
  }

  #[test]
  fn test_resize_shrink_then_grow() {
    let mut vec = ints(64);

    vec.resize_default(10).unwrap();
    assert_eq!(vec.len(), 10);
    assert!(vec.iter().all(|value| *value == 0));

    for (i, value) in vec.iter_mut().enumerate() {
      *value = i as i32;
    }

    vec.resize_default(5).unwrap();
    assert_eq!(vec, [0, 1, 2, 3, 4]);

    vec.resize(20, 7).unwrap();
    assert_eq!(vec.len(), 20);
    assert_eq!(vec[..5], [0, 1, 2, 3, 4]);
    assert!(vec[5..20].iter().all(|value| *value == 7));

    vec.resize(20, 1).unwrap();
    assert_eq!(vec[19], 7);
  }

  #[test]
  fn test_resize_past_ceiling_fails() {
    let mut vec = ints(16);
    let ceiling = vec.reserve_ceiling();

    let err = vec.resize(ceiling + 1, 0).unwrap_err();

    assert!(err.is_alloc_failure());
    assert!(vec.is_empty());
    assert_eq!(vec.capacity(), 0);
  }

  #[test]
  fn test_construct_destroy_balance() {
    let live = Rc::new(Cell::new(0));
    let drops = Rc::new(Cell::new(0));

    {
      let config = VecConfig::new(SizingPolicy::ElementCount(100));
      let mut vec = VirtualVec::from_elem(config, 10, Tracked::new(1, &live, &drops)).unwrap();
      assert_eq!(live.get(), 10);

      vec.insert(3, Tracked::new(2, &live, &drops)).unwrap();
      let position = vec.cbegin() + 5;
      let filler = Tracked::new(3, &live, &drops);
      vec.insert_n(position, 4, &filler).unwrap();
      drop(filler);
      vec.erase_range(0..2);
      vec.resize(30, Tracked::new(4, &live, &drops)).unwrap();
      vec.truncate(12);
      vec.remove_last();

      assert_eq!(live.get(), vec.len() as isize);
    }

    assert_eq!(live.get(), 0);
  }

  #[test]
  fn test_take_leaves_source_detached() {
    let mut a = VirtualVec::from_slice(VecConfig::new(SizingPolicy::ElementCount(16)), &[1, 2, 3]).unwrap();
    let base = a.as_ptr();

    let b = a.take();

    assert_eq!(a.len(), 0);
    assert_eq!(a.capacity(), 0);
    assert_eq!(a.reserve_ceiling(), 0);
    assert!(a.as_ptr().is_null());
    assert!(!a.is_attached());
    assert!(a.push(4).unwrap_err().is_alloc_failure());

    assert_eq!(b, [1, 2, 3]);
    assert_eq!(b.as_ptr(), base);
  }

  #[test]
  fn test_move_assign_releases_previous_reservation() {
    let flaky = Flaky::allowing(usize::MAX);
    let config = VecConfig::new(SizingPolicy::ElementCount(16));

    let mut target = VirtualVec::<u8, &Flaky>::with_provider(config, &flaky).unwrap();
    let mut source = VirtualVec::<u8, &Flaky>::with_provider(config, &flaky).unwrap();
    source.push(5).unwrap();
    assert!(target.is_empty());

    target = source.take();
    assert_eq!(flaky.releases.get(), 1);
    assert_eq!(target, [5]);

    drop(source);
    assert_eq!(flaky.releases.get(), 1);

    drop(target);
    assert_eq!(flaky.releases.get(), 2);
  }

  #[derive(Debug)]
  struct Bomb(bool);

  impl Drop for Bomb {
    fn drop(&mut self) {
      if self.0 {
        panic!("element destructor failed");
      }
    }
  }

  #[test]
  fn test_panicking_element_drop_still_releases() {
    let flaky = Flaky::allowing(usize::MAX);
    let config = VecConfig::new(SizingPolicy::ElementCount(4));

    let mut vec = VirtualVec::<Bomb, &Flaky>::with_provider(config, &flaky).unwrap();
    vec.push(Bomb(true)).unwrap();
    vec.push(Bomb(false)).unwrap();

    let result = panic::catch_unwind(AssertUnwindSafe(|| drop(vec)));

    assert!(result.is_err());
    assert_eq!(flaky.releases.get(), 1);
  }

  #[test]
  fn test_swap() {
    let mut a = VirtualVec::from_slice(VecConfig::new(SizingPolicy::ElementCount(8)), &[1, 2]).unwrap();
    let mut b = VirtualVec::from_slice(VecConfig::new(SizingPolicy::ElementCount(4096)), &[3]).unwrap();
    let (base_a, base_b) = (a.as_ptr(), b.as_ptr());
    let (ceiling_a, ceiling_b) = (a.reserve_ceiling(), b.reserve_ceiling());

    a.swap(&mut b);

    assert_eq!(a, [3]);
    assert_eq!(b, [1, 2]);
    assert_eq!(a.as_ptr(), base_b);
    assert_eq!(b.as_ptr(), base_a);
    assert_eq!(a.reserve_ceiling(), ceiling_b);
    assert_eq!(b.reserve_ceiling(), ceiling_a);
  }

  #[test]
  fn test_try_clone() {
    let original = VirtualVec::from_slice(VecConfig::new(SizingPolicy::ElementCount(32)), &[String::from("a"), String::from("b")]).unwrap();

    let copy = original.try_clone().unwrap();

    assert_eq!(copy, original);
    assert_ne!(copy.as_ptr(), original.as_ptr());
    assert_eq!(copy.reserve_ceiling(), original.reserve_ceiling());
  }

  #[test]
  fn test_assign_from_slice() {
    let mut vec = ints(8);
    vec.extend_from_slice(&[1, 2, 3]).unwrap();

    vec.assign_from_slice(&[9, 8]).unwrap();
    assert_eq!(vec, [9, 8]);

    let too_many = vec![0; vec.reserve_ceiling() + 1];
    assert!(vec.assign_from_slice(&too_many).unwrap_err().is_alloc_failure());
    assert_eq!(vec, [9, 8]);
  }

  #[test]
  fn test_try_extend() {
    let mut vec = VirtualVec::try_from_iter(VecConfig::new(SizingPolicy::ElementCount(8)), 0..5).unwrap();
    assert_eq!(vec, [0, 1, 2, 3, 4]);

    let ceiling = vec.reserve_ceiling();
    let err = vec.try_extend(0..ceiling as i32).unwrap_err();
    assert!(err.is_alloc_failure());
    assert_eq!(vec.len(), 5);
  }

  #[test]
  fn test_with_len() {
    let vec = VirtualVec::<String>::with_len(VecConfig::new(SizingPolicy::ElementCount(4)), 3).unwrap();

    assert_eq!(vec.len(), 3);
    assert!(vec.iter().all(String::is_empty));
  }

  #[test]
  fn test_cursor_iteration() {
    let mut vec = VirtualVec::from_slice(VecConfig::new(SizingPolicy::ElementCount(8)), &[1, 2, 3, 4]).unwrap();

    assert_eq!(vec.cend() - vec.cbegin(), 4);

    let mut forward = Vec::new();
    let mut cursor = vec.cbegin();
    while cursor != vec.cend() {
      forward.push(unsafe { *cursor.get() });
      cursor += 1;
    }
    assert_eq!(forward, vec![1, 2, 3, 4]);

    let mut backward = Vec::new();
    let mut cursor = vec.crbegin();
    while cursor != vec.crend() {
      backward.push(unsafe { *cursor.get() });
      cursor += 1;
    }
    assert_eq!(backward, vec![4, 3, 2, 1]);

    let rbegin = vec.rbegin();
    unsafe { *rbegin.get_mut() = 40 };
    let begin = vec.begin();
    unsafe { *begin.get_mut() = 10 };
    assert_eq!(vec, [10, 2, 3, 40]);

    assert_eq!(vec.iter().rev().copied().collect::<Vec<_>>(), vec![40, 3, 2, 10]);
  }

  #[test]
  fn test_cursor_bridges() {
    let vec = VirtualVec::from_slice(VecConfig::new(SizingPolicy::ElementCount(8)), &[5, 6]).unwrap();

    let end = vec.cursor_at(2).unwrap();
    assert_eq!(end, vec.cend());
    assert!(vec.cursor_at(3).unwrap_err().is_out_of_range());

    assert_eq!(vec.index_of(vec.cbegin() + 1), Some(1));
    assert_eq!(vec.index_of(vec.cend() + 1), None);
    assert_eq!(vec.index_of(vec.cbegin() - 1), None);

    assert_eq!(vec.get_at(vec.cbegin() + 1), Some(&6));
    assert_eq!(vec.get_at(vec.cend()), None);
  }

  #[test]
  fn test_empty_cursors_are_equal() {
    let mut vec = ints(4);

    assert_eq!(vec.cbegin(), vec.cend());
    assert_eq!(vec.crbegin(), vec.crend());
    let (begin, end) = (vec.begin(), vec.end());
    assert_eq!(begin, end);
  }

  #[test]
  fn test_debug_and_eq() {
    let a = VirtualVec::from_slice(VecConfig::new(SizingPolicy::ElementCount(4)), &[1, 2]).unwrap();
    let b = VirtualVec::from_slice(VecConfig::new(SizingPolicy::ElementCount(400)), &[1, 2]).unwrap();

    assert_eq!(format!("{a:?}"), "[1, 2]");
    assert_eq!(a, b);
    assert_eq!(a, &[1, 2][..]);
  }

  mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Clone, Debug)]
    enum Op {
      Push(u16),
      Insert(usize, u16),
      InsertN(usize, usize, u16),
      Erase(usize, usize),
      Resize(usize, u16),
      RemoveLast,
      Clear,
    }

    fn op() -> impl Strategy<Value = Op> {
      prop_oneof![
        4 => any::<u16>().prop_map(Op::Push),
        2 => (any::<usize>(), any::<u16>()).prop_map(|(i, v)| Op::Insert(i, v)),
        1 => (any::<usize>(), 0usize..3000, any::<u16>()).prop_map(|(i, n, v)| Op::InsertN(i, n, v)),
        2 => (any::<usize>(), any::<usize>()).prop_map(|(a, b)| Op::Erase(a, b)),
        1 => (0usize..5000, any::<u16>()).prop_map(|(n, v)| Op::Resize(n, v)),
        1 => Just(Op::RemoveLast),
        1 => Just(Op::Clear),
      ]
    }

    proptest! {
      #[test]
      fn matches_vec_model(ops in proptest::collection::vec(op(), 1..60)) {
        let mut vec = VirtualVec::<u16>::with_policy(SizingPolicy::ElementCount(8192)).unwrap();
        let mut model: Vec<u16> = Vec::new();
        let ceiling = vec.reserve_ceiling();

        for op in ops {
          let capacity = vec.capacity();

          match op {
            Op::Push(v) => {
              if vec.push(v).is_ok() {
                model.push(v);
              }
            }
            Op::Insert(i, v) => {
              let index = if model.is_empty() { 0 } else { i % (model.len() + 1) };
              if vec.insert(index, v).is_ok() {
                model.insert(index, v);
              }
            }
            Op::InsertN(i, n, v) => {
              let index = if model.is_empty() { 0 } else { i % (model.len() + 1) };
              let position = vec.cursor_at(index).unwrap();
              let result = vec.insert_n(position, n, &v);
              prop_assert_eq!(result.is_ok(), model.len() + n <= ceiling);
              if result.is_ok() {
                let tail = model.split_off(index);
                model.extend(std::iter::repeat_n(v, n));
                model.extend(tail);
              }
            }
            Op::Erase(a, b) => {
              let (a, b) = (a % (model.len() + 1), b % (model.len() + 1));
              let (start, end) = (a.min(b), a.max(b));
              vec.erase_range(start..end);
              let _ = model.drain(start..end);
            }
            Op::Resize(n, v) => {
              if vec.resize(n, v).is_ok() {
                model.resize(n, v);
              }
            }
            Op::RemoveLast => {
              if !model.is_empty() {
                vec.remove_last();
                model.pop();
              }
            }
            Op::Clear => {
              vec.clear();
              model.clear();
            }
          }

          prop_assert_eq!(vec.as_slice(), model.as_slice());
          prop_assert!(vec.capacity() >= capacity);
          prop_assert_eq!(vec.reserve_ceiling(), ceiling);
          prop_assert!(vec.len() <= vec.capacity());
          prop_assert!(vec.capacity() <= vec.reserve_ceiling());
        }
      }

      #[test]
      fn insert_shifts_right(len in 1usize..200, at in any::<usize>(), value in any::<u32>()) {
        let original: Vec<u32> = (0..len as u32).collect();
        let mut vec = VirtualVec::from_slice(VecConfig::new(SizingPolicy::ElementCount(256)), &original).unwrap();
        let index = at % len;

        vec.insert(index, value).unwrap();

        prop_assert_eq!(vec[index], value);
        prop_assert_eq!(&vec[..index], &original[..index]);
        prop_assert_eq!(&vec[index + 1..], &original[index..]);
      }

      #[test]
      fn erase_concatenates(len in 0usize..200, a in any::<usize>(), b in any::<usize>()) {
        let original: Vec<u32> = (0..len as u32).collect();
        let mut vec = VirtualVec::from_slice(VecConfig::new(SizingPolicy::ElementCount(256)), &original).unwrap();
        let (a, b) = (a % (len + 1), b % (len + 1));
        let (first, last) = (vec.cbegin() + a.min(b) as isize, vec.cbegin() + a.max(b) as isize);

        vec.erase(first, last);

        let expected: Vec<u32> = original[..a.min(b)].iter().chain(&original[a.max(b)..]).copied().collect();
        prop_assert_eq!(vec.as_slice(), expected.as_slice());
      }
    }
  }
}
