//! Random-access positions inside a [`VirtualVec`](crate::VirtualVec).
//!
//! A cursor is an address, nothing more: it does not borrow the array, so it can
//! be handed back to mutating calls such as [`VirtualVec::erase`](crate::VirtualVec::erase)
//! or [`VirtualVec::insert_at`](crate::VirtualVec::insert_at). Moving a cursor is
//! plain pointer arithmetic and is always safe; reading through one is not,
//! because the array may have shifted or dropped the element since.
//!
//! ```text
//!   begin()                         end()
//!     │                               │
//!     ▼                               ▼
//!   ┌─────┬─────┬─────┬─────┬─────┬ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ┐
//!   │  0  │  1  │  2  │  3  │  4  │   committed, empty
//!   └─────┴─────┴─────┴─────┴─────┴ ─ ─ ─ ─ ─ ─ ─ ─ ─ ─ ┘
//!               ▲                 ▲
//!               │                 │
//!           rend() - 3        rbegin()   (reverse cursors read base - 1)
//! ```
//!
//! Cursors survive appends, since the base address never moves, but not
//! insertions or erasures that shift elements.

use std::{
  cmp::Ordering,
  fmt,
  hash::{Hash, Hasher},
  marker::PhantomData,
  mem,
  ops::{Add, AddAssign, Sub, SubAssign},
};

mod sealed {
  pub trait Sealed {}
}

/// Access level of a cursor: [`Const`] or [`Mut`].
pub trait Access: sealed::Sealed {}

/// Read-only access.
#[derive(Debug)]
pub enum Const {}

/// Read-write access.
#[derive(Debug)]
pub enum Mut {}

impl sealed::Sealed for Const {}
impl sealed::Sealed for Mut {}
impl Access for Const {}
impl Access for Mut {}

/// A position in the live range of an array. See the [module docs](self).
pub struct RawCursor<T, M: Access = Const> {
  ptr: *mut T,
  _access: PhantomData<fn() -> M>,
}

pub type Cursor<T> = RawCursor<T, Const>;
pub type CursorMut<T> = RawCursor<T, Mut>;

const fn stride<T>() -> isize {
  let size = mem::size_of::<T>();
  if size == 0 { 1 } else { size as isize }
}

impl<T, M: Access> RawCursor<T, M> {
  pub(crate) fn new(ptr: *mut T) -> Self {
    debug_assert!(!ptr.is_null(), "cursor over a null pointer");

    Self {
      ptr,
      _access: PhantomData,
    }
  }

  pub fn as_ptr(self) -> *const T {
    self.ptr
  }

  /// Read-only view of the same position.
  pub fn to_const(self) -> Cursor<T> {
    RawCursor::new(self.ptr)
  }

  /// Moves `n` elements forward.
  pub fn advance(
    self,
    n: usize,
  ) -> Self {
    Self::new(self.ptr.wrapping_add(n))
  }

  /// Moves `n` elements backward.
  pub fn retreat(
    self,
    n: usize,
  ) -> Self {
    Self::new(self.ptr.wrapping_sub(n))
  }

  /// Number of elements from `origin` to `self`.
  pub fn distance_from<N: Access>(
    self,
    origin: RawCursor<T, N>,
  ) -> isize {
    (self.ptr as isize).wrapping_sub(origin.ptr as isize) / stride::<T>()
  }

  /// # Safety
  ///
  /// The cursor must point at a live element, and the element must stay live
  /// and unaliased by a mutable reference for `'a`.
  pub unsafe fn get<'a>(self) -> &'a T {
    unsafe { &*self.ptr }
  }

  /// The element `n` positions away, like `cursor[n]`.
  ///
  /// # Safety
  ///
  /// Same contract as [`get`](Self::get) for the target position.
  pub unsafe fn get_at<'a>(
    self,
    n: isize,
  ) -> &'a T {
    unsafe { (self + n).get() }
  }
}

impl<T> CursorMut<T> {
  pub fn as_mut_ptr(self) -> *mut T {
    self.ptr
  }

  /// # Safety
  ///
  /// The cursor must point at a live element, and no other reference to it may
  /// exist for `'a`.
  pub unsafe fn get_mut<'a>(self) -> &'a mut T {
    unsafe { &mut *self.ptr }
  }
}

impl<T> From<CursorMut<T>> for Cursor<T> {
  fn from(cursor: CursorMut<T>) -> Self {
    cursor.to_const()
  }
}

impl<T, M: Access> Clone for RawCursor<T, M> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<T, M: Access> Copy for RawCursor<T, M> {}

impl<T, M: Access> fmt::Debug for RawCursor<T, M> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_tuple("Cursor").field(&self.ptr).finish()
  }
}

impl<T, M: Access, N: Access> PartialEq<RawCursor<T, N>> for RawCursor<T, M> {
  fn eq(
    &self,
    other: &RawCursor<T, N>,
  ) -> bool {
    self.ptr == other.ptr
  }
}

impl<T, M: Access> Eq for RawCursor<T, M> {}

impl<T, M: Access, N: Access> PartialOrd<RawCursor<T, N>> for RawCursor<T, M> {
  fn partial_cmp(
    &self,
    other: &RawCursor<T, N>,
  ) -> Option<Ordering> {
    Some(self.ptr.cmp(&other.ptr))
  }
}

impl<T, M: Access> Ord for RawCursor<T, M> {
  fn cmp(
    &self,
    other: &Self,
  ) -> Ordering {
    self.ptr.cmp(&other.ptr)
  }
}

impl<T, M: Access> Hash for RawCursor<T, M> {
  fn hash<H: Hasher>(
    &self,
    state: &mut H,
  ) {
    self.ptr.hash(state);
  }
}

impl<T, M: Access> Add<isize> for RawCursor<T, M> {
  type Output = Self;

  fn add(
    self,
    n: isize,
  ) -> Self {
    Self::new(self.ptr.wrapping_offset(n))
  }
}

impl<T, M: Access> Sub<isize> for RawCursor<T, M> {
  type Output = Self;

  fn sub(
    self,
    n: isize,
  ) -> Self {
    Self::new(self.ptr.wrapping_offset(n.wrapping_neg()))
  }
}

impl<T, M: Access> AddAssign<isize> for RawCursor<T, M> {
  fn add_assign(
    &mut self,
    n: isize,
  ) {
    *self = *self + n;
  }
}

impl<T, M: Access> SubAssign<isize> for RawCursor<T, M> {
  fn sub_assign(
    &mut self,
    n: isize,
  ) {
    *self = *self - n;
  }
}

impl<T, M: Access, N: Access> Sub<RawCursor<T, N>> for RawCursor<T, M> {
  type Output = isize;

  fn sub(
    self,
    other: RawCursor<T, N>,
  ) -> isize {
    self.distance_from(other)
  }
}

/// A cursor walking backwards. It reads the element just before its base.
pub struct RevCursor<T, M: Access = Const> {
  base: RawCursor<T, M>,
}

impl<T, M: Access> RevCursor<T, M> {
  pub(crate) fn new(base: RawCursor<T, M>) -> Self {
    Self { base }
  }

  /// The forward cursor one past the element this one reads.
  pub fn base(self) -> RawCursor<T, M> {
    self.base
  }

  /// # Safety
  ///
  /// Same contract as [`RawCursor::get`] for `base() - 1`.
  pub unsafe fn get<'a>(self) -> &'a T {
    unsafe { self.base.retreat(1).get() }
  }
}

impl<T> RevCursor<T, Mut> {
  /// # Safety
  ///
  /// Same contract as [`RawCursor::get_mut`] for `base() - 1`.
  pub unsafe fn get_mut<'a>(self) -> &'a mut T {
    unsafe { self.base.retreat(1).get_mut() }
  }
}

impl<T, M: Access> Clone for RevCursor<T, M> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<T, M: Access> Copy for RevCursor<T, M> {}

impl<T, M: Access> fmt::Debug for RevCursor<T, M> {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_tuple("RevCursor").field(&self.base.ptr).finish()
  }
}

impl<T, M: Access> PartialEq for RevCursor<T, M> {
  fn eq(
    &self,
    other: &Self,
  ) -> bool {
    self.base == other.base
  }
}

impl<T, M: Access> Eq for RevCursor<T, M> {}

impl<T, M: Access> PartialOrd for RevCursor<T, M> {
  fn partial_cmp(
    &self,
    other: &Self,
  ) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl<T, M: Access> Ord for RevCursor<T, M> {
  fn cmp(
    &self,
    other: &Self,
  ) -> Ordering {
    other.base.cmp(&self.base)
  }
}

impl<T, M: Access> Add<isize> for RevCursor<T, M> {
  type Output = Self;

  fn add(
    self,
    n: isize,
  ) -> Self {
    Self::new(self.base - n)
  }
}

impl<T, M: Access> Sub<isize> for RevCursor<T, M> {
  type Output = Self;

  fn sub(
    self,
    n: isize,
  ) -> Self {
    Self::new(self.base + n)
  }
}

impl<T, M: Access> AddAssign<isize> for RevCursor<T, M> {
  fn add_assign(
    &mut self,
    n: isize,
  ) {
    *self = *self + n;
  }
}

impl<T, M: Access> SubAssign<isize> for RevCursor<T, M> {
  fn sub_assign(
    &mut self,
    n: isize,
  ) {
    *self = *self - n;
  }
}

impl<T, M: Access> Sub for RevCursor<T, M> {
  type Output = isize;

  fn sub(
    self,
    other: Self,
  ) -> isize {
    other.base - self.base
  }
}
