//! # vmvec - A Dynamic Array Backed by Virtual Memory
//!
//! This crate provides [`VirtualVec`], a growable array that claims one large
//! range of **address space** up front and backs it with physical memory page
//! by page as elements are appended.
//!
//! ## Overview
//!
//! A regular `Vec` re-allocates and moves every element when it runs out of room.
//! `VirtualVec` never does: the base address is fixed for its whole lifetime.
//!
//! ```text
//!   Virtual Memory Array Concept:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                       ONE RESERVATION                                │
//!   │                                                                      │
//!   │   ┌─────┬─────┬─────┬─────┬────────┬─────────────────────────────┐   │
//!   │   │ e0  │ e1  │ e2  │ e3  │ unused │     reserved, no backing    │   │
//!   │   └─────┴─────┴─────┴─────┴────────┴─────────────────────────────┘   │
//!   │                           ▲        ▲                             ▲   │
//!   │                           │        │                             │   │
//!   │                          len    capacity                     ceiling │
//!   │                                 (committed)               (reserved) │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Growing commits the next page in place. Nothing ever moves.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   vmvec
//!   ├── align      - Page rounding (align_up!, page_count, growth_pages)
//!   ├── config     - SizingPolicy, GrowthStrategy, VecConfig
//!   ├── cursor     - Cursor, CursorMut, RevCursor
//!   ├── error      - VecError, ProviderError
//!   ├── os         - OsMemory: mmap / mprotect / madvise / munmap
//!   ├── provider   - MemoryProvider trait
//!   └── vec        - VirtualVec implementation (internal)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use vmvec::{SizingPolicy, VirtualVec};
//!
//! fn main() -> Result<(), vmvec::VecError> {
//!   // Room for a million u64, but no physical memory is used yet.
//!   let mut values = VirtualVec::with_policy(SizingPolicy::ElementCount(1_000_000))?;
//!   assert_eq!(values.capacity(), 0);
//!
//!   values.push(42u64)?;
//!   let base = values.as_ptr();
//!
//!   for i in 0..100_000 {
//!     values.push(i)?;
//!   }
//!
//!   // Same address: the array grew in place.
//!   assert_eq!(values.as_ptr(), base);
//!   Ok(())
//! }
//! ```
//!
//! ## How It Works
//!
//! The array tracks three sizes and always keeps them ordered:
//!
//! ```text
//!   len ≤ capacity ≤ reserve ceiling
//!
//!   construction   ── reserve(ceiling bytes)             PROT_NONE, nothing backed
//!   push / insert  ── commit(next whole page(s))         PROT_READ | PROT_WRITE
//!   erase / clear  ── destroy elements, pages stay committed
//!   drop           ── destroy elements, release(ceiling bytes)
//! ```
//!
//! The reservation size comes from a [`SizingPolicy`]:
//!
//! ```text
//!   ┌───────────────────┬──────────────────────────────────────────┐
//!   │ FixedBytes(n)     │ n bytes (GIB_4, GIB_8, GIB_16 presets)   │
//!   │ RamMultiple(k)    │ k × installed RAM (RAM, RAM_DOUBLE)      │
//!   │ ElementCount(n)   │ n × size_of::<T>()                       │
//!   └───────────────────┴──────────────────────────────────────────┘
//!                 every size is rounded up to whole pages
//! ```
//!
//! ## Features
//!
//! - **Stable addresses**: pointers and cursors survive appends
//! - **Lazy backing**: only touched pages cost physical memory
//! - **Large pages**: optional, committed in one go at construction
//! - **Pluggable memory**: any [`MemoryProvider`] can stand in for the OS
//!
//! ## Limitations
//!
//! - **Hard ceiling**: growth beyond the reservation fails, it never re-allocates
//! - **No shrinking**: committed pages stay committed until the array is dropped
//! - **No zero-sized types**: they are rejected at construction
//! - **Unix-only**: [`OsMemory`] requires `libc` and `mmap` (POSIX systems)
//!
//! ## Safety
//!
//! The array itself is safe to use. Cursors are plain addresses and do not
//! borrow the array, so reading through one is `unsafe`.

pub mod align;
pub mod config;
pub mod cursor;
pub mod error;
pub mod os;
pub mod provider;
mod vec;

pub use config::{GrowthStrategy, SizingPolicy, VecConfig};
pub use cursor::{Cursor, CursorMut, RevCursor};
pub use error::{ProviderError, VecError};
pub use os::OsMemory;
pub use provider::MemoryProvider;
pub use vec::VirtualVec;
