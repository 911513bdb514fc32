//! Construction-time options for [`VirtualVec`](crate::VirtualVec).

use crate::{
  align::gib,
  error::{ProviderError, VecError},
};

/// How many bytes of address space a [`VirtualVec`](crate::VirtualVec) reserves.
///
/// The reservation is the array's hard ceiling: it is made once, at construction,
/// and is never extended. Choose it as a strict upper bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizingPolicy {
  /// Exactly this many bytes, rounded up to the page size.
  FixedBytes(usize),
  /// This multiple of the installed physical RAM.
  RamMultiple(usize),
  /// Room for this many elements.
  ElementCount(usize),
}

impl SizingPolicy {
  #[cfg(target_pointer_width = "64")]
  pub const GIB_4: Self = Self::FixedBytes(gib(4));
  #[cfg(target_pointer_width = "64")]
  pub const GIB_8: Self = Self::FixedBytes(gib(8));
  #[cfg(target_pointer_width = "64")]
  pub const GIB_16: Self = Self::FixedBytes(gib(16));

  pub const RAM: Self = Self::RamMultiple(1);
  pub const RAM_DOUBLE: Self = Self::RamMultiple(2);

  /// Resolves the policy to a byte count.
  ///
  /// `installed_ram` is only called for [`SizingPolicy::RamMultiple`].
  pub fn target_bytes(
    self,
    element_size: usize,
    installed_ram: impl FnOnce() -> Result<usize, ProviderError>,
  ) -> Result<usize, VecError> {
    let bytes = match self {
      Self::FixedBytes(0) | Self::RamMultiple(0) | Self::ElementCount(0) => {
        return Err(VecError::InvalidConfig(format!("{self:?} reserves nothing")));
      }
      Self::FixedBytes(bytes) => Some(bytes),
      Self::RamMultiple(factor) => installed_ram()
        .map_err(|err| VecError::InvalidConfig(format!("{self:?} cannot be resolved: {err}")))?
        .checked_mul(factor),
      Self::ElementCount(count) => count.checked_mul(element_size),
    };

    bytes.ok_or_else(|| VecError::InvalidConfig(format!("{self:?} overflows the address space")))
  }
}

impl Default for SizingPolicy {
  fn default() -> Self {
    Self::RAM
  }
}

/// How far a commit reaches past what the current operation needs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GrowthStrategy {
  /// Commit exactly the whole pages the request needs.
  #[default]
  Exact,
  /// Commit up to this many extra pages, clamped to the reserve ceiling.
  Ahead(usize),
}

impl GrowthStrategy {
  /// Pages to commit for a request that needs `needed` pages when `available`
  /// reserved pages remain uncommitted.
  pub fn pages_to_commit(
    self,
    needed: usize,
    available: usize,
  ) -> usize {
    debug_assert!(needed <= available);

    match self {
      Self::Exact => needed,
      Self::Ahead(extra) => needed.saturating_add(extra).min(available),
    }
  }
}

/// Configuration of a [`VirtualVec`](crate::VirtualVec).
///
/// Validated at construction; immutable afterwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VecConfig {
  pub policy: SizingPolicy,

  /// Use the provider's large page size. Implies `commit_with_reserve`, since
  /// large pages cannot be committed into an existing reservation.
  pub large_pages: bool,

  /// Commit the whole reservation up front instead of page by page.
  pub commit_with_reserve: bool,

  pub growth: GrowthStrategy,
}

impl VecConfig {
  pub const fn new(policy: SizingPolicy) -> Self {
    Self {
      policy,
      large_pages: false,
      commit_with_reserve: false,
      growth: GrowthStrategy::Exact,
    }
  }

  pub const fn large_pages(
    mut self,
    enabled: bool,
  ) -> Self {
    self.large_pages = enabled;
    self
  }

  pub const fn commit_with_reserve(
    mut self,
    enabled: bool,
  ) -> Self {
    self.commit_with_reserve = enabled;
    self
  }

  pub const fn growth(
    mut self,
    growth: GrowthStrategy,
  ) -> Self {
    self.growth = growth;
    self
  }

  /// Whether construction commits everything at once.
  pub const fn commits_up_front(&self) -> bool {
    self.commit_with_reserve || self.large_pages
  }
}

impl From<SizingPolicy> for VecConfig {
  fn from(policy: SizingPolicy) -> Self {
    Self::new(policy)
  }
}
