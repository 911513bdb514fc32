use std::io;

use thiserror::Error;

/// Failure reported by a [`MemoryProvider`](crate::MemoryProvider).
#[derive(Debug, Error)]
pub enum ProviderError {
  /// The OS refused the request: address space or physical memory is exhausted.
  #[error("{op} failed: {source}")]
  Exhausted {
    op: &'static str,
    #[source]
    source: io::Error,
  },
  /// The host cannot provide the requested capability.
  #[error("unsupported: {0}")]
  Unsupported(&'static str),
}

impl ProviderError {
  /// Captures `errno` right after a failed system call.
  pub fn last_os_error(op: &'static str) -> Self {
    Self::Exhausted {
      op,
      source: io::Error::last_os_error(),
    }
  }
}

/// Errors returned by [`VirtualVec`](crate::VirtualVec).
#[derive(Debug, Error)]
pub enum VecError {
  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  #[error("failed to reserve {bytes} bytes of address space")]
  Reserve {
    bytes: usize,
    #[source]
    source: ProviderError,
  },

  #[error("failed to commit {bytes} bytes")]
  Commit {
    bytes: usize,
    #[source]
    source: ProviderError,
  },

  /// Growth past the reservation made at construction. There is no extension mechanism.
  #[error("reserve ceiling exceeded: requested {requested} elements, ceiling is {reserve}")]
  CeilingExceeded { requested: usize, reserve: usize },

  #[error("index {index} out of range for length {len}")]
  OutOfRange { index: usize, len: usize },
}

impl VecError {
  /// True for every flavour of allocation failure: reservation, commit and ceiling.
  pub fn is_alloc_failure(&self) -> bool {
    matches!(
      self,
      Self::Reserve { .. } | Self::Commit { .. } | Self::CeilingExceeded { .. }
    )
  }

  pub fn is_invalid_config(&self) -> bool {
    matches!(self, Self::InvalidConfig(_))
  }

  pub fn is_out_of_range(&self) -> bool {
    matches!(self, Self::OutOfRange { .. })
  }
}

pub type Result<T, E = VecError> = std::result::Result<T, E>;
