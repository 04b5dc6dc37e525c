use core::fmt;

/// Errors surfaced across the arena's public API.
///
/// Matches the taxonomy of a bump allocator that never implements
/// general `free()`: the only failure a caller can recover from is
/// asking for more than a single allocation is ever allowed to hand
/// out. Everything else (OS mapping failure) propagates as-is.
#[derive(Debug)]
pub enum AllocError {
    /// A single `alloc`/`malloc` request exceeded `max_allocation_size`.
    AllocationTooLarge { requested: usize, max: usize },
    /// The host's page allocator (aligned heap or OS mapping) failed.
    Os(std::io::Error),
    /// `align` exceeded `maxAlignment` (64). Checked by `debug_assert!`
    /// on the fast path; this variant exists for callers that construct
    /// layouts dynamically and want a recoverable check instead.
    InvalidAlignment { align: usize, max: usize },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::AllocationTooLarge { requested, max } => write!(
                f,
                "allocation of {requested} bytes exceeds the arena's maximum single allocation of {max} bytes"
            ),
            AllocError::Os(err) => write!(f, "host allocation failed: {err}"),
            AllocError::InvalidAlignment { align, max } => {
                write!(f, "alignment {align} exceeds the maximum supported alignment of {max}")
            }
        }
    }
}

impl std::error::Error for AllocError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AllocError::Os(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AllocError {
    fn from(err: std::io::Error) -> Self {
        AllocError::Os(err)
    }
}

pub type Result<T> = core::result::Result<T, AllocError>;
