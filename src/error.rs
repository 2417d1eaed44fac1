//! Error types for tsblock.

use thiserror::Error;

/// Result type alias for tsblock operations.
pub type Result<T> = std::result::Result<T, TsblockError>;

/// Main error type for tsblock operations.
#[derive(Error, Debug)]
pub enum TsblockError {
    /// Not a failure: the decoder reached the block's finish marker.
    /// `unmarshal` consumes this internally; direct `Decoder` callers use
    /// it to terminate their read loop.
    #[error("end of block")]
    EndOfBlock,

    #[error("malformed block stream: {0}")]
    Malformed(String),

    #[error("timestamps must be non-decreasing: {next} follows {prev}")]
    OutOfOrderTimestamp { prev: u64, next: u64 },

    #[error("first-sample delta {delta} does not fit the block's first-delta field")]
    FirstDeltaOverflow { delta: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
