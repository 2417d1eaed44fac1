//! tsblock - Gorilla-style compression for time-series blocks
//!
//! tsblock packs a chronologically ordered run of (timestamp, value)
//! samples, anchored to a block timestamp, into a dense bit stream and
//! decodes it back bit-exactly, following the scheme of Facebook's
//! Gorilla in-memory time series database (VLDB 2015):
//!
//! - **Timestamps** are delta-of-delta coded: regular intervals collapse
//!   to a single bit per sample, deviations to a variable-length prefix
//!   bucket.
//! - **Values** are XOR coded against their predecessor, storing only the
//!   changed bits and reusing the leading/trailing-zero window across
//!   consecutive samples.
//!
//! Every IEEE-754 bit pattern (NaN payloads included) round-trips
//! exactly, and encoding is deterministic: the same anchor and samples
//! always produce the same bytes.
//!
//! ```
//! use tsblock::{marshal, unmarshal, DataPoint};
//!
//! let t0 = 1_600_000_000_000_000_000u64;
//! let points = vec![
//!     DataPoint::new(t0 + 62_000_000_000, 12.0),
//!     DataPoint::new(t0 + 122_000_000_000, 12.0),
//!     DataPoint::new(t0 + 182_000_000_000, 24.0),
//! ];
//!
//! let block = marshal(t0, &points).unwrap();
//! let (anchor, decoded) = unmarshal(&block).unwrap();
//! assert_eq!(anchor, t0);
//! assert_eq!(decoded, points);
//! ```
//!
//! For incremental encoding or lazy decoding, use [`Encoder`] and
//! [`Decoder`] directly; `Decoder::decode_point` returns
//! [`TsblockError::EndOfBlock`] once the block's finish marker is
//! reached.

pub mod block;
pub mod bstream;
pub mod encoding;
pub mod error;

pub use block::{marshal, unmarshal};
pub use encoding::{Decoder, Encoder};
pub use error::{Result, TsblockError};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents a data point, the smallest unit of time series data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// The actual value.
    pub value: f64,
    /// Timestamp, opaque to the codec; typically nanoseconds since an
    /// epoch. Must be non-decreasing within a block.
    pub timestamp: u64,
}

impl DataPoint {
    /// Creates a new DataPoint.
    pub fn new(timestamp: u64, value: f64) -> Self {
        Self { value, timestamp }
    }
}

impl fmt::Display for DataPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataPoint(ts: {}, val: {})", self.timestamp, self.value)
    }
}
