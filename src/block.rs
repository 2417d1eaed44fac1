//! One-shot façades over [`Encoder`] and [`Decoder`] for whole blocks.

use tracing::debug;

use crate::encoding::{Decoder, Encoder};
use crate::error::{Result, TsblockError};
use crate::DataPoint;

/// Encodes an anchor and its points into a self-contained block.
///
/// Points must be in non-decreasing timestamp order, each at or after the
/// anchor, with the first one within the anchor-offset field's range.
pub fn marshal(t0: u64, points: &[DataPoint]) -> Result<Vec<u8>> {
    let mut encoder = Encoder::new(Vec::with_capacity(32 + points.len() * 2));
    encoder.encode_header(t0)?;
    for point in points {
        encoder.encode_point(point)?;
    }
    let buf = encoder.finish()?;

    debug!(points = points.len(), bytes = buf.len(), "marshalled block");
    Ok(buf)
}

/// Decodes a block back into its anchor and points.
///
/// Any error other than the finish marker is surfaced; points accumulated
/// before the failure are dropped.
pub fn unmarshal(bytes: &[u8]) -> Result<(u64, Vec<DataPoint>)> {
    let mut decoder = Decoder::from_slice(bytes);
    let t0 = decoder.decode_header()?;

    let mut points = Vec::new();
    loop {
        match decoder.decode_point() {
            Ok(point) => points.push(point),
            Err(TsblockError::EndOfBlock) => break,
            Err(e) => return Err(e),
        }
    }

    debug!(points = points.len(), bytes = bytes.len(), "unmarshalled block");
    Ok((t0, points))
}
