//! Gorilla-style encoder and decoder for time-series blocks.
//!
//! A block is a 64-bit anchor timestamp followed by any number of samples
//! and a finish marker, zero-padded to a byte boundary. The first sample
//! carries its anchor offset in a fixed-width field plus its raw IEEE-754
//! bits; every later sample delta-of-delta codes its timestamp through
//! variable-length prefix buckets and XOR codes its value against the
//! previous one, reusing the leading/trailing-zero window when possible.

use std::io::Write;

use crate::bstream::{BitStreamReader, BitStreamWriter};
use crate::error::{Result, TsblockError};
use crate::DataPoint;

/// Width of the first sample's anchor offset. 38 bits spans about 274
/// seconds of nanosecond offsets, proportionally more at coarser units.
/// The all-ones pattern is reserved as the empty-block finish marker, so
/// the largest representable offset is `2^38 - 2`.
pub const FIRST_DELTA_BITS: u8 = 38;

const FIRST_DELTA_SENTINEL: u64 = (1 << FIRST_DELTA_BITS) - 1;

/// The leading-zero count is carried in a 5-bit field, so counts above 31
/// are clamped; the window just widens to compensate.
const MAX_LEADING_ZEROS: u8 = 31;

/// Everything the delta-of-delta and XOR coding needs to know about the
/// previously processed sample. Shared by encoder and decoder.
#[derive(Debug, Clone, Copy)]
struct SampleState {
    timestamp: u64,
    delta: u64,
    value_bits: u64,
    leading: u8,
    trailing: u8,
}

/// Position within a block: before the first sample, or primed with the
/// last sample's state. Keeping this a tagged variant (rather than a
/// zero-timestamp sentinel) lets anchors and timestamps of 0 round-trip.
#[derive(Debug, Clone, Copy)]
enum BlockState {
    Empty,
    Primed(SampleState),
}

/// Encoder for one time-series block.
///
/// Bits are buffered in memory and reach the underlying writer only when
/// [`finish`](Encoder::finish) flushes them, zero-padded to a byte
/// boundary. An encoder is single-use: construct, [`encode_header`]
/// (exactly once, first), any number of [`encode_point`] calls in
/// non-decreasing timestamp order, then `finish`.
///
/// [`encode_header`]: Encoder::encode_header
/// [`encode_point`]: Encoder::encode_point
pub struct Encoder<W: Write> {
    writer: W,
    buf: BitStreamWriter,
    header_timestamp: u64,
    state: BlockState,
}

impl<W: Write> Encoder<W> {
    /// Creates a new Encoder over the given writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            buf: BitStreamWriter::with_capacity(128),
            header_timestamp: 0,
            state: BlockState::Empty,
        }
    }

    /// Writes the block anchor as a 64-bit big-endian field. All sample
    /// timestamps are stored as offsets from it.
    pub fn encode_header(&mut self, t0: u64) -> Result<()> {
        self.buf.write_bits(t0, 64);
        self.header_timestamp = t0;
        Ok(())
    }

    /// Encodes a data point.
    pub fn encode_point(&mut self, point: &DataPoint) -> Result<()> {
        match self.state {
            BlockState::Empty => self.encode_first(point),
            BlockState::Primed(prev) => self.encode_subsequent(prev, point),
        }
    }

    /// Writes the finish marker, flushes everything to the underlying
    /// writer with zero padding up to the next byte boundary, and hands
    /// the writer back. Consuming `self` makes the encoder unusable
    /// afterwards.
    pub fn finish(mut self) -> Result<W> {
        match self.state {
            BlockState::Empty => {
                // Reserved all-ones offset plus a placeholder value field
                // the decoder discards.
                self.buf.write_bits(FIRST_DELTA_SENTINEL, FIRST_DELTA_BITS);
                self.buf.write_bits(0, 64);
            }
            BlockState::Primed(_) => {
                // Widest bucket with an all-ones payload, then a "value
                // unchanged" bit.
                self.buf.write_bits(0b1111, 4);
                self.buf.write_bits(u64::MAX, 64);
                self.buf.write_bit(false);
            }
        }
        self.writer.write_all(self.buf.bytes())?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn encode_first(&mut self, point: &DataPoint) -> Result<()> {
        let delta = point
            .timestamp
            .checked_sub(self.header_timestamp)
            .ok_or(TsblockError::OutOfOrderTimestamp {
                prev: self.header_timestamp,
                next: point.timestamp,
            })?;
        if delta >= FIRST_DELTA_SENTINEL {
            return Err(TsblockError::FirstDeltaOverflow { delta });
        }

        let value_bits = point.value.to_bits();
        self.buf.write_bits(delta, FIRST_DELTA_BITS);
        self.buf.write_bits(value_bits, 64);

        self.state = BlockState::Primed(SampleState {
            timestamp: point.timestamp,
            delta,
            value_bits,
            // Above any real count, so the first non-zero XOR always
            // writes a fresh window descriptor.
            leading: u8::MAX,
            trailing: 0,
        });
        Ok(())
    }

    fn encode_subsequent(&mut self, prev: SampleState, point: &DataPoint) -> Result<()> {
        let delta = point
            .timestamp
            .checked_sub(prev.timestamp)
            .ok_or(TsblockError::OutOfOrderTimestamp {
                prev: prev.timestamp,
                next: point.timestamp,
            })?;
        let dod = (delta as i64).wrapping_sub(prev.delta as i64);

        // Smallest bucket containing the delta-of-delta. The ranges sit
        // one above the symmetric two's-complement window so that dod = 1
        // and the other small accelerations stay in the narrow buckets.
        match dod {
            0 => self.buf.write_bit(false),
            -63..=64 => {
                self.buf.write_bits(0b10, 2);
                self.buf.write_bits(dod as u64, 7);
            }
            -255..=256 => {
                self.buf.write_bits(0b110, 3);
                self.buf.write_bits(dod as u64, 9);
            }
            -2047..=2048 => {
                self.buf.write_bits(0b1110, 4);
                self.buf.write_bits(dod as u64, 12);
            }
            _ => {
                self.buf.write_bits(0b1111, 4);
                self.buf.write_bits(dod as u64, 64);
            }
        }

        let value_bits = point.value.to_bits();
        let (leading, trailing) = self.encode_value_xor(&prev, value_bits);

        self.state = BlockState::Primed(SampleState {
            timestamp: point.timestamp,
            delta,
            value_bits,
            leading,
            trailing,
        });
        Ok(())
    }

    /// Writes the value section and returns the window description to
    /// carry forward.
    fn encode_value_xor(&mut self, prev: &SampleState, value_bits: u64) -> (u8, u8) {
        let xor = value_bits ^ prev.value_bits;
        if xor == 0 {
            self.buf.write_bit(false);
            return (prev.leading, prev.trailing);
        }
        self.buf.write_bit(true);

        let leading = (xor.leading_zeros() as u8).min(MAX_LEADING_ZEROS);
        let trailing = xor.trailing_zeros() as u8;

        if leading >= prev.leading && trailing >= prev.trailing {
            // The previous window still covers every meaningful bit.
            self.buf.write_bit(false);
            let sig = 64 - prev.leading - prev.trailing;
            self.buf.write_bits(xor >> prev.trailing, sig);
            (prev.leading, prev.trailing)
        } else {
            self.buf.write_bit(true);
            self.buf.write_bits(leading as u64, 5);
            let sig = 64 - leading - trailing;
            // sig is 1..=64; 64 aliases to 0 in the 6-bit field and the
            // decoder maps it back.
            self.buf.write_bits(sig as u64, 6);
            self.buf.write_bits(xor >> trailing, sig);
            (leading, trailing)
        }
    }
}

/// Decoder for one time-series block.
///
/// Mirrors [`Encoder`]: construct, [`decode_header`](Decoder::decode_header)
/// once, then [`decode_point`](Decoder::decode_point) until it returns
/// [`TsblockError::EndOfBlock`].
pub struct Decoder<'a> {
    reader: BitStreamReader<'a>,
    header_timestamp: u64,
    state: BlockState,
}

impl<'a> Decoder<'a> {
    /// Creates a new Decoder that owns its bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            reader: BitStreamReader::new(bytes),
            header_timestamp: 0,
            state: BlockState::Empty,
        }
    }

    /// Creates a new Decoder borrowing an existing byte slice.
    pub fn from_slice(bytes: &'a [u8]) -> Self {
        Self {
            reader: BitStreamReader::from_slice(bytes),
            header_timestamp: 0,
            state: BlockState::Empty,
        }
    }

    /// Reads the block anchor.
    pub fn decode_header(&mut self) -> Result<u64> {
        self.header_timestamp = self.reader.read_bits(64)?;
        Ok(self.header_timestamp)
    }

    /// Decodes the next data point. Returns [`TsblockError::EndOfBlock`]
    /// at either finish marker; a reader EOF anywhere else surfaces as an
    /// I/O error.
    pub fn decode_point(&mut self) -> Result<DataPoint> {
        match self.state {
            BlockState::Empty => self.decode_first(),
            BlockState::Primed(prev) => self.decode_subsequent(prev),
        }
    }

    fn decode_first(&mut self) -> Result<DataPoint> {
        let delta = self.reader.read_bits(FIRST_DELTA_BITS)?;
        if delta == FIRST_DELTA_SENTINEL {
            return Err(TsblockError::EndOfBlock);
        }
        let value_bits = self.reader.read_bits(64)?;
        let timestamp = self.header_timestamp.wrapping_add(delta);

        self.state = BlockState::Primed(SampleState {
            timestamp,
            delta,
            value_bits,
            leading: 0,
            trailing: 0,
        });
        Ok(DataPoint::new(timestamp, f64::from_bits(value_bits)))
    }

    fn decode_subsequent(&mut self, prev: SampleState) -> Result<DataPoint> {
        let dod = self.decode_delta_of_delta()?;
        let delta = prev.delta.wrapping_add(dod as u64);
        let timestamp = prev.timestamp.wrapping_add(delta);

        let (value_bits, leading, trailing) = self.decode_value_xor(&prev)?;

        self.state = BlockState::Primed(SampleState {
            timestamp,
            delta,
            value_bits,
            leading,
            trailing,
        });
        Ok(DataPoint::new(timestamp, f64::from_bits(value_bits)))
    }

    fn decode_delta_of_delta(&mut self) -> Result<i64> {
        // Unary bucket selector: up to four bits, stopping at the first
        // zero.
        let mut selector = 0u8;
        for _ in 0..4 {
            selector <<= 1;
            if !self.reader.read_bit()? {
                break;
            }
            selector |= 1;
        }

        let nbits: u8 = match selector {
            0b0000 => return Ok(0),
            0b0010 => 7,
            0b0110 => 9,
            0b1110 => 12,
            0b1111 => 64,
            _ => {
                return Err(TsblockError::Malformed(format!(
                    "invalid delta-of-delta selector {selector:#06b}"
                )));
            }
        };

        let bits = self.reader.read_bits(nbits)?;
        if nbits == 64 {
            if bits == u64::MAX {
                return Err(TsblockError::EndOfBlock);
            }
            return Ok(bits as i64);
        }

        // The bucket window sits one above the symmetric two's-complement
        // range, so the midpoint pattern decodes as the positive upper
        // bound and only strictly larger patterns are negative.
        if bits > 1 << (nbits - 1) {
            Ok(bits as i64 - (1i64 << nbits))
        } else {
            Ok(bits as i64)
        }
    }

    fn decode_value_xor(&mut self, prev: &SampleState) -> Result<(u64, u8, u8)> {
        if !self.reader.read_bit()? {
            // XOR was zero: the value repeats.
            return Ok((prev.value_bits, prev.leading, prev.trailing));
        }

        let (leading, trailing) = if self.reader.read_bit()? {
            // Fresh window descriptor.
            let leading = self.reader.read_bits(5)? as u8;
            let sig = match self.reader.read_bits(6)? as u8 {
                0 => 64,
                n => n,
            };
            match 64u8.checked_sub(leading + sig) {
                Some(trailing) => (leading, trailing),
                None => {
                    return Err(TsblockError::Malformed(format!(
                        "XOR window of {leading} leading zeros and {sig} significant bits \
                         exceeds 64 bits"
                    )));
                }
            }
        } else {
            (prev.leading, prev.trailing)
        };

        let sig = 64 - leading - trailing;
        let bits = self.reader.read_bits(sig)?;
        let value_bits = prev.value_bits ^ (bits << trailing);
        Ok((value_bits, leading, trailing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_all(t0: u64, points: &[DataPoint]) -> Vec<u8> {
        let mut encoder = Encoder::new(Vec::new());
        encoder.encode_header(t0).unwrap();
        for point in points {
            encoder.encode_point(point).unwrap();
        }
        encoder.finish().unwrap()
    }

    fn decode_all(bytes: &[u8]) -> (u64, Vec<DataPoint>) {
        let mut decoder = Decoder::from_slice(bytes);
        let t0 = decoder.decode_header().unwrap();
        let mut points = Vec::new();
        loop {
            match decoder.decode_point() {
                Ok(point) => points.push(point),
                Err(TsblockError::EndOfBlock) => break,
                Err(e) => panic!("decode failed: {e}"),
            }
        }
        (t0, points)
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let points = vec![
            DataPoint::new(1100, 1.0),
            DataPoint::new(1160, 1.1),
            DataPoint::new(1220, 1.2),
            DataPoint::new(1280, 1.15),
            DataPoint::new(1345, 1.25),
        ];

        let bytes = encode_all(1000, &points);
        let (t0, decoded) = decode_all(&bytes);
        assert_eq!(t0, 1000);
        assert_eq!(decoded, points);
    }

    #[test]
    fn test_empty_block_decodes_to_no_points() {
        let bytes = encode_all(1000, &[]);
        let (t0, decoded) = decode_all(&bytes);
        assert_eq!(t0, 1000);
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_zero_anchor_and_zero_timestamp() {
        let points = vec![DataPoint::new(0, 1.0), DataPoint::new(10, 2.0)];
        let bytes = encode_all(0, &points);
        let (t0, decoded) = decode_all(&bytes);
        assert_eq!(t0, 0);
        assert_eq!(decoded, points);
    }

    #[test]
    fn test_equal_timestamps_are_accepted() {
        let points = vec![
            DataPoint::new(500, 1.0),
            DataPoint::new(500, 2.0),
            DataPoint::new(500, 3.0),
        ];
        let bytes = encode_all(400, &points);
        let (_, decoded) = decode_all(&bytes);
        assert_eq!(decoded, points);
    }

    #[test]
    fn test_encoder_rejects_decreasing_timestamps() {
        let mut encoder = Encoder::new(Vec::new());
        encoder.encode_header(100).unwrap();
        encoder.encode_point(&DataPoint::new(200, 1.0)).unwrap();

        let err = encoder.encode_point(&DataPoint::new(199, 2.0)).unwrap_err();
        assert!(matches!(
            err,
            TsblockError::OutOfOrderTimestamp { prev: 200, next: 199 }
        ));
    }

    #[test]
    fn test_encoder_rejects_first_point_before_anchor() {
        let mut encoder = Encoder::new(Vec::new());
        encoder.encode_header(1000).unwrap();

        let err = encoder.encode_point(&DataPoint::new(999, 1.0)).unwrap_err();
        assert!(matches!(err, TsblockError::OutOfOrderTimestamp { .. }));
    }

    #[test]
    fn test_encoder_rejects_oversized_first_delta() {
        let mut encoder = Encoder::new(Vec::new());
        encoder.encode_header(0).unwrap();

        // The all-ones offset is the empty-block marker, so it is the
        // first value that must be refused.
        let err = encoder
            .encode_point(&DataPoint::new((1 << FIRST_DELTA_BITS) - 1, 1.0))
            .unwrap_err();
        assert!(matches!(err, TsblockError::FirstDeltaOverflow { .. }));

        let mut encoder = Encoder::new(Vec::new());
        encoder.encode_header(0).unwrap();
        encoder
            .encode_point(&DataPoint::new((1 << FIRST_DELTA_BITS) - 2, 1.0))
            .unwrap();
    }

    #[test]
    fn test_full_width_xor_window() {
        // 0x0 ^ 0x8000000000000001 touches bit 63 and bit 0, so the
        // significant-bit count is 64 and aliases to 0 on the wire.
        let points = vec![
            DataPoint::new(10, 0.0),
            DataPoint::new(20, f64::from_bits(0x8000_0000_0000_0001)),
            DataPoint::new(30, 0.0),
        ];
        let bytes = encode_all(1, &points);
        let (_, decoded) = decode_all(&bytes);
        assert_eq!(decoded.len(), 3);
        for (got, want) in decoded.iter().zip(&points) {
            assert_eq!(got.timestamp, want.timestamp);
            assert_eq!(got.value.to_bits(), want.value.to_bits());
        }
    }

    #[test]
    fn test_large_leading_zero_count_roundtrips() {
        // XOR of these two values has well over 31 leading zeros; the
        // 5-bit field forces the clamp path.
        let a = f64::from_bits(0x4028_0000_0000_0000);
        let b = f64::from_bits(0x4028_0000_0000_0003);
        let points = vec![DataPoint::new(10, a), DataPoint::new(20, b)];

        let bytes = encode_all(1, &points);
        let (_, decoded) = decode_all(&bytes);
        assert_eq!(decoded, points);
    }

    #[test]
    fn test_decoder_reports_malformed_window_descriptor() {
        let mut buf = BitStreamWriter::new();
        buf.write_bits(1000, 64); // header
        buf.write_bits(5, FIRST_DELTA_BITS); // first sample
        buf.write_bits(1.0f64.to_bits(), 64);
        buf.write_bit(false); // dod = 0
        buf.write_bit(true); // value changed
        buf.write_bit(true); // fresh window
        buf.write_bits(31, 5); // leading
        buf.write_bits(63, 6); // sig; 31 + 63 > 64
        buf.write_bits(0, 63);

        let mut decoder = Decoder::new(buf.into_bytes());
        decoder.decode_header().unwrap();
        decoder.decode_point().unwrap();
        let err = decoder.decode_point().unwrap_err();
        assert!(matches!(err, TsblockError::Malformed(_)));
    }

    #[test]
    fn test_truncated_stream_is_io_error() {
        let bytes = encode_all(1000, &[DataPoint::new(1060, 42.0)]);

        let mut decoder = Decoder::from_slice(&bytes[..12]);
        decoder.decode_header().unwrap();
        let err = decoder.decode_point().unwrap_err();
        match err {
            TsblockError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            other => panic!("expected Io error, got {other}"),
        }
    }
}
