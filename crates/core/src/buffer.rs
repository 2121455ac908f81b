//! Append-only binary buffer for trace records.
//!
//! All multi-byte scalars are little-endian. Strings and byte strings are
//! length-prefixed with an unsigned LEB128 varint; signed varints use
//! zigzag encoding. The matching decoder lives in `reqlog-traceparser`.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Duration, Utc};

use crate::stack::CallStack;

/// An append-only buffer holding one binary trace record under
/// construction.
#[derive(Debug, Default)]
pub struct TraceBuffer {
    buf: BytesMut,
}

impl TraceBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size the buffer; the capacity is a hint, not a limit.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn put_byte(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    /// Append raw bytes with no length prefix.
    pub fn put_bytes(&mut self, value: &[u8]) {
        self.buf.put_slice(value);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.put_u8(u8::from(value));
    }

    /// Unsigned LEB128.
    pub fn put_uvarint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.buf.put_u8(byte);
                break;
            }
            self.buf.put_u8(byte | 0x80);
        }
    }

    /// Zigzag-encoded signed LEB128.
    pub fn put_varint(&mut self, value: i64) {
        self.put_uvarint(((value << 1) ^ (value >> 63)) as u64);
    }

    /// Length-prefixed UTF-8 string.
    pub fn put_string(&mut self, value: &str) {
        self.put_byte_string(value.as_bytes());
    }

    /// Length-prefixed byte string.
    pub fn put_byte_string(&mut self, value: &[u8]) {
        self.put_uvarint(value.len() as u64);
        self.buf.put_slice(value);
    }

    /// Fixed 8-byte timestamp: unix nanoseconds, saturating outside the
    /// representable range (chrono's nanosecond range ends in 2262).
    pub fn put_time(&mut self, value: DateTime<Utc>) {
        let nanos = value.timestamp_nanos_opt().unwrap_or_else(|| {
            if value > Utc::now() { i64::MAX } else { i64::MIN }
        });
        self.buf.put_i64_le(nanos);
    }

    /// Fixed 8-byte signed nanosecond count, saturating on overflow.
    pub fn put_duration(&mut self, value: Duration) {
        let nanos = value.num_nanoseconds().unwrap_or_else(|| {
            if value > Duration::zero() { i64::MAX } else { i64::MIN }
        });
        self.buf.put_i64_le(nanos);
    }

    pub fn put_f32(&mut self, value: f32) {
        self.buf.put_f32_le(value);
    }

    pub fn put_f64(&mut self, value: f64) {
        self.buf.put_f64_le(value);
    }

    /// Frame count followed by one length-prefixed string per frame.
    pub fn put_stack(&mut self, stack: &CallStack) {
        self.put_uvarint(stack.frames.len() as u64);
        for frame in &stack.frames {
            self.put_string(frame);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Freeze the finished record.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(f: impl FnOnce(&mut TraceBuffer)) -> Vec<u8> {
        let mut tb = TraceBuffer::new();
        f(&mut tb);
        tb.into_bytes().to_vec()
    }

    #[test]
    fn test_uvarint_known_vectors() {
        assert_eq!(contents(|tb| tb.put_uvarint(0)), [0x00]);
        assert_eq!(contents(|tb| tb.put_uvarint(1)), [0x01]);
        assert_eq!(contents(|tb| tb.put_uvarint(127)), [0x7f]);
        assert_eq!(contents(|tb| tb.put_uvarint(128)), [0x80, 0x01]);
        assert_eq!(contents(|tb| tb.put_uvarint(300)), [0xac, 0x02]);
        assert_eq!(
            contents(|tb| tb.put_uvarint(u64::MAX)),
            [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01]
        );
    }

    #[test]
    fn test_varint_zigzag() {
        assert_eq!(contents(|tb| tb.put_varint(0)), [0x00]);
        assert_eq!(contents(|tb| tb.put_varint(-1)), [0x01]);
        assert_eq!(contents(|tb| tb.put_varint(1)), [0x02]);
        assert_eq!(contents(|tb| tb.put_varint(-2)), [0x03]);
        assert_eq!(contents(|tb| tb.put_varint(2)), [0x04]);
    }

    #[test]
    fn test_string_is_length_prefixed() {
        assert_eq!(contents(|tb| tb.put_string("hi")), [0x02, b'h', b'i']);
        assert_eq!(contents(|tb| tb.put_string("")), [0x00]);
    }

    #[test]
    fn test_bool_single_byte() {
        assert_eq!(contents(|tb| tb.put_bool(true)), [0x01]);
        assert_eq!(contents(|tb| tb.put_bool(false)), [0x00]);
    }

    #[test]
    fn test_time_fixed_width() {
        let t = DateTime::from_timestamp(1_700_000_000, 123).unwrap();
        let bytes = contents(|tb| tb.put_time(t));
        assert_eq!(bytes.len(), 8);
        assert_eq!(
            i64::from_le_bytes(bytes.try_into().unwrap()),
            1_700_000_000 * 1_000_000_000 + 123
        );
    }

    #[test]
    fn test_duration_fixed_width() {
        let bytes = contents(|tb| tb.put_duration(Duration::milliseconds(-5)));
        assert_eq!(
            i64::from_le_bytes(bytes.try_into().unwrap()),
            -5_000_000
        );
    }

    #[test]
    fn test_duration_saturates_on_overflow() {
        let bytes = contents(|tb| tb.put_duration(Duration::MAX));
        assert_eq!(i64::from_le_bytes(bytes.try_into().unwrap()), i64::MAX);
    }

    #[test]
    fn test_stack_encoding() {
        let stack = CallStack {
            frames: vec!["a".into(), "bc".into()],
        };
        assert_eq!(
            contents(|tb| tb.put_stack(&stack)),
            [0x02, 0x01, b'a', 0x02, b'b', b'c']
        );
        assert_eq!(contents(|tb| tb.put_stack(&CallStack::empty())), [0x00]);
    }

    #[test]
    fn test_floats_little_endian() {
        assert_eq!(contents(|tb| tb.put_f32(1.0)), 1.0f32.to_le_bytes());
        assert_eq!(contents(|tb| tb.put_f64(-2.5)), (-2.5f64).to_le_bytes());
    }
}
