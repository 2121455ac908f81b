//! Bounds-checked cursor over a binary trace record.

use thiserror::Error;

/// Errors that can occur while decoding a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of record")]
    UnexpectedEof,
    #[error("varint longer than 64 bits")]
    VarintOverflow,
    #[error("invalid UTF-8 in string payload")]
    InvalidUtf8,
    #[error("unknown field tag: {0}")]
    UnknownTag(u8),
    #[error("unknown level code: {0}")]
    UnknownLevel(u8),
    #[error("{0} trailing bytes after record")]
    TrailingBytes(usize),
}

/// Cursor reading the primitive encodings out of a byte slice.
///
/// All multi-byte scalars are little-endian; varints are LEB128, with
/// zigzag for the signed form; strings and byte strings are
/// length-prefixed with an unsigned varint.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn u8(&mut self) -> Result<u8, ParseError> {
        let byte = *self.buf.get(self.pos).ok_or(ParseError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        if self.remaining() < n {
            return Err(ParseError::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn bool(&mut self) -> Result<bool, ParseError> {
        Ok(self.u8()? != 0)
    }

    /// Unsigned LEB128, at most 10 bytes.
    pub fn uvarint(&mut self) -> Result<u64, ParseError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.u8()?;
            if shift == 63 && byte > 1 {
                return Err(ParseError::VarintOverflow);
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift > 63 {
                return Err(ParseError::VarintOverflow);
            }
        }
    }

    /// Zigzag-encoded signed LEB128.
    pub fn varint(&mut self) -> Result<i64, ParseError> {
        let raw = self.uvarint()?;
        Ok(((raw >> 1) as i64) ^ -((raw & 1) as i64))
    }

    pub fn i64_le(&mut self) -> Result<i64, ParseError> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.bytes(8)?);
        Ok(i64::from_le_bytes(bytes))
    }

    pub fn f32_le(&mut self) -> Result<f32, ParseError> {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(self.bytes(4)?);
        Ok(f32::from_le_bytes(bytes))
    }

    pub fn f64_le(&mut self) -> Result<f64, ParseError> {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(self.bytes(8)?);
        Ok(f64::from_le_bytes(bytes))
    }

    pub fn byte_string(&mut self) -> Result<Vec<u8>, ParseError> {
        let len = self.uvarint()?;
        let len = usize::try_from(len).map_err(|_| ParseError::UnexpectedEof)?;
        Ok(self.bytes(len)?.to_vec())
    }

    pub fn string(&mut self) -> Result<String, ParseError> {
        String::from_utf8(self.byte_string()?).map_err(|_| ParseError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uvarint_known_vectors() {
        assert_eq!(Reader::new(&[0x00]).uvarint(), Ok(0));
        assert_eq!(Reader::new(&[0x7f]).uvarint(), Ok(127));
        assert_eq!(Reader::new(&[0x80, 0x01]).uvarint(), Ok(128));
        assert_eq!(Reader::new(&[0xac, 0x02]).uvarint(), Ok(300));
        assert_eq!(
            Reader::new(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01]).uvarint(),
            Ok(u64::MAX)
        );
    }

    #[test]
    fn test_uvarint_truncated() {
        assert_eq!(
            Reader::new(&[0x80]).uvarint(),
            Err(ParseError::UnexpectedEof)
        );
    }

    #[test]
    fn test_uvarint_overflow() {
        let eleven = [0x80u8, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x01];
        assert_eq!(
            Reader::new(&eleven).uvarint(),
            Err(ParseError::VarintOverflow)
        );
        let overflow_top = [0xffu8, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02];
        assert_eq!(
            Reader::new(&overflow_top).uvarint(),
            Err(ParseError::VarintOverflow)
        );
    }

    #[test]
    fn test_varint_zigzag() {
        assert_eq!(Reader::new(&[0x00]).varint(), Ok(0));
        assert_eq!(Reader::new(&[0x01]).varint(), Ok(-1));
        assert_eq!(Reader::new(&[0x02]).varint(), Ok(1));
        assert_eq!(Reader::new(&[0x03]).varint(), Ok(-2));
    }

    #[test]
    fn test_string_round() {
        let mut r = Reader::new(&[0x02, b'h', b'i', 0xff]);
        assert_eq!(r.string(), Ok("hi".to_owned()));
        assert_eq!(r.remaining(), 1);
    }

    #[test]
    fn test_string_invalid_utf8() {
        assert_eq!(
            Reader::new(&[0x01, 0xff]).string(),
            Err(ParseError::InvalidUtf8)
        );
    }

    #[test]
    fn test_string_length_past_end() {
        assert_eq!(
            Reader::new(&[0x05, b'h', b'i']).string(),
            Err(ParseError::UnexpectedEof)
        );
    }

    #[test]
    fn test_fixed_width_reads() {
        assert_eq!(
            Reader::new(&(-42i64).to_le_bytes()).i64_le(),
            Ok(-42)
        );
        assert_eq!(Reader::new(&1.5f32.to_le_bytes()).f32_le(), Ok(1.5));
        assert_eq!(Reader::new(&(-2.5f64).to_le_bytes()).f64_le(), Ok(-2.5));
        assert_eq!(
            Reader::new(&[]).i64_le(),
            Err(ParseError::UnexpectedEof)
        );
    }
}
