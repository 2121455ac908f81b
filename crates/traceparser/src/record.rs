//! Typed decoding of the log-message record.

use uuid::Uuid;

use crate::reader::{ParseError, Reader};

/// The one-byte field type tags of the wire format.
///
/// Declared here independently of the encoder on purpose: the parser must
/// keep decoding old records even if it is built separately.
pub mod tags {
    pub const ERROR: u8 = 1;
    pub const STR: u8 = 2;
    pub const BOOL: u8 = 3;
    pub const TIME: u8 = 4;
    pub const DURATION: u8 = 5;
    pub const UUID: u8 = 6;
    pub const JSON: u8 = 7;
    pub const INT: u8 = 8;
    pub const UINT: u8 = 9;
    pub const F32: u8 = 10;
    pub const F64: u8 = 11;
}

/// Severity level of a decoded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl TryFrom<u8> for Level {
    type Error = ParseError;

    fn try_from(code: u8) -> Result<Self, ParseError> {
        match code {
            0 => Ok(Self::Trace),
            1 => Ok(Self::Debug),
            2 => Ok(Self::Info),
            3 => Ok(Self::Warn),
            4 => Ok(Self::Error),
            other => Err(ParseError::UnknownLevel(other)),
        }
    }
}

/// Payload of a decoded field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldData {
    Error { message: String, stack: Vec<String> },
    Str(String),
    Bool(bool),
    /// Unix nanoseconds.
    Time(i64),
    /// Signed nanosecond count.
    Duration(i64),
    Uuid(Uuid),
    /// JSON-encoded bytes, or the serialization failure that replaced them.
    Json {
        data: Vec<u8>,
        error: Option<String>,
    },
    Int(i64),
    Uint(u64),
    F32(f32),
    F64(f64),
}

impl FieldData {
    /// The wire tag this payload was decoded from.
    #[must_use]
    pub const fn tag(&self) -> u8 {
        match self {
            Self::Error { .. } => tags::ERROR,
            Self::Str(_) => tags::STR,
            Self::Bool(_) => tags::BOOL,
            Self::Time(_) => tags::TIME,
            Self::Duration(_) => tags::DURATION,
            Self::Uuid(_) => tags::UUID,
            Self::Json { .. } => tags::JSON,
            Self::Int(_) => tags::INT,
            Self::Uint(_) => tags::UINT,
            Self::F32(_) => tags::F32,
            Self::F64(_) => tags::F64,
        }
    }
}

/// A decoded `(key, payload)` field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: String,
    pub data: FieldData,
}

/// A fully decoded log-message record.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub span_id: [u8; 8],
    pub event_seq: u64,
    pub level: Level,
    pub message: String,
    pub fields: Vec<Field>,
    pub stack: Vec<String>,
}

/// Decode one log-message record.
///
/// The whole buffer must be consumed; leftover bytes are an error.
pub fn parse_log_record(buf: &[u8]) -> Result<LogRecord, ParseError> {
    let mut r = Reader::new(buf);

    let mut span_id = [0u8; 8];
    span_id.copy_from_slice(r.bytes(8)?);
    let event_seq = r.uvarint()?;
    let level = Level::try_from(r.u8()?)?;
    let message = r.string()?;

    let num_fields = r.uvarint()?;
    // Cap the pre-allocation: the count is attacker-controlled data.
    let mut fields = Vec::with_capacity(num_fields.min(64) as usize);
    for _ in 0..num_fields {
        fields.push(parse_field(&mut r)?);
    }

    let stack = parse_stack(&mut r)?;

    if r.remaining() > 0 {
        return Err(ParseError::TrailingBytes(r.remaining()));
    }

    Ok(LogRecord {
        span_id,
        event_seq,
        level,
        message,
        fields,
        stack,
    })
}

fn parse_field(r: &mut Reader<'_>) -> Result<Field, ParseError> {
    let tag = r.u8()?;
    let key = r.string()?;
    let data = match tag {
        tags::ERROR => {
            let message = r.string()?;
            let stack = parse_stack(r)?;
            FieldData::Error { message, stack }
        }
        tags::STR => FieldData::Str(r.string()?),
        tags::BOOL => FieldData::Bool(r.bool()?),
        tags::TIME => FieldData::Time(r.i64_le()?),
        tags::DURATION => FieldData::Duration(r.i64_le()?),
        tags::UUID => {
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(r.bytes(16)?);
            FieldData::Uuid(Uuid::from_bytes(bytes))
        }
        tags::JSON => {
            let data = r.byte_string()?;
            let error = r.string()?;
            FieldData::Json {
                data,
                error: if error.is_empty() { None } else { Some(error) },
            }
        }
        tags::INT => FieldData::Int(r.varint()?),
        tags::UINT => FieldData::Uint(r.uvarint()?),
        tags::F32 => FieldData::F32(r.f32_le()?),
        tags::F64 => FieldData::F64(r.f64_le()?),
        other => return Err(ParseError::UnknownTag(other)),
    };
    Ok(Field { key, data })
}

fn parse_stack(r: &mut Reader<'_>) -> Result<Vec<String>, ParseError> {
    let count = r.uvarint()?;
    let mut frames = Vec::with_capacity(count.min(64) as usize);
    for _ in 0..count {
        frames.push(r.string()?);
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal hand-rolled encoder so these tests stay independent of the
    /// producing crate.
    #[derive(Default)]
    struct Enc(Vec<u8>);

    impl Enc {
        fn byte(mut self, b: u8) -> Self {
            self.0.push(b);
            self
        }

        fn raw(mut self, b: &[u8]) -> Self {
            self.0.extend_from_slice(b);
            self
        }

        fn uvarint(mut self, mut v: u64) -> Self {
            loop {
                let byte = (v & 0x7f) as u8;
                v >>= 7;
                if v == 0 {
                    self.0.push(byte);
                    break self;
                }
                self.0.push(byte | 0x80);
            }
        }

        fn string(self, s: &str) -> Self {
            self.uvarint(s.len() as u64).raw(s.as_bytes())
        }
    }

    fn header(nfields: u64) -> Enc {
        Enc::default()
            .raw(&[9; 8]) // span id
            .uvarint(7) // event seq
            .byte(2) // info
            .string("msg")
            .uvarint(nfields)
    }

    #[test]
    fn test_parse_minimal_record() {
        let buf = header(0).uvarint(0).0; // no fields, empty stack
        let rec = parse_log_record(&buf).unwrap();
        assert_eq!(rec.span_id, [9; 8]);
        assert_eq!(rec.event_seq, 7);
        assert_eq!(rec.level, Level::Info);
        assert_eq!(rec.message, "msg");
        assert!(rec.fields.is_empty());
        assert!(rec.stack.is_empty());
    }

    #[test]
    fn test_parse_str_and_int_fields() {
        let buf = header(2)
            .byte(tags::STR)
            .string("name")
            .string("val")
            .byte(tags::INT)
            .string("n")
            .uvarint(5) // zigzag(-3)
            .uvarint(1) // one stack frame
            .string("app::main")
            .0;
        let rec = parse_log_record(&buf).unwrap();
        assert_eq!(rec.fields.len(), 2);
        assert_eq!(rec.fields[0].key, "name");
        assert_eq!(rec.fields[0].data, FieldData::Str("val".into()));
        assert_eq!(rec.fields[1].data, FieldData::Int(-3));
        assert_eq!(rec.stack, vec!["app::main"]);
    }

    #[test]
    fn test_parse_error_field_with_stack() {
        let buf = header(1)
            .byte(tags::ERROR)
            .string("cause")
            .string("boom")
            .uvarint(1)
            .string("app::fail")
            .uvarint(0)
            .0;
        let rec = parse_log_record(&buf).unwrap();
        assert_eq!(
            rec.fields[0].data,
            FieldData::Error {
                message: "boom".into(),
                stack: vec!["app::fail".into()],
            }
        );
    }

    #[test]
    fn test_parse_json_field_failure_marker() {
        let buf = header(1)
            .byte(tags::JSON)
            .string("blob")
            .uvarint(0) // empty payload
            .string("cannot serialize")
            .uvarint(0)
            .0;
        let rec = parse_log_record(&buf).unwrap();
        assert_eq!(
            rec.fields[0].data,
            FieldData::Json {
                data: vec![],
                error: Some("cannot serialize".into()),
            }
        );
    }

    #[test]
    fn test_truncated_record_is_eof_not_panic() {
        let full = header(1)
            .byte(tags::STR)
            .string("k")
            .string("v")
            .uvarint(0)
            .0;
        for len in 0..full.len() {
            assert_eq!(
                parse_log_record(&full[..len]),
                Err(ParseError::UnexpectedEof),
                "prefix of {len} bytes"
            );
        }
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let buf = header(1).byte(0xee).string("k").uvarint(0).0;
        assert_eq!(parse_log_record(&buf), Err(ParseError::UnknownTag(0xee)));
    }

    #[test]
    fn test_unknown_level_rejected() {
        let buf = Enc::default()
            .raw(&[0; 8])
            .uvarint(0)
            .byte(9)
            .string("m")
            .uvarint(0)
            .uvarint(0)
            .0;
        assert_eq!(parse_log_record(&buf), Err(ParseError::UnknownLevel(9)));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut buf = header(0).uvarint(0).0;
        buf.push(0x00);
        assert_eq!(parse_log_record(&buf), Err(ParseError::TrailingBytes(1)));
    }
}
