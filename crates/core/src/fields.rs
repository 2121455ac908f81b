//! Log field values, the trace wire-tag table, and key normalization.
//!
//! A log call supplies fields as a flat sequence of alternating keys and
//! values ([`pairs`] trims a trailing unpaired entry). Every value resolves
//! to exactly one [`FieldTag`] at encode time; anything outside the known
//! cases falls back to a JSON encoding.

use std::borrow::Cow;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Prefix of field keys reserved for internal use.
///
/// Caller-supplied keys starting with this prefix are rewritten with an
/// additional `x_` prefix before they reach either the structured sink or
/// the trace buffer, so they cannot shadow internal fields such as span
/// metadata.
pub const INTERNAL_KEY_PREFIX: &str = "reqlog_";

/// One-byte type tags used in the binary trace encoding.
///
/// All integer widths collapse to the single [`FieldTag::Int`] or
/// [`FieldTag::Uint`] tag; width is deliberately not preserved on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldTag {
    Error = 1,
    Str = 2,
    Bool = 3,
    Time = 4,
    Duration = 5,
    Uuid = 6,
    Json = 7,
    Int = 8,
    Uint = 9,
    F32 = 10,
    F64 = 11,
}

impl FieldTag {
    /// The one-byte wire code.
    #[must_use]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// A single typed log field value.
///
/// Construct values through the `From` impls, [`FieldValue::error`] for
/// errors, or [`FieldValue::any`] for arbitrary serializable data; the
/// [`vals!`](crate::vals) macro converts a whole key/value list at once.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// An error, reduced to its display message.
    Error { message: String },
    Str(String),
    Bool(bool),
    Time(DateTime<Utc>),
    Duration(Duration),
    Uuid(Uuid),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Fallback for values outside the known cases: the JSON form, or the
    /// serialization failure captured as data.
    Any(Result<JsonValue, String>),
}

impl FieldValue {
    /// Encode an arbitrary serializable value through the JSON fallback.
    ///
    /// A serialization failure is captured inside the value rather than
    /// returned; encoding a field must never fail the surrounding log call.
    pub fn any<T: Serialize + ?Sized>(value: &T) -> Self {
        Self::Any(serde_json::to_value(value).map_err(|e| e.to_string()))
    }

    /// Capture an error as a field value, reduced to its display message.
    pub fn error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }

    /// The trace wire tag for this value.
    ///
    /// Depends only on the value's type, never its content.
    #[must_use]
    pub const fn tag(&self) -> FieldTag {
        match self {
            Self::Error { .. } => FieldTag::Error,
            Self::Str(_) => FieldTag::Str,
            Self::Bool(_) => FieldTag::Bool,
            Self::Time(_) => FieldTag::Time,
            Self::Duration(_) => FieldTag::Duration,
            Self::Uuid(_) => FieldTag::Uuid,
            Self::I8(_) | Self::I16(_) | Self::I32(_) | Self::I64(_) => FieldTag::Int,
            Self::U8(_) | Self::U16(_) | Self::U32(_) | Self::U64(_) => FieldTag::Uint,
            Self::F32(_) => FieldTag::F32,
            Self::F64(_) => FieldTag::F64,
            Self::Any(_) => FieldTag::Json,
        }
    }

    /// Render this value for use as a field key.
    ///
    /// Keys are expected to be strings; when a caller puts a non-string
    /// value in a key position we coerce it to text instead of failing the
    /// log call.
    pub(crate) fn into_key(self) -> String {
        match self {
            Self::Str(s) => s,
            Self::Error { message } => message,
            Self::Bool(v) => v.to_string(),
            Self::Time(v) => v.to_rfc3339(),
            Self::Duration(v) => v.to_string(),
            Self::Uuid(v) => v.to_string(),
            Self::I8(v) => v.to_string(),
            Self::I16(v) => v.to_string(),
            Self::I32(v) => v.to_string(),
            Self::I64(v) => v.to_string(),
            Self::U8(v) => v.to_string(),
            Self::U16(v) => v.to_string(),
            Self::U32(v) => v.to_string(),
            Self::U64(v) => v.to_string(),
            Self::F32(v) => v.to_string(),
            Self::F64(v) => v.to_string(),
            Self::Any(Ok(v)) => v.to_string(),
            Self::Any(Err(_)) => String::from("?"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Time(value)
    }
}

impl From<Duration> for FieldValue {
    fn from(value: Duration) -> Self {
        Self::Duration(value)
    }
}

impl From<std::time::Duration> for FieldValue {
    fn from(value: std::time::Duration) -> Self {
        Self::Duration(Duration::from_std(value).unwrap_or(Duration::MAX))
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

macro_rules! from_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for FieldValue {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        })*
    };
}

from_primitive! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

/// A `(key, value)` log field pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: String,
    pub value: FieldValue,
}

impl Field {
    pub fn new(key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Build a flat key/value list for a log call.
///
/// Keys and values alternate, exactly as they are passed to the logging
/// functions:
///
/// ```
/// use reqlog_core::vals;
///
/// let kv = vals!["path", "/healthz", "status", 200u32];
/// assert_eq!(kv.len(), 4);
/// ```
#[macro_export]
macro_rules! vals {
    ($($value:expr),* $(,)?) => {
        [$($crate::FieldValue::from($value)),*]
    };
}

/// Trim a flat key/value list to the longest even-length prefix.
///
/// A trailing unpaired entry is silently dropped; order is preserved.
#[must_use]
pub fn pairs(keys_and_values: &[FieldValue]) -> &[FieldValue] {
    &keys_and_values[..keys_and_values.len() & !1]
}

/// Normalize a flat key/value list into [`Field`]s.
pub(crate) fn collect_fields(keys_and_values: &[FieldValue]) -> Vec<Field> {
    pairs(keys_and_values)
        .chunks_exact(2)
        .map(|pair| Field {
            key: pair[0].clone().into_key(),
            value: pair[1].clone(),
        })
        .collect()
}

/// Rewrite a key that collides with the reserved namespace.
///
/// Keys starting with [`INTERNAL_KEY_PREFIX`] gain an `x_` prefix; all
/// other keys pass through unchanged.
#[must_use]
pub fn escape_key(key: &str) -> Cow<'_, str> {
    if key.starts_with(INTERNAL_KEY_PREFIX) {
        Cow::Owned(format!("x_{key}"))
    } else {
        Cow::Borrowed(key)
    }
}
