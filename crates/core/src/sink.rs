//! The structured-sink seam and the bundled sink implementations.
//!
//! A sink accepts events in a build-then-commit pattern: typed field
//! setters on an [`EventBuilder`] followed by a terminal
//! [`emit`](EventBuilder::emit). A [`ContextBuilder`] supports the same
//! setters but finishes into an immutable [`SinkContext`] that seeds
//! future events, which is what makes inherited context fields free at
//! log time.
//!
//! Two implementations ship with the crate: [`JsonSink`] writes one JSON
//! object per event to any writer, and [`TracingSink`] forwards events to
//! the `tracing` ecosystem.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::level::Level;

/// Typed field setters shared by event and context builders.
///
/// Sinks must handle the canonical-width setters; the narrower integer and
/// float widths default to forwarding, so a sink only distinguishes widths
/// when it wants to.
pub trait FieldWriter {
    /// An error, reduced to its message.
    fn write_err(&mut self, key: &str, message: &str);
    fn write_str(&mut self, key: &str, value: &str);
    fn write_bool(&mut self, key: &str, value: bool);
    fn write_time(&mut self, key: &str, value: DateTime<Utc>);
    fn write_duration(&mut self, key: &str, value: Duration);
    fn write_i64(&mut self, key: &str, value: i64);
    fn write_u64(&mut self, key: &str, value: u64);
    fn write_f64(&mut self, key: &str, value: f64);
    /// Generic fallback for values outside the known cases.
    fn write_any(&mut self, key: &str, value: &JsonValue);

    fn write_uuid(&mut self, key: &str, value: Uuid) {
        self.write_str(key, &value.to_string());
    }
    fn write_i8(&mut self, key: &str, value: i8) {
        self.write_i64(key, value.into());
    }
    fn write_i16(&mut self, key: &str, value: i16) {
        self.write_i64(key, value.into());
    }
    fn write_i32(&mut self, key: &str, value: i32) {
        self.write_i64(key, value.into());
    }
    fn write_u8(&mut self, key: &str, value: u8) {
        self.write_u64(key, value.into());
    }
    fn write_u16(&mut self, key: &str, value: u16) {
        self.write_u64(key, value.into());
    }
    fn write_u32(&mut self, key: &str, value: u32) {
        self.write_u64(key, value.into());
    }
    fn write_f32(&mut self, key: &str, value: f32) {
        self.write_f64(key, value.into());
    }
}

/// An event under construction; committed with [`emit`](Self::emit).
pub trait EventBuilder: FieldWriter {
    /// Flush the message together with all accumulated fields.
    ///
    /// Emission is best-effort: transport failures are the sink's concern
    /// and never surface to the logging caller.
    fn emit(self: Box<Self>, msg: &str);
}

/// A sub-context under construction; committed with
/// [`finish`](Self::finish).
pub trait ContextBuilder: FieldWriter {
    fn finish(self: Box<Self>) -> Arc<dyn SinkContext>;
}

/// An immutable accumulated sub-context.
///
/// Events started from a context carry its fields; layering via
/// [`child`](Self::child) copies, never mutates.
pub trait SinkContext: Send + Sync {
    /// Start an event seeded with this context's fields.
    fn event(&self, level: Level) -> Box<dyn EventBuilder>;
    /// Start a builder layering additional fields onto a copy of this
    /// context.
    fn child(&self) -> Box<dyn ContextBuilder>;
}

/// A structured log sink.
pub trait Sink: Send + Sync {
    /// Start an event with no inherited context.
    fn event(&self, level: Level) -> Box<dyn EventBuilder>;
    /// Start an empty sub-context builder.
    fn context(&self) -> Box<dyn ContextBuilder>;
}

/// Ordered JSON field map backing the bundled sinks.
#[derive(Debug, Clone, Default)]
struct FieldMap(Map<String, JsonValue>);

impl FieldWriter for FieldMap {
    fn write_err(&mut self, key: &str, message: &str) {
        self.0.insert(key.to_owned(), JsonValue::String(message.to_owned()));
    }

    fn write_str(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_owned(), JsonValue::String(value.to_owned()));
    }

    fn write_bool(&mut self, key: &str, value: bool) {
        self.0.insert(key.to_owned(), JsonValue::Bool(value));
    }

    fn write_time(&mut self, key: &str, value: DateTime<Utc>) {
        self.0.insert(key.to_owned(), JsonValue::String(value.to_rfc3339()));
    }

    fn write_duration(&mut self, key: &str, value: Duration) {
        // Durations render as integer milliseconds.
        self.0.insert(key.to_owned(), value.num_milliseconds().into());
    }

    fn write_i64(&mut self, key: &str, value: i64) {
        self.0.insert(key.to_owned(), value.into());
    }

    fn write_u64(&mut self, key: &str, value: u64) {
        self.0.insert(key.to_owned(), value.into());
    }

    fn write_f64(&mut self, key: &str, value: f64) {
        // Non-finite floats have no JSON form; they become null.
        self.0.insert(
            key.to_owned(),
            serde_json::Number::from_f64(value)
                .map_or(JsonValue::Null, JsonValue::Number),
        );
    }

    fn write_any(&mut self, key: &str, value: &JsonValue) {
        self.0.insert(key.to_owned(), value.clone());
    }
}

macro_rules! forward_field_writer {
    ($ty:ty) => {
        impl FieldWriter for $ty {
            fn write_err(&mut self, key: &str, message: &str) {
                self.fields.write_err(key, message);
            }
            fn write_str(&mut self, key: &str, value: &str) {
                self.fields.write_str(key, value);
            }
            fn write_bool(&mut self, key: &str, value: bool) {
                self.fields.write_bool(key, value);
            }
            fn write_time(&mut self, key: &str, value: DateTime<Utc>) {
                self.fields.write_time(key, value);
            }
            fn write_duration(&mut self, key: &str, value: Duration) {
                self.fields.write_duration(key, value);
            }
            fn write_i64(&mut self, key: &str, value: i64) {
                self.fields.write_i64(key, value);
            }
            fn write_u64(&mut self, key: &str, value: u64) {
                self.fields.write_u64(key, value);
            }
            fn write_f64(&mut self, key: &str, value: f64) {
                self.fields.write_f64(key, value);
            }
            fn write_any(&mut self, key: &str, value: &JsonValue) {
                self.fields.write_any(key, value);
            }
        }
    };
}

type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// Structured sink writing one JSON object per event, newline-terminated.
///
/// Each line carries `level`, an RFC 3339 `time`, the accumulated fields,
/// and the `message`.
pub struct JsonSink {
    out: SharedWriter,
}

impl JsonSink {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(out)),
        }
    }

    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    #[must_use]
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl Sink for JsonSink {
    fn event(&self, level: Level) -> Box<dyn EventBuilder> {
        Box::new(JsonEventBuilder {
            out: Arc::clone(&self.out),
            level,
            fields: FieldMap::default(),
        })
    }

    fn context(&self) -> Box<dyn ContextBuilder> {
        Box::new(JsonContextBuilder {
            out: Arc::clone(&self.out),
            fields: FieldMap::default(),
        })
    }
}

struct JsonEventBuilder {
    out: SharedWriter,
    level: Level,
    fields: FieldMap,
}

forward_field_writer!(JsonEventBuilder);

impl EventBuilder for JsonEventBuilder {
    fn emit(self: Box<Self>, msg: &str) {
        let mut map = Map::with_capacity(self.fields.0.len() + 3);
        map.insert("level".to_owned(), JsonValue::String(self.level.as_str().to_owned()));
        map.insert("time".to_owned(), JsonValue::String(Utc::now().to_rfc3339()));
        map.extend(self.fields.0);
        map.insert("message".to_owned(), JsonValue::String(msg.to_owned()));

        // Transport failures (and a poisoned writer) are swallowed here;
        // a log call must not fail its caller.
        if let Ok(mut out) = self.out.lock() {
            let _ = writeln!(out, "{}", JsonValue::Object(map));
        }
    }
}

struct JsonContextBuilder {
    out: SharedWriter,
    fields: FieldMap,
}

forward_field_writer!(JsonContextBuilder);

impl ContextBuilder for JsonContextBuilder {
    fn finish(self: Box<Self>) -> Arc<dyn SinkContext> {
        Arc::new(JsonContext {
            out: self.out,
            fields: self.fields,
        })
    }
}

struct JsonContext {
    out: SharedWriter,
    fields: FieldMap,
}

impl SinkContext for JsonContext {
    fn event(&self, level: Level) -> Box<dyn EventBuilder> {
        Box::new(JsonEventBuilder {
            out: Arc::clone(&self.out),
            level,
            fields: self.fields.clone(),
        })
    }

    fn child(&self) -> Box<dyn ContextBuilder> {
        Box::new(JsonContextBuilder {
            out: Arc::clone(&self.out),
            fields: self.fields.clone(),
        })
    }
}

/// Structured sink forwarding events to the `tracing` ecosystem.
///
/// The field map is serialized to JSON and attached as a single `fields`
/// value, since `tracing` events cannot carry dynamically-named fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl Sink for TracingSink {
    fn event(&self, level: Level) -> Box<dyn EventBuilder> {
        Box::new(TracingEventBuilder {
            level,
            fields: FieldMap::default(),
        })
    }

    fn context(&self) -> Box<dyn ContextBuilder> {
        Box::new(TracingContextBuilder {
            fields: FieldMap::default(),
        })
    }
}

struct TracingEventBuilder {
    level: Level,
    fields: FieldMap,
}

forward_field_writer!(TracingEventBuilder);

impl EventBuilder for TracingEventBuilder {
    fn emit(self: Box<Self>, msg: &str) {
        let fields = JsonValue::Object(self.fields.0).to_string();
        match self.level {
            Level::Trace => tracing::trace!(target: "reqlog", fields = %fields, "{msg}"),
            Level::Debug => tracing::debug!(target: "reqlog", fields = %fields, "{msg}"),
            Level::Info => tracing::info!(target: "reqlog", fields = %fields, "{msg}"),
            Level::Warn => tracing::warn!(target: "reqlog", fields = %fields, "{msg}"),
            Level::Error => tracing::error!(target: "reqlog", fields = %fields, "{msg}"),
        }
    }
}

struct TracingContextBuilder {
    fields: FieldMap,
}

forward_field_writer!(TracingContextBuilder);

impl ContextBuilder for TracingContextBuilder {
    fn finish(self: Box<Self>) -> Arc<dyn SinkContext> {
        Arc::new(TracingContext {
            fields: self.fields,
        })
    }
}

struct TracingContext {
    fields: FieldMap,
}

impl SinkContext for TracingContext {
    fn event(&self, level: Level) -> Box<dyn EventBuilder> {
        Box::new(TracingEventBuilder {
            level,
            fields: self.fields.clone(),
        })
    }

    fn child(&self) -> Box<dyn ContextBuilder> {
        Box::new(TracingContextBuilder {
            fields: self.fields.clone(),
        })
    }
}
