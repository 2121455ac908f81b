//! The per-call log pipeline: [`Manager`], [`Ctx`], and the twin field
//! encoders.
//!
//! Every log call emits a structured event through the sink and, when the
//! current execution is associated with both a request and an active
//! trace, additionally serializes a binary record of the same event onto
//! that trace. When no trace is active the trace path costs nothing.
//!
//! The two encodings are kept tag-consistent by construction: both
//! [`write_sink_field`] and [`Manager::write_trace_field`] are total over
//! [`FieldValue`], so a new value variant fails to compile until it is
//! handled in each.

use std::sync::Arc;

use crate::buffer::TraceBuffer;
use crate::fields::{Field, FieldValue, collect_fields, escape_key};
use crate::level::Level;
use crate::reqtrack::{RecordKind, RequestTracker, TraceSink};
use crate::sink::{EventBuilder, FieldWriter, Sink, SinkContext};
use crate::stack::{StackCapture, SystemStackCapture};

/// Frames between the record's stack capture and the user's log call:
/// the capture itself, `do_log`, and the level method.
const RECORD_STACK_SKIP: usize = 3;
/// One more for error-typed fields, encoded a call deeper.
const ERROR_STACK_SKIP: usize = 4;

/// Entry point for logging; cheap to clone and share.
///
/// The manager holds read-only handles to its collaborators (request
/// tracker, structured sink, stack capture); all per-call state lives on
/// the stack of the call itself, so concurrent calls never contend.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    tracker: Arc<dyn RequestTracker>,
    sink: Arc<dyn Sink>,
    stacks: Arc<dyn StackCapture>,
}

/// One log call's worth of input, consumed by the pipeline.
struct LogEvent<'a> {
    level: Level,
    message: &'a str,
    /// Fields inherited from a [`Ctx`]; already part of the sink
    /// sub-context, so they only go to the trace buffer.
    ctx_fields: &'a [Field],
    /// Call-site fields; go to both the sink event and the trace buffer.
    fields: &'a [Field],
}

impl Manager {
    /// Create a manager with the default (std backtrace) stack capture.
    #[must_use]
    pub fn new(tracker: Arc<dyn RequestTracker>, sink: Arc<dyn Sink>) -> Self {
        Self::with_stack_capture(tracker, sink, Arc::new(SystemStackCapture))
    }

    #[must_use]
    pub fn with_stack_capture(
        tracker: Arc<dyn RequestTracker>,
        sink: Arc<dyn Sink>,
        stacks: Arc<dyn StackCapture>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                tracker,
                sink,
                stacks,
            }),
        }
    }

    pub fn debug(&self, msg: &str, keys_and_values: &[FieldValue]) {
        self.log(Level::Debug, msg, keys_and_values);
    }

    pub fn info(&self, msg: &str, keys_and_values: &[FieldValue]) {
        self.log(Level::Info, msg, keys_and_values);
    }

    pub fn warn(&self, msg: &str, keys_and_values: &[FieldValue]) {
        self.log(Level::Warn, msg, keys_and_values);
    }

    pub fn error(&self, msg: &str, keys_and_values: &[FieldValue]) {
        self.log(Level::Error, msg, keys_and_values);
    }

    /// Create a logging context carrying the given fields.
    ///
    /// The fields are encoded into a brand-new sink sub-context once, here;
    /// events logged through the returned [`Ctx`] inherit them for free.
    #[must_use]
    pub fn with(&self, keys_and_values: &[FieldValue]) -> Ctx {
        let fields = collect_fields(keys_and_values);
        let mut builder = self.inner.sink.context();
        for field in &fields {
            write_sink_field(&mut *builder, field);
        }
        Ctx {
            mgr: self.clone(),
            sink_ctx: builder.finish(),
            fields: fields.into(),
        }
    }

    fn log(&self, level: Level, msg: &str, keys_and_values: &[FieldValue]) {
        let fields = collect_fields(keys_and_values);
        let ev = self.inner.sink.event(level);
        self.do_log(
            LogEvent {
                level,
                message: msg,
                ctx_fields: &[],
                fields: &fields,
            },
            ev,
        );
    }

    fn do_log(&self, event: LogEvent<'_>, mut ev: Box<dyn EventBuilder>) {
        let inner = &*self.inner;
        let num_fields = event.ctx_fields.len() + event.fields.len();

        // The trace header needs the field count up front, which is why
        // fields are counted before any encoding happens.
        let mut trace: Option<(TraceBuffer, Arc<dyn TraceSink>)> = None;
        if let Some(curr) = inner.tracker.current() {
            if let Some(trace_sink) = curr.trace {
                let mut tb = TraceBuffer::with_capacity(
                    8 + 10 + event.message.len() + 4 + num_fields * 50,
                );
                tb.put_bytes(curr.span_id.as_bytes());
                tb.put_uvarint(curr.event_seq);
                tb.put_byte(event.level.code());
                tb.put_string(event.message);
                tb.put_uvarint(num_fields as u64);
                trace = Some((tb, trace_sink));
            }
        }

        // Inherited fields go to the trace only; they are already part of
        // the sink sub-context and would otherwise appear twice.
        if let Some((tb, _)) = trace.as_mut() {
            for field in event.ctx_fields {
                self.write_trace_field(tb, field);
            }
        }

        for field in event.fields {
            write_sink_field(&mut *ev, field);
            if let Some((tb, _)) = trace.as_mut() {
                self.write_trace_field(tb, field);
            }
        }

        ev.emit(event.message);

        if let Some((mut tb, trace_sink)) = trace {
            tb.put_stack(&inner.stacks.capture(RECORD_STACK_SKIP));
            trace_sink.append(RecordKind::LogMessage, tb.into_bytes());
        }
    }

    /// Trace-buffer encoding of one field: `[tag][key][payload]`.
    fn write_trace_field(&self, tb: &mut TraceBuffer, field: &Field) {
        let key = escape_key(&field.key);
        tb.put_byte(field.value.tag().code());
        tb.put_string(&key);
        match &field.value {
            FieldValue::Error { message } => {
                tb.put_string(message);
                tb.put_stack(&self.inner.stacks.capture(ERROR_STACK_SKIP));
            }
            FieldValue::Str(v) => tb.put_string(v),
            FieldValue::Bool(v) => tb.put_bool(*v),
            FieldValue::Time(v) => tb.put_time(*v),
            FieldValue::Duration(v) => tb.put_duration(*v),
            FieldValue::Uuid(v) => tb.put_bytes(v.as_bytes()),
            FieldValue::I8(v) => tb.put_varint((*v).into()),
            FieldValue::I16(v) => tb.put_varint((*v).into()),
            FieldValue::I32(v) => tb.put_varint((*v).into()),
            FieldValue::I64(v) => tb.put_varint(*v),
            FieldValue::U8(v) => tb.put_uvarint((*v).into()),
            FieldValue::U16(v) => tb.put_uvarint((*v).into()),
            FieldValue::U32(v) => tb.put_uvarint((*v).into()),
            FieldValue::U64(v) => tb.put_uvarint(*v),
            FieldValue::F32(v) => tb.put_f32(*v),
            FieldValue::F64(v) => tb.put_f64(*v),
            FieldValue::Any(Ok(v)) => match serde_json::to_vec(v) {
                Ok(data) => {
                    tb.put_byte_string(&data);
                    tb.put_string("");
                }
                Err(e) => {
                    tb.put_byte_string(&[]);
                    tb.put_string(&e.to_string());
                }
            },
            FieldValue::Any(Err(e)) => {
                tb.put_byte_string(&[]);
                tb.put_string(e);
            }
        }
    }
}

/// Structured-sink encoding of one field: dispatch to the most specific
/// typed writer.
fn write_sink_field<W: FieldWriter + ?Sized>(writer: &mut W, field: &Field) {
    let key = escape_key(&field.key);
    match &field.value {
        FieldValue::Error { message } => writer.write_err(&key, message),
        FieldValue::Str(v) => writer.write_str(&key, v),
        FieldValue::Bool(v) => writer.write_bool(&key, *v),
        FieldValue::Time(v) => writer.write_time(&key, *v),
        FieldValue::Duration(v) => writer.write_duration(&key, *v),
        FieldValue::Uuid(v) => writer.write_uuid(&key, *v),
        FieldValue::I8(v) => writer.write_i8(&key, *v),
        FieldValue::I16(v) => writer.write_i16(&key, *v),
        FieldValue::I32(v) => writer.write_i32(&key, *v),
        FieldValue::I64(v) => writer.write_i64(&key, *v),
        FieldValue::U8(v) => writer.write_u8(&key, *v),
        FieldValue::U16(v) => writer.write_u16(&key, *v),
        FieldValue::U32(v) => writer.write_u32(&key, *v),
        FieldValue::U64(v) => writer.write_u64(&key, *v),
        FieldValue::F32(v) => writer.write_f32(&key, *v),
        FieldValue::F64(v) => writer.write_f64(&key, *v),
        FieldValue::Any(Ok(v)) => writer.write_any(&key, v),
        FieldValue::Any(Err(e)) => writer.write_any(
            &key,
            &serde_json::Value::String(format!("marshaling error: {e}")),
        ),
    }
}

/// Immutable logging context accumulated via `with`.
///
/// A `Ctx` layers fields onto its parent without mutating it; any number
/// of children can be derived from the same parent, concurrently, with no
/// synchronization.
#[derive(Clone)]
pub struct Ctx {
    mgr: Manager,
    sink_ctx: Arc<dyn SinkContext>,
    fields: Arc<[Field]>,
}

impl Ctx {
    /// Create a child context layering additional fields onto this one.
    ///
    /// The receiver is unaffected; field order is parent's fields followed
    /// by the new ones. Repeated keys are kept as-is — the trace records
    /// every occurrence, and the structured sink applies its own
    /// last-writer-wins semantics.
    #[must_use]
    pub fn with(&self, keys_and_values: &[FieldValue]) -> Ctx {
        let new_fields = collect_fields(keys_and_values);
        let mut builder = self.sink_ctx.child();
        for field in &new_fields {
            write_sink_field(&mut *builder, field);
        }
        let mut fields = self.fields.to_vec();
        fields.extend(new_fields);
        Ctx {
            mgr: self.mgr.clone(),
            sink_ctx: builder.finish(),
            fields: fields.into(),
        }
    }

    pub fn debug(&self, msg: &str, keys_and_values: &[FieldValue]) {
        self.log(Level::Debug, msg, keys_and_values);
    }

    pub fn info(&self, msg: &str, keys_and_values: &[FieldValue]) {
        self.log(Level::Info, msg, keys_and_values);
    }

    pub fn warn(&self, msg: &str, keys_and_values: &[FieldValue]) {
        self.log(Level::Warn, msg, keys_and_values);
    }

    pub fn error(&self, msg: &str, keys_and_values: &[FieldValue]) {
        self.log(Level::Error, msg, keys_and_values);
    }

    fn log(&self, level: Level, msg: &str, keys_and_values: &[FieldValue]) {
        let fields = collect_fields(keys_and_values);
        let ev = self.sink_ctx.event(level);
        self.mgr.do_log(
            LogEvent {
                level,
                message: msg,
                ctx_fields: &self.fields,
                fields: &fields,
            },
            ev,
        );
    }
}
