//! Request-scoped structured logging with binary trace correlation.
//!
//! Every log call is emitted twice: as a structured event through a
//! pluggable [`Sink`], and, when the current execution belongs to a traced
//! request, as a compact binary record appended to that request's trace,
//! so log output and trace spans can be cross-referenced after the fact.
//! Logging contexts ([`Ctx`]) accumulate fields immutably across nested
//! scopes; inherited fields are never re-encoded into the structured
//! event, but always appear in the trace record.
//!
//! ```
//! use std::sync::Arc;
//! use reqlog_core::{JsonSink, LocalRequestTracker, Manager, vals};
//!
//! let mgr = Manager::new(Arc::new(LocalRequestTracker), Arc::new(JsonSink::stderr()));
//! let ctx = mgr.with(&vals!["request_id", "r-123"]);
//! ctx.info("handling request", &vals!["path", "/healthz"]);
//! ```
//!
//! The matching decoder for trace records lives in `reqlog-traceparser`.

pub mod buffer;
pub mod fields;
pub mod level;
pub mod log;
pub mod reqtrack;
pub mod sink;
pub mod stack;

pub use buffer::TraceBuffer;
pub use fields::{Field, FieldTag, FieldValue, INTERNAL_KEY_PREFIX, escape_key, pairs};
pub use level::Level;
pub use log::{Ctx, Manager};
pub use reqtrack::{
    CurrentRequest, LocalRequestTracker, RecordKind, RequestScope, RequestState, RequestTracker,
    SpanId, TraceSink,
};
pub use sink::{
    ContextBuilder, EventBuilder, FieldWriter, JsonSink, Sink, SinkContext, TracingSink,
};
pub use stack::{CallStack, NoStackCapture, StackCapture, SystemStackCapture};
