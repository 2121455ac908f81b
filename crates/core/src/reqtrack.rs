//! The request/trace association seam.
//!
//! Every log call asks "what request am I running inside, and is it being
//! traced?" through [`RequestTracker`]. The answer is a read-only
//! [`CurrentRequest`] snapshot; when it carries a trace sink, the pipeline
//! builds a binary record and hands it over. The bundled
//! [`LocalRequestTracker`] keeps the association in a thread-local with an
//! RAII scope guard; runtimes with their own task-local propagation
//! implement the trait instead.

use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

/// Fixed-width span identifier carried by every trace record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SpanId([u8; 8]);

impl SpanId {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Kind tag attached to records handed to a [`TraceSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    LogMessage = 5,
}

/// Destination for finished binary trace records.
///
/// One opaque record per call, appended to the trace of the current
/// request. Implementations own their transport and its failure handling.
pub trait TraceSink: Send + Sync {
    fn append(&self, kind: RecordKind, record: Bytes);
}

/// Read-only snapshot of the current execution's request association.
#[derive(Clone)]
pub struct CurrentRequest {
    pub span_id: SpanId,
    /// Monotonically increasing per-request event counter. Owned and
    /// advanced by the provider; only read here.
    pub event_seq: u64,
    /// The active trace, if this request is being traced.
    pub trace: Option<Arc<dyn TraceSink>>,
}

/// Provider of the current execution's request/trace association.
pub trait RequestTracker: Send + Sync {
    /// The current association, or `None` outside any request.
    fn current(&self) -> Option<CurrentRequest>;
}

/// Per-request state held by the bundled thread-local tracker.
pub struct RequestState {
    span_id: SpanId,
    counter: AtomicU64,
    trace: Option<Arc<dyn TraceSink>>,
}

impl RequestState {
    #[must_use]
    pub fn new(span_id: SpanId, trace: Option<Arc<dyn TraceSink>>) -> Arc<Self> {
        Arc::new(Self {
            span_id,
            counter: AtomicU64::new(0),
            trace,
        })
    }

    #[must_use]
    pub const fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// Advance the event counter, returning the new value.
    pub fn advance(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn snapshot(self: &Arc<Self>) -> CurrentRequest {
        CurrentRequest {
            span_id: self.span_id,
            event_seq: self.counter.load(Ordering::Relaxed),
            trace: self.trace.clone(),
        }
    }
}

thread_local! {
    static CURRENT_REQUEST: RefCell<Option<Arc<RequestState>>> = const { RefCell::new(None) };
}

/// Get the current request state for this thread.
#[must_use]
pub fn current_request() -> Option<Arc<RequestState>> {
    CURRENT_REQUEST.with(|current| current.borrow().clone())
}

/// Set the current request state for this thread.
pub fn set_current_request(state: Option<Arc<RequestState>>) {
    CURRENT_REQUEST.with(|current| {
        *current.borrow_mut() = state;
    });
}

/// RAII guard associating the current thread with a request for a scope.
pub struct RequestScope {
    previous: Option<Arc<RequestState>>,
}

impl RequestScope {
    pub fn enter(state: Arc<RequestState>) -> Self {
        let previous = current_request();
        set_current_request(Some(state));
        Self { previous }
    }
}

impl Drop for RequestScope {
    fn drop(&mut self) {
        set_current_request(self.previous.take());
    }
}

/// [`RequestTracker`] backed by the thread-local [`RequestScope`] state.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalRequestTracker;

impl RequestTracker for LocalRequestTracker {
    fn current(&self) -> Option<CurrentRequest> {
        current_request().map(|state| state.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTraceSink {
        records: Mutex<Vec<(RecordKind, Bytes)>>,
    }

    impl TraceSink for RecordingTraceSink {
        fn append(&self, kind: RecordKind, record: Bytes) {
            self.records.lock().unwrap().push((kind, record));
        }
    }

    #[test]
    fn test_span_id_display_is_hex() {
        let id = SpanId::from_bytes([0, 1, 2, 3, 4, 5, 0xab, 0xcd]);
        assert_eq!(id.to_string(), "000102030405abcd");
    }

    #[test]
    fn test_no_request_outside_scope() {
        assert!(LocalRequestTracker.current().is_none());
    }

    #[test]
    fn test_scope_sets_and_restores() {
        let tracker = LocalRequestTracker;
        let outer = RequestState::new(SpanId::from_bytes([1; 8]), None);
        {
            let _outer_scope = RequestScope::enter(Arc::clone(&outer));
            assert_eq!(
                tracker.current().unwrap().span_id,
                SpanId::from_bytes([1; 8])
            );

            let inner = RequestState::new(SpanId::from_bytes([2; 8]), None);
            {
                let _inner_scope = RequestScope::enter(inner);
                assert_eq!(
                    tracker.current().unwrap().span_id,
                    SpanId::from_bytes([2; 8])
                );
            }

            // Inner scope drop restores the outer request.
            assert_eq!(
                tracker.current().unwrap().span_id,
                SpanId::from_bytes([1; 8])
            );
        }
        assert!(tracker.current().is_none());
    }

    #[test]
    fn test_counter_advances_monotonically() {
        let state = RequestState::new(SpanId::default(), None);
        assert_eq!(state.advance(), 1);
        assert_eq!(state.advance(), 2);

        let _scope = RequestScope::enter(Arc::clone(&state));
        assert_eq!(LocalRequestTracker.current().unwrap().event_seq, 2);
    }

    #[test]
    fn test_snapshot_carries_trace_sink() {
        let sink: Arc<dyn TraceSink> = Arc::new(RecordingTraceSink::default());
        let state = RequestState::new(SpanId::default(), Some(Arc::clone(&sink)));
        let _scope = RequestScope::enter(state);

        let current = LocalRequestTracker.current().unwrap();
        let trace = current.trace.expect("trace sink should be present");
        trace.append(RecordKind::LogMessage, Bytes::from_static(b"rec"));
    }
}
