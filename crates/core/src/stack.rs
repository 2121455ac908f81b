//! Call-stack capture for trace records.
//!
//! Stack capture is a collaborator seam: the pipeline asks for the current
//! call stack through [`StackCapture`] and embeds the result verbatim into
//! trace records and error-typed field payloads. The bundled
//! [`SystemStackCapture`] uses the standard library's backtrace support;
//! integrators with their own unwinder can plug in a replacement.

use std::backtrace::Backtrace;

/// A serializable representation of a captured call stack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStack {
    /// Frame descriptions, innermost first.
    pub frames: Vec<String>,
}

impl CallStack {
    /// A stack with no frames.
    #[must_use]
    pub const fn empty() -> Self {
        Self { frames: Vec::new() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Captures the current call stack.
pub trait StackCapture: Send + Sync {
    /// Capture the current stack, dropping the `skip` innermost frames.
    fn capture(&self, skip: usize) -> CallStack;
}

/// Stack capture backed by [`std::backtrace`].
///
/// Frame symbols are recovered from the rendered backtrace; when the build
/// carries no symbol information the frames may be bare addresses or the
/// stack may come back empty. Capture never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemStackCapture;

impl StackCapture for SystemStackCapture {
    fn capture(&self, skip: usize) -> CallStack {
        let rendered = Backtrace::force_capture().to_string();
        CallStack {
            frames: parse_frames(&rendered, skip),
        }
    }
}

/// Stack capture that always returns an empty stack.
///
/// Useful in tests and in deployments that don't want to pay for capture.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoStackCapture;

impl StackCapture for NoStackCapture {
    fn capture(&self, _skip: usize) -> CallStack {
        CallStack::empty()
    }
}

fn parse_frames(rendered: &str, skip: usize) -> Vec<String> {
    rendered
        .lines()
        .filter_map(frame_symbol)
        .skip(skip)
        .map(str::to_owned)
        .collect()
}

/// Extract the symbol from a rendered frame line of the form `  N: symbol`.
///
/// Location lines (`at file:line`) and anything else are ignored.
fn frame_symbol(line: &str) -> Option<&str> {
    let (index, symbol) = line.trim_start().split_once(": ")?;
    if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) {
        Some(symbol.trim_end())
    } else {
        None
    }
}
