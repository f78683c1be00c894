// progress.rs — Sinks for progress lines emitted by long-running pushes.

/// Receives progress lines from push operations.
///
/// Any `FnMut(&str)` closure is a sink, so callers can forward lines to a
/// terminal, a buffer, or nowhere.
pub trait ProgressSink {
    fn line(&mut self, line: &str);
}

impl<F: FnMut(&str)> ProgressSink for F {
    fn line(&mut self, line: &str) {
        self(line)
    }
}

/// Discards all progress.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn line(&mut self, _line: &str) {}
}

/// Forwards progress to `tracing` at debug level.
pub struct TracingProgress {
    label: String,
}

impl TracingProgress {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl ProgressSink for TracingProgress {
    fn line(&mut self, line: &str) {
        tracing::debug!(target: "wl_store::progress", "{}: {}", self.label, line);
    }
}

/// Feed every non-empty line of `text` to `sink`.
pub(crate) fn forward_lines(text: &str, sink: &mut dyn ProgressSink) {
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        sink.line(line);
    }
}
