use std::fmt;

/// Lifecycle callback observed by a diagnostic sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Initialize,
    Prepare,
    Process,
    Unprepare,
    Finalize,
}

impl LifecycleEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleEvent::Initialize => "initialize",
            LifecycleEvent::Prepare => "prepare",
            LifecycleEvent::Process => "process",
            LifecycleEvent::Unprepare => "unprepare",
            LifecycleEvent::Finalize => "finalize",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-owned hook that observes tap lifecycle callbacks.
///
/// `record` is also invoked from the render callback for
/// [`LifecycleEvent::Process`], so implementations used in production must be
/// as cheap as a [`ResultSink`](crate::ResultSink).
pub trait DiagnosticSink {
    fn record(&mut self, tap_index: usize, event: LifecycleEvent);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiagnostics;

impl DiagnosticSink for NoopDiagnostics {
    fn record(&mut self, _tap_index: usize, _event: LifecycleEvent) {}
}

/// Forwards lifecycle events to `tracing`. Process events are logged at trace
/// level, so keep that level disabled on real-time threads.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn record(&mut self, tap_index: usize, event: LifecycleEvent) {
        match event {
            LifecycleEvent::Process => tracing::trace!(tap = tap_index, "audio tap process"),
            other => tracing::debug!(
                tap = tap_index,
                event = other.as_str(),
                "audio tap lifecycle"
            ),
        }
    }
}

/// One recorded lifecycle callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticEntry {
    pub tap_index: usize,
    pub event: LifecycleEvent,
}

impl fmt::Display for DiagnosticEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "audioTap {}: {}", self.tap_index, self.event)
    }
}

/// Bounded in-memory log. Storage is reserved up front; once full, further
/// entries are counted but not stored, so recording never allocates.
#[derive(Debug, Clone)]
pub struct DiagnosticLog {
    entries: Vec<DiagnosticEntry>,
    capacity: usize,
    overflowed: u64,
}

impl DiagnosticLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            overflowed: 0,
        }
    }

    pub fn entries(&self) -> &[DiagnosticEntry] {
        &self.entries
    }

    pub fn overflowed(&self) -> u64 {
        self.overflowed
    }

    pub fn count(&self, event: LifecycleEvent) -> usize {
        self.entries.iter().filter(|entry| entry.event == event).count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.overflowed = 0;
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::with_capacity(1024)
    }
}

impl DiagnosticSink for DiagnosticLog {
    fn record(&mut self, tap_index: usize, event: LifecycleEvent) {
        if self.entries.len() < self.capacity {
            self.entries.push(DiagnosticEntry { tap_index, event });
        } else {
            self.overflowed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_entries_with_tap_index() {
        let entry = DiagnosticEntry {
            tap_index: 3,
            event: LifecycleEvent::Prepare,
        };
        assert_eq!(entry.to_string(), "audioTap 3: prepare");
    }

    #[test]
    fn log_stops_growing_at_capacity() {
        let mut log = DiagnosticLog::with_capacity(2);
        log.record(0, LifecycleEvent::Initialize);
        log.record(0, LifecycleEvent::Process);
        log.record(0, LifecycleEvent::Process);

        assert_eq!(log.entries().len(), 2);
        assert_eq!(log.overflowed(), 1);
        assert_eq!(log.count(LifecycleEvent::Process), 1);

        log.clear();
        assert!(log.entries().is_empty());
        assert_eq!(log.overflowed(), 0);
    }
}
