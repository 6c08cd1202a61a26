//! Progress events from the orchestrator to an external observer.
//!
//! Delivery is fire-and-forget over a bounded channel: a slow or absent
//! observer loses events, it never blocks phase progress.

use std::fmt;

use tokio::sync::mpsc;
use tracing::debug;

/// The pipeline phase an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Reference extraction from the rendered page.
    Extracting,
    /// Identifier resolution.
    Resolving,
    /// Metadata enrichment.
    Enriching,
    /// Asset acquisition.
    Fetching,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extracting => "extracting",
            Self::Resolving => "resolving",
            Self::Enriching => "enriching",
            Self::Fetching => "fetching",
        };
        f.write_str(name)
    }
}

/// What an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// The phase started.
    Started,
    /// An item (or the phase) succeeded.
    Succeeded,
    /// An item (or the phase) failed.
    Failed,
    /// An item was skipped.
    Skipped,
}

/// One structured progress event.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Which phase emitted the event.
    pub phase: Phase,
    /// Item index when the event is item-scoped.
    pub index: Option<usize>,
    /// What happened.
    pub outcome: EventOutcome,
    /// Human-readable detail.
    pub message: String,
}

impl ProgressEvent {
    pub(crate) fn phase_started(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            index: None,
            outcome: EventOutcome::Started,
            message: message.into(),
        }
    }

    pub(crate) fn phase_failed(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            index: None,
            outcome: EventOutcome::Failed,
            message: message.into(),
        }
    }

    pub(crate) fn item(
        phase: Phase,
        index: usize,
        outcome: EventOutcome,
        message: impl Into<String>,
    ) -> Self {
        Self {
            phase,
            index: Some(index),
            outcome,
            message: message.into(),
        }
    }
}

/// Sending side of the progress channel.
///
/// `emit` never waits: when the observer's buffer is full the event is
/// dropped with a debug log.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    sender: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressSink {
    /// Creates a bounded channel and its sink.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// A sink that discards everything; for runs with no observer.
    #[must_use]
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Emits an event without waiting for the observer.
    pub(crate) fn emit(&self, event: ProgressEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(error) = sender.try_send(event) {
            debug!(error = %error, "progress event dropped");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_delivers_when_capacity_available() {
        let (sink, mut receiver) = ProgressSink::channel(4);
        sink.emit(ProgressEvent::phase_started(Phase::Extracting, "go"));
        let event = receiver.try_recv().unwrap();
        assert_eq!(event.phase, Phase::Extracting);
        assert_eq!(event.outcome, EventOutcome::Started);
        assert_eq!(event.index, None);
    }

    #[test]
    fn test_emit_drops_when_buffer_full_without_blocking() {
        let (sink, mut receiver) = ProgressSink::channel(1);
        sink.emit(ProgressEvent::phase_started(Phase::Resolving, "one"));
        // Buffer full; this must return immediately and drop the event.
        sink.emit(ProgressEvent::phase_started(Phase::Resolving, "two"));

        assert_eq!(receiver.try_recv().unwrap().message, "one");
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_disabled_sink_discards_silently() {
        let sink = ProgressSink::disabled();
        sink.emit(ProgressEvent::item(
            Phase::Fetching,
            3,
            EventOutcome::Succeeded,
            "ok",
        ));
    }

    #[test]
    fn test_phase_display_names() {
        assert_eq!(Phase::Extracting.to_string(), "extracting");
        assert_eq!(Phase::Fetching.to_string(), "fetching");
    }
}
