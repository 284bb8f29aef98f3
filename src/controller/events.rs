//! Event surface between the controller and the presentation layer.
//!
//! The controller emits [`SessionEvent`]s into an [`EventSink`] and has no
//! scheduling responsibility; the presentation layer owns the queue and
//! drains it on its own cadence.

use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::rc::Rc;

use crate::error::ErrorKind;
use crate::models::{CodePair, DiffArtifacts, ProgressInfo};

/// Events emitted to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A pair and its diff artifacts are ready to display.
    PairLoaded {
        pair: CodePair,
        diff: DiffArtifacts,
    },
    /// A verdict row was persisted.
    VerdictAccepted { review_id: u32 },
    /// The tail row was retracted.
    UndoAccepted { review_id: u32 },
    /// Progress counters changed.
    ProgressChanged(ProgressInfo),
    /// The session finished; the report lives at this path.
    SessionCompleted { final_report_path: PathBuf },
    /// The report writer switched to CSV.
    ReportFailover { new_path: PathBuf },
    /// An error reached the UI boundary.
    Error {
        kind: ErrorKind,
        message: String,
        details: Option<String>,
    },
}

impl SessionEvent {
    /// Create an error event.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Get the event type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::PairLoaded { .. } => "pair_loaded",
            Self::VerdictAccepted { .. } => "verdict_accepted",
            Self::UndoAccepted { .. } => "undo_accepted",
            Self::ProgressChanged(_) => "progress_changed",
            Self::SessionCompleted { .. } => "session_completed",
            Self::ReportFailover { .. } => "report_failover",
            Self::Error { .. } => "error",
        }
    }
}

/// Receives controller events.
pub trait EventSink {
    fn emit(&mut self, event: SessionEvent);
}

/// Shared FIFO the presentation layer owns and drains.
///
/// Clones share the same queue, so the presentation keeps one handle and
/// gives the controller the other.
#[derive(Clone, Default)]
pub struct EventQueue {
    inner: Rc<RefCell<VecDeque<SessionEvent>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every queued event, oldest first.
    pub fn drain(&self) -> Vec<SessionEvent> {
        self.inner.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }
}

impl EventSink for EventQueue {
    fn emit(&mut self, event: SessionEvent) {
        self.inner.borrow_mut().push_back(event);
    }
}

/// Sink that drops everything; for headless use and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: SessionEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_is_fifo_and_shared() {
        let queue = EventQueue::new();
        let mut sender = queue.clone();

        sender.emit(SessionEvent::VerdictAccepted { review_id: 1 });
        sender.emit(SessionEvent::UndoAccepted { review_id: 1 });
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(drained[0].type_name(), "verdict_accepted");
        assert_eq!(drained[1].type_name(), "undo_accepted");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = SessionEvent::error(ErrorKind::UserInput, "comment too long");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("user_input"));
    }
}
