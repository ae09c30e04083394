//! Event types and event bus
//!
//! Provides the workflow event definitions and the EventBus that carries
//! them from the workflow controller to whatever renders the view.

mod workflow_types;

pub use workflow_types::{OutputFileInfo, Stage};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Workflow event types
///
/// Emitted by the workflow controller after it has applied a change to its
/// own state, so a subscriber that reacts to an event and then asks the
/// controller for a snapshot always sees the change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkflowEvent {
    /// Stage changed
    StageChanged {
        /// Session the change belongs to (None before upload)
        session_id: Option<String>,
        /// Stage before change
        old_stage: Stage,
        /// Stage after change
        new_stage: Stage,
        /// When the stage changed
        timestamp: DateTime<Utc>,
    },

    /// Server accepted the upload and issued a session identifier
    SessionStarted {
        session_id: String,
        /// Uploaded file name
        file_name: String,
        timestamp: DateTime<Utc>,
    },

    /// Analysis payload is available for display
    AnalysisReady {
        session_id: String,
        /// Opaque analysis description as returned by the server
        analysis: serde_json::Value,
        timestamp: DateTime<Utc>,
    },

    /// Configuration accepted, status polling has begun
    ProcessingStarted {
        session_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A status poll result was applied
    ///
    /// Sent for every applied poll result, terminal ones included.
    ProgressUpdated {
        session_id: String,
        /// Percent complete (0.0 - 100.0)
        progress: f32,
        /// Server-side stage label
        stage_label: String,
        /// Number of log entries in this status
        log_entries: usize,
        timestamp: DateTime<Utc>,
    },

    /// A user-visible failure occurred
    ErrorRaised {
        session_id: Option<String>,
        /// Single human-readable message
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Workflow finished successfully
    WorkflowCompleted {
        session_id: String,
        output_files: Vec<OutputFileInfo>,
        /// Handle for the downstream translation editor, if offered
        edit_session_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Controller discarded its session and returned to the upload step
    SessionReset {
        /// Session that was discarded, if any
        previous_session_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    /// Short event name used in log lines
    pub fn event_type(&self) -> &'static str {
        match self {
            WorkflowEvent::StageChanged { .. } => "StageChanged",
            WorkflowEvent::SessionStarted { .. } => "SessionStarted",
            WorkflowEvent::AnalysisReady { .. } => "AnalysisReady",
            WorkflowEvent::ProcessingStarted { .. } => "ProcessingStarted",
            WorkflowEvent::ProgressUpdated { .. } => "ProgressUpdated",
            WorkflowEvent::ErrorRaised { .. } => "ErrorRaised",
            WorkflowEvent::WorkflowCompleted { .. } => "WorkflowCompleted",
            WorkflowEvent::SessionReset { .. } => "SessionReset",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for workflow events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the controller)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use magi_common::events::{EventBus, Stage, WorkflowEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit(WorkflowEvent::StageChanged {
///     session_id: None,
///     old_stage: Stage::Upload,
///     new_stage: Stage::Analysis,
///     timestamp: chrono::Utc::now(),
/// }).ok();
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WorkflowEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: WorkflowEvent,
    ) -> Result<usize, broadcast::error::SendError<WorkflowEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// A headless controller (no view attached) is a normal configuration.
    pub fn emit_lossy(&self, event: WorkflowEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(10);
        let result = bus.emit(WorkflowEvent::SessionReset {
            previous_session_id: None,
            timestamp: Utc::now(),
        });
        assert!(result.is_err());
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_in_order() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit_lossy(WorkflowEvent::ProcessingStarted {
            session_id: "s1".to_string(),
            timestamp: Utc::now(),
        });
        bus.emit_lossy(WorkflowEvent::ProgressUpdated {
            session_id: "s1".to_string(),
            progress: 10.0,
            stage_label: "transcription".to_string(),
            log_entries: 2,
            timestamp: Utc::now(),
        });

        assert_eq!(rx.recv().await.unwrap().event_type(), "ProcessingStarted");
        assert_eq!(rx.recv().await.unwrap().event_type(), "ProgressUpdated");
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = WorkflowEvent::ErrorRaised {
            session_id: Some("s1".to_string()),
            message: "boom".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ErrorRaised");
        assert_eq!(json["message"], "boom");
    }
}
