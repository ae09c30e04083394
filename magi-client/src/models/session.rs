//! Workflow session state machine
//!
//! A session progresses through five stages:
//! UPLOAD → ANALYSIS → CONFIG → PROCESS → COMPLETE
//!
//! `Failed` can be entered from any stage and is never left. `Process` may be
//! re-entered from itself when the user resubmits a configuration after a
//! failed start.

use chrono::{DateTime, Utc};
use magi_common::events::Stage;
use serde::{Deserialize, Serialize};

use crate::error::{WorkflowError, WorkflowResult};

/// Stage transition record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub session_id: Option<String>,
    pub old_stage: Stage,
    pub new_stage: Stage,
    pub transitioned_at: DateTime<Utc>,
}

/// Identity and lifecycle status of one workflow run
///
/// Invariant: `processing` implies `stage == Process` and a session id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    session_id: Option<String>,
    stage: Stage,
    processing: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Fresh session waiting for an upload
    pub fn new() -> Self {
        Self {
            session_id: None,
            stage: Stage::Upload,
            processing: false,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    /// Whether `from → to` is a legal stage change
    pub fn can_transition(from: Stage, to: Stage) -> bool {
        if from == Stage::Failed {
            return false;
        }
        to == Stage::Failed
            || from.next() == Some(to)
            || (from == Stage::Process && to == Stage::Process)
    }

    /// Move to a new stage
    ///
    /// The single place stages change. Leaving `Process` clears `processing`.
    pub fn transition_to(&mut self, new_stage: Stage) -> WorkflowResult<StageTransition> {
        if !Self::can_transition(self.stage, new_stage) {
            return Err(WorkflowError::InvalidTransition {
                from: self.stage,
                to: new_stage,
            });
        }

        let transition = StageTransition {
            session_id: self.session_id.clone(),
            old_stage: self.stage,
            new_stage,
            transitioned_at: Utc::now(),
        };
        self.stage = new_stage;
        if new_stage != Stage::Process {
            self.processing = false;
        }

        Ok(transition)
    }

    /// Record the server-issued session identifier
    ///
    /// Only valid before any session exists.
    pub fn assign_session(&mut self, session_id: String) -> WorkflowResult<()> {
        if self.stage != Stage::Upload || self.session_id.is_some() {
            return Err(WorkflowError::InvalidTransition {
                from: self.stage,
                to: Stage::Analysis,
            });
        }
        self.session_id = Some(session_id);
        Ok(())
    }

    /// Set or clear the processing flag
    ///
    /// Setting requires `stage == Process` and a session id.
    pub fn set_processing(&mut self, processing: bool) -> WorkflowResult<()> {
        if processing {
            if self.session_id.is_none() {
                return Err(WorkflowError::SessionLost);
            }
            if self.stage != Stage::Process {
                return Err(WorkflowError::InvalidTransition {
                    from: self.stage,
                    to: Stage::Process,
                });
            }
        }
        self.processing = processing;
        Ok(())
    }

    /// Stop following the job; always allowed
    pub fn clear_processing(&mut self) {
        self.processing = false;
    }

    /// Session id or `SessionLost`
    pub fn require_session(&self) -> WorkflowResult<&str> {
        self.session_id.as_deref().ok_or(WorkflowError::SessionLost)
    }

    /// Check the invariant (used by tests and debug assertions)
    pub fn invariant_holds(&self) -> bool {
        !self.processing || (self.stage == Stage::Process && self.session_id.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_at(stage: Stage) -> SessionState {
        let mut session = SessionState::new();
        session.assign_session("s1".to_string()).unwrap();
        let mut current = Stage::Upload;
        while current != stage {
            current = current.next().unwrap();
            session.transition_to(current).unwrap();
        }
        session
    }

    #[test]
    fn test_forward_edges_only() {
        let mut session = SessionState::new();
        assert!(matches!(
            session.transition_to(Stage::Config),
            Err(WorkflowError::InvalidTransition { .. })
        ));

        let transition = session.transition_to(Stage::Analysis).unwrap();
        assert_eq!(transition.old_stage, Stage::Upload);
        assert_eq!(transition.new_stage, Stage::Analysis);
        assert!(session.transition_to(Stage::Upload).is_err());
    }

    #[test]
    fn test_failed_from_anywhere_and_sticky() {
        for stage in [
            Stage::Upload,
            Stage::Analysis,
            Stage::Config,
            Stage::Process,
            Stage::Complete,
        ] {
            let mut session = session_at(stage);
            assert!(session.transition_to(Stage::Failed).is_ok());
            assert!(session.transition_to(Stage::Upload).is_err());
            assert!(session.transition_to(Stage::Failed).is_err());
        }
    }

    #[test]
    fn test_process_reentry() {
        let mut session = session_at(Stage::Process);
        assert!(session.transition_to(Stage::Process).is_ok());
    }

    #[test]
    fn test_processing_requires_process_stage() {
        let mut session = session_at(Stage::Config);
        assert!(session.set_processing(true).is_err());

        session.transition_to(Stage::Process).unwrap();
        session.set_processing(true).unwrap();
        assert!(session.invariant_holds());

        session.transition_to(Stage::Complete).unwrap();
        assert!(!session.is_processing());
        assert!(session.invariant_holds());
    }

    #[test]
    fn test_clear_processing_keeps_stage() {
        let mut session = session_at(Stage::Process);
        session.set_processing(true).unwrap();

        session.clear_processing();
        assert!(!session.is_processing());
        assert_eq!(session.stage(), Stage::Process);
        assert!(session.invariant_holds());

        // Clearing an idle session is a no-op
        let mut fresh = SessionState::new();
        fresh.clear_processing();
        assert_eq!(fresh, SessionState::new());
    }

    #[test]
    fn test_processing_without_session_is_session_lost() {
        let mut session = SessionState::new();
        assert!(matches!(
            session.set_processing(true),
            Err(WorkflowError::SessionLost)
        ));
        assert!(matches!(
            session.require_session(),
            Err(WorkflowError::SessionLost)
        ));
    }

    #[test]
    fn test_session_assigned_once() {
        let mut session = SessionState::new();
        session.assign_session("a".to_string()).unwrap();
        assert!(session.assign_session("b".to_string()).is_err());
        assert_eq!(session.session_id(), Some("a"));
    }
}
