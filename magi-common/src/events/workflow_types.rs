//! Workflow type definitions
//!
//! Supporting types shared between the workflow controller and anything
//! that renders its state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a session within the five-step workflow.
///
/// `Failed` is terminal and can be entered from any other stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Waiting for a video to be chosen and uploaded
    Upload,
    /// Session exists, analysis not yet available
    Analysis,
    /// Analysis available, waiting for the user's configuration
    Config,
    /// Configuration submitted, server-side processing running
    Process,
    /// Processing finished, outputs available
    Complete,
    /// Unrecoverable failure for this session
    Failed,
}

impl Stage {
    /// One-based step number shown to the user (`Failed` has none)
    pub fn step_number(self) -> Option<u8> {
        match self {
            Stage::Upload => Some(1),
            Stage::Analysis => Some(2),
            Stage::Config => Some(3),
            Stage::Process => Some(4),
            Stage::Complete => Some(5),
            Stage::Failed => None,
        }
    }

    /// The stage that normally follows this one
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Upload => Some(Stage::Analysis),
            Stage::Analysis => Some(Stage::Config),
            Stage::Config => Some(Stage::Process),
            Stage::Process => Some(Stage::Complete),
            Stage::Complete | Stage::Failed => None,
        }
    }

    /// True for stages no operation can leave
    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Complete | Stage::Failed)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Upload => "upload",
            Stage::Analysis => "analysis",
            Stage::Config => "config",
            Stage::Process => "process",
            Stage::Complete => "complete",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Output artifact reference carried by completion events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFileInfo {
    pub id: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_sequence() {
        let mut stage = Stage::Upload;
        let mut steps = vec![stage.step_number().unwrap()];
        while let Some(next) = stage.next() {
            stage = next;
            steps.push(stage.step_number().unwrap());
        }
        assert_eq!(steps, vec![1, 2, 3, 4, 5]);
        assert_eq!(stage, Stage::Complete);
    }

    #[test]
    fn test_failed_is_terminal_without_step() {
        assert!(Stage::Failed.is_terminal());
        assert!(Stage::Complete.is_terminal());
        assert!(!Stage::Process.is_terminal());
        assert_eq!(Stage::Failed.step_number(), None);
        assert_eq!(Stage::Failed.next(), None);
    }

    #[test]
    fn test_stage_serializes_snake_case() {
        let json = serde_json::to_string(&Stage::Analysis).unwrap();
        assert_eq!(json, "\"analysis\"");
    }
}
