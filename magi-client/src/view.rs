//! Data handed to whatever renders the workflow
//!
//! The controller does not draw anything. It exposes a `ViewSnapshot` on
//! request and `WorkflowEvent`s on the bus; a renderer (the CLI in this
//! crate, a UI elsewhere) decides which step panel to show from `stage`.

use magi_common::events::Stage;
use serde::Serialize;

use crate::models::{AnalysisResult, OutputFile, ProcessingStatus, UploadExtras};

/// Editor hand-off path for an edit session
pub fn editor_url(edit_session_id: &str) -> String {
    format!("/editor?session={}&return_to=main_pipeline", edit_session_id)
}

/// Point-in-time copy of the controller's visible state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSnapshot {
    pub stage: Stage,
    pub processing: bool,
    pub session_id: Option<String>,
    pub file_name: Option<String>,
    pub analysis: Option<AnalysisResult>,
    pub extras: UploadExtras,
    pub status: Option<ProcessingStatus>,
    pub output_files: Vec<OutputFile>,
    pub editor_url: Option<String>,
    pub error: Option<String>,
}

impl ViewSnapshot {
    /// 1-based step indicator position (None when failed)
    pub fn step_number(&self) -> Option<u8> {
        self.stage.step_number()
    }

    /// Progress bar value in percent, 0 before the first status arrives
    pub fn progress_percent(&self) -> f32 {
        self.status
            .as_ref()
            .map(ProcessingStatus::progress_percent)
            .unwrap_or(0.0)
    }

    /// Label shown under the progress bar
    pub fn progress_label(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.stage.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("Waiting for status")
    }
}
