//! Processing status reported by `GET /status/{session_id}`
//!
//! Each poll result replaces the previous one wholesale.

use magi_common::events::OutputFileInfo;
use serde::{Deserialize, Serialize};

/// Server-side job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Error,
    /// Any status string this client does not know; treated as non-terminal
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

/// One line of the server's processing log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
}

/// Downloadable artifact produced by processing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub id: String,
    pub name: String,
}

impl OutputFile {
    /// Server path the artifact is served from
    pub fn download_path(&self) -> String {
        format!("/download/{}", self.id)
    }
}

impl From<&OutputFile> for OutputFileInfo {
    fn from(file: &OutputFile) -> Self {
        OutputFileInfo {
            id: file.id.clone(),
            name: file.name.clone(),
        }
    }
}

/// Snapshot of a processing job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub status: JobStatus,
    /// Percent complete, 0 - 100
    #[serde(default)]
    pub progress: f32,
    /// Human-readable label of the current server step
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub log: Vec<LogEntry>,
    #[serde(default)]
    pub output_files: Vec<OutputFile>,
    #[serde(default)]
    pub edit_session_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ProcessingStatus {
    /// A non-terminal status with the given progress
    pub fn running(progress: f32, stage: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Running,
            progress,
            stage: stage.into(),
            log: Vec::new(),
            output_files: Vec::new(),
            edit_session_id: None,
            error: None,
        }
    }

    /// Progress clamped to 0 - 100
    pub fn progress_percent(&self) -> f32 {
        if self.progress.is_nan() {
            0.0
        } else {
            self.progress.clamp(0.0, 100.0)
        }
    }

    /// Message for an `error` status
    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .filter(|msg| !msg.trim().is_empty())
            .unwrap_or_else(|| "Processing failed".to_string())
    }
}
