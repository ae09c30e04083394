//! Data models for magi-client
//!
//! - Session state machine
//! - Upload candidates
//! - Server payloads (analysis, status, endpoint responses)
//! - User configuration

pub mod analysis;
pub mod process_config;
pub mod responses;
pub mod session;
pub mod status;
pub mod upload;

pub use analysis::{
    AnalysisResult, ExternalSubtitle, StreamInfo, SubtitleStyle, UploadExtras, VideoInfo,
    VideoSummary, WhisperModel, WhisperModels,
};
pub use process_config::ProcessConfig;
pub use responses::{AnalyzeResponse, ProcessResponse, UploadAccepted, UploadResponse};
pub use session::{SessionState, StageTransition};
pub use status::{JobStatus, LogEntry, OutputFile, ProcessingStatus};
pub use upload::{UploadCandidate, UploadSource, VideoUpload};
