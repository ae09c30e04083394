//! Error types for magi-client
//!
//! Four failure families reach the user:
//! - `Validation`: bad file type/size, never reaches the network
//! - `Transport`: network failure, non-2xx status, non-JSON body
//! - `Application`: well-formed response carrying `error` or `success: false`
//! - `SessionLost`: operation attempted with no active session

use magi_common::events::Stage;
use thiserror::Error;

/// Upload candidate rejected before submission
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Neither MIME type nor extension is an accepted video container
    #[error("Unsupported file type '{file_name}': only MP4, AVI, MOV and MKV videos are accepted")]
    UnsupportedFormat { file_name: String },

    /// File exceeds the upload ceiling
    #[error("File is too large ({size_bytes} bytes): the maximum upload size is {limit_bytes} bytes")]
    TooLarge { size_bytes: u64, limit_bytes: u64 },
}

/// Request could not produce a usable JSON body
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Connection, DNS, timeout or body streaming failure
    #[error("Network error: {0}")]
    Network(String),

    /// Server answered with a non-2xx status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Server answered 2xx but not with JSON
    #[error("Server returned a non-JSON response ({content_type})")]
    NotJson { content_type: String },

    /// JSON body did not match the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Workflow controller error
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Server understood the request and refused it
    #[error("{0}")]
    Application(String),

    /// No session identifier is held
    #[error("Session lost: upload the file again")]
    SessionLost,

    /// Operation is not valid in the current stage
    #[error("Cannot move from {from} to {to}")]
    InvalidTransition { from: Stage, to: Stage },

    /// Configuration submitted while a job is already being followed
    #[error("Processing is already running for this session")]
    AlreadyProcessing,

    /// Status polling hit its consecutive failure limit
    #[error("Server unreachable: {attempts} status checks failed in a row ({last_error})")]
    Unreachable { attempts: u32, last_error: String },

    /// Controller token fired while the request was in flight
    #[error("Operation cancelled")]
    Cancelled,

    /// Local file access while preparing an upload or saving a download
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkflowError {
    /// True when the failure was decided locally without any request
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            WorkflowError::Validation(_)
                | WorkflowError::SessionLost
                | WorkflowError::InvalidTransition { .. }
                | WorkflowError::AlreadyProcessing
        )
    }
}

/// Result type for workflow operations
pub type WorkflowResult<T> = Result<T, WorkflowError>;
