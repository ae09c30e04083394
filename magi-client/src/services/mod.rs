//! Workflow services
//!
//! - `upload_gate`: pure pre-upload validation
//! - `pipeline_api`: the server seam and its HTTP implementation
//! - `progress_poller`: recurring status task
//! - `workflow_controller`: the stage machine tying them together

pub mod pipeline_api;
pub mod progress_poller;
pub mod upload_gate;
pub mod workflow_controller;

pub use pipeline_api::{HttpPipelineApi, PipelineApi, UPLOAD_FIELD};
pub use progress_poller::{
    PollEvent, PollMessage, PollOutcome, PollSink, PollerSettings, ProgressPoller,
};
pub use upload_gate::{UploadGate, ALLOWED_EXTENSIONS, ALLOWED_MIME_TYPES};
pub use workflow_controller::{ControllerSettings, WorkflowController};
