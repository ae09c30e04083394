//! magi-client library interface
//!
//! Client-side orchestration of the video pipeline workflow:
//! upload → analysis → configuration → processing → complete.
//!
//! `WorkflowController` is the entry point. It talks to the server through
//! the `PipelineApi` trait and reports state through `ViewSnapshot` and the
//! `WorkflowEvent` bus.

pub mod error;
pub mod models;
pub mod services;
pub mod view;

pub use crate::error::{TransportError, ValidationError, WorkflowError, WorkflowResult};
pub use crate::services::{
    ControllerSettings, HttpPipelineApi, PipelineApi, UploadGate, WorkflowController,
};
pub use crate::view::ViewSnapshot;
