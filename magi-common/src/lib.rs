//! # Magi Common Library
//!
//! Shared code for the Magi pipeline client including:
//! - Bootstrap configuration (TOML) and its resolution order
//! - Workflow event types and the broadcast `EventBus`
//! - The common error type

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EventBus, WorkflowEvent};
