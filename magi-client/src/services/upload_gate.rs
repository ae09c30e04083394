//! Upload candidate validation
//!
//! Runs before any request is made. A candidate passes the format check if
//! either its MIME type or its file extension names an accepted container,
//! since browsers and file systems often report a missing or generic MIME
//! type for perfectly good videos.

use magi_common::config::DEFAULT_MAX_UPLOAD_BYTES;

use crate::error::ValidationError;
use crate::models::UploadCandidate;

/// MIME types accepted without looking at the name
pub const ALLOWED_MIME_TYPES: [&str; 4] = [
    "video/mp4",
    "video/x-msvideo",
    "video/quicktime",
    "video/x-matroska",
];

/// Extensions accepted regardless of MIME type (compared case-insensitively)
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

/// Pure upload predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadGate {
    max_bytes: u64,
}

impl Default for UploadGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_UPLOAD_BYTES)
    }
}

impl UploadGate {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Check format first, then size
    pub fn validate(&self, candidate: &UploadCandidate) -> Result<(), ValidationError> {
        if !(mime_allowed(&candidate.mime_type) || extension_allowed(&candidate.name)) {
            return Err(ValidationError::UnsupportedFormat {
                file_name: candidate.name.clone(),
            });
        }

        if candidate.size_bytes > self.max_bytes {
            return Err(ValidationError::TooLarge {
                size_bytes: candidate.size_bytes,
                limit_bytes: self.max_bytes,
            });
        }

        Ok(())
    }
}

fn mime_allowed(mime_type: &str) -> bool {
    ALLOWED_MIME_TYPES.contains(&mime_type.trim())
}

fn extension_allowed(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}
