//! Upload candidate and payload source

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File proposed for upload, described by its metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCandidate {
    /// File name as presented to the server
    pub name: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// MIME type; empty when unknown
    pub mime_type: String,
}

impl UploadCandidate {
    pub fn new(name: impl Into<String>, size_bytes: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Describe a file on disk.
    ///
    /// The MIME type is sniffed from the file's leading bytes; it is left
    /// empty when the content is not recognised, so the extension check can
    /// still accept the file.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let sniff_path = path.to_path_buf();
        let mime_type = tokio::task::spawn_blocking(move || infer::get_from_path(&sniff_path))
            .await
            .map_err(std::io::Error::other)??
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_default();

        Ok(Self {
            name,
            size_bytes: metadata.len(),
            mime_type,
        })
    }
}

/// Where the upload body comes from
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// Streamed from a file on disk
    File(PathBuf),
    /// Held in memory
    Bytes(Vec<u8>),
}

/// Everything needed to issue the upload request
#[derive(Debug, Clone)]
pub struct VideoUpload {
    pub candidate: UploadCandidate,
    pub source: UploadSource,
}

impl VideoUpload {
    pub fn new(candidate: UploadCandidate, source: UploadSource) -> Self {
        Self { candidate, source }
    }
}
