//! Pipeline server API
//!
//! `PipelineApi` is the seam between the workflow logic and the network.
//! `HttpPipelineApi` talks to the real server; tests substitute scripted
//! implementations.
//!
//! Every endpoint follows the same transport contract: a network failure,
//! a non-2xx status, a non-JSON content type or an undecodable body is a
//! `TransportError`. Interpreting `error`/`success` fields is left to the
//! caller.

use async_trait::async_trait;
use futures::StreamExt;
use magi_common::config::TomlConfig;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::error::{TransportError, WorkflowResult};
use crate::models::{
    AnalyzeResponse, OutputFile, ProcessConfig, ProcessResponse, ProcessingStatus, UploadResponse,
    UploadSource, VideoUpload,
};

const USER_AGENT: &str = concat!("magi-client/", env!("CARGO_PKG_VERSION"));

/// Multipart field the server reads the video from
pub const UPLOAD_FIELD: &str = "video";

/// Longest slice of a non-JSON error body quoted in messages
const ERROR_SNIPPET_CHARS: usize = 200;

/// Operations the workflow needs from the pipeline server
#[async_trait]
pub trait PipelineApi: Send + Sync {
    /// `POST /upload_video`
    async fn upload_video(&self, upload: &VideoUpload) -> WorkflowResult<UploadResponse>;

    /// `POST /analyze`
    async fn analyze(&self, session_id: &str) -> WorkflowResult<AnalyzeResponse>;

    /// `POST /process`; `config` is already stamped with the session id
    async fn start_processing(&self, config: &ProcessConfig) -> WorkflowResult<ProcessResponse>;

    /// `GET /status/{session_id}`
    async fn fetch_status(&self, session_id: &str) -> WorkflowResult<ProcessingStatus>;
}

/// reqwest-backed pipeline client
#[derive(Debug, Clone)]
pub struct HttpPipelineApi {
    http_client: reqwest::Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpPipelineApi {
    /// Create a client for `base_url`.
    ///
    /// `request_timeout` bounds the JSON endpoints. Uploads and downloads
    /// are not bounded since they scale with file size.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, TransportError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| TransportError::Malformed(format!("invalid server URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::Malformed(format!(
                "server URL cannot be used as a base: {}",
                base_url
            )));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            request_timeout,
        })
    }

    pub fn from_config(config: &TomlConfig) -> Result<Self, TransportError> {
        Self::new(&config.server_url, config.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for a server-relative path such as `/download/f1`
    pub fn absolute_url(&self, path: &str) -> Result<Url, TransportError> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        base.join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::Malformed(format!("invalid path '{}': {}", path, e)))
    }

    /// Build `<base>/<segments...>` with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::Malformed(format!("bad base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Stream one output artifact into `dest_dir`, returning the written path
    pub async fn download_output(
        &self,
        file: &OutputFile,
        dest_dir: &Path,
    ) -> WorkflowResult<PathBuf> {
        let url = self.endpoint(&["download", &file.id])?;
        tracing::debug!(file_id = %file.id, url = %url, "Downloading output file");

        let response = self.http_client.get(url).send().await.map_err(network_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                message: error_message(&body, status),
            }
            .into());
        }

        // Never trust the server-provided name as a path
        let file_name = Path::new(&file.name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| file.id.clone().into());
        tokio::fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(file_name);

        let mut out = tokio::fs::File::create(&dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(network_error)?;
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;

        tracing::info!(
            file_id = %file.id,
            path = %dest.display(),
            bytes = written,
            "Output file downloaded"
        );
        Ok(dest)
    }
}

#[async_trait]
impl PipelineApi for HttpPipelineApi {
    async fn upload_video(&self, upload: &VideoUpload) -> WorkflowResult<UploadResponse> {
        let part = match &upload.source {
            UploadSource::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                let length = file.metadata().await?.len();
                Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), length)
            }
            UploadSource::Bytes(bytes) => Part::bytes(bytes.clone()),
        };
        let mut part = part.file_name(upload.candidate.name.clone());
        if !upload.candidate.mime_type.is_empty() {
            part = part
                .mime_str(&upload.candidate.mime_type)
                .map_err(|e| TransportError::Malformed(e.to_string()))?;
        }
        let form = Form::new().part(UPLOAD_FIELD, part);

        tracing::info!(
            file_name = %upload.candidate.name,
            size_bytes = upload.candidate.size_bytes,
            "Uploading video"
        );

        let response = self
            .http_client
            .post(self.endpoint(&["upload_video"])?)
            .multipart(form)
            .send()
            .await
            .map_err(network_error)?;

        tracing::debug!(status = %response.status(), "Upload response received");
        Ok(decode_json(response).await?)
    }

    async fn analyze(&self, session_id: &str) -> WorkflowResult<AnalyzeResponse> {
        let response = self
            .http_client
            .post(self.endpoint(&["analyze"])?)
            .timeout(self.request_timeout)
            .json(&json!({ "session_id": session_id }))
            .send()
            .await
            .map_err(network_error)?;

        Ok(decode_json(response).await?)
    }

    async fn start_processing(&self, config: &ProcessConfig) -> WorkflowResult<ProcessResponse> {
        let response = self
            .http_client
            .post(self.endpoint(&["process"])?)
            .timeout(self.request_timeout)
            .json(config)
            .send()
            .await
            .map_err(network_error)?;

        Ok(decode_json(response).await?)
    }

    async fn fetch_status(&self, session_id: &str) -> WorkflowResult<ProcessingStatus> {
        let response = self
            .http_client
            .get(self.endpoint(&["status", session_id])?)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(network_error)?;

        Ok(decode_json(response).await?)
    }
}

fn network_error(err: reqwest::Error) -> TransportError {
    TransportError::Network(err.to_string())
}

/// Decode a JSON body, classifying every failure as a transport error
async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = response.text().await.map_err(network_error)?;

    if !status.is_success() {
        return Err(TransportError::Status {
            status: status.as_u16(),
            message: error_message(&body, status),
        });
    }

    if !content_type.contains("application/json") {
        let snippet: String = body.chars().take(ERROR_SNIPPET_CHARS).collect();
        tracing::warn!(content_type = %content_type, body = %snippet, "Server returned non-JSON body");
        return Err(TransportError::NotJson {
            content_type: if content_type.is_empty() {
                "no content type".to_string()
            } else {
                content_type
            },
        });
    }

    serde_json::from_str(&body).map_err(|e| TransportError::Malformed(e.to_string()))
}

/// Best message for a failed response: the JSON `error` field when present,
/// otherwise the start of the body, otherwise the status reason
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(msg) = value.get("error").and_then(|e| e.as_str()) {
            return msg.to_string();
        }
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() && !trimmed.starts_with('<') {
        return trimmed.chars().take(ERROR_SNIPPET_CHARS).collect();
    }
    status.canonical_reason().unwrap_or("request failed").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_client_creation() {
        assert!(HttpPipelineApi::new("http://127.0.0.1:5000", Duration::from_secs(5)).is_ok());
        assert!(HttpPipelineApi::new("not a url", Duration::from_secs(5)).is_err());
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let api = HttpPipelineApi::new("http://host:1/app/", Duration::from_secs(5)).unwrap();
        let url = api.endpoint(&["status", "a b/c"]).unwrap();
        assert_eq!(url.as_str(), "http://host:1/app/status/a%20b%2Fc");

        let root = HttpPipelineApi::new("http://host:1", Duration::from_secs(5)).unwrap();
        assert_eq!(
            root.endpoint(&["upload_video"]).unwrap().as_str(),
            "http://host:1/upload_video"
        );
    }

    #[test]
    fn test_absolute_url_keeps_prefix_and_query() {
        let api = HttpPipelineApi::new("http://host:1/app", Duration::from_secs(5)).unwrap();
        let url = api
            .absolute_url("/editor?session=e1&return_to=main_pipeline")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://host:1/app/editor?session=e1&return_to=main_pipeline"
        );
    }

    #[test]
    fn test_error_message_prefers_json_error() {
        assert_eq!(
            error_message(r#"{"error": "File too large"}"#, StatusCode::BAD_REQUEST),
            "File too large"
        );
        assert_eq!(
            error_message("<html>oops</html>", StatusCode::BAD_GATEWAY),
            "Bad Gateway"
        );
        assert_eq!(
            error_message("plain failure", StatusCode::INTERNAL_SERVER_ERROR),
            "plain failure"
        );
        assert_eq!(error_message("", StatusCode::NOT_FOUND), "Not Found");
    }
}
