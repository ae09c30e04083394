//! Test helper utilities
//!
//! `ScriptedApi` is a `PipelineApi` whose responses are queued up front by
//! each test. Every call is recorded so tests can assert on what (and how
//! often) the workflow asked the server.

#![allow(dead_code)]

use async_trait::async_trait;
use magi_client::models::{
    AnalyzeResponse, OutputFile, ProcessConfig, ProcessResponse, ProcessingStatus, UploadResponse,
    VideoUpload,
};
use magi_client::{PipelineApi, TransportError, WorkflowError, WorkflowResult};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// A request the workflow made
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Upload(String),
    Analyze(String),
    Process(ProcessConfig),
    Status(String),
}

#[derive(Default)]
pub struct ScriptedApi {
    uploads: Mutex<VecDeque<WorkflowResult<UploadResponse>>>,
    analyses: Mutex<VecDeque<WorkflowResult<AnalyzeResponse>>>,
    starts: Mutex<VecDeque<WorkflowResult<ProcessResponse>>>,
    statuses: Mutex<VecDeque<WorkflowResult<ProcessingStatus>>>,
    calls: Mutex<Vec<ApiCall>>,
    stall_uploads: AtomicBool,
    stall_statuses: AtomicBool,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_upload(&self, response: WorkflowResult<UploadResponse>) -> &Self {
        self.uploads.lock().unwrap().push_back(response);
        self
    }

    pub fn push_analysis(&self, response: WorkflowResult<AnalyzeResponse>) -> &Self {
        self.analyses.lock().unwrap().push_back(response);
        self
    }

    pub fn push_start(&self, response: WorkflowResult<ProcessResponse>) -> &Self {
        self.starts.lock().unwrap().push_back(response);
        self
    }

    pub fn push_status(&self, response: WorkflowResult<ProcessingStatus>) -> &Self {
        self.statuses.lock().unwrap().push_back(response);
        self
    }

    /// Uploads never answer until the caller gives up
    pub fn stall_uploads(&self) {
        self.stall_uploads.store(true, Ordering::SeqCst);
    }

    /// Status requests never answer until the caller gives up
    pub fn stall_statuses(&self) {
        self.stall_statuses.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ApiCall::Status(_)))
            .count()
    }

    pub fn process_calls(&self) -> Vec<ProcessConfig> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::Process(config) => Some(config),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ApiCall) {
        self.calls.lock().unwrap().push(call);
    }
}

fn unscripted(endpoint: &str) -> WorkflowError {
    TransportError::Network(format!("no scripted response for {}", endpoint)).into()
}

#[async_trait]
impl PipelineApi for ScriptedApi {
    async fn upload_video(&self, upload: &VideoUpload) -> WorkflowResult<UploadResponse> {
        self.record(ApiCall::Upload(upload.candidate.name.clone()));
        if self.stall_uploads.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let next = self.uploads.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(unscripted("upload_video")))
    }

    async fn analyze(&self, session_id: &str) -> WorkflowResult<AnalyzeResponse> {
        self.record(ApiCall::Analyze(session_id.to_string()));
        let next = self.analyses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(unscripted("analyze")))
    }

    async fn start_processing(&self, config: &ProcessConfig) -> WorkflowResult<ProcessResponse> {
        self.record(ApiCall::Process(config.clone()));
        let next = self.starts.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err(unscripted("process")))
    }

    /// Unscripted status requests report a job that is still running
    async fn fetch_status(&self, session_id: &str) -> WorkflowResult<ProcessingStatus> {
        self.record(ApiCall::Status(session_id.to_string()));
        if self.stall_statuses.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let next = self.statuses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(ProcessingStatus::running(0.0, "Waiting")))
    }
}

// ----------------------------------------------------------------------
// Canned payloads
// ----------------------------------------------------------------------

pub fn sample_analysis() -> Value {
    json!({
        "audio_streams": [{"index": 1, "codec": "aac", "language": "jpn"}],
        "subtitle_streams": [{"index": 2, "codec": "ass", "language": "eng", "title": "Full"}],
        "video_info": {"duration": "00:24:00", "width": 1920, "height": 1080}
    })
}

/// Upload acknowledgement without inline analysis
pub fn upload_ok(session_id: &str) -> WorkflowResult<UploadResponse> {
    Ok(UploadResponse {
        session_id: Some(session_id.to_string()),
        ..UploadResponse::default()
    })
}

/// Upload acknowledgement carrying the analysis
pub fn upload_with_analysis(session_id: &str) -> WorkflowResult<UploadResponse> {
    Ok(UploadResponse {
        session_id: Some(session_id.to_string()),
        success: Some(true),
        analysis: Some(sample_analysis()),
        ..UploadResponse::default()
    })
}

pub fn analysis_ok() -> WorkflowResult<AnalyzeResponse> {
    Ok(AnalyzeResponse {
        success: true,
        analysis: Some(sample_analysis()),
        error: None,
    })
}

pub fn analysis_failed(message: &str) -> WorkflowResult<AnalyzeResponse> {
    Ok(AnalyzeResponse {
        success: false,
        analysis: None,
        error: Some(message.to_string()),
    })
}

pub fn start_ok() -> WorkflowResult<ProcessResponse> {
    Ok(ProcessResponse {
        success: true,
        error: None,
    })
}

pub fn start_failed(message: &str) -> WorkflowResult<ProcessResponse> {
    Ok(ProcessResponse {
        success: false,
        error: Some(message.to_string()),
    })
}

pub fn running(progress: f32, stage: &str) -> WorkflowResult<ProcessingStatus> {
    Ok(ProcessingStatus::running(progress, stage))
}

pub fn completed(files: &[(&str, &str)], edit_session_id: Option<&str>) -> WorkflowResult<ProcessingStatus> {
    let mut status = ProcessingStatus::running(100.0, "Done");
    status.status = magi_client::models::JobStatus::Completed;
    status.output_files = files
        .iter()
        .map(|(id, name)| OutputFile {
            id: id.to_string(),
            name: name.to_string(),
        })
        .collect();
    status.edit_session_id = edit_session_id.map(str::to_string);
    Ok(status)
}

pub fn job_error(message: Option<&str>) -> WorkflowResult<ProcessingStatus> {
    let mut status = ProcessingStatus::running(35.0, "Translating");
    status.status = magi_client::models::JobStatus::Error;
    status.error = message.map(str::to_string);
    Ok(status)
}

pub fn network_down() -> WorkflowResult<ProcessingStatus> {
    Err(TransportError::Network("connection refused".to_string()).into())
}
