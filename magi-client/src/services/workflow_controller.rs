//! Workflow controller
//!
//! Owns the `SessionState` of one workflow run and is the only code that
//! changes it. Drives the five steps:
//!
//! 1. `submit_upload`    UPLOAD → ANALYSIS (→ CONFIG when analysis is inline)
//! 2. `request_analysis` ANALYSIS → CONFIG
//! 3. `submit_config`    CONFIG → PROCESS, starts status polling
//! 4. poll messages      PROCESS → COMPLETE (or FAILED)
//!
//! Failure handling per step:
//! - upload failures move the session to FAILED
//! - analysis failures keep the session in ANALYSIS for a manual retry
//! - config submission failures keep the session in PROCESS with
//!   `processing = false` so the user can resubmit
//! - polling transport failures are absorbed by the poller
//!
//! The poller never touches the session: its results arrive as messages on
//! a channel and are applied by `apply_poll_message`, which discards
//! anything from a replaced poller or arriving after `processing` ended.

use chrono::Utc;
use magi_common::config::TomlConfig;
use magi_common::events::{EventBus, OutputFileInfo, Stage, WorkflowEvent};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::{WorkflowError, WorkflowResult};
use crate::models::{
    AnalysisResult, AnalyzeResponse, OutputFile, ProcessConfig, ProcessResponse,
    ProcessingStatus, SessionState, StageTransition, UploadExtras, UploadResponse, VideoUpload,
};
use crate::services::pipeline_api::PipelineApi;
use crate::services::progress_poller::{
    PollEvent, PollMessage, PollOutcome, PollerSettings, ProgressPoller,
};
use crate::services::upload_gate::UploadGate;
use crate::view::{editor_url, ViewSnapshot};

/// Controller tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub max_upload_bytes: u64,
    pub poller: PollerSettings,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: UploadGate::default().max_bytes(),
            poller: PollerSettings::default(),
        }
    }
}

impl From<&TomlConfig> for ControllerSettings {
    fn from(config: &TomlConfig) -> Self {
        Self {
            max_upload_bytes: config.max_upload_bytes,
            poller: PollerSettings::from(config),
        }
    }
}

/// State machine for one workflow run
pub struct WorkflowController {
    api: Arc<dyn PipelineApi>,
    gate: UploadGate,
    session: SessionState,
    poller: ProgressPoller,
    poll_tx: mpsc::UnboundedSender<PollMessage>,
    poll_rx: mpsc::UnboundedReceiver<PollMessage>,
    event_bus: EventBus,
    cancel_token: CancellationToken,

    file_name: Option<String>,
    analysis: Option<AnalysisResult>,
    extras: UploadExtras,
    last_status: Option<ProcessingStatus>,
    output_files: Vec<OutputFile>,
    edit_session_id: Option<String>,
    pending_error: Option<String>,
    last_transition: Option<StageTransition>,
}

impl WorkflowController {
    pub fn new(api: Arc<dyn PipelineApi>, settings: ControllerSettings, event_bus: EventBus) -> Self {
        let cancel_token = CancellationToken::new();
        let poller = ProgressPoller::new(Arc::clone(&api), settings.poller, cancel_token.clone());
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();

        Self {
            api,
            gate: UploadGate::new(settings.max_upload_bytes),
            session: SessionState::new(),
            poller,
            poll_tx,
            poll_rx,
            event_bus,
            cancel_token,
            file_name: None,
            analysis: None,
            extras: UploadExtras::default(),
            last_status: None,
            output_files: Vec::new(),
            edit_session_id: None,
            pending_error: None,
            last_transition: None,
        }
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn stage(&self) -> Stage {
        self.session.stage()
    }

    pub fn is_processing(&self) -> bool {
        self.session.is_processing()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.session_id()
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    pub fn extras(&self) -> &UploadExtras {
        &self.extras
    }

    /// Most recent applied poll result
    pub fn last_status(&self) -> Option<&ProcessingStatus> {
        self.last_status.as_ref()
    }

    pub fn output_files(&self) -> &[OutputFile] {
        &self.output_files
    }

    pub fn edit_session_id(&self) -> Option<&str> {
        self.edit_session_id.as_deref()
    }

    /// Editor hand-off path, once processing has offered an edit session
    pub fn editor_url(&self) -> Option<String> {
        self.edit_session_id.as_deref().map(editor_url)
    }

    /// Message of the last user-visible failure, until cleared
    pub fn pending_error(&self) -> Option<&str> {
        self.pending_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.pending_error = None;
    }

    pub fn last_transition(&self) -> Option<&StageTransition> {
        self.last_transition.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.event_bus.subscribe()
    }

    /// Token that aborts in-flight requests and polling when cancelled.
    ///
    /// `reset()` replaces the token, so fetch a fresh one afterwards.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Generation of the running poller, if any
    pub fn poll_generation(&self) -> Option<u64> {
        self.poller.active_generation()
    }

    /// Everything a view needs to render the current state
    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            stage: self.session.stage(),
            processing: self.session.is_processing(),
            session_id: self.session.session_id().map(str::to_string),
            file_name: self.file_name.clone(),
            analysis: self.analysis.clone(),
            extras: self.extras.clone(),
            status: self.last_status.clone(),
            output_files: self.output_files.clone(),
            editor_url: self.editor_url(),
            error: self.pending_error.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Step 1: upload
    // ------------------------------------------------------------------

    /// Validate and upload a video, returning the stage reached.
    ///
    /// On success the stage is ANALYSIS, or CONFIG when the analysis was
    /// obtained (inline or by the follow-up request). A failed follow-up
    /// analysis is surfaced but does not fail the upload.
    pub async fn submit_upload(&mut self, upload: VideoUpload) -> WorkflowResult<Stage> {
        if self.session.stage() != Stage::Upload {
            let err = WorkflowError::InvalidTransition {
                from: self.session.stage(),
                to: Stage::Analysis,
            };
            self.report(&err);
            return Err(err);
        }

        if let Err(rejection) = self.gate.validate(&upload.candidate) {
            tracing::info!(
                file_name = %upload.candidate.name,
                reason = %rejection,
                "Upload rejected before submission"
            );
            let err = WorkflowError::from(rejection);
            self.report(&err);
            return Err(err);
        }

        self.clear_error();
        let api = Arc::clone(&self.api);
        let result = with_cancel(&self.cancel_token, api.upload_video(&upload))
            .await
            .and_then(UploadResponse::into_accepted);

        let accepted = match result {
            Ok(accepted) => accepted,
            Err(WorkflowError::Cancelled) => return Err(WorkflowError::Cancelled),
            Err(err) => return Err(self.fail(err)),
        };

        self.session.assign_session(accepted.session_id.clone())?;
        self.file_name = Some(upload.candidate.name.clone());
        self.extras = accepted.extras;

        tracing::info!(
            session_id = %accepted.session_id,
            file_name = %upload.candidate.name,
            inline_analysis = accepted.analysis.is_some(),
            "Upload accepted"
        );
        self.emit(WorkflowEvent::SessionStarted {
            session_id: accepted.session_id.clone(),
            file_name: upload.candidate.name,
            timestamp: Utc::now(),
        });

        self.transition(Stage::Analysis)?;

        let follow_up = match accepted.analysis {
            Some(analysis) => self.apply_analysis(analysis),
            None => self.fetch_analysis(&accepted.session_id).await,
        };
        if let Err(err) = follow_up {
            tracing::warn!(
                session_id = %accepted.session_id,
                error = %err,
                "Analysis not available yet, staying in analysis step"
            );
            self.report(&err);
        }

        Ok(self.session.stage())
    }

    // ------------------------------------------------------------------
    // Step 2: analysis
    // ------------------------------------------------------------------

    /// Ask the server to analyze the uploaded video.
    ///
    /// Failures leave the session in ANALYSIS; calling again is the retry.
    pub async fn request_analysis(&mut self) -> WorkflowResult<()> {
        let session_id = match self.session.require_session() {
            Ok(id) => id.to_string(),
            Err(err) => {
                self.report(&err);
                return Err(err);
            }
        };

        if self.session.stage() != Stage::Analysis {
            let err = WorkflowError::InvalidTransition {
                from: self.session.stage(),
                to: Stage::Config,
            };
            self.report(&err);
            return Err(err);
        }

        self.clear_error();
        match self.fetch_analysis(&session_id).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.report(&err);
                Err(err)
            }
        }
    }

    async fn fetch_analysis(&mut self, session_id: &str) -> WorkflowResult<()> {
        tracing::debug!(session_id = %session_id, "Requesting analysis");
        let api = Arc::clone(&self.api);
        let analysis = with_cancel(&self.cancel_token, api.analyze(session_id))
            .await
            .and_then(AnalyzeResponse::into_analysis)?;
        self.apply_analysis(analysis)
    }

    fn apply_analysis(&mut self, analysis: AnalysisResult) -> WorkflowResult<()> {
        if let Some(message) = analysis.error() {
            return Err(WorkflowError::Application(message.to_string()));
        }

        let session_id = self.session.require_session()?.to_string();
        self.emit(WorkflowEvent::AnalysisReady {
            session_id,
            analysis: analysis.raw().clone(),
            timestamp: Utc::now(),
        });
        self.analysis = Some(analysis);
        self.transition(Stage::Config)
    }

    // ------------------------------------------------------------------
    // Step 3: configuration
    // ------------------------------------------------------------------

    /// Submit the user's configuration and start following the job.
    ///
    /// Fails with `SessionLost` before any I/O when no session exists.
    pub async fn submit_config(&mut self, form_values: ProcessConfig) -> WorkflowResult<()> {
        let session_id = match self.session.require_session() {
            Ok(id) => id.to_string(),
            Err(err) => {
                tracing::warn!("Configuration submitted without a session");
                self.report(&err);
                return Err(err);
            }
        };

        if self.session.is_processing() {
            let err = WorkflowError::AlreadyProcessing;
            self.report(&err);
            return Err(err);
        }
        if !SessionState::can_transition(self.session.stage(), Stage::Process) {
            let err = WorkflowError::InvalidTransition {
                from: self.session.stage(),
                to: Stage::Process,
            };
            self.report(&err);
            return Err(err);
        }

        let payload = form_values.stamped(&session_id);
        self.transition(Stage::Process)?;
        self.session.set_processing(true)?;
        self.clear_error();
        self.last_status = None;
        self.output_files.clear();
        self.edit_session_id = None;

        tracing::info!(
            session_id = %session_id,
            fields = payload.len(),
            translation_engine = payload.translation_engine().unwrap_or("default"),
            "Submitting processing configuration"
        );

        let api = Arc::clone(&self.api);
        let result = with_cancel(&self.cancel_token, api.start_processing(&payload))
            .await
            .and_then(ProcessResponse::into_started);

        match result {
            Ok(()) => {
                self.poller.start(session_id.clone(), self.poll_tx.clone());
                self.emit(WorkflowEvent::ProcessingStarted {
                    session_id,
                    timestamp: Utc::now(),
                });
                Ok(())
            }
            Err(err) => {
                self.session.clear_processing();
                tracing::warn!(
                    session_id = %session_id,
                    error = %err,
                    "Processing did not start, configuration can be resubmitted"
                );
                self.report(&err);
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------
    // Step 4: progress
    // ------------------------------------------------------------------

    /// Wait for and apply the next poll message.
    ///
    /// Returns the stage after applying it, or None when there is nothing
    /// to wait for (not processing, or the controller token was cancelled).
    pub async fn next_poll_event(&mut self) -> Option<Stage> {
        if !self.session.is_processing() {
            return None;
        }

        let message = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => None,
            message = self.poll_rx.recv() => message,
        };

        match message {
            Some(message) => {
                self.apply_poll_message(message);
                Some(self.session.stage())
            }
            None => {
                self.abandon_processing();
                None
            }
        }
    }

    /// Apply poll messages until processing ends, returning the final stage
    pub async fn wait_for_completion(&mut self) -> Stage {
        while self.next_poll_event().await.is_some() {}
        self.session.stage()
    }

    /// Apply one poller message.
    ///
    /// Returns false when the message was discarded as superseded.
    pub fn apply_poll_message(&mut self, message: PollMessage) -> bool {
        let current = self.poller.active_generation() == Some(message.generation)
            && self.session.is_processing()
            && self.session.session_id() == Some(message.session_id.as_str());
        if !current {
            tracing::debug!(
                session_id = %message.session_id,
                generation = message.generation,
                active_generation = ?self.poller.active_generation(),
                "Discarding superseded poll result"
            );
            return false;
        }

        match message.event {
            PollEvent::Update(status) => {
                self.emit(WorkflowEvent::ProgressUpdated {
                    session_id: message.session_id,
                    progress: status.progress_percent(),
                    stage_label: status.stage.clone(),
                    log_entries: status.log.len(),
                    timestamp: Utc::now(),
                });
                self.last_status = Some(status);
            }
            PollEvent::Terminal(PollOutcome::Completed(status)) => {
                self.finalize(status);
            }
            PollEvent::Terminal(PollOutcome::Failed(reason)) => {
                self.fail(WorkflowError::Application(reason));
            }
            PollEvent::Terminal(PollOutcome::Unreachable {
                attempts,
                last_error,
            }) => {
                self.fail(WorkflowError::Unreachable {
                    attempts,
                    last_error,
                });
            }
        }
        true
    }

    /// Terminal success: expose outputs and move to COMPLETE
    fn finalize(&mut self, result: ProcessingStatus) {
        let session_id = self.session.session_id().unwrap_or_default().to_string();
        self.output_files = result.output_files.clone();
        self.edit_session_id = result.edit_session_id.clone();
        self.last_status = Some(result);

        if let Err(err) = self.transition(Stage::Complete) {
            tracing::error!(session_id = %session_id, error = %err, "Could not complete workflow");
            return;
        }

        tracing::info!(
            session_id = %session_id,
            output_files = self.output_files.len(),
            editable = self.edit_session_id.is_some(),
            "Workflow completed"
        );
        self.emit(WorkflowEvent::WorkflowCompleted {
            session_id,
            output_files: self.output_files.iter().map(OutputFileInfo::from).collect(),
            edit_session_id: self.edit_session_id.clone(),
            timestamp: Utc::now(),
        });
    }

    // ------------------------------------------------------------------
    // Reset / teardown
    // ------------------------------------------------------------------

    /// Discard the session and start over at UPLOAD.
    ///
    /// Cancels polling and any request still in flight.
    pub fn reset(&mut self) {
        let previous_session_id = self.session.session_id().map(str::to_string);

        self.cancel_token.cancel();
        self.cancel_token = CancellationToken::new();
        self.poller.rebind(self.cancel_token.clone());
        while self.poll_rx.try_recv().is_ok() {}

        self.session = SessionState::new();
        self.file_name = None;
        self.analysis = None;
        self.extras = UploadExtras::default();
        self.last_status = None;
        self.output_files.clear();
        self.edit_session_id = None;
        self.pending_error = None;
        self.last_transition = None;

        tracing::info!(previous_session_id = ?previous_session_id, "Workflow reset");
        self.emit(WorkflowEvent::SessionReset {
            previous_session_id,
            timestamp: Utc::now(),
        });
    }

    /// Controller token fired while processing: stop following the job
    fn abandon_processing(&mut self) {
        self.poller.stop();
        if self.session.is_processing() {
            tracing::info!(
                session_id = ?self.session.session_id(),
                "Processing abandoned, no longer following server job"
            );
            self.session.clear_processing();
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// The single place stages change
    fn transition(&mut self, to: Stage) -> WorkflowResult<()> {
        let transition = self.session.transition_to(to)?;

        if to != Stage::Process {
            self.poller.stop();
        }

        if transition.old_stage != transition.new_stage {
            tracing::info!(
                session_id = ?transition.session_id,
                from = %transition.old_stage,
                to = %transition.new_stage,
                "Stage transition"
            );
            self.emit(WorkflowEvent::StageChanged {
                session_id: transition.session_id.clone(),
                old_stage: transition.old_stage,
                new_stage: transition.new_stage,
                timestamp: transition.transitioned_at,
            });
        }

        debug_assert!(self.session.invariant_holds());
        self.last_transition = Some(transition);
        Ok(())
    }

    /// Surface an error and move to FAILED; returns the error for `?` chains
    fn fail(&mut self, err: WorkflowError) -> WorkflowError {
        tracing::error!(
            session_id = ?self.session.session_id(),
            stage = %self.session.stage(),
            error = %err,
            "Workflow failed"
        );
        self.report(&err);
        if self.session.stage() != Stage::Failed {
            if let Err(transition_err) = self.transition(Stage::Failed) {
                tracing::error!(error = %transition_err, "Could not enter failed stage");
            }
        }
        err
    }

    /// Record a user-visible message (cancellations are not shown)
    fn report(&mut self, err: &WorkflowError) {
        if matches!(err, WorkflowError::Cancelled) {
            return;
        }
        let message = err.to_string();
        self.emit(WorkflowEvent::ErrorRaised {
            session_id: self.session.session_id().map(str::to_string),
            message: message.clone(),
            timestamp: Utc::now(),
        });
        self.pending_error = Some(message);
    }

    fn emit(&self, event: WorkflowEvent) {
        self.event_bus.emit_lossy(event);
    }
}

impl Drop for WorkflowController {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// Race a request against the controller token
async fn with_cancel<T>(
    token: &CancellationToken,
    request: impl Future<Output = WorkflowResult<T>>,
) -> WorkflowResult<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(WorkflowError::Cancelled),
        result = request => result,
    }
}
