//! Status polling task
//!
//! Follows one server-side processing job by requesting
//! `GET /status/{session_id}` on a fixed period. Results are not applied
//! here: each one is sent as a `PollMessage` into the owner's queue, tagged
//! with the generation of the `start()` call that produced it, so the owner
//! can drop anything from a poller it has since replaced.
//!
//! Per `start()`:
//! - every successful response is delivered as `PollEvent::Update`
//! - `completed` / `error` additionally deliver exactly one
//!   `PollEvent::Terminal` and end the task
//! - transport failures are logged and polling continues, unless a
//!   consecutive failure limit is configured

use magi_common::config::{TomlConfig, DEFAULT_POLL_INTERVAL_MS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::models::{JobStatus, ProcessingStatus};
use crate::services::pipeline_api::PipelineApi;

/// Polling behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerSettings {
    /// Time between status requests; the first request is sent one
    /// interval after `start()`
    pub interval: Duration,
    /// Consecutive transport failures before giving up (None = never)
    pub max_consecutive_failures: Option<u32>,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_consecutive_failures: None,
        }
    }
}

impl From<&TomlConfig> for PollerSettings {
    fn from(config: &TomlConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_consecutive_failures: config.max_poll_failures,
        }
    }
}

/// How a polling run ended
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Server reported `completed`
    Completed(ProcessingStatus),
    /// Server reported `error`
    Failed(String),
    /// Consecutive failure limit reached
    Unreachable { attempts: u32, last_error: String },
}

/// What a poller delivers
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Update(ProcessingStatus),
    Terminal(PollOutcome),
}

impl PollEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PollEvent::Terminal(_))
    }
}

/// A poll event tagged with its origin
#[derive(Debug, Clone, PartialEq)]
pub struct PollMessage {
    pub generation: u64,
    pub session_id: String,
    pub event: PollEvent,
}

/// Receiving side of a poller's messages
pub type PollSink = mpsc::UnboundedSender<PollMessage>;

struct ActivePoll {
    generation: u64,
    session_id: String,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Single-flight recurring status task
pub struct ProgressPoller {
    api: Arc<dyn PipelineApi>,
    settings: PollerSettings,
    parent_token: CancellationToken,
    generation: u64,
    active: Option<ActivePoll>,
}

impl ProgressPoller {
    /// Create an idle poller.
    ///
    /// Tasks are cancelled when `parent_token` is.
    pub fn new(
        api: Arc<dyn PipelineApi>,
        settings: PollerSettings,
        parent_token: CancellationToken,
    ) -> Self {
        Self {
            api,
            settings,
            parent_token,
            generation: 0,
            active: None,
        }
    }

    pub fn settings(&self) -> PollerSettings {
        self.settings
    }

    /// Stop any active task and attach future tasks to a new parent token.
    ///
    /// The generation counter keeps counting, so messages still in flight
    /// from earlier tasks can never be mistaken for new ones.
    pub fn rebind(&mut self, parent_token: CancellationToken) {
        self.stop();
        self.parent_token = parent_token;
    }

    /// Begin polling `session_id`, returning the generation of this run.
    ///
    /// Any previous run is stopped first.
    pub fn start(&mut self, session_id: String, sink: PollSink) -> u64 {
        self.stop();

        self.generation += 1;
        let generation = self.generation;
        let token = self.parent_token.child_token();

        tracing::info!(
            session_id = %session_id,
            generation,
            interval_ms = self.settings.interval.as_millis() as u64,
            "Status polling started"
        );

        let handle = tokio::spawn(run_poll_loop(
            Arc::clone(&self.api),
            self.settings,
            session_id.clone(),
            generation,
            sink,
            token.clone(),
        ));

        self.active = Some(ActivePoll {
            generation,
            session_id,
            token,
            handle,
        });
        generation
    }

    /// Cancel the active task, if any. Idempotent.
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.token.cancel();
            tracing::debug!(
                session_id = %active.session_id,
                generation = active.generation,
                "Status polling stopped"
            );
        }
    }

    /// Generation of the current run (None once stopped)
    pub fn active_generation(&self) -> Option<u64> {
        self.active.as_ref().map(|a| a.generation)
    }

    /// True while a started task has not yet exited
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .map(|a| !a.handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for ProgressPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_poll_loop(
    api: Arc<dyn PipelineApi>,
    settings: PollerSettings,
    session_id: String,
    generation: u64,
    sink: PollSink,
    token: CancellationToken,
) {
    let send = |event: PollEvent| {
        sink.send(PollMessage {
            generation,
            session_id: session_id.clone(),
            event,
        })
        .is_ok()
    };

    let mut ticker = tokio::time::interval_at(Instant::now() + settings.interval, settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut consecutive_failures: u32 = 0;

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            result = api.fetch_status(&session_id) => result,
        };

        let status = match result {
            Ok(status) => status,
            Err(err) => {
                consecutive_failures += 1;
                tracing::warn!(
                    session_id = %session_id,
                    error = %err,
                    consecutive_failures,
                    "Status check failed, will retry"
                );
                if let Some(limit) = settings.max_consecutive_failures {
                    if consecutive_failures >= limit {
                        tracing::error!(
                            session_id = %session_id,
                            consecutive_failures,
                            "Giving up on status polling"
                        );
                        send(PollEvent::Terminal(PollOutcome::Unreachable {
                            attempts: consecutive_failures,
                            last_error: err.to_string(),
                        }));
                        return;
                    }
                }
                continue;
            }
        };

        consecutive_failures = 0;
        // Cancelled while the response was being decoded
        if token.is_cancelled() {
            return;
        }

        let job = status.status;
        tracing::debug!(
            session_id = %session_id,
            status = ?job,
            progress = status.progress,
            stage = %status.stage,
            "Status received"
        );

        let outcome = match job {
            JobStatus::Completed => Some(PollOutcome::Completed(status.clone())),
            JobStatus::Error => Some(PollOutcome::Failed(status.error_message())),
            JobStatus::Running | JobStatus::Unknown => None,
        };

        if !send(PollEvent::Update(status)) {
            tracing::debug!(session_id = %session_id, "Poll receiver dropped, stopping");
            return;
        }

        if let Some(outcome) = outcome {
            tracing::info!(session_id = %session_id, status = ?job, "Terminal status received");
            send(PollEvent::Terminal(outcome));
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let config = TomlConfig {
            poll_interval_ms: 250,
            max_poll_failures: Some(4),
            ..TomlConfig::default()
        };
        let settings = PollerSettings::from(&config);
        assert_eq!(settings.interval, Duration::from_millis(250));
        assert_eq!(settings.max_consecutive_failures, Some(4));
    }

    #[test]
    fn test_default_matches_observed_behaviour() {
        let settings = PollerSettings::default();
        assert_eq!(settings.interval, Duration::from_secs(2));
        assert!(settings.max_consecutive_failures.is_none());
    }
}
