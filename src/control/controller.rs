use anyhow::{bail, Context, Result};
use log::{info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::engine::{ActivationStateMachine, EngineConfig, HandFrame};

use super::dispatcher::{ActionDispatcher, ActionExecutor};
use super::loop_worker::{control_loop, LoopSummary};
use super::relay::{self, ObserverHandle};
use super::ControlConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    NotRunning,
    Clean(LoopSummary),
    /// The loop missed the stop deadline and was aborted.
    Forced,
}

/// Start/stop lifecycle for one control loop at a time.
pub struct ControlLoopController {
    handle: Option<JoinHandle<LoopSummary>>,
    cancel_token: Option<CancellationToken>,
    session_id: Option<String>,
    stop_timeout: Duration,
}

impl ControlLoopController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            session_id: None,
            stop_timeout: ControlConfig::default().stop_timeout,
        }
    }

    /// Spawn the loop on the current runtime. The returned handle is the
    /// only way to observe or command it.
    pub fn start(
        &mut self,
        engine: EngineConfig,
        config: ControlConfig,
        frames: mpsc::Receiver<HandFrame>,
        executor: Box<dyn ActionExecutor>,
    ) -> Result<ObserverHandle> {
        if self.is_running() {
            bail!("control loop already running");
        }

        let session_id = Uuid::new_v4().to_string();
        info!(
            "Starting control loop (session {session_id}, executor '{}')",
            executor.name()
        );

        let (loop_relay, observer) = relay::channel(&config);
        let dispatcher = ActionDispatcher::spawn(executor)?;
        let cancel_token = CancellationToken::new();

        let handle = tokio::spawn(control_loop(
            session_id.clone(),
            ActivationStateMachine::new(engine),
            frames,
            loop_relay,
            dispatcher,
            config.clone(),
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.session_id = Some(session_id);
        self.stop_timeout = config.stop_timeout;
        Ok(observer)
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Cancel the loop and join it within the configured stop timeout.
    pub async fn stop(&mut self) -> Result<StopOutcome> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        let Some(mut handle) = self.handle.take() else {
            return Ok(StopOutcome::NotRunning);
        };

        match tokio::time::timeout(self.stop_timeout, &mut handle).await {
            Ok(joined) => {
                let summary = joined.context("control loop task failed to join")?;
                Ok(StopOutcome::Clean(summary))
            }
            Err(_) => {
                warn!(
                    "Control loop did not stop within {:?}; aborting (session {})",
                    self.stop_timeout,
                    self.session_id.as_deref().unwrap_or("?")
                );
                handle.abort();
                Ok(StopOutcome::Forced)
            }
        }
    }

    /// Wait for the loop to end on its own (frame source closed or `Stop` command).
    pub async fn join(&mut self) -> Result<Option<LoopSummary>> {
        self.cancel_token = None;
        match self.handle.take() {
            Some(handle) => handle
                .await
                .map(Some)
                .context("control loop task failed to join"),
            None => Ok(None),
        }
    }
}

impl Default for ControlLoopController {
    fn default() -> Self {
        Self::new()
    }
}
