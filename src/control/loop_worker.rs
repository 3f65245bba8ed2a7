use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::engine::{ActivationState, ActivationStateMachine, HandFrame, Transition};
use crate::gesture::Action;
use crate::metrics::{MetricsCollector, RelayCounters};

use super::dispatcher::ActionDispatcher;
use super::relay::{LoopCommand, LoopEvent, LoopRelay, StatusMessage, TriggerRecord};
use super::ControlConfig;

// Set to false to silence this module without touching RUST_LOG
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Commands applied between two frames, at most.
const MAX_COMMANDS_PER_BATCH: usize = 8;
/// Upper bound on waiting for in-flight action reports at shutdown.
const REPORT_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ExitReason {
    Cancelled,
    StopCommand,
    FrameSourceClosed,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoopSummary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub exit_reason: ExitReason,
    pub final_state: ActivationState,
    pub frames_processed: u64,
    pub triggers_emitted: u64,
    pub status_dropped: u64,
    pub events_lost: u64,
}

/// Owns the machine for the lifetime of one session. Consumes frames until
/// cancelled, told to stop, or the producer hangs up.
pub async fn control_loop(
    session_id: String,
    machine: ActivationStateMachine,
    mut frames: mpsc::Receiver<HandFrame>,
    relay: LoopRelay,
    dispatcher: ActionDispatcher,
    config: ControlConfig,
    cancel_token: CancellationToken,
) -> LoopSummary {
    let mut worker = ControlLoop {
        session_id,
        started_at: Utc::now(),
        machine,
        relay,
        dispatcher,
        metrics: MetricsCollector::new(),
        config,
        paused: false,
        last_frame: None,
        last_status: Instant::now(),
        last_metrics: Instant::now(),
    };

    log_info!("control loop started (session {})", worker.session_id);
    let exit_reason = worker.run(&mut frames, &cancel_token).await;

    // Unblock a producer waiting on a full frame queue.
    frames.close();
    worker.finish(exit_reason).await
}

struct ControlLoop {
    session_id: String,
    started_at: DateTime<Utc>,
    machine: ActivationStateMachine,
    relay: LoopRelay,
    dispatcher: ActionDispatcher,
    metrics: MetricsCollector,
    config: ControlConfig,
    paused: bool,
    /// Newest frame timestamp and the wall-clock instant it arrived.
    last_frame: Option<(Instant, Instant)>,
    last_status: Instant,
    last_metrics: Instant,
}

impl ControlLoop {
    async fn run(
        &mut self,
        frames: &mut mpsc::Receiver<HandFrame>,
        cancel_token: &CancellationToken,
    ) -> ExitReason {
        let mut ticker = tokio::time::interval(self.config.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.publish_snapshot(self.clock());

        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    log_info!("control loop cancelled (session {})", self.session_id);
                    return ExitReason::Cancelled;
                }
                frame = frames.recv() => {
                    let Some(frame) = frame else {
                        log_info!("frame source closed (session {})", self.session_id);
                        return ExitReason::FrameSourceClosed;
                    };
                    if self.apply_commands(frame.at) {
                        return ExitReason::StopCommand;
                    }
                    self.handle_frame(&frame).await;
                    self.housekeeping().await;
                }
                _ = ticker.tick() => {
                    if self.apply_commands(self.clock()) {
                        return ExitReason::StopCommand;
                    }
                    self.housekeeping().await;
                }
            }
        }
    }

    /// Machine time: frame timestamps advanced by wall time since the last frame.
    fn clock(&self) -> Instant {
        match self.last_frame {
            Some((frame_at, received)) => frame_at + received.elapsed(),
            None => Instant::now(),
        }
    }

    async fn handle_frame(&mut self, frame: &HandFrame) {
        self.last_frame = Some((frame.at, Instant::now()));
        if self.paused {
            self.metrics.record_ignored();
            return;
        }

        let started = Instant::now();
        let outcome = self.machine.process(frame);
        self.metrics.record_frame(frame.at, started.elapsed());

        if let Some(transition) = outcome.transition {
            self.publish_transition(transition);
        }
        if outcome.triggers.is_empty() {
            return;
        }

        self.metrics.record_triggers(outcome.triggers.len());
        for trigger in &outcome.triggers {
            let action = Action::resolve(trigger.hand, trigger.label);
            // Dispatch before publishing so back-pressure never delays the action.
            self.dispatcher.dispatch(*trigger, action);
            self.relay
                .publish_event(LoopEvent::Triggered(TriggerRecord::new(trigger, action)))
                .await;
        }
        self.publish_snapshot(frame.at);
    }

    /// Returns true when a `Stop` command was seen.
    fn apply_commands(&mut self, now: Instant) -> bool {
        for command in self.relay.poll_commands(MAX_COMMANDS_PER_BATCH) {
            log_debug!("applying {:?}", command);
            match command {
                LoopCommand::Pause => {
                    if self.paused {
                        continue;
                    }
                    self.paused = true;
                    if let Some(transition) = self.machine.reset(now) {
                        self.publish_transition(transition);
                    }
                    self.relay.publish_status(StatusMessage::Paused { paused: true });
                    self.publish_snapshot(now);
                    log_info!("gesture processing paused");
                }
                LoopCommand::Resume => {
                    if !self.paused {
                        continue;
                    }
                    self.paused = false;
                    self.relay.publish_status(StatusMessage::Paused { paused: false });
                    self.publish_snapshot(now);
                    log_info!("gesture processing resumed");
                }
                LoopCommand::Reset => match self.machine.reset(now) {
                    Some(transition) => self.publish_transition(transition),
                    None => self.publish_snapshot(now),
                },
                LoopCommand::SetHandMode(mode) => {
                    self.machine.set_hand_mode(mode);
                    self.publish_snapshot(now);
                }
                LoopCommand::Stop => {
                    log_info!("stop requested by observer (session {})", self.session_id);
                    return true;
                }
            }
        }
        false
    }

    /// Forward action reports, retry parked events, keep the periodic pushes on schedule.
    async fn housekeeping(&mut self) {
        for report in self.dispatcher.drain_reports() {
            self.relay.publish_event(LoopEvent::ActionCompleted(report)).await;
        }
        self.relay.flush_events().await;

        if self.last_status.elapsed() >= self.config.refresh_interval {
            self.publish_snapshot(self.clock());
        }
        if self.last_metrics.elapsed() >= self.config.metrics_interval {
            let counters = self.counters();
            let report = self.metrics.report(counters);
            self.relay.publish_status(StatusMessage::Metrics(report));
            self.last_metrics = Instant::now();
        }
    }

    fn publish_snapshot(&mut self, now: Instant) {
        let mut snapshot = self.machine.snapshot(now);
        snapshot.paused = self.paused;
        self.relay.publish_status(StatusMessage::Snapshot(snapshot));
        self.last_status = Instant::now();
    }

    fn publish_transition(&mut self, transition: Transition) {
        let mut snapshot = self.machine.snapshot(transition.at);
        snapshot.paused = self.paused;
        self.relay.publish_status(StatusMessage::Transition {
            from: transition.from,
            to: transition.to,
            reason: transition.reason,
            snapshot,
        });
        self.last_status = Instant::now();
    }

    fn counters(&self) -> RelayCounters {
        RelayCounters {
            status_dropped: self.relay.status_dropped(),
            events_lost: self.relay.events_lost(),
            pending_actions: self.dispatcher.in_flight(),
        }
    }

    async fn finish(mut self, exit_reason: ExitReason) -> LoopSummary {
        let grace = REPORT_GRACE.min(self.config.stop_timeout / 4);
        let deadline = tokio::time::Instant::now() + grace;
        while self.dispatcher.in_flight() > 0 {
            match tokio::time::timeout_at(deadline, self.dispatcher.next_report()).await {
                Ok(Some(report)) => {
                    self.relay.publish_event(LoopEvent::ActionCompleted(report)).await;
                }
                _ => break,
            }
        }
        if self.dispatcher.in_flight() > 0 {
            log_info!(
                "{} action(s) still running at shutdown; their reports are dropped",
                self.dispatcher.in_flight()
            );
        }

        self.publish_snapshot(self.clock());
        let counters = self.counters();
        let report = self.metrics.report(counters);
        self.relay.publish_status(StatusMessage::Metrics(report));

        let summary = LoopSummary {
            session_id: self.session_id.clone(),
            started_at: self.started_at,
            ended_at: Utc::now(),
            exit_reason,
            final_state: self.machine.state(),
            frames_processed: self.metrics.frames_processed(),
            triggers_emitted: self.metrics.triggers_emitted(),
            status_dropped: self.relay.status_dropped(),
            events_lost: self.relay.events_lost(),
        };
        log_info!(
            "control loop stopped (session {}, {:?}): {} frames, {} triggers",
            summary.session_id,
            summary.exit_reason,
            summary.frames_processed,
            summary.triggers_emitted
        );

        self.relay.publish_event(LoopEvent::Stopped(summary.clone())).await;
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::dispatcher::LogActionExecutor;
    use crate::control::relay::{self, Observed};
    use crate::engine::{EngineConfig, HandMode};
    use crate::gesture::GestureLabel::{self, *};

    struct Rig {
        frames: Option<mpsc::Sender<HandFrame>>,
        observer: relay::ObserverHandle,
        task: tokio::task::JoinHandle<LoopSummary>,
        cancel: CancellationToken,
        t0: Instant,
    }

    fn rig() -> Rig {
        let engine = EngineConfig::with_timing(
            Duration::from_millis(100),
            Duration::from_millis(200),
            3,
        )
        .unwrap();
        let config = ControlConfig::default();
        let (relay, observer) = relay::channel(&config);
        let dispatcher = ActionDispatcher::spawn(Box::new(LogActionExecutor)).unwrap();
        let (frames, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(control_loop(
            "test-session".to_string(),
            ActivationStateMachine::new(engine),
            rx,
            relay,
            dispatcher,
            config,
            cancel.clone(),
        ));
        Rig {
            frames: Some(frames),
            observer,
            task,
            cancel,
            t0: Instant::now(),
        }
    }

    impl Rig {
        async fn right(&self, ms: u64, label: GestureLabel) {
            let frame = HandFrame::new(self.t0 + Duration::from_millis(ms), None, Some(label));
            if let Some(frames) = &self.frames {
                // The loop may already have stopped.
                let _ = frames.send(frame).await;
            }
        }

        fn close_frames(&mut self) {
            self.frames = None;
        }

        /// Open palm long enough to activate, ending at 132 ms.
        async fn activate(&self) {
            for ms in (0..=132).step_by(33) {
                self.right(ms, OpenPalm).await;
            }
        }

        async fn events_until_stopped(&mut self) -> Vec<LoopEvent> {
            let mut out = Vec::new();
            loop {
                let event = tokio::time::timeout(Duration::from_secs(2), self.observer.recv_event())
                    .await
                    .expect("event in time")
                    .expect("relay open");
                let stopped = matches!(event, LoopEvent::Stopped(_));
                out.push(event);
                if stopped {
                    return out;
                }
            }
        }
    }

    fn states(observed: &[Observed]) -> Vec<ActivationState> {
        observed
            .iter()
            .filter_map(|o| match o {
                Observed::Status(StatusMessage::Transition { to, .. }) => Some(*to),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn trigger_reaches_observer_and_action_reports_back() {
        let mut rig = rig();
        rig.activate().await;
        for ms in [165, 198, 231, 264] {
            rig.right(ms, OneFinger).await;
        }
        // Closing the frame source ends the session.
        rig.close_frames();

        let events = rig.events_until_stopped().await;
        let triggered: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                LoopEvent::Triggered(record) => Some((record.label, record.action)),
                _ => None,
            })
            .collect();
        assert_eq!(triggered, vec![(OneFinger, Action::OpenBrowser)]);
        assert!(events.iter().any(|e| matches!(
            e,
            LoopEvent::ActionCompleted(report) if report.success && report.action == Action::OpenBrowser
        )));

        let summary = rig.task.await.unwrap();
        assert_eq!(summary.exit_reason, ExitReason::FrameSourceClosed);
        assert_eq!(summary.triggers_emitted, 1);
        assert_eq!(summary.frames_processed, 9);
        assert_eq!(summary.final_state, ActivationState::Active);

        let observed = rig.observer.drain();
        assert_eq!(
            states(&observed),
            vec![ActivationState::Activating, ActivationState::Active]
        );
    }

    #[tokio::test]
    async fn pause_ignores_frames_and_resets() {
        let mut rig = rig();
        rig.activate().await;
        rig.right(165, OneFinger).await;

        rig.observer.send_command(LoopCommand::Pause).unwrap();
        for ms in [198, 231, 264, 297] {
            rig.right(ms, OneFinger).await;
        }
        rig.observer.send_command(LoopCommand::Stop).unwrap();
        rig.right(330, OneFinger).await;

        let events = rig.events_until_stopped().await;
        assert!(!events.iter().any(|e| matches!(e, LoopEvent::Triggered(_))));

        let summary = rig.task.await.unwrap();
        assert_eq!(summary.exit_reason, ExitReason::StopCommand);
        assert_eq!(summary.final_state, ActivationState::Inactive);
        assert_eq!(summary.triggers_emitted, 0);

        let observed = rig.observer.drain();
        assert!(observed.iter().any(|o| matches!(
            o,
            Observed::Status(StatusMessage::Paused { paused: true })
        )));
        // Snapshots carry the flag too, so a dropped `Paused` message is recovered.
        assert!(observed.iter().any(|o| matches!(
            o,
            Observed::Status(StatusMessage::Snapshot(s)) if s.paused
        )));
    }

    #[tokio::test]
    async fn hand_mode_command_is_reflected_in_snapshots() {
        let mut rig = rig();
        rig.observer
            .send_command(LoopCommand::SetHandMode(HandMode::SingleHand))
            .unwrap();
        rig.right(0, NoGesture).await;

        let observer = &mut rig.observer;
        let seen = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let switched = observer.drain().iter().any(|o| {
                    matches!(o, Observed::Status(StatusMessage::Snapshot(s)) if s.hand_mode == HandMode::SingleHand)
                });
                if switched {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(seen.is_ok());

        rig.cancel.cancel();
        let summary = rig.task.await.unwrap();
        assert_eq!(summary.exit_reason, ExitReason::Cancelled);
    }
}
