//! Consumer side of the relay: keeps the latest status, metrics and the
//! activity log, and renders the one-line status text. Never touches the
//! machine; everything it knows arrived as a message.

pub mod activity_log;

pub use activity_log::{ActivityEntry, ActivityLog};

use anyhow::Result;
use log::{debug, warn};

use crate::control::relay::Observed;
use crate::control::{LoopCommand, LoopEvent, LoopSummary, ObserverHandle, StatusMessage};
use crate::engine::{ActivationState, StatusSnapshot};
use crate::metrics::LoopMetrics;

pub struct StatusObserver {
    handle: ObserverHandle,
    latest: Option<StatusSnapshot>,
    metrics: Option<LoopMetrics>,
    activity: ActivityLog,
    paused: bool,
    status_lagged: u64,
    summary: Option<LoopSummary>,
}

impl StatusObserver {
    pub fn new(handle: ObserverHandle) -> Self {
        Self {
            handle,
            latest: None,
            metrics: None,
            activity: ActivityLog::new(),
            paused: false,
            status_lagged: 0,
            summary: None,
        }
    }

    /// Drain everything queued and fold it in. Returns the events seen,
    /// for callers that print or forward them.
    pub fn poll(&mut self) -> Vec<LoopEvent> {
        let mut events = Vec::new();
        for observed in self.handle.drain() {
            match observed {
                Observed::Status(message) => self.apply_status(message),
                Observed::Event(event) => {
                    self.apply_event(&event);
                    events.push(event);
                }
                Observed::Lagged(skipped) => {
                    self.status_lagged += skipped;
                    debug!("observer skipped {skipped} status update(s)");
                }
            }
        }
        events
    }

    /// Block until the next trigger/action event, then fold in everything else queued.
    pub async fn wait(&mut self) -> Option<Vec<LoopEvent>> {
        let first = self.handle.recv_event().await?;
        self.apply_event(&first);
        let mut events = vec![first];
        events.extend(self.poll());
        Some(events)
    }

    pub fn send(&self, command: LoopCommand) -> Result<()> {
        self.handle.send_command(command).inspect_err(|err| {
            warn!("{err:#}");
        })
    }

    pub fn status_text(&self) -> String {
        if self.paused {
            return "PAUSED".to_string();
        }
        let Some(snapshot) = &self.latest else {
            return ActivationState::Inactive.as_str().to_string();
        };
        match snapshot.state {
            ActivationState::Inactive => "INACTIVE".to_string(),
            ActivationState::Activating => {
                let progress = snapshot.activation_progress.unwrap_or(0.0);
                format!("ACTIVATING ({:.0}%)", progress * 100.0)
            }
            ActivationState::Active => match snapshot.cooldown_remaining_ms {
                Some(ms) => format!("ACTIVE (Cooldown: {:.1}s)", ms as f64 / 1000.0),
                None => "ACTIVE".to_string(),
            },
        }
    }

    pub fn latest(&self) -> Option<&StatusSnapshot> {
        self.latest.as_ref()
    }

    pub fn metrics(&self) -> Option<&LoopMetrics> {
        self.metrics.as_ref()
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Status updates overwritten before this observer read them.
    pub fn status_lagged(&self) -> u64 {
        self.status_lagged
    }

    /// Set once the loop has reported its final summary.
    pub fn summary(&self) -> Option<&LoopSummary> {
        self.summary.as_ref()
    }

    fn apply_status(&mut self, message: StatusMessage) {
        match message {
            StatusMessage::Snapshot(snapshot) | StatusMessage::Transition { snapshot, .. } => {
                self.paused = snapshot.paused;
                self.latest = Some(snapshot);
            }
            StatusMessage::Metrics(metrics) => self.metrics = Some(metrics),
            StatusMessage::Paused { paused } => self.paused = paused,
        }
    }

    fn apply_event(&mut self, event: &LoopEvent) {
        match event {
            LoopEvent::Triggered(record) => self.activity.record_trigger(record),
            LoopEvent::ActionCompleted(report) => {
                if !self.activity.record_report(report) {
                    debug!("action report without a matching trigger: {:?}", report.action);
                }
            }
            LoopEvent::Stopped(summary) => self.summary = Some(summary.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::relay;
    use crate::control::ControlConfig;
    use crate::engine::{ActivationStateMachine, EngineConfig, HandFrame};
    use crate::gesture::GestureLabel;
    use std::time::{Duration, Instant};

    fn machine() -> ActivationStateMachine {
        let config =
            EngineConfig::with_timing(Duration::from_millis(1000), Duration::from_millis(1000), 2)
                .unwrap();
        ActivationStateMachine::new(config)
    }

    #[tokio::test]
    async fn status_text_follows_snapshots() {
        let (mut relay, handle) = relay::channel(&ControlConfig::default());
        let mut observer = StatusObserver::new(handle);
        assert_eq!(observer.status_text(), "INACTIVE");

        let mut machine = machine();
        let t0 = Instant::now();
        let at = |ms| t0 + Duration::from_millis(ms);
        let palm = |ms| HandFrame::new(at(ms), None, Some(GestureLabel::OpenPalm));

        machine.process(&palm(0));
        machine.process(&palm(450));
        relay.publish_status(StatusMessage::Snapshot(machine.snapshot(at(450))));
        observer.poll();
        assert_eq!(observer.status_text(), "ACTIVATING (45%)");

        machine.process(&palm(1000));
        for ms in [1033, 1066] {
            machine.process(&HandFrame::new(at(ms), None, Some(GestureLabel::OneFinger)));
        }
        relay.publish_status(StatusMessage::Snapshot(machine.snapshot(at(1266))));
        observer.poll();
        assert_eq!(observer.status_text(), "ACTIVE (Cooldown: 0.8s)");

        relay.publish_status(StatusMessage::Snapshot(machine.snapshot(at(2100))));
        observer.poll();
        assert_eq!(observer.status_text(), "ACTIVE");

        relay.publish_status(StatusMessage::Paused { paused: true });
        observer.poll();
        assert_eq!(observer.status_text(), "PAUSED");
    }

    #[tokio::test]
    async fn snapshot_clears_pause_when_resume_message_was_lost() {
        let (mut relay, handle) = relay::channel(&ControlConfig::default());
        let mut observer = StatusObserver::new(handle);
        let machine = machine();
        let now = Instant::now();

        let mut paused = machine.snapshot(now);
        paused.paused = true;
        relay.publish_status(StatusMessage::Snapshot(paused));
        observer.poll();
        assert!(observer.is_paused());
        assert_eq!(observer.status_text(), "PAUSED");

        relay.publish_status(StatusMessage::Snapshot(machine.snapshot(now)));
        observer.poll();
        assert!(!observer.is_paused());
        assert_eq!(observer.status_text(), "INACTIVE");
    }

    #[tokio::test]
    async fn lagged_updates_are_counted() {
        let config = ControlConfig {
            status_capacity: 2,
            ..ControlConfig::default()
        };
        let (mut relay, handle) = relay::channel(&config);
        let mut observer = StatusObserver::new(handle);
        for _ in 0..5 {
            relay.publish_status(StatusMessage::Paused { paused: false });
        }
        observer.poll();
        assert_eq!(observer.status_lagged(), 3);
    }
}
