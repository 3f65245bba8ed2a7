//! Message relay between the control loop and its single observer.
//!
//! Three bounded, typed channels:
//! - status (loop → observer): snapshots, transitions, metrics. On overflow
//!   the oldest entries are overwritten; the observer learns how many it lost.
//! - events (loop → observer): triggers and action reports. Never overwritten;
//!   a full relay applies bounded back-pressure and then parks events in a
//!   local backlog that is retried on every publish.
//! - commands (observer → loop): applied between frames.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{
    broadcast,
    mpsc::{self, error::TrySendError},
};

use crate::engine::{
    ActivationState, HandMode, StatusSnapshot, TransitionReason, TriggerEvent,
};
use crate::gesture::{Action, GestureLabel, Hand, HandSlot};
use crate::metrics::LoopMetrics;

use super::dispatcher::ActionReport;
use super::loop_worker::LoopSummary;
use super::ControlConfig;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Events parked beyond this many multiples of the relay capacity are dropped loudly.
const BACKLOG_FACTOR: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCommand {
    /// Keep consuming frames but ignore them; the machine is reset.
    Pause,
    Resume,
    Reset,
    SetHandMode(HandMode),
    Stop,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StatusMessage {
    Snapshot(StatusSnapshot),
    #[serde(rename_all = "camelCase")]
    Transition {
        from: ActivationState,
        to: ActivationState,
        reason: TransitionReason,
        snapshot: StatusSnapshot,
    },
    Metrics(LoopMetrics),
    Paused { paused: bool },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRecord {
    pub slot: HandSlot,
    pub hand: Hand,
    pub label: GestureLabel,
    pub action: Action,
    pub triggered_at: DateTime<Utc>,
}

impl TriggerRecord {
    pub fn new(event: &TriggerEvent, action: Action) -> Self {
        Self {
            slot: event.slot,
            hand: event.hand,
            label: event.label,
            action,
            triggered_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LoopEvent {
    Triggered(TriggerRecord),
    ActionCompleted(ActionReport),
    Stopped(LoopSummary),
}

/// Everything the observer can pull out of the relay.
#[derive(Debug, Clone)]
pub enum Observed {
    Status(StatusMessage),
    Event(LoopEvent),
    /// Status messages overwritten before the observer read them.
    Lagged(u64),
}

pub fn channel(config: &ControlConfig) -> (LoopRelay, ObserverHandle) {
    let (status_tx, status_rx) = broadcast::channel(config.status_capacity);
    let (event_tx, event_rx) = mpsc::channel(config.event_capacity);
    let (command_tx, command_rx) = mpsc::channel(config.command_capacity);

    let relay = LoopRelay {
        status_tx,
        // broadcast rounds its ring up to a power of two
        status_capacity: config.status_capacity.next_power_of_two(),
        event_tx,
        command_rx,
        backpressure: config.trigger_backpressure,
        backlog: VecDeque::new(),
        backlog_limit: config.event_capacity.saturating_mul(BACKLOG_FACTOR),
        status_dropped: 0,
        events_lost: 0,
        degraded: false,
    };
    let observer = ObserverHandle {
        status_rx,
        event_rx,
        command_tx,
    };
    (relay, observer)
}

/// Producer end, owned by the control loop.
pub struct LoopRelay {
    status_tx: broadcast::Sender<StatusMessage>,
    status_capacity: usize,
    event_tx: mpsc::Sender<LoopEvent>,
    command_rx: mpsc::Receiver<LoopCommand>,
    backpressure: Duration,
    backlog: VecDeque<LoopEvent>,
    backlog_limit: usize,
    status_dropped: u64,
    events_lost: u64,
    degraded: bool,
}

impl LoopRelay {
    /// Never blocks. When the observer falls behind the oldest status is overwritten.
    pub fn publish_status(&mut self, message: StatusMessage) {
        if self.status_tx.len() >= self.status_capacity {
            self.status_dropped += 1;
            if !self.degraded {
                self.degraded = true;
                log_warn!("status relay full; observer is lagging and old status updates are being dropped");
            }
        } else if self.degraded {
            self.degraded = false;
            log_info!(
                "status relay recovered after dropping {} updates",
                self.status_dropped
            );
        }

        // Err only means no observer is attached.
        let _ = self.status_tx.send(message);
    }

    pub async fn publish_event(&mut self, event: LoopEvent) {
        self.backlog.push_back(event);
        self.flush_events().await;
    }

    /// Push parked events out in order, waiting at most one back-pressure interval.
    pub async fn flush_events(&mut self) {
        while let Some(event) = self.backlog.pop_front() {
            let event = match self.event_tx.try_send(event) {
                Ok(()) => continue,
                Err(TrySendError::Closed(_)) => {
                    self.discard_backlog();
                    return;
                }
                Err(TrySendError::Full(event)) => event,
            };

            let parked = match tokio::time::timeout(self.backpressure, self.event_tx.reserve()).await {
                Ok(Ok(permit)) => {
                    permit.send(event);
                    continue;
                }
                Ok(Err(_)) => None,
                Err(_) => Some(event),
            };

            let Some(event) = parked else {
                self.discard_backlog();
                return;
            };
            self.backlog.push_front(event);
            if self.backlog.len() > self.backlog_limit {
                if let Some(lost) = self.backlog.pop_front() {
                    self.events_lost += 1;
                    log_error!("event backlog over {} entries; lost {:?}", self.backlog_limit, lost);
                }
            } else {
                log_warn!(
                    "event relay full for {:?}; {} event(s) parked for retry",
                    self.backpressure,
                    self.backlog.len()
                );
            }
            return;
        }
    }

    /// Drain at most `max` pending commands without waiting.
    pub fn poll_commands(&mut self, max: usize) -> Vec<LoopCommand> {
        let mut batch = Vec::new();
        while batch.len() < max {
            match self.command_rx.try_recv() {
                Ok(command) => batch.push(command),
                Err(_) => break,
            }
        }
        batch
    }

    pub fn status_dropped(&self) -> u64 {
        self.status_dropped
    }

    pub fn events_lost(&self) -> u64 {
        self.events_lost
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    fn discard_backlog(&mut self) {
        if !self.backlog.is_empty() {
            log_debug!("observer detached; discarding {} parked event(s)", self.backlog.len());
        }
        self.backlog.clear();
    }
}

/// Consumer end. Reads never block the loop and the loop never waits on a read,
/// except for the bounded back-pressure on events.
pub struct ObserverHandle {
    status_rx: broadcast::Receiver<StatusMessage>,
    event_rx: mpsc::Receiver<LoopEvent>,
    command_tx: mpsc::Sender<LoopCommand>,
}

impl ObserverHandle {
    pub fn send_command(&self, command: LoopCommand) -> anyhow::Result<()> {
        self.command_tx
            .try_send(command)
            .map_err(|err| anyhow::anyhow!("failed to queue {command:?}: {err}"))
    }

    /// Everything currently queued, events first.
    pub fn drain(&mut self) -> Vec<Observed> {
        let mut out = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            out.push(Observed::Event(event));
        }
        loop {
            match self.status_rx.try_recv() {
                Ok(message) => out.push(Observed::Status(message)),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    out.push(Observed::Lagged(skipped))
                }
                Err(_) => break,
            }
        }
        out
    }

    /// Wait for the next trigger/action event; `None` once the loop is gone.
    pub async fn recv_event(&mut self) -> Option<LoopEvent> {
        self.event_rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn config(status: usize, events: usize) -> ControlConfig {
        ControlConfig {
            status_capacity: status,
            event_capacity: events,
            command_capacity: 4,
            trigger_backpressure: Duration::from_millis(10),
            ..ControlConfig::default()
        }
    }

    fn trigger(label: GestureLabel) -> LoopEvent {
        let event = TriggerEvent {
            slot: HandSlot::Primary,
            hand: Hand::Right,
            label,
            at: Instant::now(),
        };
        LoopEvent::Triggered(TriggerRecord::new(&event, Action::Unmapped))
    }

    fn labels(observed: &[Observed]) -> Vec<GestureLabel> {
        observed
            .iter()
            .filter_map(|o| match o {
                Observed::Event(LoopEvent::Triggered(record)) => Some(record.label),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn status_overflow_drops_oldest() {
        let (mut relay, mut observer) = channel(&config(4, 4));
        for paused in [true, false, true, false, true, false, true, false, true, false] {
            relay.publish_status(StatusMessage::Paused { paused });
        }
        assert!(relay.status_dropped() > 0);

        let drained = observer.drain();
        let lagged: u64 = drained
            .iter()
            .filter_map(|o| match o {
                Observed::Lagged(n) => Some(*n),
                _ => None,
            })
            .sum();
        let kept = drained
            .iter()
            .filter(|o| matches!(o, Observed::Status(_)))
            .count();
        assert_eq!(lagged, 6);
        assert_eq!(kept, 4);
    }

    #[tokio::test]
    async fn events_are_parked_not_lost_when_full() {
        let (mut relay, mut observer) = channel(&config(4, 1));
        relay.publish_event(trigger(GestureLabel::Pinky)).await;
        relay.publish_event(trigger(GestureLabel::OneFinger)).await;
        relay.publish_event(trigger(GestureLabel::TwoFingers)).await;
        assert_eq!(relay.backlog_len(), 2);
        assert_eq!(relay.events_lost(), 0);

        let mut seen = labels(&observer.drain());
        relay.flush_events().await;
        seen.extend(labels(&observer.drain()));
        relay.flush_events().await;
        seen.extend(labels(&observer.drain()));

        assert_eq!(
            seen,
            vec![GestureLabel::Pinky, GestureLabel::OneFinger, GestureLabel::TwoFingers]
        );
        assert_eq!(relay.backlog_len(), 0);
    }

    #[tokio::test]
    async fn commands_arrive_in_order_and_batch_is_bounded() {
        let (mut relay, observer) = channel(&config(4, 4));
        observer.send_command(LoopCommand::Pause).unwrap();
        observer.send_command(LoopCommand::Reset).unwrap();
        observer.send_command(LoopCommand::Resume).unwrap();

        assert_eq!(relay.poll_commands(2), vec![LoopCommand::Pause, LoopCommand::Reset]);
        assert_eq!(relay.poll_commands(2), vec![LoopCommand::Resume]);
        assert!(relay.poll_commands(2).is_empty());
    }

    #[tokio::test]
    async fn full_command_relay_reports_error() {
        let (_relay, observer) = channel(&config(4, 4));
        for _ in 0..4 {
            observer.send_command(LoopCommand::Reset).unwrap();
        }
        assert!(observer.send_command(LoopCommand::Stop).is_err());
    }

    #[tokio::test]
    async fn detached_observer_discards_backlog() {
        let (mut relay, observer) = channel(&config(4, 1));
        drop(observer);
        relay.publish_status(StatusMessage::Paused { paused: true });
        relay.publish_event(trigger(GestureLabel::Pinky)).await;
        assert_eq!(relay.backlog_len(), 0);
    }
}
