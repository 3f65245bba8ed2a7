use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::engine::TriggerEvent;
use crate::gesture::{Action, GestureLabel, Hand};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Carries out the action bound to a trigger. Runs on the dispatcher's
/// own thread, so it may block.
pub trait ActionExecutor: Send {
    fn name(&self) -> &str;

    /// Returns a short human-readable result for the activity log.
    fn execute(&mut self, action: Action, trigger: &TriggerEvent) -> Result<String>;
}

/// Logs each action instead of touching the OS.
#[derive(Debug, Default)]
pub struct LogActionExecutor;

impl ActionExecutor for LogActionExecutor {
    fn name(&self) -> &str {
        "log"
    }

    fn execute(&mut self, action: Action, trigger: &TriggerEvent) -> Result<String> {
        log::info!(
            "[{} hand] {} → {}",
            trigger.hand.as_str(),
            trigger.label.display_name(),
            action.description()
        );
        Ok(action.description().to_string())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionReport {
    pub hand: Hand,
    pub label: GestureLabel,
    pub action: Action,
    pub success: bool,
    pub message: String,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
}

enum DispatchCommand {
    Execute { trigger: TriggerEvent, action: Action },
    Shutdown,
}

/// Hands triggers to a dedicated worker thread so a slow or hung action
/// never stalls frame processing. Reports come back on a tokio channel the
/// control loop can poll or await.
pub struct ActionDispatcher {
    tx: Sender<DispatchCommand>,
    reports: UnboundedReceiver<ActionReport>,
    worker: Option<JoinHandle<()>>,
    in_flight: usize,
    worker_lost: bool,
}

impl ActionDispatcher {
    pub fn spawn(executor: Box<dyn ActionExecutor>) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<DispatchCommand>();
        let (report_tx, reports) = unbounded_channel();

        let worker = thread::Builder::new()
            .name("gesture-actions".to_string())
            .spawn(move || run_worker(executor, rx, report_tx))
            .context("failed to spawn action dispatcher thread")?;

        Ok(Self {
            tx,
            reports,
            worker: Some(worker),
            in_flight: 0,
            worker_lost: false,
        })
    }

    /// Queue an action without waiting. Returns false if the worker is gone.
    pub fn dispatch(&mut self, trigger: TriggerEvent, action: Action) -> bool {
        match self.tx.send(DispatchCommand::Execute { trigger, action }) {
            Ok(()) => {
                self.in_flight += 1;
                true
            }
            Err(_) => {
                if !self.worker_lost {
                    self.worker_lost = true;
                    log_warn!("action worker has exited; further actions are not executed");
                }
                false
            }
        }
    }

    /// Reports finished since the last call.
    pub fn drain_reports(&mut self) -> Vec<ActionReport> {
        let mut out = Vec::new();
        while let Ok(report) = self.reports.try_recv() {
            out.push(report);
        }
        self.in_flight = self.in_flight.saturating_sub(out.len());
        out
    }

    /// Wait for the next report; `None` when nothing is in flight or the worker is gone.
    pub async fn next_report(&mut self) -> Option<ActionReport> {
        if self.in_flight == 0 {
            return None;
        }
        let report = self.reports.recv().await?;
        self.in_flight -= 1;
        Some(report)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

impl Drop for ActionDispatcher {
    fn drop(&mut self) {
        let _ = self.tx.send(DispatchCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.is_finished() {
                let _ = worker.join();
            } else {
                // A hung action must not hold up shutdown; the thread exits
                // once it reaches the queued Shutdown.
                log_debug!("action worker still busy; detaching");
            }
        }
    }
}

fn run_worker(
    mut executor: Box<dyn ActionExecutor>,
    rx: mpsc::Receiver<DispatchCommand>,
    reports: UnboundedSender<ActionReport>,
) {
    log_info!("action worker started with '{}' executor", executor.name());

    while let Ok(command) = rx.recv() {
        let (trigger, action) = match command {
            DispatchCommand::Execute { trigger, action } => (trigger, action),
            DispatchCommand::Shutdown => break,
        };

        let started = Instant::now();
        let result = if action.is_mapped() {
            executor.execute(action, &trigger)
        } else {
            Err(anyhow::anyhow!(
                "no action bound to {} ({} hand)",
                trigger.label.display_name(),
                trigger.hand.as_str()
            ))
        };

        let (success, message) = match result {
            Ok(message) => (true, message),
            Err(err) => {
                if action.is_mapped() {
                    log_warn!("action {action:?} failed: {err:#}");
                }
                (false, format!("{err:#}"))
            }
        };

        let report = ActionReport {
            hand: trigger.hand,
            label: trigger.label,
            action,
            success,
            message,
            elapsed_ms: crate::engine::state::duration_ms(started.elapsed()),
            finished_at: Utc::now(),
        };
        if reports.send(report).is_err() {
            break;
        }
    }

    log_info!("action worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::HandSlot;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct Recording {
        seen: Arc<Mutex<Vec<Action>>>,
        fail: bool,
    }

    impl ActionExecutor for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn execute(&mut self, action: Action, _trigger: &TriggerEvent) -> Result<String> {
            self.seen.lock().unwrap().push(action);
            if self.fail {
                anyhow::bail!("launch failed");
            }
            Ok(format!("ran {action}"))
        }
    }

    fn trigger(hand: Hand, label: GestureLabel) -> TriggerEvent {
        TriggerEvent {
            slot: HandSlot::Primary,
            hand,
            label,
            at: Instant::now(),
        }
    }

    async fn collect(dispatcher: &mut ActionDispatcher, n: usize) -> Vec<ActionReport> {
        let mut out = Vec::new();
        while out.len() < n {
            let report = tokio::time::timeout(Duration::from_secs(2), dispatcher.next_report())
                .await
                .expect("report in time")
                .expect("worker alive");
            out.push(report);
        }
        out
    }

    #[tokio::test]
    async fn executes_in_order_and_reports() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = ActionDispatcher::spawn(Box::new(Recording {
            seen: Arc::clone(&seen),
            fail: false,
        }))
        .unwrap();

        assert!(dispatcher.dispatch(trigger(Hand::Right, GestureLabel::OneFinger), Action::OpenBrowser));
        assert!(dispatcher.dispatch(trigger(Hand::Left, GestureLabel::Pinky), Action::PlayPause));
        assert_eq!(dispatcher.in_flight(), 2);

        let reports = collect(&mut dispatcher, 2).await;
        assert!(reports.iter().all(|r| r.success));
        assert_eq!(reports[0].action, Action::OpenBrowser);
        assert_eq!(reports[1].label, GestureLabel::Pinky);
        assert_eq!(*seen.lock().unwrap(), vec![Action::OpenBrowser, Action::PlayPause]);
        assert_eq!(dispatcher.in_flight(), 0);
        assert!(dispatcher.next_report().await.is_none());
    }

    #[tokio::test]
    async fn failures_are_reported_not_raised() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = ActionDispatcher::spawn(Box::new(Recording {
            seen,
            fail: true,
        }))
        .unwrap();

        dispatcher.dispatch(trigger(Hand::Left, GestureLabel::ThreeFingers), Action::Mute);
        let report = collect(&mut dispatcher, 1).await.remove(0);
        assert!(!report.success);
        assert!(report.message.contains("launch failed"));
    }

    #[tokio::test]
    async fn unmapped_actions_skip_the_executor() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = ActionDispatcher::spawn(Box::new(Recording {
            seen: Arc::clone(&seen),
            fail: false,
        }))
        .unwrap();

        dispatcher.dispatch(trigger(Hand::Right, GestureLabel::ThumbsUp), Action::Unmapped);
        let report = collect(&mut dispatcher, 1).await.remove(0);
        assert!(!report.success);
        assert!(report.message.contains("no action bound"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn drop_does_not_wait_for_a_hung_action() {
        struct Hung;
        impl ActionExecutor for Hung {
            fn name(&self) -> &str {
                "hung"
            }
            fn execute(&mut self, _: Action, _: &TriggerEvent) -> Result<String> {
                thread::sleep(Duration::from_millis(500));
                Ok(String::new())
            }
        }

        let mut dispatcher = ActionDispatcher::spawn(Box::new(Hung)).unwrap();
        dispatcher.dispatch(trigger(Hand::Right, GestureLabel::OneFinger), Action::OpenBrowser);
        thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        drop(dispatcher);
        assert!(started.elapsed() < Duration::from_millis(250));
    }
}
