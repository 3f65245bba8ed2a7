pub mod controller;
pub mod dispatcher;
pub mod loop_worker;
pub mod relay;

use std::time::Duration;

pub use controller::{ControlLoopController, StopOutcome};
pub use dispatcher::{ActionDispatcher, ActionExecutor, ActionReport, LogActionExecutor};
pub use loop_worker::{ExitReason, LoopSummary};
pub use relay::{LoopCommand, LoopEvent, ObserverHandle, StatusMessage, TriggerRecord};

/// Relay sizing and loop cadence. Built and validated by `Settings::control_config`.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlConfig {
    pub status_capacity: usize,
    pub event_capacity: usize,
    pub command_capacity: usize,
    /// Longest the loop blocks on a full event relay before parking the event.
    pub trigger_backpressure: Duration,
    /// Minimum snapshot cadence even when nothing changes.
    pub refresh_interval: Duration,
    pub metrics_interval: Duration,
    pub stop_timeout: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            status_capacity: 64,
            event_capacity: 32,
            command_capacity: 16,
            trigger_backpressure: Duration::from_millis(50),
            refresh_interval: Duration::from_millis(100),
            metrics_interval: Duration::from_secs(1),
            stop_timeout: Duration::from_secs(2),
        }
    }
}
