use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

/// One metrics report pushed on the status relay.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoopMetrics {
    pub timestamp: DateTime<Utc>,
    pub frames_processed: u64,
    pub frames_ignored: u64,
    /// Frame rate over the recent window, from frame timestamps.
    pub fps: f64,
    /// Mean `process` latency since the previous report.
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    pub triggers_emitted: u64,
    pub status_dropped: u64,
    pub events_lost: u64,
    pub pending_actions: usize,
    pub system: SystemMetrics,
}
