mod types;

pub use types::{LoopMetrics, SystemMetrics};

use chrono::Utc;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessesToUpdate, System};

const FPS_WINDOW: usize = 30;

/// Relay-side counters folded into a report.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayCounters {
    pub status_dropped: u64,
    pub events_lost: u64,
    pub pending_actions: usize,
}

/// Owned by the control loop; nothing else touches it.
pub struct MetricsCollector {
    frame_times: VecDeque<Instant>,
    frames_processed: u64,
    frames_ignored: u64,
    triggers_emitted: u64,
    latency_total: Duration,
    latency_samples: u32,
    max_latency: Duration,
    system: System,
    pid: Pid,
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // CPU usage is a delta between refreshes; take the baseline now.
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self {
            frame_times: VecDeque::with_capacity(FPS_WINDOW),
            frames_processed: 0,
            frames_ignored: 0,
            triggers_emitted: 0,
            latency_total: Duration::ZERO,
            latency_samples: 0,
            max_latency: Duration::ZERO,
            system,
            pid,
        }
    }

    pub fn record_frame(&mut self, at: Instant, latency: Duration) {
        self.frames_processed += 1;
        self.frame_times.push_back(at);
        if self.frame_times.len() > FPS_WINDOW {
            self.frame_times.pop_front();
        }

        self.latency_total += latency;
        self.latency_samples = self.latency_samples.saturating_add(1);
        self.max_latency = self.max_latency.max(latency);
    }

    /// Frames consumed while paused.
    pub fn record_ignored(&mut self) {
        self.frames_ignored += 1;
    }

    pub fn record_triggers(&mut self, count: usize) {
        self.triggers_emitted += count as u64;
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn triggers_emitted(&self) -> u64 {
        self.triggers_emitted
    }

    pub fn fps(&self) -> f64 {
        let (Some(first), Some(last)) = (self.frame_times.front(), self.frame_times.back()) else {
            return 0.0;
        };
        let span = last.saturating_duration_since(*first).as_secs_f64();
        if span <= 0.0 {
            return 0.0;
        }
        (self.frame_times.len() - 1) as f64 / span
    }

    pub fn sample_system_metrics(&mut self) -> SystemMetrics {
        let pid = self.pid;
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        match self.system.process(pid) {
            Some(process) => SystemMetrics {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            },
            None => SystemMetrics::default(),
        }
    }

    /// Build a report and restart the per-interval latency figures.
    pub fn report(&mut self, counters: RelayCounters) -> LoopMetrics {
        let avg_latency = match self.latency_samples {
            0 => Duration::ZERO,
            n => self.latency_total / n,
        };
        let report = LoopMetrics {
            timestamp: Utc::now(),
            frames_processed: self.frames_processed,
            frames_ignored: self.frames_ignored,
            fps: self.fps(),
            avg_latency_us: micros(avg_latency),
            max_latency_us: micros(self.max_latency),
            triggers_emitted: self.triggers_emitted,
            status_dropped: counters.status_dropped,
            events_lost: counters.events_lost,
            pending_actions: counters.pending_actions,
            system: self.sample_system_metrics(),
        };

        self.latency_total = Duration::ZERO;
        self.latency_samples = 0;
        self.max_latency = Duration::ZERO;
        report
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_from_frame_timestamps() {
        let mut metrics = MetricsCollector::new();
        let t0 = Instant::now();
        for i in 0..11 {
            metrics.record_frame(t0 + Duration::from_millis(i * 100), Duration::from_micros(50));
        }
        assert!((metrics.fps() - 10.0).abs() < 0.01);
    }

    #[test]
    fn fps_is_zero_without_a_span() {
        let mut metrics = MetricsCollector::new();
        assert_eq!(metrics.fps(), 0.0);
        metrics.record_frame(Instant::now(), Duration::ZERO);
        assert_eq!(metrics.fps(), 0.0);
    }

    #[test]
    fn report_resets_latency_but_keeps_totals() {
        let mut metrics = MetricsCollector::new();
        let t0 = Instant::now();
        metrics.record_frame(t0, Duration::from_micros(100));
        metrics.record_frame(t0 + Duration::from_millis(33), Duration::from_micros(300));
        metrics.record_triggers(2);
        metrics.record_ignored();

        let first = metrics.report(RelayCounters {
            status_dropped: 3,
            ..RelayCounters::default()
        });
        assert_eq!(first.frames_processed, 2);
        assert_eq!(first.frames_ignored, 1);
        assert_eq!(first.avg_latency_us, 200);
        assert_eq!(first.max_latency_us, 300);
        assert_eq!(first.triggers_emitted, 2);
        assert_eq!(first.status_dropped, 3);

        let second = metrics.report(RelayCounters::default());
        assert_eq!(second.frames_processed, 2);
        assert_eq!(second.avg_latency_us, 0);
        assert_eq!(second.max_latency_us, 0);
    }
}
