use std::time::{Duration, Instant};

/// Post-trigger throttle. Purely a comparison of `now` against a stored deadline.
#[derive(Debug, Clone, Default)]
pub struct CooldownGate {
    deadline: Option<Instant>,
}

impl CooldownGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, now: Instant, duration: Duration) {
        self.deadline = Some(now + duration);
    }

    pub fn is_active(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if now < deadline)
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    pub fn clear(&mut self) {
        self.deadline = None;
    }
}
