use std::time::{Duration, Instant};

use crate::gesture::GestureLabel;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivationOutcome {
    NotActivating,
    /// Hold in progress; fraction in `[0.0, 1.0)`.
    Progressing(f32),
    Activated,
}

/// Strict hold timer: any frame without the activation label restarts it.
#[derive(Debug, Clone)]
pub struct ActivationTimer {
    activation_label: GestureLabel,
    hold_duration: Duration,
    hold_started: Option<Instant>,
}

impl ActivationTimer {
    pub fn new(activation_label: GestureLabel, hold_duration: Duration) -> Self {
        Self {
            activation_label,
            hold_duration,
            hold_started: None,
        }
    }

    pub fn tick(&mut self, label: GestureLabel, now: Instant) -> ActivationOutcome {
        if label != self.activation_label {
            self.hold_started = None;
            return ActivationOutcome::NotActivating;
        }

        let started = *self.hold_started.get_or_insert(now);
        let elapsed = now.saturating_duration_since(started);
        if elapsed >= self.hold_duration {
            self.hold_started = None;
            return ActivationOutcome::Activated;
        }

        ActivationOutcome::Progressing(self.fraction(elapsed))
    }

    /// Current progress without advancing the timer; `None` when no hold is running.
    pub fn progress(&self, now: Instant) -> Option<f32> {
        self.hold_started
            .map(|started| self.fraction(now.saturating_duration_since(started)))
    }

    pub fn is_holding(&self) -> bool {
        self.hold_started.is_some()
    }

    pub fn reset(&mut self) {
        self.hold_started = None;
    }

    fn fraction(&self, elapsed: Duration) -> f32 {
        (elapsed.as_secs_f64() / self.hold_duration.as_secs_f64()).min(1.0) as f32
    }
}
