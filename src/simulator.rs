//! Synthetic frame producers standing in for the camera and classifier.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::engine::HandFrame;
use crate::gesture::GestureLabel;

pub const DEFAULT_FPS: u32 = 30;

/// Poses the random generator picks trigger candidates from.
const CANDIDATES: [GestureLabel; 6] = [
    GestureLabel::OneFinger,
    GestureLabel::TwoFingers,
    GestureLabel::ThreeFingers,
    GestureLabel::RingAndPinky,
    GestureLabel::Pinky,
    GestureLabel::ThumbsUp,
];

/// Both hands held steady for `duration`. `None` means the hand is out of view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScriptStep {
    pub left: Option<GestureLabel>,
    pub right: Option<GestureLabel>,
    pub duration: Duration,
}

impl ScriptStep {
    pub fn idle(secs: f64) -> Self {
        Self::both(None, None, secs)
    }

    pub fn right(label: GestureLabel, secs: f64) -> Self {
        Self::both(None, Some(label), secs)
    }

    pub fn left(label: GestureLabel, secs: f64) -> Self {
        Self::both(Some(label), None, secs)
    }

    pub fn both(left: Option<GestureLabel>, right: Option<GestureLabel>, secs: f64) -> Self {
        Self {
            left,
            right,
            duration: Duration::from_secs_f64(secs.max(0.0)),
        }
    }

    pub fn frame_count(&self, fps: u32) -> usize {
        (self.duration.as_secs_f64() * f64::from(fps)).round() as usize
    }
}

/// Activate, fire a few gestures with each hand, then deactivate.
pub fn demo_script() -> Vec<ScriptStep> {
    use GestureLabel::*;
    vec![
        ScriptStep::idle(0.5),
        ScriptStep::right(OpenPalm, 2.3),
        ScriptStep::right(OneFinger, 0.6),
        ScriptStep::idle(0.3),
        ScriptStep::right(TwoFingers, 1.2),
        ScriptStep::idle(0.4),
        ScriptStep::left(Pinky, 0.8),
        ScriptStep::idle(0.4),
        ScriptStep::both(Some(OneFinger), Some(RingAndPinky), 0.8),
        ScriptStep::idle(0.4),
        ScriptStep::right(ThumbsUp, 0.8),
        ScriptStep::right(Fist, 0.5),
        ScriptStep::idle(0.5),
    ]
}

/// Seeded noise source: random scripts plus per-frame misclassification.
#[derive(Debug)]
pub struct JitterGenerator {
    rng: StdRng,
    /// Probability a single frame's label is replaced by noise.
    noise: f64,
}

impl JitterGenerator {
    pub fn new(seed: u64, noise: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            noise: noise.clamp(0.0, 1.0),
        }
    }

    pub fn random_script(&mut self, total: Duration) -> Vec<ScriptStep> {
        let mut steps = vec![ScriptStep::right(GestureLabel::OpenPalm, 2.3)];
        let mut elapsed = steps[0].duration;

        while elapsed < total {
            let step = match self.rng.gen_range(0..10) {
                0 => ScriptStep::right(GestureLabel::Fist, 0.4),
                1 => ScriptStep::right(GestureLabel::OpenPalm, 2.3),
                2 | 3 => ScriptStep::idle(self.rng.gen_range(0.2..0.8)),
                _ => {
                    let label = CANDIDATES.choose(&mut self.rng).copied();
                    let secs = self.rng.gen_range(0.3..1.5);
                    if self.rng.gen_bool(0.3) {
                        ScriptStep::both(label, None, secs)
                    } else {
                        ScriptStep::both(None, label, secs)
                    }
                }
            };
            elapsed += step.duration;
            steps.push(step);
        }
        steps
    }

    /// Occasionally swap a present hand's label for detector noise, or drop the hand.
    pub fn perturb(&mut self, label: Option<GestureLabel>) -> Option<GestureLabel> {
        let label = label?;
        if !self.rng.gen_bool(self.noise) {
            return Some(label);
        }
        match self.rng.gen_range(0..3) {
            0 => None,
            1 => Some(GestureLabel::Unknown),
            _ => CANDIDATES.choose(&mut self.rng).copied(),
        }
    }
}

/// Plays scripts into the control loop's frame queue at a fixed rate.
pub struct FrameProducer {
    fps: u32,
    jitter: Option<JitterGenerator>,
}

impl FrameProducer {
    pub fn new(fps: u32) -> Self {
        Self {
            fps: fps.max(1),
            jitter: None,
        }
    }

    pub fn with_jitter(mut self, jitter: JitterGenerator) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Returns the number of frames delivered. Stops early when cancelled or
    /// when the loop has closed its end.
    pub async fn play(
        &mut self,
        steps: &[ScriptStep],
        frames: &mpsc::Sender<HandFrame>,
        cancel_token: &CancellationToken,
    ) -> usize {
        let mut ticker = tokio::time::interval(Duration::from_secs(1) / self.fps);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut sent = 0;

        for step in steps {
            for _ in 0..step.frame_count(self.fps) {
                tokio::select! {
                    _ = cancel_token.cancelled() => return sent,
                    _ = ticker.tick() => {}
                }
                let (left, right) = match &mut self.jitter {
                    Some(jitter) => (jitter.perturb(step.left), jitter.perturb(step.right)),
                    None => (step.left, step.right),
                };
                if frames.send(HandFrame::new(Instant::now(), left, right)).await.is_err() {
                    log::debug!("frame queue closed after {sent} frames");
                    return sent;
                }
                sent += 1;
            }
        }
        sent
    }
}
