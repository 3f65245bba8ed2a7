use anyhow::{anyhow, bail, Result};
use std::time::Duration;

use crate::gesture::{GestureLabel, Hand};
use crate::settings::{ActivationSettings, HandSettings};

use super::arbiter::HandMode;

/// Timing and label configuration for one state-machine instance.
///
/// Immutable once built; every constructor validates, so a value of this type
/// always has well-defined timing semantics.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    activation_hold: Duration,
    cooldown: Duration,
    stability_frames: usize,
    activation_label: GestureLabel,
    deactivation_label: GestureLabel,
    primary_hand: Hand,
    hand_mode: HandMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            activation_hold: Duration::from_secs(2),
            cooldown: Duration::from_secs(1),
            stability_frames: 10,
            activation_label: GestureLabel::OpenPalm,
            deactivation_label: GestureLabel::Fist,
            primary_hand: Hand::Right,
            hand_mode: HandMode::TwoHand,
        }
    }
}

impl EngineConfig {
    pub fn from_settings(activation: &ActivationSettings, hands: &HandSettings) -> Result<Self> {
        let config = Self {
            activation_hold: secs_to_duration("activation.hold_secs", activation.hold_secs)?,
            cooldown: secs_to_duration("activation.cooldown_secs", activation.cooldown_secs)?,
            stability_frames: activation.stability_frames,
            activation_label: activation.activation_label,
            deactivation_label: activation.deactivation_label,
            primary_hand: hands.primary,
            hand_mode: if hands.two_hand_mode {
                HandMode::TwoHand
            } else {
                HandMode::SingleHand
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Defaults with the three timing knobs replaced.
    pub fn with_timing(
        activation_hold: Duration,
        cooldown: Duration,
        stability_frames: usize,
    ) -> Result<Self> {
        let config = Self {
            activation_hold,
            cooldown,
            stability_frames,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_primary_hand(mut self, hand: Hand) -> Self {
        self.primary_hand = hand;
        self
    }

    pub fn with_hand_mode(mut self, mode: HandMode) -> Self {
        self.hand_mode = mode;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.activation_hold.is_zero() {
            bail!("activation hold duration must be greater than zero");
        }
        if self.cooldown.is_zero() {
            bail!("cooldown duration must be greater than zero");
        }
        if self.stability_frames == 0 {
            bail!("stability window must be at least one frame");
        }
        for (name, label) in [
            ("activation", self.activation_label),
            ("deactivation", self.deactivation_label),
        ] {
            if !label.is_pose() {
                bail!("{name} label must be a real pose, got {label}");
            }
        }
        if self.activation_label == self.deactivation_label {
            bail!(
                "activation and deactivation labels must differ (both are {})",
                self.activation_label
            );
        }
        Ok(())
    }

    pub fn activation_hold(&self) -> Duration {
        self.activation_hold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn stability_frames(&self) -> usize {
        self.stability_frames
    }

    pub fn activation_label(&self) -> GestureLabel {
        self.activation_label
    }

    pub fn deactivation_label(&self) -> GestureLabel {
        self.deactivation_label
    }

    pub fn primary_hand(&self) -> Hand {
        self.primary_hand
    }

    pub fn hand_mode(&self) -> HandMode {
        self.hand_mode
    }
}

pub(crate) fn secs_to_duration(field: &str, secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        bail!("{field} must be a positive number of seconds, got {secs}");
    }
    Duration::try_from_secs_f64(secs).map_err(|err| anyhow!("{field} is out of range: {err}"))
}
