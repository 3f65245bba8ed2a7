use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};

use crate::control::ControlConfig;
use crate::engine::EngineConfig;
use crate::gesture::{GestureLabel, Hand};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ActivationSettings {
    pub hold_secs: f64,
    pub cooldown_secs: f64,
    pub stability_frames: usize,
    pub activation_label: GestureLabel,
    pub deactivation_label: GestureLabel,
}

impl Default for ActivationSettings {
    fn default() -> Self {
        Self {
            hold_secs: 2.0,
            cooldown_secs: 1.0,
            stability_frames: 10,
            activation_label: GestureLabel::OpenPalm,
            deactivation_label: GestureLabel::Fist,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HandSettings {
    pub primary: Hand,
    pub two_hand_mode: bool,
}

impl Default for HandSettings {
    fn default() -> Self {
        Self {
            primary: Hand::Right,
            two_hand_mode: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelaySettings {
    pub status_capacity: usize,
    pub event_capacity: usize,
    pub command_capacity: usize,
    pub trigger_backpressure_ms: u64,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            status_capacity: 64,
            event_capacity: 32,
            command_capacity: 16,
            trigger_backpressure_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoopSettings {
    pub refresh_interval_ms: u64,
    pub metrics_interval_ms: u64,
    pub stop_timeout_ms: u64,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 100,
            metrics_interval_ms: 1000,
            stop_timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub activation: ActivationSettings,
    pub hands: HandSettings,
    pub relay: RelaySettings,
    pub control_loop: LoopSettings,
}

impl Settings {
    /// Read settings from `path`. A missing or unparsable file falls back to
    /// defaults; value validation happens when the configs are built.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        match serde_json::from_str(&contents) {
            Ok(settings) => Ok(settings),
            Err(err) => {
                warn!(
                    "Could not parse settings at {} ({err}); using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn engine_config(&self) -> Result<EngineConfig> {
        EngineConfig::from_settings(&self.activation, &self.hands)
            .context("invalid activation settings")
    }

    pub fn control_config(&self) -> Result<ControlConfig> {
        let relay = &self.relay;
        for (name, capacity) in [
            ("relay.status_capacity", relay.status_capacity),
            ("relay.event_capacity", relay.event_capacity),
            ("relay.command_capacity", relay.command_capacity),
        ] {
            if capacity == 0 {
                bail!("{name} must be greater than zero");
            }
        }

        let lp = &self.control_loop;
        for (name, value) in [
            ("relay.trigger_backpressure_ms", relay.trigger_backpressure_ms),
            ("control_loop.refresh_interval_ms", lp.refresh_interval_ms),
            ("control_loop.metrics_interval_ms", lp.metrics_interval_ms),
            ("control_loop.stop_timeout_ms", lp.stop_timeout_ms),
        ] {
            if value == 0 {
                bail!("{name} must be greater than zero");
            }
        }

        Ok(ControlConfig {
            status_capacity: relay.status_capacity,
            event_capacity: relay.event_capacity,
            command_capacity: relay.command_capacity,
            trigger_backpressure: Duration::from_millis(relay.trigger_backpressure_ms),
            refresh_interval: Duration::from_millis(lp.refresh_interval_ms),
            metrics_interval: Duration::from_millis(lp.metrics_interval_ms),
            stop_timeout: Duration::from_millis(lp.stop_timeout_ms),
        })
    }
}
