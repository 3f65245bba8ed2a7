use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::gesture::{GestureLabel, Hand, HandSlot};

use super::arbiter::{HandMode, SlotLabels};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ActivationState {
    Inactive,
    Activating,
    /// Cooldown is an attribute of `Active`, not a separate state.
    Active,
}

impl Default for ActivationState {
    fn default() -> Self {
        ActivationState::Inactive
    }
}

impl ActivationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationState::Inactive => "INACTIVE",
            ActivationState::Activating => "ACTIVATING",
            ActivationState::Active => "ACTIVE",
        }
    }
}

/// A stable gesture accepted as a deliberate user decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerEvent {
    pub slot: HandSlot,
    pub hand: Hand,
    pub label: GestureLabel,
    pub at: Instant,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransitionReason {
    ActivationStarted,
    ActivationInterrupted,
    ActivationHeld,
    DeactivationGesture,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ActivationState,
    pub to: ActivationState,
    pub reason: TransitionReason,
    pub at: Instant,
}

/// Everything one call to `ActivationStateMachine::process` decided.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameOutcome {
    pub transition: Option<Transition>,
    pub triggers: Vec<TriggerEvent>,
}

impl FrameOutcome {
    pub fn is_quiet(&self) -> bool {
        self.transition.is_none() && self.triggers.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSummary {
    pub slot: HandSlot,
    pub hand: Hand,
    pub label: GestureLabel,
    pub age_ms: u64,
}

impl TriggerSummary {
    pub fn from_event(event: &TriggerEvent, now: Instant) -> Self {
        Self {
            slot: event.slot,
            hand: event.hand,
            label: event.label,
            age_ms: duration_ms(now.saturating_duration_since(event.at)),
        }
    }
}

/// Read-only copy of the machine handed to observers.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub state: ActivationState,
    /// Present only while `Activating`.
    pub activation_progress: Option<f32>,
    /// Longest remaining cooldown across slots; `None` when no slot is cooling down.
    pub cooldown_remaining_ms: Option<u64>,
    pub slot_cooldowns_ms: [Option<u64>; 2],
    pub governing_slot: Option<HandSlot>,
    pub labels: SlotLabels,
    /// Share of each slot's stability window agreeing with its newest label.
    pub stability: [f32; 2],
    pub hand_mode: HandMode,
    /// Set by the control loop; the machine itself is never paused.
    pub paused: bool,
    pub last_trigger: Option<TriggerSummary>,
}

impl StatusSnapshot {
    pub fn in_cooldown(&self) -> bool {
        self.cooldown_remaining_ms.is_some()
    }
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
