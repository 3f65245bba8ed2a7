//! Merges the two per-hand pipelines into one decision per frame.
//!
//! The primary slot governs activation and deactivation whenever it is
//! present; otherwise the secondary slot governs for that frame. Authority is
//! re-evaluated every frame. Triggers from both slots are independent, except
//! that an identical label confirmed on both slots in the same frame is
//! emitted once, by the primary slot.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::gesture::{GestureLabel, Hand, HandSlot};

use super::state::TriggerEvent;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum HandMode {
    /// Both slots may trigger independently.
    TwoHand,
    /// Only the governing slot is evaluated for triggers.
    SingleHand,
}

impl Default for HandMode {
    fn default() -> Self {
        HandMode::TwoHand
    }
}

/// Raw classifier output for one camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct HandFrame {
    pub at: Instant,
    pub left: Option<GestureLabel>,
    pub right: Option<GestureLabel>,
}

impl HandFrame {
    pub fn new(at: Instant, left: Option<GestureLabel>, right: Option<GestureLabel>) -> Self {
        Self { at, left, right }
    }

    pub fn empty(at: Instant) -> Self {
        Self::new(at, None, None)
    }

    pub fn hand(&self, hand: Hand) -> Option<GestureLabel> {
        match hand {
            Hand::Left => self.left,
            Hand::Right => self.right,
        }
    }
}

/// Frame labels rearranged by slot. `None` means the hand is absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotLabels {
    pub primary: Option<GestureLabel>,
    pub secondary: Option<GestureLabel>,
}

impl SlotLabels {
    pub fn get(&self, slot: HandSlot) -> Option<GestureLabel> {
        match slot {
            HandSlot::Primary => self.primary,
            HandSlot::Secondary => self.secondary,
        }
    }

    /// Label a pipeline should observe: absence reads as `NoGesture`.
    pub fn observed(&self, slot: HandSlot) -> GestureLabel {
        self.get(slot).unwrap_or(GestureLabel::NoGesture)
    }
}

#[derive(Debug, Clone)]
pub struct HandArbiter {
    primary_hand: Hand,
    mode: HandMode,
}

impl HandArbiter {
    pub fn new(primary_hand: Hand, mode: HandMode) -> Self {
        Self { primary_hand, mode }
    }

    pub fn mode(&self) -> HandMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: HandMode) {
        self.mode = mode;
    }

    pub fn hand_for(&self, slot: HandSlot) -> Hand {
        match slot {
            HandSlot::Primary => self.primary_hand,
            HandSlot::Secondary => self.primary_hand.other(),
        }
    }

    pub fn assign(&self, frame: &HandFrame) -> SlotLabels {
        SlotLabels {
            primary: frame.hand(self.hand_for(HandSlot::Primary)),
            secondary: frame.hand(self.hand_for(HandSlot::Secondary)),
        }
    }

    pub fn governing_slot(&self, labels: &SlotLabels) -> Option<HandSlot> {
        if labels.primary.is_some() {
            Some(HandSlot::Primary)
        } else if labels.secondary.is_some() {
            Some(HandSlot::Secondary)
        } else {
            None
        }
    }

    /// Slots whose stable gestures may become triggers this frame, in priority order.
    pub fn trigger_slots(&self, governing: Option<HandSlot>) -> Vec<HandSlot> {
        match self.mode {
            HandMode::TwoHand => HandSlot::ALL.to_vec(),
            HandMode::SingleHand => governing.into_iter().collect(),
        }
    }

    /// Collapse same-frame candidates; `candidates` must be in slot priority order.
    pub fn merge(&self, candidates: Vec<TriggerEvent>) -> Vec<TriggerEvent> {
        let mut merged: Vec<TriggerEvent> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if merged.iter().any(|kept| kept.label == candidate.label) {
                log::debug!(
                    "Dropping duplicate {} from {:?} slot; already triggered this frame",
                    candidate.label,
                    candidate.slot
                );
                continue;
            }
            merged.push(candidate);
        }
        merged
    }
}
