use std::time::Instant;

use log::{debug, info};

use crate::gesture::{GestureLabel, HandSlot};

use super::{
    activation::{ActivationOutcome, ActivationTimer},
    arbiter::{HandArbiter, HandFrame, HandMode, SlotLabels},
    config::EngineConfig,
    cooldown::CooldownGate,
    stability::StabilityFilter,
    state::{
        duration_ms, ActivationState, FrameOutcome, StatusSnapshot, Transition, TransitionReason,
        TriggerEvent, TriggerSummary,
    },
};

/// Single authoritative owner of activation, stability and cooldown state.
///
/// Driven exclusively by the control loop, once per frame. Observers only ever
/// see [`StatusSnapshot`] copies.
#[derive(Debug, Clone)]
pub struct ActivationStateMachine {
    config: EngineConfig,
    state: ActivationState,
    timer: ActivationTimer,
    filters: [StabilityFilter; 2],
    cooldowns: [CooldownGate; 2],
    arbiter: HandArbiter,
    labels: SlotLabels,
    governing: Option<HandSlot>,
    last_trigger: Option<TriggerEvent>,
}

impl ActivationStateMachine {
    pub fn new(config: EngineConfig) -> Self {
        let frames = config.stability_frames();
        Self {
            state: ActivationState::Inactive,
            timer: ActivationTimer::new(config.activation_label(), config.activation_hold()),
            filters: [StabilityFilter::new(frames), StabilityFilter::new(frames)],
            cooldowns: [CooldownGate::new(), CooldownGate::new()],
            arbiter: HandArbiter::new(config.primary_hand(), config.hand_mode()),
            labels: SlotLabels::default(),
            governing: None,
            last_trigger: None,
            config,
        }
    }

    pub fn state(&self) -> ActivationState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn hand_mode(&self) -> HandMode {
        self.arbiter.mode()
    }

    pub fn set_hand_mode(&mut self, mode: HandMode) {
        if self.arbiter.mode() != mode {
            info!("Hand mode changed to {:?}", mode);
            self.arbiter.set_mode(mode);
        }
    }

    pub fn is_cooling_down(&self, slot: HandSlot, now: Instant) -> bool {
        self.cooldowns[slot.index()].is_active(now)
    }

    /// Run the per-frame pipeline. Never fails; any label sequence is valid input.
    pub fn process(&mut self, frame: &HandFrame) -> FrameOutcome {
        let now = frame.at;
        self.labels = self.arbiter.assign(frame);
        self.governing = self.arbiter.governing_slot(&self.labels);
        let governing_label = self
            .governing
            .map(|slot| self.labels.observed(slot))
            .unwrap_or(GestureLabel::NoGesture);

        // Deactivation outranks activation, stability and cooldown.
        if self.state != ActivationState::Inactive
            && governing_label == self.config.deactivation_label()
        {
            let from = self.state;
            self.clear_pipelines();
            self.state = ActivationState::Inactive;
            let transition = Transition {
                from,
                to: ActivationState::Inactive,
                reason: TransitionReason::DeactivationGesture,
                at: now,
            };
            log_transition(&transition);
            return FrameOutcome {
                transition: Some(transition),
                triggers: Vec::new(),
            };
        }

        match self.state {
            ActivationState::Inactive | ActivationState::Activating => {
                self.advance_activation(governing_label, now)
            }
            ActivationState::Active => FrameOutcome {
                transition: None,
                triggers: self.evaluate_triggers(now),
            },
        }
    }

    /// Return to `Inactive` with every window, timer and cooldown cleared.
    pub fn reset(&mut self, now: Instant) -> Option<Transition> {
        let from = self.state;
        self.clear_pipelines();
        self.state = ActivationState::Inactive;
        self.labels = SlotLabels::default();
        self.governing = None;

        if from == ActivationState::Inactive {
            return None;
        }
        let transition = Transition {
            from,
            to: ActivationState::Inactive,
            reason: TransitionReason::Reset,
            at: now,
        };
        log_transition(&transition);
        Some(transition)
    }

    pub fn snapshot(&self, now: Instant) -> StatusSnapshot {
        let slot_cooldowns_ms = HandSlot::ALL.map(|slot| {
            let gate = &self.cooldowns[slot.index()];
            gate.is_active(now).then(|| duration_ms(gate.remaining(now)))
        });

        StatusSnapshot {
            state: self.state,
            activation_progress: match self.state {
                ActivationState::Activating => self.timer.progress(now),
                _ => None,
            },
            cooldown_remaining_ms: slot_cooldowns_ms.iter().flatten().copied().max(),
            slot_cooldowns_ms,
            governing_slot: self.governing,
            labels: self.labels,
            stability: HandSlot::ALL.map(|slot| self.filters[slot.index()].agreement()),
            hand_mode: self.arbiter.mode(),
            paused: false,
            last_trigger: self
                .last_trigger
                .as_ref()
                .map(|event| TriggerSummary::from_event(event, now)),
        }
    }

    fn advance_activation(&mut self, label: GestureLabel, now: Instant) -> FrameOutcome {
        let from = self.state;
        let (to, reason) = match self.timer.tick(label, now) {
            ActivationOutcome::Activated => {
                // Fresh start for gesture detection.
                for filter in &mut self.filters {
                    filter.reset();
                }
                for gate in &mut self.cooldowns {
                    gate.clear();
                }
                (ActivationState::Active, TransitionReason::ActivationHeld)
            }
            ActivationOutcome::Progressing(_) => {
                (ActivationState::Activating, TransitionReason::ActivationStarted)
            }
            ActivationOutcome::NotActivating => {
                (ActivationState::Inactive, TransitionReason::ActivationInterrupted)
            }
        };

        self.state = to;
        let transition = (from != to).then(|| Transition {
            from,
            to,
            reason,
            at: now,
        });
        if let Some(transition) = &transition {
            log_transition(transition);
        }

        FrameOutcome {
            transition,
            triggers: Vec::new(),
        }
    }

    fn evaluate_triggers(&mut self, now: Instant) -> Vec<TriggerEvent> {
        let eligible = self.arbiter.trigger_slots(self.governing);
        let mut candidates = Vec::with_capacity(eligible.len());

        for slot in HandSlot::ALL {
            let idx = slot.index();
            let shown = self.labels.observed(slot);
            // Poses shown during cooldown, or on a slot that is not being
            // evaluated, must not count toward the next confirmation. A change
            // of pose still re-arms the confirmed one.
            if self.cooldowns[idx].is_active(now) || !eligible.contains(&slot) {
                self.filters[idx].clear_window();
                self.filters[idx].disarm(shown);
                continue;
            }

            let Some(stable) = self.filters[idx].observe(shown) else {
                continue;
            };
            if !self.is_triggerable(stable) {
                debug!("Stable {} on {:?} slot is not a trigger", stable, slot);
                continue;
            }
            candidates.push(TriggerEvent {
                slot,
                hand: self.arbiter.hand_for(slot),
                label: stable,
                at: now,
            });
        }

        let triggers = self.arbiter.merge(candidates);
        for trigger in &triggers {
            let idx = trigger.slot.index();
            self.cooldowns[idx].start(now, self.config.cooldown());
            self.filters[idx].clear_window();
            self.last_trigger = Some(*trigger);
            info!(
                "Trigger: {} on {:?} slot ({} hand)",
                trigger.label,
                trigger.slot,
                trigger.hand.as_str()
            );
        }
        triggers
    }

    fn is_triggerable(&self, label: GestureLabel) -> bool {
        label.is_pose()
            && label != self.config.activation_label()
            && label != self.config.deactivation_label()
    }

    fn clear_pipelines(&mut self) {
        self.timer.reset();
        for filter in &mut self.filters {
            filter.reset();
        }
        for gate in &mut self.cooldowns {
            gate.clear();
        }
    }
}

fn log_transition(transition: &Transition) {
    info!(
        "State {} -> {} ({:?})",
        transition.from.as_str(),
        transition.to.as_str(),
        transition.reason
    );
}
