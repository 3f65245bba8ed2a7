pub mod activation;
pub mod arbiter;
pub mod config;
pub mod cooldown;
pub mod machine;
pub mod stability;
pub mod state;

pub use activation::{ActivationOutcome, ActivationTimer};
pub use arbiter::{HandArbiter, HandFrame, HandMode, SlotLabels};
pub use config::EngineConfig;
pub use cooldown::CooldownGate;
pub use machine::ActivationStateMachine;
pub use stability::StabilityFilter;
pub use state::{
    ActivationState, FrameOutcome, StatusSnapshot, Transition, TransitionReason, TriggerEvent,
    TriggerSummary,
};
