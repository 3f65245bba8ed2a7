pub mod action;
pub mod label;

pub use action::Action;
pub use label::{GestureLabel, Hand, HandSlot};
