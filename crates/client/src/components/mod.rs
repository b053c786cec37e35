//! Consumers of the live-update coordinator.

pub mod timer_display;

pub use timer_display::{ActionError, TimerAction, TimerDisplay};
