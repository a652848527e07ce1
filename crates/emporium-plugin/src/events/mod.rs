//! Event system: notify-style delivery to persisted listeners.

pub mod bus;

pub use bus::{EmitReport, EventBus};
