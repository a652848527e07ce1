//! Persisted hook handlers and event listeners.

pub mod hook;
pub mod listener;

pub use hook::{HookRegistration, NewHookRegistration};
pub use listener::{EventListener, NewEventListener};
