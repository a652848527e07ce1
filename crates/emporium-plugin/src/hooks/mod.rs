//! Hook system: filter/pipeline dispatch over persisted handlers.

pub mod context;
pub mod dispatcher;

pub use context::HookContext;
pub use dispatcher::{DispatchReport, HookDispatcher};
