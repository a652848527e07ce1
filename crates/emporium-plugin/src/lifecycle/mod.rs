//! Plugin lifecycle management.

pub mod cleanup;
pub mod manager;
pub mod package;

pub use cleanup::{SYSTEM_TABLES, TableGuard, TablePlan};
pub use manager::{LifecycleManager, UninstallReport};
pub use package::{HookSource, InstallRequest, ListenerSource};
