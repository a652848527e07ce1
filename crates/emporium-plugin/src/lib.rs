//! # emporium-plugin
//!
//! Plugin runtime for Emporium. Provides:
//!
//! - Dynamic code loader turning persisted Rhai source into sandboxed callables
//! - Hook dispatcher with priority-ordered filter/pipeline semantics
//! - Event bus with fire-and-await-all notify semantics
//! - Plugin registry with dependents and in-use queries
//! - Plugin-scoped key/value data store
//! - Lifecycle manager: install, enable, disable, and guarded uninstall
//!   with backup and cleanup

pub mod backup;
pub mod data;
pub mod error;
pub mod events;
pub mod hooks;
pub mod lifecycle;
pub mod loader;
pub mod manager;
pub mod registry;
pub mod tracker;

pub use backup::{BackupSnapshot, BackupWriter};
pub use data::PluginDataStore;
pub use error::{HandlerFailure, LoadError, PluginError, PluginResult};
pub use events::{EmitReport, EventBus};
pub use hooks::{DispatchReport, HookContext, HookDispatcher};
pub use lifecycle::{InstallRequest, LifecycleManager, UninstallReport};
pub use loader::{LoaderLimits, ScriptLoader};
pub use manager::PluginManager;
pub use registry::{HandlerKind, InvalidHandler, PluginRegistry};
pub use tracker::ResourceTracker;
