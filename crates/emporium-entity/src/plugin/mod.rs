//! Plugin entity, manifest, and status.

pub mod manifest;
pub mod model;
pub mod status;

pub use manifest::{DataCleanupDirective, PluginManifest};
pub use model::{NewPlugin, Plugin};
pub use status::PluginStatus;
