//! Plugin-scoped key/value data.

pub mod model;

pub use model::{DEFAULT_DATA_TYPE, PluginDataEntry};
