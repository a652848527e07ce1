//! PostgreSQL implementations of the persistence ports.

pub mod plugin;
pub mod plugin_data;
pub mod schema;

pub use plugin::PluginRepository;
pub use plugin_data::PluginDataRepositoryPg;
pub use schema::SchemaRepository;
