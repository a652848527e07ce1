//! # emporium-database
//!
//! Persistence for the plugin runtime. The runtime talks to the
//! [`store`] traits; this crate provides a PostgreSQL implementation
//! (via sqlx, with embedded migrations) and an in-memory implementation
//! for embedded setups and tests.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use memory::MemoryStore;
pub use store::{
    ForeignKey, PluginDataRepository, PluginStore, SchemaManager, StoreSet, ensure_safe_identifier,
    is_safe_identifier,
};
