//! # emporium-entity
//!
//! Entity models for the Emporium plugin runtime. Every struct in this
//! crate represents a database table row or a value object embedded in
//! one. Database entities additionally derive `sqlx::FromRow`.

pub mod audit;
pub mod backup;
pub mod data;
pub mod handler;
pub mod plugin;
