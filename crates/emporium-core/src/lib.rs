//! # emporium-core
//!
//! Core crate for the Emporium plugin runtime. Contains configuration
//! schemas, the asset storage trait, and the unified error system.
//!
//! This crate has **no** internal dependencies on other Emporium crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;

pub use error::AppError;
pub use result::AppResult;
