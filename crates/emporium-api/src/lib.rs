//! # emporium-api
//!
//! Administrative HTTP API for the Emporium plugin runtime, built on Axum.
//!
//! Exposes plugin lifecycle operations (install, enable, disable, guarded
//! uninstall), handler validation, diagnostic hook/event dispatch, and
//! plugin data access under `/api`.

pub mod app;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{build_app, build_runtime, run_server};
pub use error::ApiError;
pub use state::AppState;
