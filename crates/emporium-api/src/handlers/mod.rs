//! Route handlers organized by domain.

pub mod data;
pub mod dispatch;
pub mod health;
pub mod plugins;
