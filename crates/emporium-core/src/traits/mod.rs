//! Core traits defined in `emporium-core` and implemented by other crates.

pub mod storage;

pub use storage::{AssetEntry, AssetStorage};
