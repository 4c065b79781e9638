//! I/O helpers: filesystem discovery, archive ingestion, config.

pub mod archive;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod scaffold;
