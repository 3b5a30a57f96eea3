//! Configuration management for the querybox sandbox
//!
//! This crate provides centralized configuration loading and management
//! for different environments (development, production, etc.).

pub mod environment;
pub mod loader;
pub mod types;

pub use environment::Environment;
pub use loader::{ConfigError, ConfigLoader};
pub use types::*;
