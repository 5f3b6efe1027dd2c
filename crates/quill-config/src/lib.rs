//! # Quill Config
//!
//! Configuration management for Quill.
//! Supports layered configuration from files, environment variables,
//! and runtime refresh.

mod app_config;
mod loader;
mod mode;
mod validation;

pub use app_config::*;
pub use loader::*;
pub use mode::*;
pub use validation::*;
