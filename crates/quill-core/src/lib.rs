//! # Quill Core
//!
//! Shared error type, result alias and tracing initialisation used by every
//! Quill crate.

pub mod error;
pub mod telemetry;

pub use error::*;
pub use telemetry::{init_tracing, LogFormat};

// Re-export shaku for dependency injection
pub use shaku::Interface;
