//! # Quill REST
//!
//! REST API layer using Axum for Quill.
//! Exposes the producer side of the job queue plus health and metrics endpoints.

pub mod controllers;
pub mod extractors;
pub mod middleware;
pub mod responses;
pub mod router;
pub mod state;

pub use router::*;
pub use state::*;
