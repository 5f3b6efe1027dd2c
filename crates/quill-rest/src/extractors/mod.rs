//! Custom Axum extractors.

mod json;

pub use json::ApiJson;
