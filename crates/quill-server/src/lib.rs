//! # Quill Server Library
//!
//! Process wiring for the `quill-server` binary: the REST API, the worker
//! pool, and the webhook handler that forwards jobs to collaborator services.

pub mod app;
pub mod startup;
pub mod webhook;
