//! Job handler contract.

use crate::error::{JobError, JobResult};
use crate::job::Job;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Does the actual work for a claimed job.
///
/// `Ok` completes the job with the optional result. `Err` goes through the
/// retry policy with the error's message recorded on the job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> JobResult<Option<Value>>;
}

#[async_trait]
impl<H: JobHandler + ?Sized> JobHandler for Arc<H> {
    async fn handle(&self, job: &Job) -> JobResult<Option<Value>> {
        (**self).handle(job).await
    }
}

/// Handler backed by an async closure. See [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
}

/// Adapts an async closure into a [`JobHandler`].
///
/// ```rust,ignore
/// let handler = handler_fn(|job: Job| async move {
///     Ok(Some(json!({ "echo": job.payload })))
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Job) -> Fut + Send + Sync,
    Fut: Future<Output = JobResult<Option<Value>>> + Send,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(Job) -> Fut + Send + Sync,
    Fut: Future<Output = JobResult<Option<Value>>> + Send,
{
    async fn handle(&self, job: &Job) -> JobResult<Option<Value>> {
        (self.f)(job.clone()).await
    }
}

/// Dispatches jobs to a handler by job type.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the handler for a job type, replacing any previous one.
    pub fn register(mut self, job_type: impl Into<String>, handler: impl JobHandler + 'static) -> Self {
        self.handlers.insert(job_type.into(), Arc::new(handler));
        self
    }

    /// Returns true if a handler exists for the job type.
    pub fn handles(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Registered job types.
    pub fn job_types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

#[async_trait]
impl JobHandler for HandlerRegistry {
    async fn handle(&self, job: &Job) -> JobResult<Option<Value>> {
        match self.handlers.get(&job.job_type) {
            Some(handler) => handler.handle(job).await,
            None => Err(JobError::ExecutionFailed(format!(
                "no handler registered for job type '{}'",
                job.job_type
            ))),
        }
    }
}
