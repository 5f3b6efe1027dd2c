//! Store key layout.

use crate::job::Priority;

/// Key builder for the job queue.
#[derive(Debug, Clone)]
pub struct QueueKeys {
    prefix: String,
}

impl QueueKeys {
    /// Create a new key builder with the given prefix.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Job record key (string: JSON).
    pub fn job(&self, job_id: &str) -> String {
        format!("{}:job:{}", self.prefix, job_id)
    }

    /// Priority queue key (sorted set: job_id scored by eligibility time).
    pub fn queue(&self, priority: Priority) -> String {
        format!("{}:queue:{}", self.prefix, priority)
    }

    /// Processing set key (sorted set: job_id scored by claim time).
    pub fn processing(&self) -> String {
        format!("{}:processing", self.prefix)
    }

    /// Lease key (string: owning worker ID).
    pub fn lock(&self, job_id: &str) -> String {
        format!("{}:lock:{}", self.prefix, job_id)
    }

    /// Stats counters key (hash).
    pub fn stats(&self) -> String {
        format!("{}:stats", self.prefix)
    }

    /// Batch record key (string: JSON).
    pub fn batch(&self, batch_id: &str) -> String {
        format!("{}:batch:{}", self.prefix, batch_id)
    }
}

impl Default for QueueKeys {
    fn default() -> Self {
        Self::new("quill:jobs")
    }
}
