//! Queue counters.

use crate::error::JobResult;
use crate::keys::QueueKeys;
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One field of the stats hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Total,
}

impl Counter {
    /// Hash field name.
    pub fn field(self) -> &'static str {
        match self {
            Counter::Pending => "pending",
            Counter::Processing => "processing",
            Counter::Completed => "completed",
            Counter::Failed => "failed",
            Counter::Cancelled => "cancelled",
            Counter::Total => "total",
        }
    }
}

/// Snapshot of the queue counters.
///
/// Counters are updated incrementally next to each transition, not in the
/// same atomic step, so a snapshot may be briefly stale. Negative drift is
/// reported as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub total: u64,
}

/// Literal sizes of the queue's sorted sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepths {
    /// Members per priority level, keyed by level.
    pub levels: BTreeMap<u8, u64>,
    /// Members of the processing set.
    pub processing: u64,
}

impl QueueDepths {
    /// Jobs waiting across all levels, delayed retries included.
    pub fn total_pending(&self) -> u64 {
        self.levels.values().sum()
    }
}

/// Incremental counters in the `{prefix}:stats` hash.
#[derive(Clone)]
pub struct StatsCounters {
    store: Arc<dyn Store>,
    key: String,
}

impl StatsCounters {
    pub fn new(store: Arc<dyn Store>, keys: &QueueKeys) -> Self {
        Self {
            store,
            key: keys.stats(),
        }
    }

    /// Applies a set of counter deltas.
    pub async fn apply(&self, deltas: &[(Counter, i64)]) -> JobResult<()> {
        for (counter, delta) in deltas {
            self.store
                .hash_increment(&self.key, counter.field(), *delta)
                .await?;
        }
        Ok(())
    }

    /// Reads the current counters.
    pub async fn snapshot(&self) -> JobResult<QueueStats> {
        let fields = self.store.hash_get_all(&self.key).await?;
        let read = |counter: Counter| {
            fields
                .get(counter.field())
                .map_or(0, |value| u64::try_from(*value).unwrap_or(0))
        };

        Ok(QueueStats {
            pending: read(Counter::Pending),
            processing: read(Counter::Processing),
            completed: read(Counter::Completed),
            failed: read(Counter::Failed),
            cancelled: read(Counter::Cancelled),
            total: read(Counter::Total),
        })
    }
}
