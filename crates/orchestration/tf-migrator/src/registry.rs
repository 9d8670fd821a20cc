//! Bookkeeping for pending prefixes and running scan units.

use futures::FutureExt;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tf_error::{Result, TfError};
use tokio::task::JoinSet;

use crate::scanner::UnitReport;

/// Outcome of one scan unit, tagged with its prefix.
pub type UnitOutcome = (String, Result<UnitReport>);

/// Pending prefixes (FIFO) plus the set of running scan unit tasks.
///
/// A run is complete exactly when [`ScanRegistry::is_idle`] holds: nothing
/// queued and nothing running.
#[derive(Debug, Default)]
pub struct ScanRegistry {
    pending: VecDeque<String>,
    running: JoinSet<UnitOutcome>,
    discovered: u64,
    started: u64,
    finished: u64,
}

impl ScanRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a prefix for scanning.
    pub fn enqueue(&mut self, prefix: String) {
        self.discovered += 1;
        self.pending.push_back(prefix);
    }

    /// Take the oldest queued prefix.
    pub fn pop_pending(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Drop every queued prefix, returning how many were dropped.
    pub fn clear_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Spawn a scan unit on the current runtime.
    ///
    /// A panic inside the unit is caught and reported as an error for its prefix.
    pub fn spawn<F>(&mut self, prefix: String, unit: F)
    where
        F: Future<Output = Result<UnitReport>> + Send + 'static,
    {
        self.started += 1;
        self.running.spawn(async move {
            let result = AssertUnwindSafe(unit)
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(anyhow::anyhow!("scan unit panicked").into()));
            (prefix, result)
        });
    }

    /// Wait for the next unit to finish.
    ///
    /// Returns `None` when nothing is running.
    pub async fn join_next(&mut self) -> Option<UnitOutcome> {
        let joined = self.running.join_next().await?;
        self.finished += 1;
        Some(joined.unwrap_or_else(|e| {
            (
                String::new(),
                Err(TfError::Other(anyhow::anyhow!("scan unit task failed: {e}"))),
            )
        }))
    }

    /// Number of units currently running.
    pub fn running(&self) -> usize {
        self.running.len()
    }

    /// Whether nothing is queued and nothing is running.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.running.is_empty()
    }

    /// Prefixes ever queued.
    pub fn discovered(&self) -> u64 {
        self.discovered
    }

    /// Units ever spawned.
    pub fn started(&self) -> u64 {
        self.started
    }

    /// Units joined so far.
    pub fn finished(&self) -> u64 {
        self.finished
    }
}
