//! Permit pool bounding how many scan units list and batch at once.

use std::sync::Arc;
use tf_error::{Result, TfError};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

/// Counting permit pool shared by every scan unit of a run.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

/// A held scan permit. Dropping it returns the permit to the pool.
#[derive(Debug)]
pub struct ScanPermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    /// Create a limiter with `limit` permits, clamped to `1..=Semaphore::MAX_PERMITS`.
    pub fn new(limit: usize) -> Self {
        let limit = limit.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Wait for a permit.
    ///
    /// Returns [`TfError::Cancelled`] as soon as `cancel` fires, even while
    /// all permits are held.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<ScanPermit> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TfError::Cancelled),
            permit = self.semaphore.clone().acquire_owned() => permit
                .map(|permit| ScanPermit { _permit: permit })
                .map_err(|e| TfError::Config(format!("Failed to acquire scan permit: {e}"))),
        }
    }

    /// Total number of permits.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Permits currently free.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Permits currently held by scan units.
    pub fn in_use(&self) -> usize {
        self.limit - self.available()
    }
}
