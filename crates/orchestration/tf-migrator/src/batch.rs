//! Per-unit batch buffering and submission of tier changes.

use std::sync::Arc;
use tf_error::{Result, TierChangeError};
use tracing::{debug, info, trace};

use crate::namespace::TierChanger;
use crate::stats::TierCounters;
use crate::tier::Tier;

/// Accumulates eligible object paths until the flush threshold is reached.
///
/// Each scan unit owns one accumulator, so a batch never mixes objects from
/// different prefixes and never holds more than `threshold` paths.
#[derive(Debug)]
pub struct BatchAccumulator {
    items: Vec<String>,
    threshold: usize,
}

impl BatchAccumulator {
    /// Create an accumulator flushing at `threshold` paths (at least one).
    pub fn new(threshold: usize) -> Self {
        let threshold = threshold.max(1);
        Self {
            items: Vec::with_capacity(threshold),
            threshold,
        }
    }

    /// Add a path.
    ///
    /// Returns the full batch once the threshold is reached; the accumulator
    /// is empty afterwards.
    pub fn push(&mut self, path: String) -> Option<Vec<String>> {
        self.items.push(path);
        if self.items.len() >= self.threshold {
            trace!(batch_size = self.items.len(), "Flush threshold reached");
            Some(std::mem::replace(
                &mut self.items,
                Vec::with_capacity(self.threshold),
            ))
        } else {
            None
        }
    }

    /// Take whatever is buffered, if anything.
    pub fn take_remaining(&mut self) -> Option<Vec<String>> {
        if self.items.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.items))
        }
    }

    /// Number of buffered paths.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Flush threshold.
    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

/// Sends flushed batches to the tier changer.
///
/// In preview mode batches are logged and counted but never sent.
#[derive(Clone)]
pub struct BatchSubmitter {
    changer: Arc<dyn TierChanger>,
    target: Tier,
    dry_run: bool,
    max_batch: usize,
    counters: Arc<TierCounters>,
}

impl BatchSubmitter {
    /// Create a submitter moving objects to `target`.
    pub fn new(
        changer: Arc<dyn TierChanger>,
        target: Tier,
        max_batch: usize,
        counters: Arc<TierCounters>,
    ) -> Self {
        Self {
            changer,
            target,
            dry_run: false,
            max_batch,
            counters,
        }
    }

    /// Enable or disable preview mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Target tier of every submitted batch.
    pub fn target(&self) -> Tier {
        self.target
    }

    /// Submit one batch.
    pub async fn submit(&self, paths: Vec<String>) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        if paths.len() > self.max_batch {
            return Err(TierChangeError::TooLarge {
                size: paths.len(),
                limit: self.max_batch,
            }
            .into());
        }

        info!(
            batch_size = paths.len(),
            target_tier = %self.target,
            what_if = self.dry_run,
            "Sending batch"
        );

        if self.dry_run {
            debug!(first = %paths[0], "Preview only, batch not sent");
        } else {
            self.changer.set_tier(&paths, self.target).await?;
        }

        self.counters.record_batch(paths.len());
        Ok(())
    }
}

impl std::fmt::Debug for BatchSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSubmitter")
            .field("target", &self.target)
            .field("dry_run", &self.dry_run)
            .field("max_batch", &self.max_batch)
            .finish()
    }
}
