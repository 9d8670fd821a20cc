//! Scan units: list one prefix, count its objects, batch the eligible ones.

use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tf_error::{ListingError, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::batch::{BatchAccumulator, BatchSubmitter};
use crate::config::MigrationConfig;
use crate::limiter::ScanPermit;
use crate::namespace::Namespace;
use crate::stats::TierCounters;
use crate::tier::{ListingEntry, ObjectRecord, Tier};

/// What a scan unit does with one listed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Not a block object; ignored entirely
    Skip,
    /// Counted in its tier only
    Count,
    /// Counted and queued for a tier change
    Eligible,
    /// Archived and already rehydrating to the given tier; counted, never queued
    PendingRehydration(Tier),
}

/// Decide how an object is treated when migrating out of `source`.
pub fn classify(record: &ObjectRecord, source: Tier) -> Disposition {
    if !record.kind.is_block() {
        return Disposition::Skip;
    }
    match (record.tier, record.pending_rehydration) {
        (Tier::Archive, Some(target)) => Disposition::PendingRehydration(target),
        (tier, _) if tier == source => Disposition::Eligible,
        _ => Disposition::Count,
    }
}

/// State shared by every scan unit of a run.
#[derive(Clone)]
pub struct ScanContext {
    namespace: Arc<dyn Namespace>,
    submitter: BatchSubmitter,
    counters: Arc<TierCounters>,
    config: Arc<MigrationConfig>,
    discovered: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl ScanContext {
    pub fn new(
        namespace: Arc<dyn Namespace>,
        submitter: BatchSubmitter,
        counters: Arc<TierCounters>,
        config: Arc<MigrationConfig>,
        discovered: mpsc::UnboundedSender<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            namespace,
            submitter,
            counters,
            config,
            discovered,
            cancel,
        }
    }
}

/// Summary of one finished scan unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnitReport {
    pub prefix: String,
    /// Block objects counted
    pub objects: u64,
    /// Objects queued for a tier change
    pub eligible: u64,
    /// Deeper prefixes handed to the driver
    pub sub_prefixes: u64,
    /// Batches flushed by this unit
    pub batches: u64,
    /// Listing stopped early because the run was cancelled
    pub cancelled: bool,
}

/// One in-flight scan of exactly one prefix.
///
/// The unit owns its batch buffer and its concurrency permit; both are
/// released when [`ScanUnit::run`] returns, whatever the outcome.
pub struct ScanUnit {
    prefix: String,
    buffer: BatchAccumulator,
    permit: ScanPermit,
    ctx: ScanContext,
}

impl ScanUnit {
    pub fn new(prefix: String, permit: ScanPermit, ctx: ScanContext) -> Self {
        let buffer = BatchAccumulator::new(ctx.config.batch_flush_threshold);
        Self {
            prefix,
            buffer,
            permit,
            ctx,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// List the prefix to exhaustion.
    ///
    /// Cancellation is checked before every entry; once observed the unit
    /// stops listing, skips its trailing flush and returns a report with
    /// `cancelled` set.
    pub async fn run(self) -> Result<UnitReport> {
        let ScanUnit {
            prefix,
            mut buffer,
            permit,
            ctx,
        } = self;
        let source = ctx.config.source_tier;
        let mut report = UnitReport {
            prefix: prefix.clone(),
            ..Default::default()
        };

        debug!("Scanning prefix");
        let mut listing = ctx.namespace.list(&prefix, &ctx.config.delimiter);

        loop {
            let entry = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                entry = listing.next() => entry,
            };
            let Some(entry) = entry else {
                break;
            };

            match entry? {
                ListingEntry::Prefix(sub_prefix) => {
                    if sub_prefix.len() <= prefix.len() || !sub_prefix.starts_with(&prefix) {
                        return Err(ListingError::InvalidEntry {
                            prefix: prefix.clone(),
                            message: format!("'{sub_prefix}' is not a deeper prefix"),
                        }
                        .into());
                    }
                    trace!(sub_prefix = %sub_prefix, "Discovered prefix");
                    report.sub_prefixes += 1;
                    if ctx.discovered.send(sub_prefix).is_err() {
                        // Driver is gone, nothing will pick up further work
                        report.cancelled = true;
                        break;
                    }
                }
                ListingEntry::Object(record) => {
                    let disposition = classify(&record, source);
                    if disposition == Disposition::Skip {
                        trace!(
                            path = %record.path,
                            kind = ?record.kind,
                            "Skipping non-block object"
                        );
                        continue;
                    }

                    report.objects += 1;
                    ctx.counters.record_object(record.tier, record.size_bytes);

                    match disposition {
                        Disposition::PendingRehydration(target) => {
                            ctx.counters
                                .record_pending_rehydration(target, record.size_bytes);
                        }
                        Disposition::Eligible => {
                            report.eligible += 1;
                            if let Some(batch) = buffer.push(record.path) {
                                report.batches += 1;
                                ctx.submitter.submit(batch).await?;
                            }
                        }
                        Disposition::Count | Disposition::Skip => {}
                    }
                }
            }
        }
        drop(listing);

        if !report.cancelled {
            if let Some(batch) = buffer.take_remaining() {
                report.batches += 1;
                ctx.submitter.submit(batch).await?;
            }
            ctx.counters.record_unit_completed();
        }
        drop(permit);

        debug!(
            objects = report.objects,
            eligible = report.eligible,
            sub_prefixes = report.sub_prefixes,
            batches = report.batches,
            cancelled = report.cancelled,
            "Finished prefix"
        );
        Ok(report)
    }
}
