//! Run driver: validation, scheduling of scan units, completion and reporting.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tf_error::{Result, TfError};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, error, info, info_span, warn, Instrument};

use crate::batch::BatchSubmitter;
use crate::config::{ConfigNormalizer, MigrationConfig, RawConfig};
use crate::limiter::ConcurrencyLimiter;
use crate::namespace::{Namespace, TierChanger};
use crate::registry::ScanRegistry;
use crate::scanner::{ScanContext, ScanUnit};
use crate::stats::{CountersSnapshot, TierCounters};
use crate::tier::Tier;

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    NotStarted,
    Validating,
    /// Configuration was rejected; terminal
    Invalid,
    Scanning,
    Draining,
    Done,
}

/// How a run that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunOutcome {
    /// Every reachable prefix was scanned
    Completed,
    /// Cancellation was requested; counters cover what was scanned
    Cancelled,
}

/// Final report of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_label: String,
    pub outcome: RunOutcome,
    pub dry_run: bool,
    pub source_tier: Tier,
    pub target_tier: Tier,
    pub counters: CountersSnapshot,
    /// Scan units that finished their listing
    pub units_scanned: u64,
    /// `prefix: error` for every unit that failed (only with continue-on-error)
    pub failures: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RunReport {
    /// Wall-clock duration of the run.
    pub fn duration(&self) -> Duration {
        (self.completed_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.outcome == RunOutcome::Cancelled
    }

    /// Turn collected unit failures into [`TfError::Partial`].
    pub fn ensure_success(self) -> Result<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(TfError::Partial(self.failures))
        }
    }
}

/// Drives a single migration run over a namespace.
///
/// The driver validates the configuration, scans the prefix tree with at most
/// `concurrency_limit` units in flight, logs progress every `status_interval`
/// and returns once no unit is running and no discovered prefix is pending.
///
/// # Example
///
/// ```ignore
/// let namespace = Arc::new(MemoryNamespace::new());
/// let driver = Driver::new(namespace.clone(), namespace);
/// let report = driver
///     .run(&RawConfig::new("media", "Archive", "Hot"), CancellationToken::new())
///     .await?;
/// println!("{} archive objects", report.counters.archive.count);
/// ```
pub struct Driver {
    namespace: Arc<dyn Namespace>,
    changer: Arc<dyn TierChanger>,
    normalizer: ConfigNormalizer,
    counters: Arc<TierCounters>,
    state: Mutex<RunState>,
}

impl Driver {
    /// Create a driver listing through `namespace` and submitting batches to `changer`.
    pub fn new(namespace: Arc<dyn Namespace>, changer: Arc<dyn TierChanger>) -> Self {
        Self {
            namespace,
            changer,
            normalizer: ConfigNormalizer::new(),
            counters: Arc::new(TierCounters::new()),
            state: Mutex::new(RunState::NotStarted),
        }
    }

    /// Use a custom normalizer (e.g. a fixed hardware parallelism).
    pub fn with_normalizer(mut self, normalizer: ConfigNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// Live counters of the run.
    pub fn counters(&self) -> Arc<TierCounters> {
        Arc::clone(&self.counters)
    }

    fn set_state(&self, state: RunState) {
        debug!(?state, "Run state changed");
        *self.state.lock() = state;
    }

    /// Execute the run.
    ///
    /// Returns `ConfigInvalid` without listing anything when the configuration
    /// is rejected, and the first unit error when a unit fails and
    /// `continue_on_error` is off. Cancellation through `cancel` is not an
    /// error: the report carries [`RunOutcome::Cancelled`].
    pub async fn run(&self, raw: &RawConfig, cancel: CancellationToken) -> Result<RunReport> {
        self.begin()?;

        let span = info_span!("migration", run = %raw.run);
        async {
            let config = match self.normalizer.validate(raw) {
                Ok(config) => config,
                Err(e) => {
                    self.set_state(RunState::Invalid);
                    return Err(e);
                }
            };
            self.scan(Arc::new(config), cancel).await
        }
        .instrument(span)
        .await
    }

    /// Execute the run with a configuration validated earlier, for callers
    /// that needed it to build the backend. It goes through normalization
    /// again, which leaves a valid configuration unchanged.
    pub async fn run_config(
        &self,
        config: &MigrationConfig,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        self.run(&RawConfig::from(config), cancel).await
    }

    fn begin(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != RunState::NotStarted {
            return Err(TfError::Config(format!(
                "Driver already used (state {:?})",
                *state
            )));
        }
        *state = RunState::Validating;
        Ok(())
    }

    async fn scan(
        &self,
        config: Arc<MigrationConfig>,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        log_settings(&config);

        self.set_state(RunState::Scanning);
        let run_cancel = cancel.child_token();
        let limiter = ConcurrencyLimiter::new(config.concurrency_limit);
        let submitter = BatchSubmitter::new(
            Arc::clone(&self.changer),
            config.target_tier,
            config.batch_flush_threshold,
            Arc::clone(&self.counters),
        )
        .with_dry_run(config.dry_run);
        let (discovered_tx, mut discovered_rx) = mpsc::unbounded_channel();
        let ctx = ScanContext::new(
            Arc::clone(&self.namespace),
            submitter,
            Arc::clone(&self.counters),
            Arc::clone(&config),
            discovered_tx,
            run_cancel.clone(),
        );

        let mut registry = ScanRegistry::new();
        registry.enqueue(config.prefix.clone());

        let mut ticker = tokio::time::interval(config.status_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut units_scanned = 0u64;
        let mut failures = Vec::new();
        let mut first_error: Option<TfError> = None;

        loop {
            while let Ok(prefix) = discovered_rx.try_recv() {
                registry.enqueue(prefix);
            }
            if run_cancel.is_cancelled() {
                let dropped = registry.clear_pending();
                if dropped > 0 {
                    debug!(dropped, "Dropped pending prefixes after cancellation");
                }
            }
            if registry.is_idle() {
                break;
            }

            let can_start = registry.has_pending();
            let has_running = registry.running() > 0;

            tokio::select! {
                permit = limiter.acquire(&run_cancel), if can_start => {
                    // Err means cancelled; pending prefixes are dropped on the next pass
                    if let (Ok(permit), Some(prefix)) = (permit, registry.pop_pending()) {
                        let unit = ScanUnit::new(prefix.clone(), permit, ctx.clone());
                        let span = debug_span!("unit", prefix = %prefix);
                        registry.spawn(prefix, unit.run().instrument(span));
                    }
                }
                Some((prefix, result)) = registry.join_next(), if has_running => {
                    match result {
                        Ok(report) => {
                            if !report.cancelled {
                                units_scanned += 1;
                            }
                        }
                        Err(e) if e.is_cancelled() => {}
                        Err(e) if config.continue_on_error => {
                            warn!(
                                prefix = %prefix,
                                error = %e,
                                "Scan of prefix failed, continuing"
                            );
                            failures.push(format!("{prefix}: {e}"));
                        }
                        Err(e) => {
                            if first_error.is_none() {
                                error!(
                                    prefix = %prefix,
                                    error = %e,
                                    "Scan of prefix failed, stopping run"
                                );
                                first_error = Some(e);
                                run_cancel.cancel();
                            } else {
                                debug!(
                                    prefix = %prefix,
                                    error = %e,
                                    "Additional failure while stopping"
                                );
                            }
                        }
                    }
                }
                Some(prefix) = discovered_rx.recv() => {
                    registry.enqueue(prefix);
                }
                _ = ticker.tick() => {
                    log_status(&self.counters.snapshot(), &registry);
                }
            }
        }

        self.set_state(RunState::Draining);
        let counters = self.counters.snapshot();
        let outcome = if cancel.is_cancelled() {
            info!("Run cancelled, counters cover the prefixes scanned so far");
            RunOutcome::Cancelled
        } else {
            RunOutcome::Completed
        };
        log_summary(&counters, &config);
        info!(
            units_scanned,
            prefixes_discovered = registry.discovered(),
            failures = failures.len(),
            "Scan finished"
        );
        self.set_state(RunState::Done);

        if let Some(e) = first_error {
            return Err(e);
        }

        Ok(RunReport {
            run_label: config.run_label.clone(),
            outcome,
            dry_run: config.dry_run,
            source_tier: config.source_tier,
            target_tier: config.target_tier,
            counters,
            units_scanned,
            failures,
            started_at,
            completed_at: Utc::now(),
        })
    }
}

fn log_settings(config: &MigrationConfig) {
    info!(container = %config.container, "Container");
    info!(
        storage_connection = config.storage_connection.as_deref().unwrap_or("(default)"),
        "Storage connection"
    );
    info!(prefix = %config.prefix, delimiter = %config.delimiter, "Prefix");
    info!(source_tier = %config.source_tier, target_tier = %config.target_tier, "Tiers");
    info!(
        concurrency_limit = config.concurrency_limit,
        batch_flush_threshold = config.batch_flush_threshold,
        "Concurrency"
    );
    info!(
        what_if = config.dry_run,
        continue_on_error = config.continue_on_error,
        status_interval = ?config.status_interval,
        "Mode"
    );
}

fn log_status(snapshot: &CountersSnapshot, registry: &ScanRegistry) {
    info!(
        objects = snapshot.total.count,
        hot = snapshot.hot.count,
        cool = snapshot.cool.count,
        archive = snapshot.archive.count,
        archive_to_hot = snapshot.archive_to_hot.count,
        archive_to_cool = snapshot.archive_to_cool.count,
        batches = snapshot.batches_submitted,
        running = registry.running(),
        pending = registry.pending(),
        "Status"
    );
}

fn log_summary(snapshot: &CountersSnapshot, config: &MigrationConfig) {
    info!(count = snapshot.total.count, bytes = snapshot.total.bytes, "Total objects");
    for tier in Tier::ALL {
        let totals = snapshot.tier(tier);
        info!(tier = %tier, count = totals.count, bytes = totals.bytes, "Objects in tier");
    }
    info!(
        count = snapshot.archive_to_hot.count,
        bytes = snapshot.archive_to_hot.bytes,
        "Archive objects rehydrating to Hot"
    );
    info!(
        count = snapshot.archive_to_cool.count,
        bytes = snapshot.archive_to_cool.bytes,
        "Archive objects rehydrating to Cool"
    );
    info!(
        batches = snapshot.batches_submitted,
        objects = snapshot.objects_submitted,
        target_tier = %config.target_tier,
        what_if = config.dry_run,
        "Tier change batches"
    );
}
