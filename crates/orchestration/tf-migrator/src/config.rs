//! Configuration types and normalization for a migration run.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tf_error::{Result, TfError};
use tracing::error;

use crate::tier::Tier;

/// Number of objects that triggers a batch flush, and the largest batch ever submitted.
pub const BATCH_FLUSH_THRESHOLD: usize = 250;

/// Delimiter used when none is configured.
pub const DEFAULT_DELIMITER: &str = "/";

/// Scan units per hardware thread when no concurrency limit is configured.
pub const CONCURRENCY_PER_CPU: usize = 8;

/// Largest concurrency limit a run accepts; larger thread counts are clamped.
pub const MAX_CONCURRENCY_LIMIT: usize = tokio::sync::Semaphore::MAX_PERMITS;

/// Default interval between status log lines.
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(10);

/// Raw, unvalidated configuration as supplied by the caller.
///
/// Every field is kept in its textual form so that normalization can report
/// a diagnostic per bad value instead of failing on the first one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawConfig {
    /// Diagnostic tag attached to every log line of the run
    pub run: String,

    /// Starting prefix (empty = container root)
    pub prefix: String,

    /// Connection endpoint for the storage service (optional)
    pub storage_connection: String,

    /// Container (bucket) name
    pub container: String,

    /// Tier to move eligible objects to
    pub target_tier: String,

    /// Tier an object must currently be in to be eligible
    pub source_tier: String,

    /// Hierarchy delimiter (empty = "/")
    pub delimiter: String,

    /// Concurrent scan limit (< 1 = derived from hardware parallelism)
    pub thread_count: i64,

    /// Preview only, never submit tier changes
    pub what_if: bool,

    /// Interval between status log lines
    #[serde(with = "humantime_serde")]
    pub status_interval: Duration,

    /// Keep scanning sibling prefixes when one prefix fails
    pub continue_on_error: bool,
}

impl RawConfig {
    /// Create a raw configuration with the required settings.
    pub fn new(
        container: impl Into<String>,
        source_tier: impl Into<String>,
        target_tier: impl Into<String>,
    ) -> Self {
        Self {
            container: container.into(),
            source_tier: source_tier.into(),
            target_tier: target_tier.into(),
            status_interval: DEFAULT_STATUS_INTERVAL,
            ..Default::default()
        }
    }

    /// Set the run label.
    pub fn with_run(mut self, run: impl Into<String>) -> Self {
        self.run = run.into();
        self
    }

    /// Set the starting prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the storage connection endpoint.
    pub fn with_storage_connection(mut self, connection: impl Into<String>) -> Self {
        self.storage_connection = connection.into();
        self
    }

    /// Set the hierarchy delimiter.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Set the concurrent scan limit.
    pub fn with_thread_count(mut self, thread_count: i64) -> Self {
        self.thread_count = thread_count;
        self
    }

    /// Enable or disable preview mode.
    pub fn with_what_if(mut self, what_if: bool) -> Self {
        self.what_if = what_if;
        self
    }

    /// Set the status reporting interval.
    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    /// Set whether prefix failures are collected instead of ending the run.
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }
}

/// Validated configuration for one migration run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Diagnostic run label
    pub run_label: String,

    /// Container (bucket) name
    pub container: String,

    /// Storage connection endpoint, if one was given
    pub storage_connection: Option<String>,

    /// Tier objects must be in to be migrated
    pub source_tier: Tier,

    /// Tier objects are migrated to
    pub target_tier: Tier,

    /// Starting prefix; empty or ending with the delimiter
    pub prefix: String,

    /// Hierarchy delimiter, never empty
    pub delimiter: String,

    /// Maximum scan units listing or batching at once
    pub concurrency_limit: usize,

    /// Batch flush threshold
    pub batch_flush_threshold: usize,

    /// Preview only
    pub dry_run: bool,

    /// Interval between status log lines
    #[serde(with = "humantime_serde")]
    pub status_interval: Duration,

    /// Collect prefix failures instead of ending the run on the first one
    pub continue_on_error: bool,
}

impl From<&MigrationConfig> for RawConfig {
    fn from(config: &MigrationConfig) -> Self {
        Self {
            run: config.run_label.clone(),
            prefix: config.prefix.clone(),
            storage_connection: config.storage_connection.clone().unwrap_or_default(),
            container: config.container.clone(),
            target_tier: config.target_tier.to_string(),
            source_tier: config.source_tier.to_string(),
            delimiter: config.delimiter.clone(),
            thread_count: config.concurrency_limit as i64,
            what_if: config.dry_run,
            status_interval: config.status_interval,
            continue_on_error: config.continue_on_error,
        }
    }
}

/// Outcome of normalizing a [`RawConfig`].
#[derive(Debug, Clone)]
pub struct Normalized {
    config: Option<MigrationConfig>,
    diagnostics: Vec<String>,
}

impl Normalized {
    /// Whether every rule passed.
    pub fn is_valid(&self) -> bool {
        self.config.is_some()
    }

    /// One message per violated rule.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// The normalized configuration, when valid.
    pub fn config(&self) -> Option<&MigrationConfig> {
        self.config.as_ref()
    }

    /// Convert into a result, yielding `ConfigInvalid` with all diagnostics on failure.
    pub fn into_result(self) -> Result<MigrationConfig> {
        self.config
            .ok_or_else(|| TfError::ConfigInvalid(self.diagnostics))
    }
}

/// Validates and normalizes raw configuration.
///
/// Normalization never fails: it returns a [`Normalized`] carrying either the
/// typed configuration or the list of rules that were violated.
#[derive(Debug, Clone)]
pub struct ConfigNormalizer {
    hardware_parallelism: usize,
}

impl Default for ConfigNormalizer {
    fn default() -> Self {
        Self {
            hardware_parallelism: num_cpus(),
        }
    }
}

impl ConfigNormalizer {
    /// Create a normalizer using the host's available parallelism.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the hardware parallelism used to derive the default concurrency limit.
    pub fn with_hardware_parallelism(mut self, parallelism: usize) -> Self {
        self.hardware_parallelism = parallelism.max(1);
        self
    }

    /// Concurrency limit used when none is configured.
    pub fn default_concurrency_limit(&self) -> usize {
        self.hardware_parallelism * CONCURRENCY_PER_CPU
    }

    /// Normalize `raw`, logging every diagnostic at `error` when it is rejected.
    pub fn validate(&self, raw: &RawConfig) -> Result<MigrationConfig> {
        let normalized = self.normalize(raw);
        for diagnostic in normalized.diagnostics() {
            error!("{diagnostic}");
        }
        normalized.into_result()
    }

    /// Normalize a raw configuration.
    pub fn normalize(&self, raw: &RawConfig) -> Normalized {
        let mut diagnostics = Vec::new();

        let delimiter = if raw.delimiter.is_empty() {
            DEFAULT_DELIMITER.to_string()
        } else {
            raw.delimiter.clone()
        };

        let prefix = if raw.prefix.is_empty() || raw.prefix.ends_with(&delimiter) {
            raw.prefix.clone()
        } else {
            format!("{}{}", raw.prefix, delimiter)
        };

        let concurrency_limit = if raw.thread_count < 1 {
            self.default_concurrency_limit()
        } else {
            usize::try_from(raw.thread_count)
                .unwrap_or(usize::MAX)
                .min(MAX_CONCURRENCY_LIMIT)
        };

        let target_tier = Tier::parse(&raw.target_tier);
        if target_tier.is_none() {
            diagnostics.push(format!(
                "Invalid target tier of '{}', must be either Hot, Cool or Archive",
                raw.target_tier
            ));
        }

        let source_tier = Tier::parse(&raw.source_tier);
        if source_tier.is_none() {
            diagnostics.push(format!(
                "Invalid source tier of '{}', must be either Hot, Cool or Archive",
                raw.source_tier
            ));
        }

        if let (Some(source), Some(target)) = (source_tier, target_tier) {
            if source == target {
                diagnostics.push(format!(
                    "Invalid source/target tier, they cannot be the same ({source})"
                ));
            }
        }

        if raw.container.trim().is_empty() {
            diagnostics.push("No storage container name provided".to_string());
        }

        let config = match (source_tier, target_tier) {
            (Some(source_tier), Some(target_tier)) if diagnostics.is_empty() => {
                Some(MigrationConfig {
                    run_label: raw.run.clone(),
                    container: raw.container.trim().to_string(),
                    storage_connection: Some(raw.storage_connection.trim())
                        .filter(|c| !c.is_empty())
                        .map(str::to_string),
                    source_tier,
                    target_tier,
                    prefix,
                    delimiter,
                    concurrency_limit,
                    batch_flush_threshold: BATCH_FLUSH_THRESHOLD,
                    dry_run: raw.what_if,
                    status_interval: if raw.status_interval.is_zero() {
                        DEFAULT_STATUS_INTERVAL
                    } else {
                        raw.status_interval
                    },
                    continue_on_error: raw.continue_on_error,
                })
            }
            _ => None,
        };

        Normalized {
            config,
            diagnostics,
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
