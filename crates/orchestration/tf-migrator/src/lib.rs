//! tf-migrator - bulk storage-tier migration for tierflow.
//!
//! This crate walks a hierarchical object namespace and moves every block
//! object in a source tier to a target tier. It provides:
//!
//! - Configuration normalization with per-rule diagnostics
//! - Concurrent prefix scanning bounded by a permit pool
//! - Per-prefix batching of tier changes (at most 250 objects per request)
//! - Lock-free tier counters with periodic status reporting
//! - An S3 backend and an in-memory backend behind the same traits
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tf_migrator::{ConfigNormalizer, Driver, RawConfig};
//! use tf_migrator::s3::{S3Access, S3Backend};
//! use tokio_util::sync::CancellationToken;
//!
//! let raw = RawConfig::new("media", "Hot", "Cool").with_prefix("2019/");
//! let config = ConfigNormalizer::new().validate(&raw)?;
//! let backend = Arc::new(S3Backend::connect(&config, &S3Access::new()).await?);
//!
//! let report = Driver::new(backend.clone(), backend)
//!     .run_config(&config, CancellationToken::new())
//!     .await?;
//!
//! let counters = &report.counters;
//! eprintln!("{} objects, {} batches", counters.total.count, counters.batches_submitted);
//! ```

pub mod batch;
pub mod config;
pub mod driver;
pub mod limiter;
pub mod namespace;
pub mod registry;
pub mod s3;
pub mod scanner;
pub mod stats;
pub mod tier;

pub use batch::{BatchAccumulator, BatchSubmitter};
pub use config::{
    BATCH_FLUSH_THRESHOLD, ConfigNormalizer, DEFAULT_DELIMITER, MAX_CONCURRENCY_LIMIT,
    MigrationConfig, Normalized, RawConfig,
};
pub use driver::{Driver, RunOutcome, RunReport, RunState};
pub use limiter::{ConcurrencyLimiter, ScanPermit};
pub use namespace::{ListingStream, MemoryNamespace, Namespace, SubmittedBatch, TierChanger};
pub use registry::ScanRegistry;
pub use scanner::{Disposition, ScanContext, ScanUnit, UnitReport, classify};
pub use stats::{CountersSnapshot, TierCounters, TierTotals};
pub use tier::{ListingEntry, ObjectKind, ObjectRecord, Tier};

// Re-export error types for convenience
pub use tf_error::{Result, TfError};
