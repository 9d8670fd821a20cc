//! Common utilities for integration tests.
//!
//! This module provides namespace fixtures and driver setup for the
//! in-memory scenarios, and a LocalStack context for the S3 ones.

pub mod localstack;

pub use localstack::LocalStackTestContext;

use std::sync::Arc;
use tf_error::Result;
use tf_migrator::{
    ConfigNormalizer, Driver, MemoryNamespace, ObjectRecord, RawConfig, RunReport, Tier,
};
use tokio_util::sync::CancellationToken;

/// Namespace with `count` objects in `tier` directly under `prefix`.
pub fn flat_namespace(prefix: &str, count: usize, tier: Tier) -> Arc<MemoryNamespace> {
    let namespace = MemoryNamespace::new().with_page_size(100);
    namespace.extend(
        (0..count).map(|i| ObjectRecord::block(format!("{prefix}{i:05}.bin"), 1024, tier)),
    );
    Arc::new(namespace)
}

/// A mixed tree: `dirs` top-level prefixes, each with a nested prefix, and
/// objects cycling through every tier.
pub fn mixed_tree(dirs: usize, objects_per_prefix: usize) -> Arc<MemoryNamespace> {
    let namespace = MemoryNamespace::new().with_page_size(7);
    let mut records = Vec::new();
    for d in 0..dirs {
        for prefix in [format!("d{d:02}/"), format!("d{d:02}/nested/")] {
            for i in 0..objects_per_prefix {
                let tier = Tier::ALL[(d + i) % 3];
                let size = (i as u64 + 1) * 100;
                records.push(ObjectRecord::block(format!("{prefix}obj{i:04}"), size, tier));
            }
        }
    }
    namespace.extend(records);
    Arc::new(namespace)
}

/// Driver over a memory namespace with a fixed hardware parallelism.
pub fn driver(namespace: &Arc<MemoryNamespace>) -> Driver {
    Driver::new(namespace.clone(), namespace.clone())
        .with_normalizer(ConfigNormalizer::new().with_hardware_parallelism(2))
}

/// Run a fresh driver to completion.
pub async fn run(namespace: &Arc<MemoryNamespace>, raw: &RawConfig) -> Result<RunReport> {
    driver(namespace).run(raw, CancellationToken::new()).await
}
