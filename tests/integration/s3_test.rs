//! S3 backend integration tests using LocalStack.

use crate::common::LocalStackTestContext;
use aws_sdk_s3::types::StorageClass;
use futures::TryStreamExt;
use std::sync::Arc;
use tf_migrator::s3::{S3Access, S3Backend};
use tf_migrator::{
    ConfigNormalizer, Driver, ListingEntry, MigrationConfig, Namespace, RawConfig, RunOutcome,
    Tier,
};
use tokio_util::sync::CancellationToken;

fn run_config(ctx: &LocalStackTestContext, raw: RawConfig) -> MigrationConfig {
    ConfigNormalizer::new()
        .with_hardware_parallelism(1)
        .validate(&raw.with_storage_connection(&ctx.endpoint))
        .unwrap()
}

async fn backend(ctx: &LocalStackTestContext, config: &MigrationConfig) -> Arc<S3Backend> {
    let access = S3Access::new()
        .with_region(&ctx.region)
        .with_credentials("test", "test");
    Arc::new(S3Backend::connect(config, &access).await.unwrap())
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_list_hierarchy_one_level() {
    let ctx = LocalStackTestContext::new().await;

    if !ctx.is_available().await {
        eprintln!("LocalStack not available, skipping test");
        return;
    }

    let bucket = "tf-list-bucket";
    ctx.create_bucket(bucket).await.unwrap();
    ctx.clear_prefix(bucket, "tree/").await.unwrap();
    for key in ["tree/a.bin", "tree/sub/b.bin", "tree/sub/deeper/c.bin"] {
        ctx.put_object(bucket, key, StorageClass::Standard)
            .await
            .unwrap();
    }

    let config = run_config(&ctx, RawConfig::new(bucket, "Hot", "Cool"));
    let backend = backend(&ctx, &config).await;
    let entries: Vec<ListingEntry> = backend.list("tree/", "/").try_collect().await.unwrap();

    assert!(entries.contains(&ListingEntry::Prefix("tree/sub/".to_string())));
    let objects: Vec<_> = entries
        .iter()
        .filter_map(|entry| match entry {
            ListingEntry::Object(record) => Some(record),
            ListingEntry::Prefix(_) => None,
        })
        .collect();
    assert_eq!(objects.len(), 1);
    assert_eq!(objects[0].path, "tree/a.bin");
    assert_eq!(objects[0].tier, Tier::Hot);
}

#[tokio::test]
#[ignore = "requires LocalStack"]
async fn test_migrate_hot_to_cool() {
    let ctx = LocalStackTestContext::new().await;

    if !ctx.is_available().await {
        eprintln!("LocalStack not available, skipping test");
        return;
    }

    let bucket = "tf-migrate-bucket";
    ctx.create_bucket(bucket).await.unwrap();
    ctx.clear_prefix(bucket, "media/").await.unwrap();

    let hot_keys = ["media/2019/a.mp4", "media/2019/jan/b.mp4", "media/c.mp4"];
    for key in hot_keys {
        ctx.put_object(bucket, key, StorageClass::Standard)
            .await
            .unwrap();
    }
    ctx.put_object(bucket, "media/already-cool.mp4", StorageClass::StandardIa)
        .await
        .unwrap();

    let config = run_config(
        &ctx,
        RawConfig::new(bucket, "Hot", "Cool")
            .with_run("localstack")
            .with_prefix("media"),
    );
    let backend = backend(&ctx, &config).await;
    let driver = Driver::new(backend.clone(), backend);

    let report = driver
        .run_config(&config, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.counters.total.count, 4);
    assert_eq!(report.counters.hot.count, 3);
    assert_eq!(report.counters.cool.count, 1);
    assert_eq!(report.counters.objects_submitted, 3);

    for key in hot_keys {
        assert_eq!(ctx.storage_class(bucket, key).await.unwrap(), "STANDARD_IA");
    }
}
