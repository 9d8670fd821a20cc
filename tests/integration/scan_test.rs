//! End-to-end scan scenarios on the in-memory namespace.

use crate::common::{driver, flat_namespace, mixed_tree, run};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tf_error::TfError;
use tf_migrator::{
    MemoryNamespace, ObjectKind, ObjectRecord, RawConfig, RunOutcome, RunState, Tier,
};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_archive_objects_rehydrated_in_full_batches() {
    let namespace = flat_namespace("a/b/", 600, Tier::Archive);
    let raw = RawConfig::new("media", "Archive", "Hot").with_thread_count(4);

    let report = run(&namespace, &raw).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.counters.archive.count, 600);
    assert_eq!(report.counters.total.count, 600);
    assert_eq!(report.counters.archive.bytes, 600 * 1024);

    let batches = namespace.submitted_batches();
    let mut sizes: Vec<_> = batches.iter().map(|b| b.paths.len()).collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![100, 250, 250]);
    assert!(batches.iter().all(|b| b.tier == Tier::Hot));

    // Root, "a/" and "a/b/"
    assert_eq!(report.units_scanned, 3);
    assert_eq!(
        namespace.get("a/b/00042.bin").unwrap().pending_rehydration,
        Some(Tier::Hot)
    );
}

#[tokio::test]
async fn test_object_outside_source_tier_is_only_counted() {
    let namespace = Arc::new(MemoryNamespace::new());
    namespace.insert(ObjectRecord::block("docs/readme.txt", 512, Tier::Cool));

    let report = run(&namespace, &RawConfig::new("docs", "Hot", "Archive"))
        .await
        .unwrap();

    assert_eq!(report.counters.cool.count, 1);
    assert_eq!(report.counters.cool.bytes, 512);
    assert_eq!(report.counters.batches_submitted, 0);
    assert!(namespace.submitted_batches().is_empty());
}

#[tokio::test]
async fn test_same_source_and_target_lists_nothing() {
    let namespace = flat_namespace("x/", 10, Tier::Hot);
    let driver = driver(&namespace);

    let err = driver
        .run(&RawConfig::new("c", "hot", "Hot"), CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        TfError::ConfigInvalid(diagnostics) => {
            assert_eq!(diagnostics.len(), 1);
            assert!(diagnostics[0].contains("cannot be the same"));
        }
        other => panic!("expected ConfigInvalid, got {other:?}"),
    }
    assert_eq!(namespace.list_calls(), 0);
    assert_eq!(driver.state(), RunState::Invalid);
}

#[tokio::test]
async fn test_every_eligible_object_in_exactly_one_batch() {
    let namespace = mixed_tree(12, 90);
    let expected: HashSet<String> = (0..12)
        .flat_map(|d| {
            [format!("d{d:02}/"), format!("d{d:02}/nested/")]
                .into_iter()
                .flat_map(move |prefix| {
                    (0..90)
                        .filter(move |i| Tier::ALL[(d + i) % 3] == Tier::Cool)
                        .map(move |i| format!("{prefix}obj{i:04}"))
                })
        })
        .collect();

    let raw = RawConfig::new("c", "Cool", "Archive").with_thread_count(5);
    let report = run(&namespace, &raw).await.unwrap();

    let batches = namespace.submitted_batches();
    assert!(batches.iter().all(|b| (1..=250).contains(&b.paths.len())));

    let mut seen = HashSet::new();
    for path in batches.iter().flat_map(|b| b.paths.iter()) {
        assert!(seen.insert(path.clone()), "{path} submitted twice");
    }
    assert_eq!(seen, expected);

    let counters = report.counters;
    assert!(counters.is_consistent());
    assert_eq!(counters.total.count, 12 * 2 * 90);
    assert_eq!(counters.cool.count as usize, expected.len());
    assert_eq!(counters.objects_submitted as usize, expected.len());
    // One unit per prefix: root, 12 top-level and 12 nested
    assert_eq!(report.units_scanned, 25);
}

#[tokio::test]
async fn test_dry_run_counts_like_a_real_run() {
    let raw = RawConfig::new("c", "Hot", "Cool").with_thread_count(3);

    let previewed = mixed_tree(6, 40);
    let preview = run(&previewed, &raw.clone().with_what_if(true))
        .await
        .unwrap();

    let migrated = mixed_tree(6, 40);
    let real = run(&migrated, &raw).await.unwrap();

    assert!(preview.dry_run);
    assert_eq!(preview.counters, real.counters);
    assert!(previewed.submitted_batches().is_empty());
    assert!(!migrated.submitted_batches().is_empty());
    assert_eq!(previewed.get("d00/obj0000").unwrap().tier, Tier::Hot);
}

#[tokio::test]
async fn test_pending_rehydration_is_counted_and_never_batched() {
    let namespace = Arc::new(MemoryNamespace::new());
    namespace.extend([
        ObjectRecord::block("cold/a", 10, Tier::Archive).with_pending_rehydration(Tier::Hot),
        ObjectRecord::block("cold/b", 20, Tier::Archive).with_pending_rehydration(Tier::Cool),
        ObjectRecord::block("cold/c", 40, Tier::Archive),
    ]);

    let report = run(&namespace, &RawConfig::new("c", "Archive", "Cool"))
        .await
        .unwrap();

    let counters = report.counters;
    assert_eq!(counters.archive.count, 3);
    assert_eq!(counters.archive.bytes, 70);
    assert_eq!(counters.archive_to_hot.count, 1);
    assert_eq!(counters.archive_to_hot.bytes, 10);
    assert_eq!(counters.archive_to_cool.count, 1);
    assert_eq!(counters.archive_to_cool.bytes, 20);

    let batches = namespace.submitted_batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].paths, vec!["cold/c"]);
}

#[tokio::test]
async fn test_second_run_sees_rehydration_in_progress() {
    let namespace = flat_namespace("vault/", 30, Tier::Archive);
    let raw = RawConfig::new("c", "Archive", "Hot");

    let first = run(&namespace, &raw).await.unwrap();
    assert_eq!(first.counters.objects_submitted, 30);

    let second = run(&namespace, &raw).await.unwrap();
    assert_eq!(second.counters.archive.count, 30);
    assert_eq!(second.counters.archive_to_hot.count, 30);
    assert_eq!(second.counters.batches_submitted, 0);

    assert_eq!(namespace.complete_rehydrations(), 30);
    let third = run(&namespace, &raw).await.unwrap();
    assert_eq!(third.counters.hot.count, 30);
    assert_eq!(third.counters.archive.count, 0);
}

#[tokio::test]
async fn test_concurrent_listings_bounded_by_limit() {
    let namespace = MemoryNamespace::new().with_list_delay(Duration::from_millis(5));
    namespace.extend(
        (0..40).map(|d| ObjectRecord::block(format!("p{d:02}/q/file"), 1, Tier::Hot)),
    );
    let namespace = Arc::new(namespace);

    let raw = RawConfig::new("c", "Hot", "Cool").with_thread_count(3);
    let report = run(&namespace, &raw).await.unwrap();

    assert_eq!(report.counters.total.count, 40);
    assert!(namespace.max_active_listings() <= 3);
    assert!(namespace.max_active_listings() >= 1);
    // Root, 40 top-level and 40 nested prefixes
    assert_eq!(namespace.list_calls(), 81);
}

#[tokio::test]
async fn test_non_block_objects_are_ignored() {
    let namespace = Arc::new(MemoryNamespace::new());
    namespace.extend([
        ObjectRecord::block("logs/app.log", 99, Tier::Hot).with_kind(ObjectKind::Append),
        ObjectRecord::block("disks/vm.vhd", 99, Tier::Hot).with_kind(ObjectKind::Page),
        ObjectRecord::block("logs/day.gz", 5, Tier::Hot),
    ]);

    let report = run(&namespace, &RawConfig::new("c", "Hot", "Cool"))
        .await
        .unwrap();

    assert_eq!(report.counters.total.count, 1);
    assert_eq!(report.counters.total.bytes, 5);
    assert_eq!(namespace.submitted_batches()[0].paths, vec!["logs/day.gz"]);
}

#[tokio::test]
async fn test_prefix_and_custom_delimiter() {
    let namespace = Arc::new(MemoryNamespace::new());
    namespace.extend([
        ObjectRecord::block("2019|jan|1", 1, Tier::Hot),
        ObjectRecord::block("2019|feb|2", 1, Tier::Hot),
        ObjectRecord::block("2020|jan|3", 1, Tier::Hot),
    ]);

    let raw = RawConfig::new("c", "Hot", "Cool")
        .with_prefix("2019")
        .with_delimiter("|");
    let report = run(&namespace, &raw).await.unwrap();

    assert_eq!(report.counters.total.count, 2);
    assert_eq!(namespace.get("2019|jan|1").unwrap().tier, Tier::Cool);
    assert_eq!(namespace.get("2020|jan|3").unwrap().tier, Tier::Hot);
}

#[tokio::test]
async fn test_cancellation_during_run_is_not_an_error() {
    let namespace = MemoryNamespace::new().with_list_delay(Duration::from_millis(50));
    namespace.extend((0..20).map(|d| ObjectRecord::block(format!("p{d}/f"), 1, Tier::Hot)));
    let namespace = Arc::new(namespace);
    let driver = driver(&namespace);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let report = driver
        .run(&RawConfig::new("c", "Hot", "Cool").with_thread_count(2), cancel)
        .await
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert!(report.counters.total.count < 20);
    assert_eq!(driver.state(), RunState::Done);
}
