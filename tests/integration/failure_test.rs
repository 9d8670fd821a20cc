//! Failure handling: fail-fast by default, collected with continue-on-error.

use crate::common::{driver, run};
use std::sync::Arc;
use tf_error::{TfError, TierChangeError};
use tf_migrator::{MemoryNamespace, ObjectRecord, RawConfig, RunState, Tier};
use tokio_util::sync::CancellationToken;

fn namespace_with_bad_subtree() -> MemoryNamespace {
    let namespace = MemoryNamespace::new().with_failing_prefix("broken/");
    namespace.extend(
        ["broken/a", "ok1/b", "ok2/c", "ok2/deeper/d"]
            .into_iter()
            .map(|path| ObjectRecord::block(path, 8, Tier::Hot)),
    );
    namespace
}

#[tokio::test]
async fn test_listing_failure_fails_the_run() {
    let namespace = Arc::new(namespace_with_bad_subtree());
    let driver = driver(&namespace);

    let err = driver
        .run(&RawConfig::new("c", "Hot", "Cool"), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.is_remote());
    assert!(err.to_string().contains("broken/"));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(driver.state(), RunState::Done);
}

#[tokio::test]
async fn test_continue_on_error_collects_failures() {
    let namespace = Arc::new(namespace_with_bad_subtree());
    let raw = RawConfig::new("c", "Hot", "Cool").with_continue_on_error(true);

    let report = run(&namespace, &raw).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].starts_with("broken/: "));
    assert_eq!(report.counters.total.count, 3);
    assert_eq!(namespace.get("ok2/deeper/d").unwrap().tier, Tier::Cool);

    match report.ensure_success() {
        Err(TfError::Partial(failures)) => assert_eq!(failures.len(), 1),
        other => panic!("expected Partial, got {other:?}"),
    }
}

#[tokio::test]
async fn test_tier_change_failure_fails_the_run() {
    let namespace = Arc::new(MemoryNamespace::new().with_failing_tier_changes());
    namespace.insert(ObjectRecord::block("x/y", 1, Tier::Cool));

    let err = run(&namespace, &RawConfig::new("c", "Cool", "Hot"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TfError::TierChange(TierChangeError::Request(_))
    ));
}

#[tokio::test]
async fn test_dry_run_never_reaches_failing_changer() {
    let namespace = Arc::new(MemoryNamespace::new().with_failing_tier_changes());
    namespace.insert(ObjectRecord::block("x/y", 1, Tier::Cool));

    let report = run(
        &namespace,
        &RawConfig::new("c", "Cool", "Hot").with_what_if(true),
    )
    .await
    .unwrap();

    assert_eq!(report.counters.batches_submitted, 1);
    assert!(namespace.submitted_batches().is_empty());
}

#[tokio::test]
async fn test_every_invalid_setting_is_reported() {
    let namespace = Arc::new(MemoryNamespace::new());

    let err = run(&namespace, &RawConfig::new("  ", "Lukewarm", "Frozen"))
        .await
        .unwrap_err();

    assert_eq!(err.exit_code(), 2);
    match err {
        TfError::ConfigInvalid(diagnostics) => assert_eq!(diagnostics.len(), 3),
        other => panic!("expected ConfigInvalid, got {other:?}"),
    }
    assert_eq!(namespace.list_calls(), 0);
}
