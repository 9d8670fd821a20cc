//! Main execution logic for tf-migrate CLI.

use std::sync::Arc;
use std::time::Duration;
use tf_error::Result;
use tf_migrator::s3::{RetryConfig, S3Access, S3Backend};
use tf_migrator::{ConfigNormalizer, Driver, RunReport};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::args::Cli;

/// Execute a migration run with the provided arguments.
///
/// Settings are validated before any connection to storage is made.
pub async fn execute(args: &Cli) -> Result<RunReport> {
    let config = ConfigNormalizer::new().validate(&args.raw_config())?;

    let backend = Arc::new(
        S3Backend::connect(&config, &s3_access(args))
            .await?
            .with_retry(RetryConfig::new().with_max_retries(args.max_retries)),
    );

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    Driver::new(backend.clone(), backend)
        .run_config(&config, cancel)
        .await
}

/// Region, identity and timeout for the S3 connection.
fn s3_access(args: &Cli) -> S3Access {
    let mut access =
        S3Access::new().with_operation_timeout(Duration::from_secs(args.timeout_secs));

    if let Some(region) = &args.region {
        access = access.with_region(region);
    }

    if let (Some(access_key), Some(secret_key)) = (&args.access_key, &args.secret_key) {
        access = access.with_credentials(access_key, secret_key);
    }

    if let Some(profile) = &args.profile {
        access = access.with_profile(profile);
    }

    access
}

/// Cancel the run on Ctrl-C.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, cancelling run");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for interrupt"),
        }
    });
}
