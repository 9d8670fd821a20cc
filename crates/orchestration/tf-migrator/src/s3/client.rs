//! S3 client construction for a validated migration run.
//!
//! The bucket and the endpoint are the run's `container` and
//! `storage_connection`; [`S3Access`] carries only what the migration
//! configuration does not know about (region, identity, timeouts).

use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tf_error::Result;
use tracing::debug;

use crate::config::MigrationConfig;

/// Default per-operation timeout.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider name reported for explicit credentials.
const CREDENTIALS_PROVIDER: &str = "tierflow";

/// Static access key pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// How to reach and authenticate against S3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Access {
    /// Region override; the default provider chain is used otherwise
    pub region: Option<String>,

    /// Named profile from the shared config files
    pub profile: Option<String>,

    /// Explicit key pair, taking precedence over the provider chain
    pub credentials: Option<StaticCredentials>,

    /// Per-operation timeout (zero disables it)
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,
}

impl Default for S3Access {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            credentials: None,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl S3Access {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    /// Use an explicit key pair.
    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.credentials = Some(StaticCredentials {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        });
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

/// Create an S3 client for the run described by `config`.
///
/// A configured `storage_connection` is used as the endpoint URL, with
/// path-style addressing since custom endpoints rarely resolve
/// virtual-hosted buckets.
pub async fn create_s3_client(config: &MigrationConfig, access: &S3Access) -> Result<Client> {
    let endpoint = config.storage_connection.as_deref();
    debug!(
        bucket = %config.container,
        endpoint = endpoint.unwrap_or("(default)"),
        region = access.region.as_deref().unwrap_or("(default)"),
        "Creating S3 client"
    );

    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &access.region {
        loader = loader.region(Region::new(region.clone()));
    }
    if let Some(profile) = &access.profile {
        loader = loader.profile_name(profile);
    }
    if let Some(creds) = &access.credentials {
        loader = loader.credentials_provider(Credentials::new(
            &creds.access_key,
            &creds.secret_key,
            None,
            None,
            CREDENTIALS_PROVIDER,
        ));
    }
    if let Some(endpoint) = endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    if !access.operation_timeout.is_zero() {
        loader = loader.timeout_config(
            TimeoutConfig::builder()
                .operation_timeout(access.operation_timeout)
                .build(),
        );
    }

    let shared = loader.load().await;
    let s3_config = aws_sdk_s3::config::Builder::from(&shared)
        .force_path_style(endpoint.is_some())
        .build();

    Ok(Client::from_conf(s3_config))
}
