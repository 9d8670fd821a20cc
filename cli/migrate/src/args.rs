//! CLI argument definitions for tf-migrate.

use clap::{Parser, ValueEnum};
use std::time::Duration;
use tf_cli_common::LogLevel;
use tf_migrator::RawConfig;

/// Bulk storage-tier migration.
///
/// Walks every prefix below `--prefix` and moves all objects currently in
/// `--source-tier` to `--target-tier`, in batches of at most 250 objects.
/// Settings that are missing or invalid are all reported before anything
/// is listed.
///
/// ## Examples
///
/// Preview moving archived media back to hot storage:
///   tf-migrate --container media --source-tier Archive --target-tier Hot --what-if
///
/// Cool down a single year of logs against LocalStack:
///   tf-migrate --container logs --prefix 2019 --source-tier Hot --target-tier Cool \
///       --storage-connection http://localhost:4566
#[derive(Parser, Debug)]
#[command(name = "tf-migrate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    // === Run Options ===
    /// Label attached to every log line of this run
    #[arg(long, env = "TF_RUN", default_value = "")]
    pub run: String,

    /// Prefix to start from (default: container root)
    #[arg(long, env = "TF_PREFIX", default_value = "")]
    pub prefix: String,

    /// Hierarchy delimiter (default: "/")
    #[arg(long, env = "TF_DELIMITER", default_value = "")]
    pub delimiter: String,

    /// Tier objects must currently be in (Hot, Cool or Archive)
    #[arg(long, env = "TF_SOURCE_TIER", default_value = "")]
    pub source_tier: String,

    /// Tier to move objects to (Hot, Cool or Archive)
    #[arg(long, env = "TF_TARGET_TIER", default_value = "")]
    pub target_tier: String,

    /// Concurrent prefix scans (< 1 = 8 per CPU)
    #[arg(long, env = "TF_THREAD_COUNT", default_value = "0", allow_negative_numbers = true)]
    pub thread_count: i64,

    /// Count and log batches without changing any tier
    #[arg(long, env = "TF_WHAT_IF")]
    pub what_if: bool,

    /// Keep scanning other prefixes when one fails (exit code 4)
    #[arg(long, env = "TF_CONTINUE_ON_ERROR")]
    pub continue_on_error: bool,

    /// Seconds between status log lines
    #[arg(
        long,
        env = "TF_STATUS_INTERVAL",
        default_value = "10",
        value_parser = parse_positive_u64
    )]
    pub status_interval: u64,

    // === Storage Options ===
    /// Container (bucket) name
    #[arg(long, env = "TF_CONTAINER", default_value = "")]
    pub container: String,

    /// Storage service endpoint URL (S3-compatible services, LocalStack)
    #[arg(long, env = "TF_STORAGE_CONNECTION", default_value = "")]
    pub storage_connection: String,

    /// AWS region
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// AWS access key ID
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub access_key: Option<String>,

    /// AWS secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// AWS profile name
    #[arg(long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    /// Retries for transient storage errors
    #[arg(long, default_value = "3")]
    pub max_retries: u32,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "30", value_parser = parse_positive_u64)]
    pub timeout_secs: u64,

    // === Output Options ===
    /// Final report format (printed to stdout for json, stderr for text)
    #[arg(long, value_enum, default_value = "text")]
    pub report_format: ReportFormat,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

impl Cli {
    /// Raw migration settings, validated later by the driver.
    pub fn raw_config(&self) -> RawConfig {
        RawConfig::new(&self.container, &self.source_tier, &self.target_tier)
            .with_run(&self.run)
            .with_prefix(&self.prefix)
            .with_delimiter(&self.delimiter)
            .with_storage_connection(&self.storage_connection)
            .with_thread_count(self.thread_count)
            .with_what_if(self.what_if)
            .with_continue_on_error(self.continue_on_error)
            .with_status_interval(Duration::from_secs(self.status_interval))
    }
}

/// Report format argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable summary on stderr
    Text,
    /// Pretty-printed JSON report on stdout
    Json,
}

/// Parse a positive u64 (>= 1).
fn parse_positive_u64(s: &str) -> Result<u64, String> {
    let value: u64 = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if value == 0 {
        return Err("value must be at least 1".to_string());
    }
    Ok(value)
}
