//! Error types for tierflow.
//!
//! This crate provides:
//! - [`TfError`] - Top-level error enum for all migration errors
//! - Remote operation errors ([`ListingError`], [`TierChangeError`])
//! - [`TfError::exit_code`] for mapping run failures to process exit codes

use thiserror::Error;

/// Top-level error type for tierflow.
#[derive(Error, Debug)]
pub enum TfError {
    /// One or more configuration rules failed during normalization.
    ///
    /// Carries one diagnostic per violated rule.
    #[error("Invalid configuration: {}", .0.join("; "))]
    ConfigInvalid(Vec<String>),

    /// Configuration errors outside normalization (client setup, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Hierarchical listing failed
    #[error("Listing error: {0}")]
    Listing(#[from] ListingError),

    /// Batch tier change failed
    #[error("Tier change error: {0}")]
    TierChange(#[from] TierChangeError),

    /// Cooperative cancellation was observed
    #[error("Operation cancelled")]
    Cancelled,

    /// Some scan units failed while the rest of the run continued
    #[error(
        "{} scan unit(s) failed, first: {}",
        .0.len(),
        .0.first().map(String::as_str).unwrap_or("unknown")
    )]
    Partial(Vec<String>),

    /// Generic errors (wrapped anyhow)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Listing-related errors.
#[derive(Error, Debug)]
pub enum ListingError {
    /// The listing request was rejected or failed in transport
    #[error("List of '{prefix}' failed: {message}")]
    Request { prefix: String, message: String },

    /// The service returned an entry that cannot be interpreted
    #[error("Invalid entry under '{prefix}': {message}")]
    InvalidEntry { prefix: String, message: String },
}

/// Tier-change related errors.
#[derive(Error, Debug)]
pub enum TierChangeError {
    /// The whole batch request failed
    #[error("Batch request failed: {0}")]
    Request(String),

    /// Some items in the batch were rejected
    #[error("Partial failure: {succeeded} succeeded, {failed} failed (first error: {first_error})")]
    PartialFailure {
        succeeded: usize,
        failed: usize,
        first_error: String,
    },

    /// The batch exceeded the maximum allowed size
    #[error("Batch of {size} items exceeds the limit of {limit}")]
    TooLarge { size: usize, limit: usize },
}

impl TfError {
    /// Returns true if this error represents cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true if this error came from a remote storage operation.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Listing(_) | Self::TierChange(_))
    }

    /// Process exit code for a run that ended with this error.
    ///
    /// - `0`: cancelled (a normal, logged completion)
    /// - `2`: invalid configuration, nothing was scanned
    /// - `4`: partial failure, some subtrees failed
    /// - `1`: everything else
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cancelled => 0,
            Self::ConfigInvalid(_) => 2,
            Self::Partial(_) => 4,
            _ => 1,
        }
    }
}

/// Result type alias using TfError.
pub type Result<T> = std::result::Result<T, TfError>;
