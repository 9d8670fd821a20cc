//! S3 backend.
//!
//! This module provides:
//! - Client creation from a validated run configuration
//! - Delimited, paginated listing mapped onto tiers
//! - Batched tier changes through in-place copies (multipart above 5 GiB)
//!   and archive restores
//! - Exponential-backoff retries for transient errors

mod backend;
mod client;
mod list;
mod retry;

pub use backend::{CopyPart, MAX_COPY_OBJECT_SIZE, S3Backend, copy_parts, storage_class_for};
pub use client::{DEFAULT_OPERATION_TIMEOUT, S3Access, StaticCredentials, create_s3_client};
pub use list::{list_hierarchy, tier_for_storage_class};
pub use retry::{ErrorClassification, RemoteFailure, RetryConfig, classify_error, with_retry};
