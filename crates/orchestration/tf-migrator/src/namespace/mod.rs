//! Remote namespace abstraction.
//!
//! A migration talks to its storage service through two seams:
//! - [`Namespace`] - one-level delimited listing of a prefix
//! - [`TierChanger`] - batched tier change submission
//!
//! The S3 backend implements both; [`MemoryNamespace`] is an in-process
//! implementation used by tests and previews.

mod memory;

pub use memory::{MemoryNamespace, SubmittedBatch};

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use tf_error::Result;

use crate::tier::{ListingEntry, Tier};

/// Stream of entries produced by listing one prefix.
pub type ListingStream<'a> = Pin<Box<dyn Stream<Item = Result<ListingEntry>> + Send + 'a>>;

/// Hierarchical listing of a container.
pub trait Namespace: Send + Sync {
    /// List the direct children of `prefix`.
    ///
    /// Yields one [`ListingEntry::Prefix`] per deeper prefix (ending with
    /// `delimiter`) and one [`ListingEntry::Object`] per direct child object.
    /// Pagination is handled by the implementation; the stream ends after the
    /// last page. Entries arrive in no guaranteed order.
    fn list<'a>(&'a self, prefix: &'a str, delimiter: &'a str) -> ListingStream<'a>;
}

/// Batched tier change submission.
#[async_trait]
pub trait TierChanger: Send + Sync {
    /// Request that every object in `paths` be moved to `tier`.
    ///
    /// Returns an error if the request as a whole, or any item in it, failed.
    async fn set_tier(&self, paths: &[String], tier: Tier) -> Result<()>;
}
