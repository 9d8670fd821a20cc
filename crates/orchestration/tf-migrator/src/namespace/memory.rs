//! In-process namespace backed by a sorted map.

use async_stream::try_stream;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tf_error::{ListingError, Result, TierChangeError};

use super::{ListingStream, Namespace, TierChanger};
use crate::tier::{ListingEntry, ObjectRecord, Tier};

/// Default number of entries per listing page.
const DEFAULT_PAGE_SIZE: usize = 1000;

/// A tier change request received by [`MemoryNamespace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedBatch {
    pub paths: Vec<String>,
    pub tier: Tier,
}

/// Namespace held entirely in memory.
///
/// Tier changes follow the same rules as a real archive service: moving an
/// archived object to a warmer tier leaves it in Archive with a pending
/// rehydration until [`MemoryNamespace::complete_rehydrations`] is called.
///
/// Listing and tier-change faults can be injected per prefix, and the number
/// of concurrently open listings is tracked.
#[derive(Debug)]
pub struct MemoryNamespace {
    objects: RwLock<BTreeMap<String, ObjectRecord>>,
    page_size: usize,
    list_delay: Option<Duration>,
    failing_prefixes: HashSet<String>,
    fail_tier_changes: bool,

    list_calls: AtomicU64,
    active_listings: AtomicUsize,
    max_active_listings: AtomicUsize,
    batches: Mutex<Vec<SubmittedBatch>>,
}

impl Default for MemoryNamespace {
    fn default() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
            list_delay: None,
            failing_prefixes: HashSet::new(),
            fail_tier_changes: false,
            list_calls: AtomicU64::new(0),
            active_listings: AtomicUsize::new(0),
            max_active_listings: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryNamespace {
    /// Create an empty namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of entries returned per page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Delay every listing by `delay` before its first page.
    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = Some(delay);
        self
    }

    /// Make listings of exactly `prefix` fail.
    pub fn with_failing_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.failing_prefixes.insert(prefix.into());
        self
    }

    /// Make every tier change request fail.
    pub fn with_failing_tier_changes(mut self) -> Self {
        self.fail_tier_changes = true;
        self
    }

    /// Insert or replace an object.
    pub fn insert(&self, record: ObjectRecord) {
        self.objects.write().insert(record.path.clone(), record);
    }

    /// Insert every record yielded by `records`.
    pub fn extend(&self, records: impl IntoIterator<Item = ObjectRecord>) {
        let mut objects = self.objects.write();
        for record in records {
            objects.insert(record.path.clone(), record);
        }
    }

    /// Look up an object by path.
    pub fn get(&self, path: &str) -> Option<ObjectRecord> {
        self.objects.read().get(path).cloned()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Whether the namespace holds no objects.
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Number of listings requested so far.
    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::Relaxed)
    }

    /// Highest number of listings that were open at the same time.
    pub fn max_active_listings(&self) -> usize {
        self.max_active_listings.load(Ordering::SeqCst)
    }

    /// Every tier change request received, in arrival order.
    pub fn submitted_batches(&self) -> Vec<SubmittedBatch> {
        self.batches.lock().clone()
    }

    /// Finish every pending rehydration, returning how many completed.
    pub fn complete_rehydrations(&self) -> usize {
        let mut completed = 0;
        for record in self.objects.write().values_mut() {
            if let Some(target) = record.pending_rehydration.take() {
                record.tier = target;
                completed += 1;
            }
        }
        completed
    }

    /// Direct children of `prefix`, sub-prefixes first.
    fn children(&self, prefix: &str, delimiter: &str) -> Result<Vec<ListingEntry>> {
        if self.failing_prefixes.contains(prefix) {
            return Err(ListingError::Request {
                prefix: prefix.to_string(),
                message: "injected listing failure".to_string(),
            }
            .into());
        }

        let objects = self.objects.read();
        let mut prefixes = BTreeSet::new();
        let mut records = Vec::new();

        for (path, record) in objects.range(prefix.to_string()..) {
            let Some(rest) = path.strip_prefix(prefix) else {
                break;
            };
            match rest.find(delimiter) {
                Some(idx) => {
                    prefixes.insert(format!("{prefix}{}", &rest[..idx + delimiter.len()]));
                }
                None => records.push(record.clone()),
            }
        }

        Ok(prefixes
            .into_iter()
            .map(ListingEntry::Prefix)
            .chain(records.into_iter().map(ListingEntry::Object))
            .collect())
    }

    fn apply_tier(&self, paths: &[String], tier: Tier) -> (usize, Vec<String>) {
        let mut objects = self.objects.write();
        let mut succeeded = 0;
        let mut failures = Vec::new();

        for path in paths {
            match objects.get_mut(path) {
                Some(record) if record.tier == Tier::Archive && tier != Tier::Archive => {
                    record.pending_rehydration = Some(tier);
                    succeeded += 1;
                }
                Some(record) => {
                    record.tier = tier;
                    record.pending_rehydration = None;
                    succeeded += 1;
                }
                None => failures.push(format!("{path}: no such object")),
            }
        }

        (succeeded, failures)
    }
}

/// Tracks one open listing for the concurrency high-water mark.
struct ListingGuard<'a> {
    active: &'a AtomicUsize,
}

impl<'a> ListingGuard<'a> {
    fn enter(active: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self { active }
    }
}

impl Drop for ListingGuard<'_> {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Namespace for MemoryNamespace {
    fn list<'a>(&'a self, prefix: &'a str, delimiter: &'a str) -> ListingStream<'a> {
        self.list_calls.fetch_add(1, Ordering::Relaxed);

        Box::pin(try_stream! {
            let _guard = ListingGuard::enter(&self.active_listings, &self.max_active_listings);

            if let Some(delay) = self.list_delay {
                tokio::time::sleep(delay).await;
            }

            let entries = self.children(prefix, delimiter)?;
            for page in entries.chunks(self.page_size) {
                for entry in page {
                    yield entry.clone();
                }
                tokio::task::yield_now().await;
            }
        })
    }
}

#[async_trait]
impl TierChanger for MemoryNamespace {
    async fn set_tier(&self, paths: &[String], tier: Tier) -> Result<()> {
        self.batches.lock().push(SubmittedBatch {
            paths: paths.to_vec(),
            tier,
        });

        if self.fail_tier_changes {
            let message = "injected tier change failure".to_string();
            return Err(TierChangeError::Request(message).into());
        }

        let (succeeded, failures) = self.apply_tier(paths, tier);
        match failures.first() {
            None => Ok(()),
            Some(first) => Err(TierChangeError::PartialFailure {
                succeeded,
                failed: failures.len(),
                first_error: first.clone(),
            }
            .into()),
        }
    }
}
