//! S3 implementation of the namespace and tier-change seams.

use async_trait::async_trait;
use aws_sdk_s3::types::{
    CompletedMultipartUpload, CompletedPart, GlacierJobParameters, MetadataDirective,
    RestoreRequest, StorageClass, Tier as RetrievalTier,
};
use aws_sdk_s3::Client;
use futures::{stream, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tf_error::{Result, TierChangeError};
use tracing::{debug, info, warn};

use super::client::{create_s3_client, S3Access};
use super::list::list_hierarchy;
use super::retry::{with_retry, RemoteFailure, RetryConfig};
use crate::config::MigrationConfig;
use crate::namespace::{ListingStream, Namespace, TierChanger};
use crate::tier::{ListingEntry, Tier};

/// Objects changed concurrently within one batch.
const DEFAULT_ITEM_CONCURRENCY: usize = 16;

/// Days a restored copy of an archived object stays readable.
const DEFAULT_RESTORE_DAYS: i32 = 7;

/// Largest source a single `CopyObject` call accepts (5 GiB).
pub const MAX_COPY_OBJECT_SIZE: u64 = 5 * 1024 * 1024 * 1024;

const MIN_COPY_PART_SIZE: u64 = 512 * 1024 * 1024;
const MAX_UPLOAD_PARTS: u64 = 10_000;

/// Storage class written when moving an object to `tier`.
pub fn storage_class_for(tier: Tier) -> StorageClass {
    match tier {
        Tier::Hot => StorageClass::Standard,
        Tier::Cool => StorageClass::StandardIa,
        Tier::Archive => StorageClass::Glacier,
    }
}

/// Tier reported for archived objects whose restore is in progress.
fn rehydration_target(target: Tier) -> Tier {
    match target {
        Tier::Cool => Tier::Cool,
        Tier::Hot | Tier::Archive => Tier::Hot,
    }
}

/// `CopySource` value for an in-place copy of `key`.
fn copy_source(bucket: &str, key: &str) -> String {
    format!("{bucket}/{}", urlencoding::encode(key))
}

/// One part of a multipart copy: an inclusive byte range of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyPart {
    pub number: i32,
    pub first_byte: u64,
    pub last_byte: u64,
}

impl CopyPart {
    fn range(&self) -> String {
        format!("bytes={}-{}", self.first_byte, self.last_byte)
    }
}

/// Parts for copying an object of `size` bytes, or `None` when a single
/// `CopyObject` call can copy it.
pub fn copy_parts(size: u64) -> Option<Vec<CopyPart>> {
    if size <= MAX_COPY_OBJECT_SIZE {
        return None;
    }

    let part_size = MIN_COPY_PART_SIZE.max(size.div_ceil(MAX_UPLOAD_PARTS));
    let parts = (0..size.div_ceil(part_size))
        .map(|index| {
            let first_byte = index * part_size;
            CopyPart {
                number: index as i32 + 1,
                first_byte,
                last_byte: (first_byte + part_size).min(size) - 1,
            }
        })
        .collect();
    Some(parts)
}

fn is_archived(failure: &RemoteFailure) -> bool {
    failure.has_code("InvalidObjectState") || failure.has_code("ObjectNotInActiveTierError")
}

/// Namespace and tier changer over one S3 bucket.
///
/// Tier changes rewrite each object in place with the target storage class:
/// `CopyObject` up to 5 GiB, a multipart `UploadPartCopy` above that. Listing
/// remembers which objects are too large for a single copy. S3 refuses to
/// copy archived objects; those are rehydrated with `RestoreObject` instead
/// and show up as pending rehydration in later listings.
#[derive(Debug, Clone)]
pub struct S3Backend {
    client: Client,
    bucket: String,
    retry: RetryConfig,
    item_concurrency: usize,
    restore_days: i32,
    rehydrating_to: Tier,
    large_objects: Arc<Mutex<HashMap<String, u64>>>,
}

impl S3Backend {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            retry: RetryConfig::default(),
            item_concurrency: DEFAULT_ITEM_CONCURRENCY,
            restore_days: DEFAULT_RESTORE_DAYS,
            rehydrating_to: Tier::Hot,
            large_objects: Arc::default(),
        }
    }

    /// Connect to the container of a validated run.
    pub async fn connect(config: &MigrationConfig, access: &S3Access) -> Result<Self> {
        let client = create_s3_client(config, access).await?;
        Ok(Self::new(client, &config.container).with_target_tier(config.target_tier))
    }

    /// Report restores in progress as rehydrating towards the run's `target`.
    pub fn with_target_tier(mut self, target: Tier) -> Self {
        self.rehydrating_to = rehydration_target(target);
        self
    }

    /// Set the retry configuration for every remote call.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set how many objects of a batch are changed at once.
    pub fn with_item_concurrency(mut self, item_concurrency: usize) -> Self {
        self.item_concurrency = item_concurrency.max(1);
        self
    }

    /// Set how long restored archive copies remain available.
    pub fn with_restore_days(mut self, days: i32) -> Self {
        self.restore_days = days.max(1);
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn note_listed(&self, entry: &ListingEntry) {
        if let ListingEntry::Object(record) = entry {
            if record.size_bytes > MAX_COPY_OBJECT_SIZE {
                self.large_objects
                    .lock()
                    .insert(record.path.clone(), record.size_bytes);
            }
        }
    }

    fn large_object_size(&self, key: &str) -> Option<u64> {
        self.large_objects.lock().get(key).copied()
    }

    async fn change_tier(
        &self,
        key: &str,
        tier: Tier,
    ) -> std::result::Result<(), RemoteFailure> {
        let copied = match self.large_object_size(key).and_then(copy_parts) {
            Some(parts) => self.copy_multipart(key, tier, &parts).await,
            None => self.copy_in_place(key, tier).await,
        };

        let changed = match copied {
            Err(failure) if tier != Tier::Archive && is_archived(&failure) => {
                debug!(key, "Object is archived, requesting restore");
                self.restore(key).await
            }
            other => other,
        };

        if changed.is_ok() {
            self.large_objects.lock().remove(key);
        }
        changed
    }

    async fn copy_in_place(
        &self,
        key: &str,
        tier: Tier,
    ) -> std::result::Result<(), RemoteFailure> {
        with_retry(&self.retry, "copy_object", || {
            let req = self
                .client
                .copy_object()
                .bucket(&self.bucket)
                .key(key)
                .copy_source(copy_source(&self.bucket, key))
                .storage_class(storage_class_for(tier))
                .metadata_directive(MetadataDirective::Copy);
            async move { req.send().await.map(|_| ()).map_err(RemoteFailure::from_sdk) }
        })
        .await
    }

    async fn copy_multipart(
        &self,
        key: &str,
        tier: Tier,
        parts: &[CopyPart],
    ) -> std::result::Result<(), RemoteFailure> {
        // A multipart upload starts without the source's metadata
        let head = with_retry(&self.retry, "head_object", || {
            let req = self.client.head_object().bucket(&self.bucket).key(key);
            async move { req.send().await.map_err(RemoteFailure::from_sdk) }
        })
        .await?;

        let upload = with_retry(&self.retry, "create_multipart_upload", || {
            let req = self
                .client
                .create_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .storage_class(storage_class_for(tier))
                .set_content_type(head.content_type().map(str::to_string))
                .set_metadata(head.metadata().cloned());
            async move { req.send().await.map_err(RemoteFailure::from_sdk) }
        })
        .await?;
        let upload_id = upload
            .upload_id()
            .ok_or_else(|| RemoteFailure::new(None, "multipart upload started without an id"))?
            .to_string();

        info!(key, parts = parts.len(), tier = %tier, "Copying large object in parts");

        let completed = match self.upload_copy_parts(key, &upload_id, parts).await {
            Ok(completed) => completed,
            Err(failure) => {
                self.abort_upload(key, &upload_id).await;
                return Err(failure);
            }
        };

        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed))
            .build();
        with_retry(&self.retry, "complete_multipart_upload", || {
            let req = self
                .client
                .complete_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .multipart_upload(upload.clone());
            async move { req.send().await.map(|_| ()).map_err(RemoteFailure::from_sdk) }
        })
        .await
    }

    async fn upload_copy_parts(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CopyPart],
    ) -> std::result::Result<Vec<CompletedPart>, RemoteFailure> {
        let source = copy_source(&self.bucket, key);
        let mut completed = Vec::with_capacity(parts.len());

        for part in parts {
            let output = with_retry(&self.retry, "upload_part_copy", || {
                let req = self
                    .client
                    .upload_part_copy()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(part.number)
                    .copy_source(&source)
                    .copy_source_range(part.range());
                async move { req.send().await.map_err(RemoteFailure::from_sdk) }
            })
            .await?;

            let e_tag = output
                .copy_part_result()
                .and_then(|result| result.e_tag())
                .map(str::to_string);
            completed.push(
                CompletedPart::builder()
                    .part_number(part.number)
                    .set_e_tag(e_tag)
                    .build(),
            );
        }

        Ok(completed)
    }

    async fn abort_upload(&self, key: &str, upload_id: &str) {
        let aborted = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await;
        if let Err(e) = aborted {
            warn!(
                key,
                upload_id,
                error = %RemoteFailure::from_sdk(e),
                "Failed to abort multipart copy"
            );
        }
    }

    async fn restore(&self, key: &str) -> std::result::Result<(), RemoteFailure> {
        let job = GlacierJobParameters::builder()
            .tier(RetrievalTier::Standard)
            .build()
            .map_err(|e| RemoteFailure::new(None, e.to_string()))?;
        let request = RestoreRequest::builder()
            .days(self.restore_days)
            .glacier_job_parameters(job)
            .build();

        let restored = with_retry(&self.retry, "restore_object", || {
            let req = self
                .client
                .restore_object()
                .bucket(&self.bucket)
                .key(key)
                .restore_request(request.clone());
            async move { req.send().await.map(|_| ()).map_err(RemoteFailure::from_sdk) }
        })
        .await;

        match restored {
            Err(failure) if failure.has_code("RestoreAlreadyInProgress") => Ok(()),
            other => other,
        }
    }
}

impl Namespace for S3Backend {
    fn list<'a>(&'a self, prefix: &'a str, delimiter: &'a str) -> ListingStream<'a> {
        Box::pin(
            list_hierarchy(
                &self.client,
                &self.bucket,
                prefix,
                delimiter,
                self.rehydrating_to,
                &self.retry,
            )
            .inspect_ok(move |entry| self.note_listed(entry)),
        )
    }
}

#[async_trait]
impl TierChanger for S3Backend {
    async fn set_tier(&self, paths: &[String], tier: Tier) -> Result<()> {
        let failures: Vec<String> = stream::iter(paths.iter().cloned())
            .map(|key: String| async move {
                self.change_tier(&key, tier)
                    .await
                    .err()
                    .map(|failure| format!("{key}: {failure}"))
            })
            .buffer_unordered(self.item_concurrency)
            .filter_map(|failure| async move { failure })
            .collect()
            .await;

        let Some(first_error) = failures.first().cloned() else {
            return Ok(());
        };

        warn!(
            bucket = %self.bucket,
            failed = failures.len(),
            total = paths.len(),
            first_error = %first_error,
            "Tier change batch had failures"
        );

        if failures.len() == paths.len() {
            Err(TierChangeError::Request(first_error).into())
        } else {
            Err(TierChangeError::PartialFailure {
                succeeded: paths.len() - failures.len(),
                failed: failures.len(),
                first_error,
            }
            .into())
        }
    }
}
