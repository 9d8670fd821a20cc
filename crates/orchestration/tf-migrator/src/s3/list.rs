//! Delimited S3 listing with pagination and storage-class mapping.

use async_stream::try_stream;
use aws_sdk_s3::types::{Object, OptionalObjectAttributes};
use aws_sdk_s3::Client;
use futures::Stream;
use tf_error::{ListingError, Result, TfError};
use tracing::{debug, trace};

use super::retry::{with_retry, RemoteFailure, RetryConfig};
use crate::tier::{ListingEntry, ObjectKind, ObjectRecord, Tier};

/// Map an S3 storage class to a tier.
///
/// A missing class means STANDARD. Classes with no tier equivalent (Outposts,
/// Snow) return `None`.
pub fn tier_for_storage_class(class: Option<&str>) -> Option<Tier> {
    match class.unwrap_or("STANDARD") {
        "STANDARD" | "REDUCED_REDUNDANCY" | "INTELLIGENT_TIERING" | "EXPRESS_ONEZONE" => {
            Some(Tier::Hot)
        }
        "STANDARD_IA" | "ONEZONE_IA" | "GLACIER_IR" => Some(Tier::Cool),
        "GLACIER" | "DEEP_ARCHIVE" => Some(Tier::Archive),
        _ => None,
    }
}

/// Convert a listed S3 object into an [`ObjectRecord`].
///
/// An archived object with a restore in progress is reported as rehydrating
/// to `rehydrating_to`. S3 does not record where a restored copy is headed;
/// the next run moves it to that run's target. Returns `None` for objects
/// that cannot take part in a migration.
fn to_record(
    object: &Object,
    prefix: &str,
    delimiter: &str,
    rehydrating_to: Tier,
) -> Option<ObjectRecord> {
    let key = object.key().filter(|key| !key.is_empty())?;
    let class = object.storage_class().map(|class| class.as_str());

    let Some(tier) = tier_for_storage_class(class) else {
        trace!(key, storage_class = ?class, "Skipping object with unmapped storage class");
        return None;
    };

    let mut record = ObjectRecord::block(key, object.size().unwrap_or(0).max(0) as u64, tier);

    if key == prefix || key.ends_with(delimiter) {
        record = record.with_kind(ObjectKind::DirectoryMarker);
    }

    let restoring = object
        .restore_status()
        .and_then(|status| status.is_restore_in_progress())
        .unwrap_or(false);
    if tier == Tier::Archive && restoring {
        record = record.with_pending_rehydration(rehydrating_to);
    }

    Some(record)
}

/// List one level of `prefix` in `bucket`.
///
/// Common prefixes become [`ListingEntry::Prefix`] entries and contents become
/// [`ListingEntry::Object`] entries. Each page request is retried on transient
/// errors; the stream ends after the last page.
pub fn list_hierarchy<'a>(
    client: &'a Client,
    bucket: &'a str,
    prefix: &'a str,
    delimiter: &'a str,
    rehydrating_to: Tier,
    retry: &'a RetryConfig,
) -> impl Stream<Item = Result<ListingEntry>> + Send + 'a {
    try_stream! {
        let mut continuation_token: Option<String> = None;
        let mut page_number = 0u32;

        loop {
            let page = with_retry(retry, "list_objects_v2", || {
                let mut req = client
                    .list_objects_v2()
                    .bucket(bucket)
                    .delimiter(delimiter)
                    .optional_object_attributes(OptionalObjectAttributes::RestoreStatus);

                if !prefix.is_empty() {
                    req = req.prefix(prefix);
                }

                if let Some(ref token) = continuation_token {
                    req = req.continuation_token(token);
                }

                async move { req.send().await.map_err(RemoteFailure::from_sdk) }
            })
            .await
            .map_err(|e| {
                TfError::from(ListingError::Request {
                    prefix: prefix.to_string(),
                    message: e.to_string(),
                })
            })?;

            page_number += 1;
            debug!(
                page = page_number,
                prefixes = page.common_prefixes().len(),
                objects = page.contents().len(),
                "Listed page"
            );

            for common_prefix in page.common_prefixes() {
                if let Some(sub_prefix) = common_prefix.prefix() {
                    yield ListingEntry::Prefix(sub_prefix.to_string());
                }
            }

            for object in page.contents() {
                if let Some(record) = to_record(object, prefix, delimiter, rehydrating_to) {
                    yield ListingEntry::Object(record);
                }
            }

            match (page.is_truncated(), page.next_continuation_token()) {
                (Some(true), Some(token)) => continuation_token = Some(token.to_string()),
                _ => break,
            }
        }
    }
}
