//! Object enumeration for a single bucket.
//!
//! Objects are listed page by page until the provider stops returning a
//! continuation token, and each listed object gets one head call for its
//! secondary attributes.  Everything runs sequentially inside the calling
//! bucket task.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::cancellable;
use crate::errors::{ProviderError, SyncError};
use crate::metadata::model::{BucketSnapshot, ObjectRecord};
use crate::provider::client::{ListedObject, ObjectHead, ProviderClient};

/// Storage class assumed when the listing omits one.
const DEFAULT_STORAGE_CLASS: &str = "STANDARD";

/// Fills a bucket snapshot's object fields from the provider.
pub struct ObjectEnumerator<'a> {
    client: &'a dyn ProviderClient,
    cancel: &'a CancellationToken,
}

impl<'a> ObjectEnumerator<'a> {
    pub fn new(client: &'a dyn ProviderClient, cancel: &'a CancellationToken) -> Self {
        Self { client, cancel }
    }

    /// Populate `objects`, `object_count` and `total_size` of `bucket`.
    ///
    /// A failed listing or head call aborts the bucket; an unparseable
    /// expiry only drops that field.
    pub async fn populate(&self, bucket: &mut BucketSnapshot) -> Result<(), SyncError> {
        let objects = self.enumerate(&bucket.name).await?;
        let total_size = total_size(&objects).ok_or_else(|| SyncError::SizeOverflow {
            bucket: bucket.name.clone(),
        })?;

        bucket.object_count = objects.len();
        bucket.total_size = total_size;
        bucket.objects = objects;
        Ok(())
    }

    async fn enumerate(&self, bucket: &str) -> Result<Vec<ObjectRecord>, SyncError> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = cancellable(self.cancel, self.client.list_objects(bucket, token.as_deref()))
                .await?
                .map_err(|e| {
                    error!(
                        "unable to list objects in bucket {}. failed with error: {}",
                        bucket, e
                    );
                    e
                })?;
            debug!(
                "listed {} object(s) in bucket {}",
                page.objects.len(),
                bucket
            );

            for listed in page.objects {
                let head = cancellable(self.cancel, self.client.head_object(bucket, &listed.key))
                    .await?
                    .map_err(|e| {
                        error!(
                            "cannot perform head object on object {} in bucket {}. failed with error: {}",
                            listed.key, bucket, e
                        );
                        e
                    })?;
                objects.push(object_record(listed, head));
            }

            match page.next_continuation_token {
                Some(next) if token.as_deref() == Some(next.as_str()) => {
                    return Err(ProviderError::new(
                        "list_objects",
                        format!("continuation token '{next}' did not advance"),
                    )
                    .with_bucket(bucket)
                    .into());
                }
                Some(next) => token = Some(next),
                None => break,
            }
        }

        Ok(objects)
    }
}

/// Exact sum of object sizes; `None` on `i64` overflow.
pub fn total_size(objects: &[ObjectRecord]) -> Option<i64> {
    objects
        .iter()
        .try_fold(0i64, |total, object| total.checked_add(object.size))
}

fn object_record(listed: ListedObject, head: ObjectHead) -> ObjectRecord {
    let expires_date = head.expires.as_deref().and_then(|raw| {
        let parsed = parse_expires(raw);
        if parsed.is_none() {
            warn!(
                "unable to parse expiry '{}' of object {}. skipping ExpiresDate field",
                raw, listed.key
            );
        }
        parsed
    });

    ObjectRecord {
        name: listed.key,
        size: listed.size,
        last_modified_date: listed.last_modified,
        storage_class: listed
            .storage_class
            .unwrap_or_else(|| DEFAULT_STORAGE_CLASS.to_string()),
        encryption: head.server_side_encryption,
        version_id: head.version_id,
        content_type: head.content_type.unwrap_or_default(),
        expires_date,
        replication_status: head.replication_status,
    }
}

/// Parse an expiry timestamp: RFC 3339, or the RFC 2822 HTTP-date form.
fn parse_expires(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
