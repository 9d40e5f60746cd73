//! Concurrent per-bucket metadata collection.
//!
//! One task is spawned per listed bucket.  Each task owns its result and
//! hands it back tagged with the bucket's listing index, so the collector
//! writes every snapshot into its own positional slot and no task ever
//! touches another task's data.  An optional semaphore bounds how many
//! bucket tasks talk to the provider at once.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::cancellable;
use super::objects::ObjectEnumerator;
use crate::errors::{BucketFailure, ProviderError, SyncError};
use crate::metadata::model::BucketSnapshot;
use crate::provider::client::{BucketListing, ProviderClient};

/// Collects bucket snapshots for one backend.
pub struct BucketCollector {
    client: Arc<dyn ProviderClient>,
    /// Maximum concurrently running bucket tasks; 0 means unbounded.
    max_concurrency: usize,
    cancel: CancellationToken,
}

impl BucketCollector {
    pub fn new(client: Arc<dyn ProviderClient>, cancel: CancellationToken) -> Self {
        Self {
            client,
            max_concurrency: 0,
            cancel,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// List the backend's buckets and collect every bucket's snapshot.
    ///
    /// Snapshots come back in the provider's listing order.  If any bucket
    /// task fails, all failures are returned together, sorted by listing
    /// index, and no partial result is produced.
    pub async fn collect(&self) -> Result<Vec<BucketSnapshot>, SyncError> {
        let listed = cancellable(&self.cancel, self.client.list_buckets())
            .await?
            .map_err(|e| {
                error!("unable to list buckets. failed with error: {}", e);
                e
            })?;

        let total = listed.len();
        info!(
            "collecting metadata for {} bucket(s) in region {}",
            total,
            self.client.region()
        );

        let limiter = (self.max_concurrency > 0)
            .then(|| Arc::new(Semaphore::new(self.max_concurrency)));
        let names: Vec<String> = listed.iter().map(|b| b.name.clone()).collect();
        let mut slots: Vec<Option<BucketSnapshot>> = vec![None; total];
        let mut failures: Vec<BucketFailure> = Vec::new();

        let mut tasks = JoinSet::new();
        for (index, listing) in listed.into_iter().enumerate() {
            let client = Arc::clone(&self.client);
            let limiter = limiter.clone();
            let cancel = self.cancel.clone();
            tasks.spawn(async move {
                let result = run_bucket_task(client, listing, limiter, &cancel).await;
                (index, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(snapshot))) => slots[index] = Some(snapshot),
                Ok((index, Err(err))) => failures.push(BucketFailure {
                    index,
                    bucket: names[index].clone(),
                    error: Box::new(err),
                }),
                Err(join_err) => {
                    // The slot stays empty and is reported below.
                    error!("bucket task aborted: {}", join_err);
                }
            }
        }

        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        // Slots neither filled nor failed belong to tasks that panicked.
        for (index, slot) in slots.iter().enumerate() {
            if slot.is_none() && !failures.iter().any(|f| f.index == index) {
                failures.push(BucketFailure {
                    index,
                    bucket: names[index].clone(),
                    error: Box::new(
                        ProviderError::new("collect_bucket", "bucket task aborted")
                            .with_bucket(&names[index])
                            .into(),
                    ),
                });
            }
        }

        if !failures.is_empty() {
            failures.sort_by_key(|f| f.index);
            return Err(SyncError::BucketTasks { total, failures });
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

async fn run_bucket_task(
    client: Arc<dyn ProviderClient>,
    listing: BucketListing,
    limiter: Option<Arc<Semaphore>>,
    cancel: &CancellationToken,
) -> Result<BucketSnapshot, SyncError> {
    let _permit = match limiter {
        Some(semaphore) => Some(
            cancellable(cancel, semaphore.acquire_owned())
                .await?
                .map_err(|_| SyncError::Cancelled)?,
        ),
        None => None,
    };
    collect_bucket(client, listing, cancel).await
}

/// Region, tags and objects of a single bucket.
async fn collect_bucket(
    client: Arc<dyn ProviderClient>,
    listing: BucketListing,
    cancel: &CancellationToken,
) -> Result<BucketSnapshot, SyncError> {
    let BucketListing {
        name,
        creation_date,
    } = listing;

    let region = cancellable(cancel, client.get_bucket_location(&name))
        .await?
        .map_err(|e| {
            error!(
                "unable to get bucket location of {}. failed with error: {}",
                name, e
            );
            e
        })?;

    // Later calls must be issued against the bucket's own region.
    let client = if region != client.region() {
        debug!("bucket {} lives in {}, re-targeting client", name, region);
        client.for_region(&region)
    } else {
        client
    };

    let tags = match cancellable(cancel, client.get_bucket_tagging(&name)).await? {
        Ok(tags) => Some(tags),
        Err(e) if e.is_no_such_tag_set() => Some(BTreeMap::new()),
        Err(e) => {
            error!(
                "unable to get bucket tags of {}. failed with error: {}",
                name, e
            );
            None
        }
    };

    let mut snapshot = BucketSnapshot {
        name,
        region,
        creation_date,
        tags,
        object_count: 0,
        total_size: 0,
        objects: Vec::new(),
    };
    ObjectEnumerator::new(client.as_ref(), cancel)
        .populate(&mut snapshot)
        .await?;

    debug!(
        "collected bucket {}: objects={} size={}",
        snapshot.name, snapshot.object_count, snapshot.total_size
    );
    Ok(snapshot)
}
