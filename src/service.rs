//! Metadata service: the two operations exposed to callers.
//!
//! [`MetadataService::sync_metadata`] refreshes one backend's stored
//! aggregate from its provider; [`MetadataService::list_metadata`] runs a
//! tenant-scoped query over everything stored.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::SyncConfig;
use crate::errors::SyncError;
use crate::metadata::adapter::MetadataStoreAdapter;
use crate::metadata::model::{BackendAggregate, BackendIdentity};
use crate::metadata::pipeline::Stage;
use crate::metadata::tenant::CallContext;
use crate::metrics;
use crate::provider::client::ProviderClient;
use crate::sync::{assemble, BucketCollector};

pub struct MetadataService {
    store: Arc<MetadataStoreAdapter>,
    config: SyncConfig,
}

impl MetadataService {
    pub fn new(store: Arc<MetadataStoreAdapter>, config: SyncConfig) -> Self {
        Self { store, config }
    }

    /// Collect the backend's full metadata and upsert it as one aggregate.
    ///
    /// Nothing is written unless every bucket was collected.  Cancelling
    /// `cancel`, or exceeding `sync.timeout_seconds`, stops the cycle.
    pub async fn sync_metadata(
        &self,
        identity: &BackendIdentity,
        client: Arc<dyn ProviderClient>,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        info!("syncing metadata for backend id: {}", identity.id);
        let start = Instant::now();

        let result = self.run_sync(identity, client, cancel).await;

        metrics::record_sync(&identity.id, &result, start.elapsed());
        if let Err(e) = &result {
            error!(
                "metadata sync for backend id: {} failed with error: {}",
                identity.id, e
            );
        }
        result
    }

    async fn run_sync(
        &self,
        identity: &BackendIdentity,
        client: Arc<dyn ProviderClient>,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let collector = BucketCollector::new(client, cancel.clone())
            .with_max_concurrency(self.config.max_concurrent_buckets);

        let buckets = match self.config.timeout_seconds {
            0 => collector.collect().await?,
            seconds => tokio::time::timeout(Duration::from_secs(seconds), collector.collect())
                .await
                .map_err(|_| SyncError::TimedOut { seconds })??,
        };

        let aggregate = assemble(identity, buckets);
        self.store.upsert(&aggregate).await?;

        let objects = aggregate.buckets.iter().map(|b| b.object_count).sum();
        metrics::record_aggregate(&identity.id, aggregate.buckets.len(), objects);
        Ok(())
    }

    /// Run an aggregation pipeline over stored aggregates for `ctx`.
    pub async fn list_metadata(
        &self,
        stages: Vec<Stage>,
        ctx: Option<&CallContext>,
    ) -> Result<Vec<BackendAggregate>, SyncError> {
        let result = self.store.query(stages, ctx).await;
        metrics::record_query(&result);
        result
    }
}
