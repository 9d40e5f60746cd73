//! Metadata store adapter.
//!
//! Persists backend aggregates into a [`DocumentStore`] and answers
//! tenant-scoped aggregation queries against them.  The process shares a
//! single adapter, created on first use by [`global`].

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, error, info};

use super::memory::MemoryDocumentStore;
use super::model::BackendAggregate;
use super::pipeline::Stage;
use super::sqlite::SqliteDocumentStore;
use super::store::DocumentStore;
use super::tenant::{CallContext, TenantScope};
use crate::config::MetadataConfig;
use crate::errors::{StoreError, SyncError};

/// Process-wide adapter, set by the first successful [`global`] call.
static ADAPTER: OnceCell<Arc<MetadataStoreAdapter>> = OnceCell::const_new();

/// Return the shared adapter, connecting on first use.
///
/// Initialization is serialized: concurrent callers wait for the first
/// attempt, a successful connect is kept for the life of the process, and
/// a failed one leaves the cell empty so a later call can try again.
pub async fn global(config: &MetadataConfig) -> Result<Arc<MetadataStoreAdapter>, StoreError> {
    let adapter = ADAPTER
        .get_or_try_init(|| async {
            let store = connect(config)?;
            info!("Connected to metadata store (engine={})", config.engine);
            Ok::<_, StoreError>(Arc::new(MetadataStoreAdapter::new(store)))
        })
        .await?;
    Ok(Arc::clone(adapter))
}

/// Open the document store selected by `config.engine`.
pub fn connect(config: &MetadataConfig) -> Result<Arc<dyn DocumentStore>, StoreError> {
    match config.engine.as_str() {
        "memory" => Ok(Arc::new(MemoryDocumentStore::new())),
        "sqlite" => {
            let path = &config.sqlite.path;
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| StoreError::Connect {
                        message: format!("{}: {e}", parent.display()),
                    })?;
                }
            }
            let store = SqliteDocumentStore::new(path, &config.sqlite.collection)?;
            info!("SQLite metadata store opened at {}", path);
            Ok(Arc::new(store))
        }
        other => Err(StoreError::Connect {
            message: format!("unknown metadata engine '{other}'"),
        }),
    }
}

/// Upsert and tenant-scoped query over stored backend aggregates.
pub struct MetadataStoreAdapter {
    store: Arc<dyn DocumentStore>,
}

impl MetadataStoreAdapter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Replace the stored aggregate sharing `aggregate.id`, or insert it.
    pub async fn upsert(&self, aggregate: &BackendAggregate) -> Result<(), StoreError> {
        let document = serde_json::to_value(aggregate)?;
        match self
            .store
            .replace_with_upsert(&aggregate.id, document)
            .await
        {
            Ok(()) => {
                info!("metadata successfully synced for backend id: {}", aggregate.id);
                Ok(())
            }
            Err(e) => {
                error!(
                    "failed to sync metadata for backend id: {}. failed with error: {}",
                    aggregate.id, e
                );
                Err(e)
            }
        }
    }

    /// Run `stages` against stored aggregates on behalf of `ctx`.
    ///
    /// The context is resolved before the store is touched; a context with
    /// neither a tenant nor the privileged flag fails without reading
    /// anything.  Non-privileged callers get the tenant predicate
    /// conjoined ahead of their own stages.
    pub async fn query(
        &self,
        stages: Vec<Stage>,
        ctx: Option<&CallContext>,
    ) -> Result<Vec<BackendAggregate>, SyncError> {
        info!("received list metadata request");
        let scope = TenantScope::from_context(ctx).map_err(|e| {
            error!("rejecting metadata query: {}", e);
            e
        })?;

        let pipeline = scope.apply(stages);
        debug!("pipeline query: {:?}", pipeline);

        let documents = self.store.run_pipeline(&pipeline).await.map_err(|e| {
            error!("Failed to execute query in metadata store: {}", e);
            e
        })?;

        documents
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(|e| StoreError::from(e).into()))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::ContextError;
    use crate::metadata::model::BucketSnapshot;
    use crate::metadata::tenant::CTX_KEY_IS_ADMIN;
    use serde_json::{json, Value};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Wraps a store and counts every call made against it.
    pub(crate) struct CountingStore {
        inner: MemoryDocumentStore,
        pub(crate) calls: AtomicUsize,
    }

    impl CountingStore {
        pub(crate) fn new() -> Self {
            Self {
                inner: MemoryDocumentStore::new(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl DocumentStore for CountingStore {
        fn replace_with_upsert(
            &self,
            key: &str,
            document: Value,
        ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.replace_with_upsert(key, document)
        }

        fn run_pipeline(
            &self,
            stages: &[Stage],
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Value>, StoreError>> + Send + '_>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.run_pipeline(stages)
        }
    }

    fn aggregate(id: &str, tenant: &str) -> BackendAggregate {
        BackendAggregate {
            id: id.to_string(),
            name: format!("{id}-name"),
            backend_type: "aws-s3".to_string(),
            region: "us-east-1".to_string(),
            tenant_id: tenant.to_string(),
            buckets: vec![BucketSnapshot {
                name: format!("{id}-bucket"),
                region: "us-east-1".to_string(),
                creation_date: None,
                tags: None,
                object_count: 0,
                total_size: 0,
                objects: Vec::new(),
            }],
        }
    }

    async fn seeded() -> (Arc<CountingStore>, MetadataStoreAdapter) {
        let store = Arc::new(CountingStore::new());
        let adapter = MetadataStoreAdapter::new(store.clone());
        for (id, tenant) in [("a", "t1"), ("b", "t2"), ("c", "t1")] {
            adapter.upsert(&aggregate(id, tenant)).await.unwrap();
        }
        store.calls.store(0, Ordering::SeqCst);
        (store, adapter)
    }

    #[tokio::test]
    async fn test_upsert_is_full_replace() {
        let (_, adapter) = seeded().await;
        let mut updated = aggregate("a", "t1");
        updated.buckets.clear();
        adapter.upsert(&updated).await.unwrap();

        let all = adapter
            .query(Vec::new(), Some(&CallContext::admin()))
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], updated);
    }

    #[tokio::test]
    async fn test_tenant_query_only_sees_own_aggregates() {
        let (_, adapter) = seeded().await;
        let ctx = CallContext::for_tenant("t1");

        let pipelines = [
            json!([]),
            json!([{"$match": {"tenant_id": "t2"}}]),
            json!([{"$match": {"tenant_id": {"$in": ["t1", "t2"]}}}]),
            json!([{"$sort": {"id": -1}}, {"$limit": 10}]),
            json!([{"$matchBuckets": {"name": {"$exists": true}}}]),
        ];
        for pipeline in pipelines {
            let stages = Stage::parse_pipeline(&pipeline).unwrap();
            let result = adapter.query(stages, Some(&ctx)).await.unwrap();
            assert!(
                result.iter().all(|a| a.tenant_id == "t1"),
                "leak for pipeline {pipeline}"
            );
        }

        let all = adapter.query(Vec::new(), Some(&ctx)).await.unwrap();
        let ids: Vec<_> = all.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_admin_sees_every_tenant() {
        let (_, adapter) = seeded().await;
        let all = adapter
            .query(Vec::new(), Some(&CallContext::admin()))
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_context_failure_never_touches_store() {
        let (store, adapter) = seeded().await;

        let err = adapter.query(Vec::new(), None).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Context(ContextError::MissingContext)
        ));

        let ctx = CallContext::new().with_claim(CTX_KEY_IS_ADMIN, "false");
        let err = adapter.query(Vec::new(), Some(&ctx)).await.unwrap_err();
        assert!(matches!(err, SyncError::Context(ContextError::MissingTenant)));
        assert_eq!(err.code(), "ContextError");

        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_undecodable_document_is_store_error() {
        let store = Arc::new(MemoryDocumentStore::new());
        store
            .replace_with_upsert("x", json!({"id": "x", "tenant_id": "t1"}))
            .await
            .unwrap();
        let adapter = MetadataStoreAdapter::new(store);

        let err = adapter
            .query(Vec::new(), Some(&CallContext::for_tenant("t1")))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Store(StoreError::Serialization(_))));
    }

    #[test]
    fn test_connect_unknown_engine() {
        let config = MetadataConfig {
            engine: "mongo".to_string(),
            ..MetadataConfig::default()
        };
        assert!(matches!(
            connect(&config).err().unwrap(),
            StoreError::Connect { .. }
        ));
    }

    #[tokio::test]
    async fn test_connect_sqlite_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MetadataConfig::default();
        config.sqlite.path = dir
            .path()
            .join("nested/metadata.db")
            .to_string_lossy()
            .into_owned();

        let adapter = MetadataStoreAdapter::new(connect(&config).unwrap());
        adapter.upsert(&aggregate("a", "t1")).await.unwrap();
        assert!(dir.path().join("nested/metadata.db").exists());
    }

    #[tokio::test]
    async fn test_global_is_initialized_once() {
        let config = MetadataConfig {
            engine: "memory".to_string(),
            ..MetadataConfig::default()
        };
        let first = global(&config).await.unwrap();
        let second = global(&config).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
