//! In-memory document store.
//!
//! Stores all documents in memory with no persistence. Useful for testing
//! and ephemeral deployments. Uses `RwLock<BTreeMap>` for thread-safe access,
//! so documents are scanned in key order.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{PoisonError, RwLock};

use serde_json::Value;

use super::pipeline::{self, Stage};
use super::store::DocumentStore;
use crate::errors::StoreError;

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<BTreeMap<String, Value>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a stored document by key.
    pub fn get(&self, key: &str) -> Option<Value> {
        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        documents.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn replace_with_upsert(
        &self,
        key: &str,
        document: Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
            documents.insert(key, document);
            Ok(())
        })
    }

    fn run_pipeline(
        &self,
        stages: &[Stage],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Value>, StoreError>> + Send + '_>> {
        let stages = stages.to_vec();
        Box::pin(async move {
            let snapshot: Vec<Value> = {
                let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
                documents.values().cloned().collect()
            };
            Ok(pipeline::run(snapshot, &stages))
        })
    }
}
