//! Abstract document store trait.
//!
//! Any document store backend must implement [`DocumentStore`].  The trait
//! uses `async_trait`-style methods (manual desugaring with pinned
//! futures) so it can back both embedded and remote stores.
//!
//! Documents are plain JSON values addressed by a string key; the store
//! knows nothing about the metadata model beyond that.

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use super::pipeline::Stage;
use crate::errors::StoreError;

/// Async document store contract.
pub trait DocumentStore: Send + Sync + 'static {
    /// Insert `document` under `key`, or replace the stored document in
    /// full if one already exists.
    fn replace_with_upsert(
        &self,
        key: &str,
        document: Value,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Run an aggregation pipeline over every stored document.
    fn run_pipeline(
        &self,
        stages: &[Stage],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Value>, StoreError>> + Send + '_>>;
}
