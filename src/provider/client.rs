//! Abstract provider client trait.
//!
//! Every object-storage provider must implement [`ProviderClient`].  The
//! trait exposes only the introspection primitives the synchronizer needs:
//! bucket listing, location, tags, object listing and per-object heads.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::errors::ProviderError;

/// A bucket as returned by the provider's bucket listing.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketListing {
    pub name: String,
    pub creation_date: Option<DateTime<Utc>>,
}

/// An object entry from one page of an object listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedObject {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub storage_class: Option<String>,
}

/// One page of an object listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectPage {
    pub objects: Vec<ListedObject>,
    /// Token for the next page; `None` once the listing is exhausted.
    pub next_continuation_token: Option<String>,
}

/// Secondary attributes returned by a head-object call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectHead {
    pub server_side_encryption: Option<String>,
    pub version_id: Option<String>,
    pub content_type: Option<String>,
    /// Raw `Expires` value, unparsed.
    pub expires: Option<String>,
    pub replication_status: Option<String>,
}

/// Async provider introspection contract.
pub trait ProviderClient: Send + Sync + 'static {
    /// Region this client's session is bound to.
    fn region(&self) -> &str;

    /// A client for the same account bound to `region`.
    fn for_region(&self, region: &str) -> Arc<dyn ProviderClient>;

    /// List every bucket of the account.
    fn list_buckets(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<BucketListing>, ProviderError>> + Send + '_>>;

    /// Resolve the region a bucket lives in.
    fn get_bucket_location(
        &self,
        bucket: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ProviderError>> + Send + '_>>;

    /// Fetch a bucket's tag set.  A bucket without tags fails with an
    /// error for which [`ProviderError::is_no_such_tag_set`] holds.
    fn get_bucket_tagging(
        &self,
        bucket: &str,
    ) -> Pin<Box<dyn Future<Output = Result<BTreeMap<String, String>, ProviderError>> + Send + '_>>;

    /// Fetch one page of a bucket's object listing.
    fn list_objects(
        &self,
        bucket: &str,
        continuation_token: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectPage, ProviderError>> + Send + '_>>;

    /// Fetch an object's secondary attributes.
    fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectHead, ProviderError>> + Send + '_>>;
}
