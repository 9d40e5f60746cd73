//! Persisted metadata documents.
//!
//! One [`BackendAggregate`] is stored per backend, addressed by its id,
//! with buckets and objects nested inside it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a storage backend, as configured outside the sync core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendIdentity {
    /// Unique backend id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Backend type (e.g. `aws-s3`).
    pub backend_type: String,
    /// Default session region.
    pub region: String,
    /// Tenant owning the backend.
    pub tenant_id: String,
}

/// Full metadata snapshot of one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendAggregate {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub backend_type: String,
    pub region: String,
    pub tenant_id: String,
    /// Buckets in the provider's listing order.
    #[serde(default)]
    pub buckets: Vec<BucketSnapshot>,
}

/// Metadata of one bucket and its objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketSnapshot {
    pub name: String,
    pub region: String,
    pub creation_date: Option<DateTime<Utc>>,
    /// `Some(empty)` when the bucket has no tag set, `None` when the tag
    /// lookup failed.
    pub tags: Option<BTreeMap<String, String>>,
    pub object_count: usize,
    pub total_size: i64,
    #[serde(default)]
    pub objects: Vec<ObjectRecord>,
}

/// Metadata of one stored object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub name: String,
    pub size: i64,
    pub last_modified_date: Option<DateTime<Utc>>,
    pub storage_class: String,
    pub encryption: Option<String>,
    pub version_id: Option<String>,
    pub content_type: String,
    pub expires_date: Option<DateTime<Utc>>,
    pub replication_status: Option<String>,
}
