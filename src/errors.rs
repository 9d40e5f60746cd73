//! Error taxonomy for metadata synchronization.
//!
//! Three kinds of failure cross the core's boundary: the remote storage
//! provider ([`ProviderError`]), the document store ([`StoreError`]) and
//! the caller's identity context ([`ContextError`]).  [`SyncError`] is the
//! top-level error returned by the service operations and maps every
//! variant back to one of those kinds via [`SyncError::code`].

use thiserror::Error;

/// Provider error code returned when a bucket carries no tag set.
pub const NO_SUCH_TAG_SET: &str = "NoSuchTagSet";

/// A failed call against the remote storage provider.
#[derive(Debug, Clone, Error)]
#[error("provider {operation} failed: {message}")]
pub struct ProviderError {
    /// Provider operation that failed (e.g. `list_buckets`).
    pub operation: &'static str,
    /// Bucket the call targeted, if any.
    pub bucket: Option<String>,
    /// Provider-specific error code, when the provider reported one.
    pub code: Option<String>,
    /// Human-readable error description.
    pub message: String,
}

impl ProviderError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            bucket: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Whether this is the provider's "bucket has no tags" response, which
    /// callers treat as an empty tag set rather than a failure.
    pub fn is_no_such_tag_set(&self) -> bool {
        self.code.as_deref() == Some(NO_SUCH_TAG_SET)
    }
}

/// Persistence or connectivity failure against the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or opened.
    #[error("failed to connect to metadata store: {message}")]
    Connect { message: String },

    /// The underlying database driver reported an error.
    #[error("metadata store error: {0}")]
    Backend(#[from] rusqlite::Error),

    /// A document could not be encoded or decoded.
    #[error("metadata document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The supplied aggregation pipeline is malformed.
    #[error("invalid pipeline: {message}")]
    InvalidPipeline { message: String },
}

impl StoreError {
    pub fn invalid_pipeline(message: impl Into<String>) -> Self {
        StoreError::InvalidPipeline {
            message: message.into(),
        }
    }
}

/// The call context cannot yield a tenant identity or privileged flag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// No identity context accompanied the call.
    #[error("get context failed")]
    MissingContext,

    /// The context is not privileged and carries no tenant id.
    #[error("get tenant id failed")]
    MissingTenant,
}

/// Top-level error of the synchronization and query operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// One or more bucket tasks failed; failures are in listing order.
    #[error("{} of {total} bucket(s) failed to sync", failures.len())]
    BucketTasks {
        total: usize,
        failures: Vec<BucketFailure>,
    },

    /// The bucket's summed object size does not fit in an `i64`.
    #[error("total object size of bucket '{bucket}' overflows i64")]
    SizeOverflow { bucket: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Context(#[from] ContextError),

    /// The caller cancelled the synchronization.
    #[error("synchronization cancelled")]
    Cancelled,

    /// The synchronization exceeded its configured deadline.
    #[error("synchronization timed out after {seconds}s")]
    TimedOut { seconds: u64 },
}

/// A single bucket task's failure, kept with its listing position.
#[derive(Debug, Error)]
#[error("bucket '{bucket}': {error}")]
pub struct BucketFailure {
    /// Position of the bucket in the provider's listing.
    pub index: usize,
    /// Bucket name.
    pub bucket: String,
    /// What went wrong.
    #[source]
    pub error: Box<SyncError>,
}

impl SyncError {
    /// Return the taxonomy name of this error.
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Provider(_) => "ProviderError",
            SyncError::BucketTasks { .. } => "ProviderError",
            SyncError::SizeOverflow { .. } => "ProviderError",
            SyncError::Store(_) => "StoreError",
            SyncError::Context(_) => "ContextError",
            SyncError::Cancelled => "Cancelled",
            SyncError::TimedOut { .. } => "Cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_such_tag_set_classification() {
        let err = ProviderError::new("get_bucket_tagging", "no tags")
            .with_bucket("b1")
            .with_code(NO_SUCH_TAG_SET);
        assert!(err.is_no_such_tag_set());

        let other = ProviderError::new("get_bucket_tagging", "denied").with_code("AccessDenied");
        assert!(!other.is_no_such_tag_set());
        assert!(!ProviderError::new("get_bucket_tagging", "boom").is_no_such_tag_set());
    }

    #[test]
    fn test_codes() {
        let provider: SyncError = ProviderError::new("list_buckets", "boom").into();
        assert_eq!(provider.code(), "ProviderError");

        let store: SyncError = StoreError::invalid_pipeline("bad").into();
        assert_eq!(store.code(), "StoreError");

        let context: SyncError = ContextError::MissingTenant.into();
        assert_eq!(context.code(), "ContextError");

        let tasks = SyncError::BucketTasks {
            total: 2,
            failures: vec![BucketFailure {
                index: 1,
                bucket: "b2".to_string(),
                error: Box::new(ProviderError::new("head_object", "boom").into()),
            }],
        };
        assert_eq!(tasks.code(), "ProviderError");
        assert_eq!(tasks.to_string(), "1 of 2 bucket(s) failed to sync");
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::new("get_bucket_location", "access denied").with_bucket("b1");
        assert_eq!(
            err.to_string(),
            "provider get_bucket_location failed: access denied"
        );
        assert_eq!(err.bucket.as_deref(), Some("b1"));
    }
}
