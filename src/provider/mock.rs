//! Scripted in-memory provider used by the synchronizer tests.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use super::client::{BucketListing, ListedObject, ObjectHead, ObjectPage, ProviderClient};
use crate::errors::{ProviderError, NO_SUCH_TAG_SET};

#[derive(Clone)]
pub(crate) struct MockObject {
    listed: ListedObject,
    head: Result<ObjectHead, ProviderError>,
}

#[derive(Clone)]
pub(crate) struct MockBucket {
    name: String,
    region: String,
    creation_date: Option<DateTime<Utc>>,
    tags: Result<BTreeMap<String, String>, ProviderError>,
    location_error: Option<ProviderError>,
    objects: Vec<MockObject>,
    page_size: usize,
    delay: Duration,
}

impl MockBucket {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            region: "us-east-1".to_string(),
            creation_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single(),
            tags: Ok(BTreeMap::new()),
            location_error: None,
            objects: Vec::new(),
            page_size: 1000,
            delay: Duration::ZERO,
        }
    }

    pub(crate) fn region(mut self, region: &str) -> Self {
        self.region = region.to_string();
        self
    }

    pub(crate) fn tag(mut self, key: &str, value: &str) -> Self {
        if let Ok(tags) = &mut self.tags {
            tags.insert(key.to_string(), value.to_string());
        }
        self
    }

    pub(crate) fn no_tag_set(mut self) -> Self {
        self.tags = Err(ProviderError::new("get_bucket_tagging", "The TagSet does not exist")
            .with_bucket(&self.name)
            .with_code(NO_SUCH_TAG_SET));
        self
    }

    pub(crate) fn tag_error(mut self) -> Self {
        self.tags = Err(ProviderError::new("get_bucket_tagging", "Access Denied")
            .with_bucket(&self.name)
            .with_code("AccessDenied"));
        self
    }

    pub(crate) fn location_error(mut self) -> Self {
        self.location_error = Some(
            ProviderError::new("get_bucket_location", "Access Denied")
                .with_bucket(&self.name)
                .with_code("AccessDenied"),
        );
        self
    }

    pub(crate) fn object(self, key: &str, size: i64) -> Self {
        let head = ObjectHead {
            content_type: Some("application/octet-stream".to_string()),
            ..ObjectHead::default()
        };
        self.object_with_head(key, size, head)
    }

    pub(crate) fn object_with_head(mut self, key: &str, size: i64, head: ObjectHead) -> Self {
        self.objects.push(MockObject {
            listed: ListedObject {
                key: key.to_string(),
                size,
                last_modified: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single(),
                storage_class: Some("STANDARD".to_string()),
            },
            head: Ok(head),
        });
        self
    }

    pub(crate) fn head_error(mut self, key: &str) -> Self {
        let bucket = self.name.clone();
        self.objects.push(MockObject {
            listed: ListedObject {
                key: key.to_string(),
                size: 1,
                last_modified: None,
                storage_class: None,
            },
            head: Err(ProviderError::new("head_object", "Forbidden")
                .with_bucket(bucket)
                .with_code("403")),
        });
        self
    }

    pub(crate) fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Delay applied to this bucket's location lookup.
    pub(crate) fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A provider call observed by the mock: operation, bucket, client region.
pub(crate) type Call = (&'static str, String, String);

#[derive(Default)]
struct MockState {
    buckets: Vec<MockBucket>,
    list_buckets_error: Option<ProviderError>,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

#[derive(Clone)]
pub(crate) struct MockProvider {
    state: Arc<MockState>,
    region: String,
}

impl MockProvider {
    pub(crate) fn new(region: &str, buckets: Vec<MockBucket>) -> Self {
        Self {
            state: Arc::new(MockState {
                buckets,
                ..MockState::default()
            }),
            region: region.to_string(),
        }
    }

    pub(crate) fn failing_listing(region: &str) -> Self {
        Self {
            state: Arc::new(MockState {
                list_buckets_error: Some(ProviderError::new("list_buckets", "Access Denied")),
                ..MockState::default()
            }),
            region: region.to_string(),
        }
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().unwrap().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, operation: &'static str, bucket: &str) {
        self.state
            .calls
            .lock()
            .unwrap()
            .push((operation, bucket.to_string(), self.region.clone()));
    }

    fn bucket(&self, name: &str) -> Result<&MockBucket, ProviderError> {
        self.state
            .buckets
            .iter()
            .find(|b| b.name == name)
            .ok_or_else(|| {
                ProviderError::new("lookup", "NoSuchBucket")
                    .with_bucket(name)
                    .with_code("NoSuchBucket")
            })
    }
}

impl ProviderClient for MockProvider {
    fn region(&self) -> &str {
        &self.region
    }

    fn for_region(&self, region: &str) -> Arc<dyn ProviderClient> {
        Arc::new(Self {
            state: Arc::clone(&self.state),
            region: region.to_string(),
        })
    }

    fn list_buckets(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<BucketListing>, ProviderError>> + Send + '_>> {
        Box::pin(async move {
            self.record("list_buckets", "");
            if let Some(err) = &self.state.list_buckets_error {
                return Err(err.clone());
            }
            Ok(self
                .state
                .buckets
                .iter()
                .map(|b| BucketListing {
                    name: b.name.clone(),
                    creation_date: b.creation_date,
                })
                .collect())
        })
    }

    fn get_bucket_location(
        &self,
        bucket: &str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ProviderError>> + Send + '_>> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            self.record("get_bucket_location", &bucket);
            let b = self.bucket(&bucket)?;

            let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(b.delay).await;
            self.state.in_flight.fetch_sub(1, Ordering::SeqCst);

            match &b.location_error {
                Some(err) => Err(err.clone()),
                None => Ok(b.region.clone()),
            }
        })
    }

    fn get_bucket_tagging(
        &self,
        bucket: &str,
    ) -> Pin<Box<dyn Future<Output = Result<BTreeMap<String, String>, ProviderError>> + Send + '_>>
    {
        let bucket = bucket.to_string();
        Box::pin(async move {
            self.record("get_bucket_tagging", &bucket);
            self.bucket(&bucket)?.tags.clone()
        })
    }

    fn list_objects(
        &self,
        bucket: &str,
        continuation_token: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectPage, ProviderError>> + Send + '_>> {
        let bucket = bucket.to_string();
        let start: usize = continuation_token
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
        Box::pin(async move {
            self.record("list_objects", &bucket);
            let b = self.bucket(&bucket)?;
            let end = (start + b.page_size).min(b.objects.len());
            let objects = b.objects[start..end]
                .iter()
                .map(|o| o.listed.clone())
                .collect();
            let next_continuation_token = (end < b.objects.len()).then(|| end.to_string());
            Ok(ObjectPage {
                objects,
                next_continuation_token,
            })
        })
    }

    fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectHead, ProviderError>> + Send + '_>> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            self.record("head_object", &bucket);
            self.bucket(&bucket)?
                .objects
                .iter()
                .find(|o| o.listed.key == key)
                .map(|o| o.head.clone())
                .unwrap_or_else(|| {
                    Err(ProviderError::new("head_object", "NotFound").with_bucket(&bucket))
                })
        })
    }
}
