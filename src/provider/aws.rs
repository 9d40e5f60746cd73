//! AWS S3 provider client.
//!
//! Reads bucket and object metadata from an S3 (or S3-compatible)
//! account.  Credentials are either given explicitly in the backend
//! configuration or resolved via the standard AWS credential chain
//! (env vars, `~/.aws/credentials`, IAM role, etc.).

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use aws_config::SdkConfig;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::client::{BucketListing, ListedObject, ObjectHead, ObjectPage, ProviderClient};
use crate::config::BackendConfig;
use crate::errors::ProviderError;

/// Region S3 reports as an empty location constraint.
const DEFAULT_LOCATION: &str = "us-east-1";

/// Provider client backed by the AWS SDK.
pub struct AwsProviderClient {
    /// AWS S3 SDK client bound to `region`.
    client: Client,
    /// Shared SDK configuration, reused when re-targeting a region.
    sdk_config: SdkConfig,
    /// Region of this client's session.
    region: String,
    /// Force path-style URL addressing.
    use_path_style: bool,
}

impl AwsProviderClient {
    /// Create a client for the backend's default region.
    ///
    /// Loads AWS credentials from the backend configuration when both keys
    /// are set, otherwise from the default credential chain.
    pub async fn new(backend: &BackendConfig) -> Self {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(backend.region.clone()));

        if !backend.endpoint_url.is_empty() {
            config_loader = config_loader.endpoint_url(&backend.endpoint_url);
        }

        if !backend.access_key_id.is_empty() && !backend.secret_access_key.is_empty() {
            let creds = aws_sdk_s3::config::Credentials::new(
                &backend.access_key_id,
                &backend.secret_access_key,
                None, // session_token
                None, // expiry
                "metasync-config",
            );
            config_loader = config_loader.credentials_provider(creds);
        }

        let sdk_config = config_loader.load().await;
        let client = Self::build(&sdk_config, &backend.region, backend.use_path_style);

        info!(
            "AWS provider client initialized: backend={} region={}",
            backend.id, backend.region
        );

        Self {
            client,
            sdk_config,
            region: backend.region.clone(),
            use_path_style: backend.use_path_style,
        }
    }

    fn build(sdk_config: &SdkConfig, region: &str, use_path_style: bool) -> Client {
        let s3_config = aws_sdk_s3::config::Builder::from(sdk_config)
            .region(aws_config::Region::new(region.to_string()))
            .force_path_style(use_path_style)
            .build();
        Client::from_conf(s3_config)
    }

    /// Map an AWS SDK error to a [`ProviderError`], keeping the service code.
    fn map_sdk_error<E>(operation: &'static str, bucket: Option<&str>, err: E) -> ProviderError
    where
        E: ProvideErrorMetadata + std::error::Error,
    {
        let mut mapped = ProviderError::new(operation, DisplayErrorContext(&err).to_string());
        if let Some(code) = err.code() {
            mapped = mapped.with_code(code);
        }
        if let Some(bucket) = bucket {
            mapped = mapped.with_bucket(bucket);
        }
        mapped
    }
}

/// Translate a location constraint into a region name.
fn normalize_location(constraint: Option<&str>) -> String {
    match constraint {
        None | Some("") => DEFAULT_LOCATION.to_string(),
        Some("EU") => "eu-west-1".to_string(),
        Some(region) => region.to_string(),
    }
}

fn to_chrono(dt: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(dt.secs(), dt.subsec_nanos())
}

impl ProviderClient for AwsProviderClient {
    fn region(&self) -> &str {
        &self.region
    }

    fn for_region(&self, region: &str) -> Arc<dyn ProviderClient> {
        debug!("AWS re-targeting client: {} -> {}", self.region, region);
        Arc::new(Self {
            client: Self::build(&self.sdk_config, region, self.use_path_style),
            sdk_config: self.sdk_config.clone(),
            region: region.to_string(),
            use_path_style: self.use_path_style,
        })
    }

    fn list_buckets(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<BucketListing>, ProviderError>> + Send + '_>> {
        Box::pin(async move {
            debug!("AWS list_buckets: region={}", self.region);

            let resp = self
                .client
                .list_buckets()
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("list_buckets", None, e))?;

            Ok(resp
                .buckets()
                .iter()
                .filter_map(|b| {
                    Some(BucketListing {
                        name: b.name()?.to_string(),
                        creation_date: b.creation_date().and_then(to_chrono),
                    })
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
            debug!("AWS get_bucket_location: bucket={}", bucket);

            let resp = self
                .client
                .get_bucket_location()
                .bucket(&bucket)
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("get_bucket_location", Some(&bucket), e))?;

            Ok(normalize_location(
                resp.location_constraint().map(|c| c.as_str()),
            ))
        })
    }

    fn get_bucket_tagging(
        &self,
        bucket: &str,
    ) -> Pin<Box<dyn Future<Output = Result<BTreeMap<String, String>, ProviderError>> + Send + '_>>
    {
        let bucket = bucket.to_string();
        Box::pin(async move {
            debug!("AWS get_bucket_tagging: bucket={}", bucket);

            let resp = self
                .client
                .get_bucket_tagging()
                .bucket(&bucket)
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("get_bucket_tagging", Some(&bucket), e))?;

            Ok(resp
                .tag_set()
                .iter()
                .map(|t| (t.key().to_string(), t.value().to_string()))
                .collect())
        })
    }

    fn list_objects(
        &self,
        bucket: &str,
        continuation_token: Option<&str>,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectPage, ProviderError>> + Send + '_>> {
        let bucket = bucket.to_string();
        let continuation_token = continuation_token.map(|s| s.to_string());
        Box::pin(async move {
            debug!(
                "AWS list_objects_v2: bucket={} token={:?}",
                bucket, continuation_token
            );

            let resp = self
                .client
                .list_objects_v2()
                .bucket(&bucket)
                .set_continuation_token(continuation_token)
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("list_objects", Some(&bucket), e))?;

            let objects = resp
                .contents()
                .iter()
                .filter_map(|o| {
                    Some(ListedObject {
                        key: o.key()?.to_string(),
                        size: o.size().unwrap_or_default(),
                        last_modified: o.last_modified().and_then(to_chrono),
                        storage_class: o.storage_class().map(|c| c.as_str().to_string()),
                    })
                })
                .collect();

            let next_continuation_token = if resp.is_truncated().unwrap_or(false) {
                resp.next_continuation_token().map(|t| t.to_string())
            } else {
                None
            };

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
            debug!("AWS head_object: bucket={} key={}", bucket, key);

            let resp = self
                .client
                .head_object()
                .bucket(&bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("head_object", Some(&bucket), e))?;

            Ok(ObjectHead {
                server_side_encryption: resp
                    .server_side_encryption()
                    .map(|s| s.as_str().to_string()),
                version_id: resp.version_id().map(|s| s.to_string()),
                content_type: resp.content_type().map(|s| s.to_string()),
                expires: resp.expires_string().map(|s| s.to_string()),
                replication_status: resp
                    .replication_status()
                    .map(|s| s.as_str().to_string()),
            })
        })
    }
}
