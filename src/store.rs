//! S3 implementation of [`ObjectStore`] on top of `aws-sdk-s3`.
//!
//! Credentials come from the AWS default provider chain (environment,
//! shared profile, instance metadata). Region and endpoint can be pinned in
//! the `store` section of the config file, which also makes this usable
//! against S3-compatible backends such as MinIO.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration, ObjectCannedAcl};
use aws_sdk_s3::Client;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::contract::{ListPage, ListQuery, ObjectAcl, ObjectStore};
use crate::error::StoreError;

/// Interval between existence probes while waiting for a key to disappear.
const ABSENCE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The one region where S3 rejects an explicit location constraint.
const DEFAULT_S3_REGION: &str = "us-east-1";

fn backend_error<E>(operation: &'static str, err: SdkError<E>) -> StoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StoreError::backend(operation, DisplayErrorContext(&err).to_string())
}

/// `Content-Type` for the image formats screenshots usually come in.
fn content_type_for(key: &str) -> Option<&'static str> {
    let (_, ext) = key.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    /// Build a client from the store config and the ambient AWS environment.
    pub async fn connect(config: &StoreConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint_url) = &config.endpoint_url {
            info!(endpoint_url = %endpoint_url, "Using custom object-store endpoint");
            loader = loader.endpoint_url(endpoint_url);
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.force_path_style)
            .build();
        Self::from_client(Client::from_conf(s3_config))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn region(&self) -> Option<String> {
        self.client.config().region().map(|r| r.to_string())
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        let mut request = self.client.create_bucket().bucket(bucket);
        if let Some(region) = self.region().filter(|r| r != DEFAULT_S3_REGION) {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(region.as_str()))
                    .build(),
            );
        }
        request
            .send()
            .await
            .map_err(|e| backend_error("create_bucket", e))?;
        info!(bucket, "Created bucket");
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| backend_error("delete_bucket", e))?;
        info!(bucket, "Deleted bucket");
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        acl: Option<ObjectAcl>,
    ) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(bytes.to_vec()))
            .set_content_type(content_type_for(key).map(str::to_owned))
            .set_acl(acl.map(|a| ObjectCannedAcl::from(a.as_str())))
            .send()
            .await
            .map_err(|e| backend_error("put_object", e))?;
        debug!(bucket, key, size = bytes.len(), "Put object");
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let output = match self.client.get_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => {
                return Err(StoreError::NotFound {
                    bucket: bucket.to_owned(),
                    key: key.to_owned(),
                });
            }
            Err(err) => return Err(backend_error("get_object", err)),
        };
        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::backend("get_object", e.to_string()))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| backend_error("delete_object", e))?;
        debug!(bucket, key, "Deleted object");
        Ok(())
    }

    async fn list_objects(&self, bucket: &str, query: &ListQuery) -> Result<ListPage, StoreError> {
        let output = self
            .client
            .list_objects()
            .bucket(bucket)
            .set_prefix(query.prefix.clone())
            .set_delimiter(query.delimiter.clone())
            .set_marker(query.marker.clone())
            .max_keys(query.max_keys)
            .send()
            .await
            .map_err(|e| backend_error("list_objects", e))?;

        Ok(ListPage {
            keys: output
                .contents()
                .iter()
                .filter_map(|object| object.key().map(str::to_owned))
                .collect(),
            is_truncated: output.is_truncated().unwrap_or(false),
            next_marker: output.next_marker().map(str::to_owned),
        })
    }

    async fn wait_for_absence(
        &self,
        bucket: &str,
        key: &str,
        timeout: Duration,
    ) -> Result<(), StoreError> {
        let started = Instant::now();
        loop {
            match self.client.head_object().bucket(bucket).key(key).send().await {
                Ok(_) => {}
                Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {
                    return Ok(());
                }
                Err(err) => return Err(backend_error("wait_for_absence", err)),
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(StoreError::Timeout {
                    bucket: bucket.to_owned(),
                    key: key.to_owned(),
                    timeout,
                });
            }
            tokio::time::sleep(ABSENCE_POLL_INTERVAL.min(timeout - elapsed)).await;
        }
    }
}
