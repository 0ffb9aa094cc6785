use crate::keys::validate_key;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::retry::RetryConfig;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::create_bucket::CreateBucketError;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::head_bucket::HeadBucketError;
use aws_sdk_s3::operation::head_object::HeadObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::time::Instant;

/// Region in which S3 rejects an explicit location constraint.
const DEFAULT_S3_REGION: &str = "us-east-1";

/// Error codes S3 returns when an `If-None-Match: *` write finds an existing object.
const OBJECT_EXISTS_CODES: [&str; 2] = ["PreconditionFailed", "ConditionalRequestConflict"];

/// S3 storage implementation
#[derive(Clone, Debug)]
pub struct S3Storage {
    client: Client,
    region: String,
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// SDK retries are disabled: a failed call is reported once and the caller owns retry policy.
    ///
    /// # Arguments
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(region: String, endpoint_url: Option<String>) -> StorageResult<Self> {
        let region_provider =
            RegionProviderChain::first_try(aws_config::Region::new(region.clone()));

        let retry_config = RetryConfig::disabled();

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(region_provider)
            .retry_config(retry_config.clone())
            .load()
            .await;

        let client = if let Some(ref endpoint) = endpoint_url {
            let mut s3_config_builder = aws_sdk_s3::Config::builder()
                .endpoint_url(endpoint)
                .region(config.region().cloned())
                .retry_config(retry_config)
                .behavior_version(BehaviorVersion::latest());
            if let Some(provider) = config.credentials_provider() {
                s3_config_builder = s3_config_builder.credentials_provider(provider);
            }
            // Path-style addressing is required by MinIO and most S3-compatible providers
            s3_config_builder = s3_config_builder.force_path_style(true);

            Client::from_conf(s3_config_builder.build())
        } else {
            Client::new(&config)
        };

        tracing::info!(
            region = %region,
            endpoint = ?endpoint_url,
            "S3 storage client initialized"
        );

        Ok(S3Storage { client, region })
    }

    fn create_bucket_configuration(&self) -> Option<CreateBucketConfiguration> {
        if self.region == DEFAULT_S3_REGION {
            return None;
        }
        Some(
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                .build(),
        )
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(service_err))
                if matches!(service_err.err(), HeadBucketError::NotFound(_)) =>
            {
                Ok(false)
            }
            Err(e) => Err(StorageError::BackendError(format!(
                "HeadBucket {} failed: {}",
                bucket, e
            ))),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> StorageResult<()> {
        let start = Instant::now();
        let result = self
            .client
            .create_bucket()
            .bucket(bucket)
            .set_create_bucket_configuration(self.create_bucket_configuration())
            .send()
            .await;

        match result {
            Ok(_) => {
                tracing::info!(
                    bucket = %bucket,
                    region = %self.region,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 bucket created"
                );
                Ok(())
            }
            Err(SdkError::ServiceError(service_err))
                if matches!(
                    service_err.err(),
                    CreateBucketError::BucketAlreadyOwnedByYou(_)
                ) =>
            {
                tracing::debug!(bucket = %bucket, "S3 bucket already owned by this account");
                Ok(())
            }
            Err(e) => {
                tracing::error!(bucket = %bucket, error = %e, "S3 bucket creation failed");
                Err(StorageError::BackendError(format!(
                    "CreateBucket {} failed: {}",
                    bucket, e
                )))
            }
        }
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        validate_key(key)?;
        let size = data.len() as u64;
        let body = ByteStream::from(data);
        let start = Instant::now();

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .if_none_match("*")
            .send()
            .await
            .map_err(|e| {
                if e.code() == Some("NoSuchBucket") {
                    return StorageError::BucketNotFound(bucket.to_string());
                }
                if e.code().is_some_and(|code| OBJECT_EXISTS_CODES.contains(&code)) {
                    return StorageError::AlreadyExists(format!("{}/{}", bucket, key));
                }
                tracing::error!(
                    error = %e,
                    bucket = %bucket,
                    key = %key,
                    size_bytes = size,
                    "S3 put failed"
                );
                StorageError::UploadFailed(e.to_string())
            })?;

        tracing::info!(
            bucket = %bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 put successful"
        );

        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        let start = Instant::now();

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::ServiceError(service_err) => match service_err.err() {
                    GetObjectError::NoSuchKey(_) => {
                        StorageError::NotFound(format!("{}/{}", bucket, key))
                    }
                    other if other.code() == Some("NoSuchBucket") => {
                        StorageError::BucketNotFound(bucket.to_string())
                    }
                    _ => StorageError::DownloadFailed(e.to_string()),
                },
                _ => StorageError::DownloadFailed(e.to_string()),
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
            .into_bytes()
            .to_vec();

        tracing::info!(
            bucket = %bucket,
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 get successful"
        );

        Ok(data)
    }

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(_) => Ok(true),
            Err(SdkError::ServiceError(service_err))
                if matches!(service_err.err(), HeadObjectError::NotFound(_)) =>
            {
                Ok(false)
            }
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn storage(region: &str) -> S3Storage {
        S3Storage::new(region.to_string(), Some("http://localhost:9000".to_string()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_client_makes_a_single_attempt() {
        let storage = storage("eu-west-3").await;
        let retry = storage.client.config().retry_config().unwrap();
        assert_eq!(retry.max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_location_constraint_outside_default_region() {
        assert!(storage(DEFAULT_S3_REGION)
            .await
            .create_bucket_configuration()
            .is_none());
        let config = storage("eu-west-3").await.create_bucket_configuration().unwrap();
        assert_eq!(
            config.location_constraint(),
            Some(&BucketLocationConstraint::EuWest3)
        );
    }
}
