//! R2 client implementation.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::store::{ArtifactStore, StoreEntry};

/// Configuration for R2 client.
#[derive(Debug, Clone)]
pub struct R2Config {
    /// R2 endpoint URL (S3 API endpoint)
    pub endpoint_url: String,
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Bucket name
    pub bucket_name: String,
    /// Region (usually "auto" for R2)
    pub region: String,
    /// Base URL objects are publicly served from (custom domain or r2.dev)
    pub public_base_url: Option<String>,
}

impl R2Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("R2_ENDPOINT_URL")
                .map_err(|_| StorageError::config_error("R2_ENDPOINT_URL not set"))?,
            access_key_id: std::env::var("R2_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("R2_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("R2_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("R2_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("R2_BUCKET_NAME")
                .map_err(|_| StorageError::config_error("R2_BUCKET_NAME not set"))?,
            region: std::env::var("R2_REGION").unwrap_or_else(|_| "auto".to_string()),
            public_base_url: std::env::var("R2_PUBLIC_BASE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        })
    }

    /// Base URL used to build public object URLs.
    fn public_base(&self) -> String {
        match &self.public_base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!(
                "{}/{}",
                self.endpoint_url.trim_end_matches('/'),
                self.bucket_name
            ),
        }
    }
}

/// Cloudflare R2 storage client.
#[derive(Clone)]
pub struct R2Client {
    client: Client,
    bucket: String,
    public_base: String,
}

impl R2Client {
    /// Create a new R2 client from configuration.
    pub async fn new(config: R2Config) -> StorageResult<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "r2",
        );

        let public_base = config.public_base();

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let client = Client::from_conf(sdk_config);

        Ok(Self {
            client,
            bucket: config.bucket_name,
            public_base,
        })
    }

    /// Create from environment variables.
    pub async fn from_env() -> StorageResult<Self> {
        let config = R2Config::from_env()?;
        Self::new(config).await
    }

    /// Download object as bytes.
    pub async fn download_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        debug!("Downloading {}", key);

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify_sdk_error("get_object", key, e))?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }

    /// Check connectivity to R2 by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| classify_sdk_error("head_bucket", &self.bucket, e))?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for R2Client {
    async fn upload_file(&self, path: &Path, key: &str, content_type: &str) -> StorageResult<()> {
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", path.display(), e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| classify_sdk_error("put_object", key, e))?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }

    async fn download_file(&self, key: &str, path: &Path) -> StorageResult<()> {
        debug!("Downloading {} to {}", key, path.display());

        let bytes = self.download_bytes(key).await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::DownloadFailed(format!("Failed to create directory: {}", e)))?;
        }

        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| StorageError::DownloadFailed(format!("Failed to write file: {}", e)))?;

        info!("Downloaded {} to {}", key, path.display());
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<StoreEntry>> {
        debug!("Listing objects with prefix: {}", prefix);

        let mut entries = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .delimiter("/");

            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| classify_sdk_error("list_objects_v2", prefix, e))?;

            for common in response.common_prefixes() {
                if let Some(p) = common.prefix() {
                    entries.push(StoreEntry::Directory { prefix: p.to_string() });
                }
            }

            for obj in response.contents() {
                let Some(key) = obj.key() else { continue };
                // Zero-byte "folder" placeholders created by some consoles.
                if key.ends_with('/') {
                    continue;
                }
                entries.push(StoreEntry::File {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                });
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(str::to_string);
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }

        Ok(entries)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key.trim_start_matches('/'))
    }
}

/// Map an SDK failure onto the storage error taxonomy.
fn classify_sdk_error<E>(operation: &str, key: &str, err: SdkError<E, HttpResponse>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let detail = format!("{} {}: {}", operation, key, DisplayErrorContext(&err));

    match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => StorageError::Network(detail),
        // The response arrived but could not be parsed as the S3 contract.
        SdkError::ResponseError(_) => StorageError::UnexpectedResponse(detail),
        SdkError::ServiceError(service) => match service.raw().status().as_u16() {
            404 => StorageError::not_found(key),
            409 | 412 => StorageError::Conflict(detail),
            401 | 403 => StorageError::PermissionDenied(detail),
            status if status >= 500 => StorageError::ServiceUnavailable(detail),
            _ => StorageError::AwsSdk(detail),
        },
        _ => StorageError::AwsSdk(detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn config(public: Option<&str>) -> R2Config {
        R2Config {
            endpoint_url: "https://acct.r2.cloudflarestorage.com/".to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            bucket_name: "reels".to_string(),
            region: "auto".to_string(),
            public_base_url: public.map(str::to_string),
        }
    }

    #[test]
    fn test_public_base_prefers_custom_domain() {
        assert_eq!(config(Some("https://cdn.example.com/")).public_base(), "https://cdn.example.com");
        assert_eq!(
            config(None).public_base(),
            "https://acct.r2.cloudflarestorage.com/reels"
        );
    }

    #[tokio::test]
    async fn test_public_url_joins_key() {
        let client = R2Client::new(config(Some("https://cdn.example.com"))).await.unwrap();
        assert_eq!(
            client.public_url("videos/abc.mp4"),
            "https://cdn.example.com/videos/abc.mp4"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_requires_endpoint() {
        std::env::remove_var("R2_ENDPOINT_URL");
        assert!(matches!(R2Config::from_env(), Err(StorageError::ConfigError(_))));
    }
}
