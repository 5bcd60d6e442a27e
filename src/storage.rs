use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::config::AppConfig;

pub const SCREENSHOT_PREFIX: &str = "screenshots";
pub const TICKET_PREFIX: &str = "tickets";

/// Write-once-per-key blob store. `put_object` overwrites an existing key.
#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()>;

    /// Stable retrieval reference for `key`, stored on the registration row.
    fn public_url(&self, key: &str) -> String;
}

pub fn screenshot_key(registration_id: uuid::Uuid, extension: &str) -> String {
    format!("{SCREENSHOT_PREFIX}/{registration_id}.{extension}")
}

pub fn ticket_key(registration_id: uuid::Uuid) -> String {
    format!("{TICKET_PREFIX}/{registration_id}.pdf")
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
    public_base_url: Option<String>,
}

impl S3Storage {
    /// Builds a path-style S3 client from config.
    pub async fn connect(config: &AppConfig) -> Result<Self> {
        let region_provider =
            RegionProviderChain::first_try(Some(Region::new(config.aws_region.clone())))
                .or_default_provider()
                .or_else("us-east-1");

        #[allow(deprecated)]
        let mut loader = aws_config::from_env().region(region_provider);
        if let Some(endpoint) = &config.aws_endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        if let (Some(access_key), Some(secret_key)) = (
            config.aws_access_key_id.as_ref(),
            config.aws_secret_access_key.as_ref(),
        ) {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "static",
            ));
        }

        let shared = loader.load().await;
        let client = S3Client::from_conf(
            S3ConfigBuilder::from(&shared)
                .force_path_style(true)
                .build(),
        );

        tracing::debug!(
            bucket = %config.s3_bucket,
            custom_endpoint = config.aws_endpoint_url.is_some(),
            "connected object storage"
        );

        Ok(Self {
            client,
            bucket: config.s3_bucket.clone(),
            public_base_url: config.storage_public_base_url.clone(),
        })
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes));

        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        if let Some(content_disposition) = content_disposition {
            request = request.content_disposition(content_disposition);
        }

        request
            .send()
            .await
            .context("failed to upload object to S3")?;

        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        public_url_for(self.public_base_url.as_deref(), &self.bucket, key)
    }
}

/// `inline` disposition carrying both the quoted and RFC 5987 filename forms.
pub fn inline_content_disposition(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded = utf8_percent_encode(&sanitized, NON_ALPHANUMERIC);
    Some(format!(
        "inline; filename=\"{sanitized}\"; filename*=UTF-8''{encoded}"
    ))
}

fn public_url_for(base: Option<&str>, bucket: &str, key: &str) -> String {
    match base {
        Some(base) => format!("{}/{}", base.trim_end_matches('/'), key),
        None => format!("s3://{bucket}/{key}"),
    }
}
