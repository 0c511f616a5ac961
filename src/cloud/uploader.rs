//! Template upload to object storage.
//!
//! Rendered templates above the direct-submission size limit are keyed
//! by body hash and uploaded, and the deployment collaborator submits
//! the resulting URL instead of the body.

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::info;

use crate::compose::DocumentHasher;
use crate::error::{CloudError, Result, StacksmithError};

/// Template uploader backed by S3.
#[derive(Debug)]
pub struct TemplateUploader {
    /// S3 client.
    client: Client,
    /// Bucket name.
    bucket: String,
    /// Key prefix.
    prefix: String,
}

impl TemplateUploader {
    /// Creates a new uploader.
    pub async fn new(bucket: &str, prefix: Option<&str>, region: Option<&str>) -> Self {
        let config = if let Some(region_str) = region {
            aws_config::from_env()
                .region(aws_config::Region::new(region_str.to_string()))
                .load()
                .await
        } else {
            aws_config::load_from_env().await
        };
        Self::with_client(Client::new(&config), bucket, prefix)
    }

    /// Creates an uploader with an existing client.
    #[must_use]
    pub fn with_client(client: Client, bucket: &str, prefix: Option<&str>) -> Self {
        let prefix = prefix
            .map(|p| {
                let p = p.trim_matches('/');
                if p.is_empty() {
                    String::new()
                } else {
                    format!("{p}/")
                }
            })
            .unwrap_or_default();

        Self {
            client,
            bucket: bucket.to_string(),
            prefix,
        }
    }

    /// Uploads a rendered template body, keyed by its hash, and returns
    /// the template URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails.
    pub async fn upload(&self, body: &str) -> Result<String> {
        let digest = DocumentHasher::new().hash_template(body);
        let key = format!("{}{digest}.json", self.prefix);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("application/json")
            .body(ByteStream::from(body.as_bytes().to_vec()))
            .send()
            .await
            .map_err(|e| {
                StacksmithError::Cloud(CloudError::api(format!(
                    "Failed to upload template to s3://{}/{key}: {e}",
                    self.bucket
                )))
            })?;

        let url = format!("https://{}.s3.amazonaws.com/{key}", self.bucket);
        info!("Uploaded template to {url}");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_normalization() {
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .build();
        let client = Client::from_conf(config);

        let uploader = TemplateUploader::with_client(client.clone(), "bucket", Some("/a/b/"));
        assert_eq!(uploader.prefix, "a/b/");

        let uploader = TemplateUploader::with_client(client, "bucket", None);
        assert_eq!(uploader.prefix, "");
    }
}
