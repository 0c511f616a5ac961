//! Tag-based resource lookup against the remote inventory API.
//!
//! Given a resource type and tag filters, returns zero, one or many
//! matching resource identifiers; the caller decides the
//! single-vs-multiple tolerance.

use aws_sdk_resourcegroupstagging::types::TagFilter;
use aws_sdk_resourcegroupstagging::Client;
use tracing::{debug, warn};

use crate::error::{CloudError, Result, StacksmithError};

/// Tag-based resource lookup client.
#[derive(Debug)]
pub struct ResourceLookup {
    /// Tagging API client.
    client: Client,
}

impl ResourceLookup {
    /// Creates a lookup client against the configured region.
    pub async fn new(region: Option<&str>) -> Self {
        let config = if let Some(region_str) = region {
            aws_config::from_env()
                .region(aws_config::Region::new(region_str.to_string()))
                .load()
                .await
        } else {
            aws_config::load_from_env().await
        };
        Self {
            client: Client::new(&config),
        }
    }

    /// Creates a lookup client with an existing client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Returns all resource identifiers matching the type and tag
    /// filters.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails. Remote failures are
    /// environment errors: propagated with context, never treated as
    /// configuration problems.
    pub async fn find_all(
        &self,
        resource_type: &str,
        filters: &[(String, String)],
    ) -> Result<Vec<String>> {
        let mut arns = Vec::new();
        let mut pagination_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get_resources()
                .resource_type_filters(resource_type);
            for (key, value) in filters {
                request = request.tag_filters(
                    TagFilter::builder().key(key).values(value).build(),
                );
            }
            if let Some(token) = &pagination_token {
                request = request.pagination_token(token);
            }

            let response = request.send().await.map_err(|e| {
                StacksmithError::Cloud(CloudError::api(format!("GetResources failed: {e}")))
            })?;

            arns.extend(
                response
                    .resource_tag_mapping_list()
                    .iter()
                    .filter_map(|mapping| mapping.resource_arn().map(ToString::to_string)),
            );

            match response.pagination_token() {
                Some(token) if !token.is_empty() => {
                    pagination_token = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!(
            "Tag lookup for {resource_type} with {filters:?} matched {} resources",
            arns.len()
        );
        Ok(arns)
    }

    /// Returns exactly one matching resource identifier.
    ///
    /// # Errors
    ///
    /// Returns an error when zero or more than one resource matches.
    pub async fn find_one(
        &self,
        resource_type: &str,
        filters: &[(String, String)],
    ) -> Result<String> {
        let mut arns = self.find_all(resource_type, filters).await?;
        match arns.len() {
            0 => Err(StacksmithError::Cloud(CloudError::NoneFound {
                resource_type: resource_type.to_string(),
                filters: filters.to_vec(),
            })),
            1 => Ok(arns.remove(0)),
            count => Err(StacksmithError::Cloud(CloudError::MultipleFound {
                resource_type: resource_type.to_string(),
                count,
                arns,
            })),
        }
    }

    /// Returns at most one matching resource identifier.
    ///
    /// An empty result set is tolerated for non-critical optional
    /// lookups; multiple matches remain an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails or more than one resource
    /// matches.
    pub async fn find_optional(
        &self,
        resource_type: &str,
        filters: &[(String, String)],
    ) -> Result<Option<String>> {
        let mut arns = self.find_all(resource_type, filters).await?;
        match arns.len() {
            0 => {
                warn!("Optional lookup for {resource_type} matched nothing, continuing");
                Ok(None)
            }
            1 => Ok(Some(arns.remove(0))),
            count => Err(StacksmithError::Cloud(CloudError::MultipleFound {
                resource_type: resource_type.to_string(),
                count,
                arns,
            })),
        }
    }
}
