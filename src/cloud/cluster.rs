//! Remote cluster descriptor resolution.
//!
//! The launch resolver consumes a [`ClusterDescriptor`]; it is built
//! either from the document's `x-cluster` block or, when `lookup` is
//! set, from the remote container orchestration API.

use aws_sdk_ecs::Client;
use tracing::{debug, info};

use crate::compose::ClusterSpec;
use crate::error::{CloudError, Result, StacksmithError};
use crate::synth::ClusterDescriptor;

/// Resolver for cluster descriptors.
#[derive(Debug)]
pub struct ClusterResolver {
    /// ECS client.
    client: Client,
}

impl ClusterResolver {
    /// Creates a resolver against the configured region.
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

    /// Creates a resolver with an existing client.
    #[must_use]
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Describes a cluster by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the API call fails or the cluster does not
    /// exist.
    pub async fn describe(&self, name: &str) -> Result<ClusterDescriptor> {
        info!("Looking up cluster: {name}");
        let response = self
            .client
            .describe_clusters()
            .clusters(name)
            .send()
            .await
            .map_err(|e| {
                StacksmithError::Cloud(CloudError::api(format!("DescribeClusters failed: {e}")))
            })?;

        let cluster = response
            .clusters()
            .iter()
            .find(|cluster| cluster.cluster_name() == Some(name))
            .ok_or_else(|| {
                StacksmithError::Cloud(CloudError::ClusterNotFound {
                    name: name.to_string(),
                })
            })?;

        let capacity_providers = cluster.capacity_providers().to_vec();
        let default_strategy_providers = cluster
            .default_capacity_provider_strategy()
            .iter()
            .map(|item| item.capacity_provider().to_string())
            .collect();

        debug!(
            "Cluster {name} provides {capacity_providers:?}, default strategy \
             {default_strategy_providers:?}"
        );
        Ok(ClusterDescriptor {
            name: name.to_string(),
            capacity_providers,
            default_strategy_providers,
            platform_override: None,
        })
    }
}

/// Builds a cluster descriptor from the document declaration alone.
#[must_use]
pub fn descriptor_from_spec(default_name: &str, spec: Option<&ClusterSpec>) -> ClusterDescriptor {
    spec.map_or_else(
        || ClusterDescriptor {
            name: default_name.to_string(),
            ..ClusterDescriptor::default()
        },
        |spec| ClusterDescriptor {
            name: spec
                .name
                .clone()
                .unwrap_or_else(|| default_name.to_string()),
            capacity_providers: spec.capacity_providers.clone(),
            default_strategy_providers: spec
                .default_strategy
                .iter()
                .map(|item| item.provider.clone())
                .collect(),
            platform_override: spec.platform_override,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{CapacityProviderItem, DeclaredLaunchType};

    #[test]
    fn test_descriptor_defaults_without_spec() {
        let descriptor = descriptor_from_spec("my-stack", None);
        assert_eq!(descriptor.name, "my-stack");
        assert!(descriptor.capacity_providers.is_empty());
        assert_eq!(descriptor.platform_override, None);
    }

    #[test]
    fn test_descriptor_from_spec_values() {
        let spec = ClusterSpec {
            name: Some(String::from("prod")),
            lookup: false,
            capacity_providers: vec![String::from("FARGATE")],
            default_strategy: vec![CapacityProviderItem {
                provider: String::from("FARGATE"),
                base: Some(1),
                weight: Some(1),
            }],
            platform_override: Some(DeclaredLaunchType::Fargate),
        };
        let descriptor = descriptor_from_spec("fallback", Some(&spec));
        assert_eq!(descriptor.name, "prod");
        assert_eq!(descriptor.default_strategy_providers, vec!["FARGATE"]);
        assert_eq!(
            descriptor.platform_override,
            Some(DeclaredLaunchType::Fargate)
        );
    }
}
