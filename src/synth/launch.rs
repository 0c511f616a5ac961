//! Launch mode resolution for a family.
//!
//! State machine determining the effective compute placement for a family
//! from the cluster-wide capacity declarations and the family's own
//! `x-ecs` settings. The mixed placement modes are always derived here,
//! never declared directly.

use tracing::{debug, warn};

use crate::compose::{CapacityProviderItem, DeclaredLaunchType};
use crate::error::{Result, StacksmithError, SynthError};

/// Serverless-only capacity providers.
pub const SERVERLESS_PROVIDERS: &[&str] = &["FARGATE", "FARGATE_SPOT"];

/// Effective compute placement for a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Externally attached capacity; networking and providers are skipped.
    External,
    /// Fixed EC2 capacity.
    Ec2,
    /// Directly declared serverless placement.
    Fargate,
    /// Derived: every provider in play is serverless.
    FargateProviders,
    /// Derived: the family strategy mixes serverless and autoscaled
    /// providers.
    ServiceProviders,
    /// Derived: defer to the cluster's default provider strategy.
    ClusterDefault,
}

impl LaunchMode {
    /// Whether tasks place on the serverless fleet.
    #[must_use]
    pub const fn is_serverless(self) -> bool {
        matches!(self, Self::Fargate | Self::FargateProviders)
    }
}

/// The cluster as seen by the resolver, whether described locally or
/// fetched from the remote inventory.
#[derive(Debug, Clone, Default)]
pub struct ClusterDescriptor {
    /// Cluster name.
    pub name: String,
    /// Capacity providers attached to the cluster.
    pub capacity_providers: Vec<String>,
    /// Providers in the cluster default strategy.
    pub default_strategy_providers: Vec<String>,
    /// Cluster-wide launch type override.
    pub platform_override: Option<DeclaredLaunchType>,
}

/// Resolved placement decision for a family.
#[derive(Debug, Clone, Default)]
pub struct LaunchDecision {
    /// Effective mode; `None` defers to the remote orchestrator default.
    pub mode: Option<LaunchMode>,
    /// Capacity provider strategy to attach to the service.
    pub strategy: Vec<CapacityProviderItem>,
}

/// Resolves the launch mode for a family.
///
/// Transition rules, evaluated in order:
/// 1. declared `EXTERNAL` is terminal; remaining placement attributes are
///    rejected;
/// 2. a cluster-wide override pins the family and clears the strategy;
/// 3. declared `EC2`/`FARGATE` are honored directly;
/// 4. family and cluster providers combine per the subset rules;
/// 5. neither side declaring providers leaves the mode unset.
///
/// # Errors
///
/// Returns a configuration error on provider mismatch or conflicting
/// placement attributes. These abort synthesis for the family.
pub fn resolve_launch(
    family: &str,
    declared: Option<DeclaredLaunchType>,
    family_providers: &[CapacityProviderItem],
    cluster: &ClusterDescriptor,
) -> Result<LaunchDecision> {
    // 1. EXTERNAL is terminal; capacity provider logic must not run.
    if declared == Some(DeclaredLaunchType::External) {
        if !family_providers.is_empty() {
            return Err(StacksmithError::Synth(SynthError::ConflictingPlacement {
                family: family.to_string(),
                detail: format!(
                    "capacity providers {:?} declared alongside EXTERNAL",
                    provider_names(family_providers)
                ),
            }));
        }
        return Ok(LaunchDecision {
            mode: Some(LaunchMode::External),
            strategy: Vec::new(),
        });
    }

    // 2. Cluster-wide override pins the family, strategy is cleared.
    if let Some(override_mode) = cluster.platform_override {
        if !family_providers.is_empty() {
            warn!(
                "{family} - Launch type override to {override_mode:?}, ignoring capacity \
                 providers {:?}",
                provider_names(family_providers)
            );
        }
        let mode = match override_mode {
            DeclaredLaunchType::External => LaunchMode::External,
            DeclaredLaunchType::Ec2 => LaunchMode::Ec2,
            DeclaredLaunchType::Fargate => LaunchMode::Fargate,
        };
        return Ok(LaunchDecision {
            mode: Some(mode),
            strategy: Vec::new(),
        });
    }

    // 3. Direct declarations short-circuit provider derivation.
    match declared {
        Some(DeclaredLaunchType::Ec2) => {
            debug!("{family} - Launch type EC2 declared, skipping capacity providers");
            return Ok(LaunchDecision {
                mode: Some(LaunchMode::Ec2),
                strategy: Vec::new(),
            });
        }
        Some(DeclaredLaunchType::Fargate) => {
            return Ok(LaunchDecision {
                mode: Some(LaunchMode::Fargate),
                strategy: Vec::new(),
            });
        }
        _ => {}
    }

    let family_names = provider_names(family_providers);
    if !family_names.is_empty() {
        validate_not_mixed(family, &family_names)?;
    }

    // 4. Both sides declare providers: subset check then derivation.
    if !family_names.is_empty() && !cluster.capacity_providers.is_empty() {
        let unmatched: Vec<String> = family_names
            .iter()
            .filter(|name| !cluster.capacity_providers.contains(name))
            .cloned()
            .collect();
        if !unmatched.is_empty() {
            return Err(StacksmithError::Synth(SynthError::CapacityProviderMismatch {
                family: family.to_string(),
                unmatched,
                available: cluster.capacity_providers.clone(),
            }));
        }

        let family_serverless_only = family_names.iter().all(|name| is_serverless(name));
        let cluster_serverless_only = cluster
            .capacity_providers
            .iter()
            .all(|name| is_serverless(name));

        let mode = if family_serverless_only && cluster_serverless_only {
            LaunchMode::FargateProviders
        } else {
            debug!("{family} - Using autoscaling based providers {family_names:?}");
            LaunchMode::ServiceProviders
        };
        return Ok(LaunchDecision {
            mode: Some(mode),
            strategy: family_providers.to_vec(),
        });
    }

    // 4b. Only the cluster declares providers.
    if family_names.is_empty() && !cluster.capacity_providers.is_empty() {
        let default_has_serverless = cluster
            .default_strategy_providers
            .iter()
            .any(|name| is_serverless(name));
        let cluster_serverless_only = cluster
            .capacity_providers
            .iter()
            .all(|name| is_serverless(name));

        let mode = if default_has_serverless || cluster_serverless_only {
            debug!("{family} - Defaulting to serverless providers from the cluster strategy");
            LaunchMode::FargateProviders
        } else {
            debug!("{family} - Cluster uses non-serverless providers, using cluster default");
            LaunchMode::ClusterDefault
        };
        return Ok(LaunchDecision {
            mode: Some(mode),
            strategy: Vec::new(),
        });
    }

    // 5. Neither side declares providers: defer to the orchestrator.
    debug!("{family} - No capacity providers declared anywhere, leaving launch type unset");
    Ok(LaunchDecision {
        mode: None,
        strategy: family_providers.to_vec(),
    })
}

/// Rejects declarations mixing serverless and autoscaling providers.
fn validate_not_mixed(family: &str, providers: &[String]) -> Result<()> {
    let serverless_count = providers.iter().filter(|name| is_serverless(name)).count();
    if serverless_count != 0 && serverless_count != providers.len() {
        return Err(StacksmithError::Synth(SynthError::MixedCapacityProviders {
            family: family.to_string(),
            providers: providers.to_vec(),
        }));
    }
    Ok(())
}

/// Whether a provider name is serverless-only.
fn is_serverless(name: &str) -> bool {
    SERVERLESS_PROVIDERS.contains(&name)
}

fn provider_names(items: &[CapacityProviderItem]) -> Vec<String> {
    items.iter().map(|item| item.provider.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(name: &str) -> CapacityProviderItem {
        CapacityProviderItem {
            provider: String::from(name),
            base: None,
            weight: Some(1),
        }
    }

    fn cluster(providers: &[&str], default: &[&str]) -> ClusterDescriptor {
        ClusterDescriptor {
            name: String::from("test"),
            capacity_providers: providers.iter().map(|s| (*s).to_string()).collect(),
            default_strategy_providers: default.iter().map(|s| (*s).to_string()).collect(),
            platform_override: None,
        }
    }

    #[test]
    fn test_external_is_terminal() {
        let decision = resolve_launch(
            "app",
            Some(DeclaredLaunchType::External),
            &[],
            &cluster(&["FARGATE"], &[]),
        )
        .unwrap();
        assert_eq!(decision.mode, Some(LaunchMode::External));
    }

    #[test]
    fn test_external_with_providers_is_fatal() {
        let result = resolve_launch(
            "app",
            Some(DeclaredLaunchType::External),
            &[provider("FARGATE")],
            &cluster(&["FARGATE"], &[]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_cluster_override_pins_and_clears_strategy() {
        let mut c = cluster(&["FARGATE", "custom-asg"], &[]);
        c.platform_override = Some(DeclaredLaunchType::Ec2);
        let decision =
            resolve_launch("app", None, &[provider("FARGATE")], &c).unwrap();
        assert_eq!(decision.mode, Some(LaunchMode::Ec2));
        assert!(decision.strategy.is_empty());
    }

    #[test]
    fn test_serverless_only_both_sides() {
        let decision = resolve_launch(
            "app",
            None,
            &[provider("FARGATE"), provider("FARGATE_SPOT")],
            &cluster(&["FARGATE", "FARGATE_SPOT"], &[]),
        )
        .unwrap();
        assert_eq!(decision.mode, Some(LaunchMode::FargateProviders));
        assert_eq!(decision.strategy.len(), 2);
    }

    #[test]
    fn test_family_provider_not_subset_is_fatal() {
        // Cluster declares FARGATE only; the family also wants
        // FARGATE_SPOT, which must be reported as unmatched.
        let result = resolve_launch(
            "app",
            None,
            &[provider("FARGATE"), provider("FARGATE_SPOT")],
            &cluster(&["FARGATE"], &[]),
        );
        match result {
            Err(StacksmithError::Synth(SynthError::CapacityProviderMismatch {
                unmatched, ..
            })) => {
                assert_eq!(unmatched, vec!["FARGATE_SPOT"]);
            }
            other => panic!("expected provider mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_mixed_providers_in_family_is_fatal() {
        let result = resolve_launch(
            "app",
            None,
            &[provider("FARGATE"), provider("my-asg-provider")],
            &cluster(&["FARGATE", "my-asg-provider"], &[]),
        );
        assert!(matches!(
            result,
            Err(StacksmithError::Synth(SynthError::MixedCapacityProviders { .. }))
        ));
    }

    #[test]
    fn test_autoscaled_providers_give_service_mode() {
        let decision = resolve_launch(
            "app",
            None,
            &[provider("my-asg-provider")],
            &cluster(&["my-asg-provider", "FARGATE"], &[]),
        )
        .unwrap();
        assert_eq!(decision.mode, Some(LaunchMode::ServiceProviders));
    }

    #[test]
    fn test_cluster_only_serverless_default() {
        let decision = resolve_launch(
            "app",
            None,
            &[],
            &cluster(&["FARGATE", "my-asg-provider"], &["FARGATE"]),
        )
        .unwrap();
        assert_eq!(decision.mode, Some(LaunchMode::FargateProviders));
    }

    #[test]
    fn test_cluster_only_non_serverless_defers_to_cluster() {
        let decision = resolve_launch(
            "app",
            None,
            &[],
            &cluster(&["my-asg-provider"], &["my-asg-provider"]),
        )
        .unwrap();
        assert_eq!(decision.mode, Some(LaunchMode::ClusterDefault));
    }

    #[test]
    fn test_nothing_declared_leaves_unset() {
        let decision = resolve_launch("app", None, &[], &cluster(&[], &[])).unwrap();
        assert_eq!(decision.mode, None);
    }
}
