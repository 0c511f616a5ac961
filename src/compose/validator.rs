//! Compose document validation.
//!
//! This module provides comprehensive validation of compose documents,
//! ensuring values are valid and consistent before synthesis runs.

use crate::error::{ComposeError, Result, StacksmithError};
use std::collections::HashSet;
use tracing::debug;

use super::spec::{
    ComposeDocument, ListenerProtocol, LoadBalancerSpec, ScalingSpec, ServiceSpec,
};

/// Validator for compose documents.
#[derive(Debug, Default)]
pub struct ComposeValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ComposeValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a compose document.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn validate(&self, document: &ComposeDocument) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_services(document, &mut result);
        Self::validate_families(document, &mut result);
        Self::validate_load_balancers(document, &mut result);
        Self::validate_cluster(document, &mut result);

        if result.errors.is_empty() {
            debug!("Compose document validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(StacksmithError::Compose(ComposeError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Validates the service definitions.
    fn validate_services(document: &ComposeDocument, result: &mut ValidationResult) {
        if document.services.is_empty() {
            result
                .warnings
                .push(String::from("No services defined in compose document"));
            return;
        }

        for (name, service) in &document.services {
            let prefix = format!("services.{name}");

            if !is_valid_name(name) {
                result.errors.push(ValidationError {
                    field: prefix.clone(),
                    message: format!(
                        "Service name '{name}' is invalid. Must be lowercase alphanumeric \
                         with hyphens or underscores."
                    ),
                });
            }

            if service.image.is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.image"),
                    message: String::from("Container image cannot be empty"),
                });
            } else if service.image.ends_with(":latest") {
                result.warnings.push(format!(
                    "{prefix}.image: Using ':latest' tag is not recommended for production"
                ));
            }

            Self::validate_service_ports(service, &prefix, result);
            Self::validate_service_refs(document, service, &prefix, result);

            if let Some(scaling) = &service.scaling {
                Self::validate_scaling(scaling, &prefix, result);
            }
        }
    }

    /// Validates port declarations within one service.
    fn validate_service_ports(
        service: &ServiceSpec,
        prefix: &str,
        result: &mut ValidationResult,
    ) {
        let mut seen = HashSet::new();
        for (i, port) in service.ports.iter().enumerate() {
            if !seen.insert((port.target, port.protocol)) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.ports[{i}]"),
                    message: format!(
                        "Duplicate port {}/{} in service",
                        port.target,
                        port.protocol.as_str()
                    ),
                });
            }
        }
    }

    /// Validates secret and network references of one service.
    fn validate_service_refs(
        document: &ComposeDocument,
        service: &ServiceSpec,
        prefix: &str,
        result: &mut ValidationResult,
    ) {
        for (i, secret) in service.secrets.iter().enumerate() {
            if !document.secrets.contains_key(&secret.source) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.secrets[{i}]"),
                    message: format!("Secret '{}' is not declared in `secrets`", secret.source),
                });
            }
        }

        for network in service.networks.0.keys() {
            if !document.networks.contains_key(network) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.networks"),
                    message: format!("Network '{network}' is not declared in `networks`"),
                });
            }
        }
    }

    /// Validates a scaling declaration.
    fn validate_scaling(scaling: &ScalingSpec, prefix: &str, result: &mut ValidationResult) {
        if let Some(range) = &scaling.range
            && parse_range(range).is_none()
        {
            result.errors.push(ValidationError {
                field: format!("{prefix}.x-scaling.range"),
                message: format!("Invalid range '{range}': expected 'min-max' with min <= max"),
            });
        }

        for (i, step) in scaling.steps.iter().enumerate() {
            if let Some(upper) = step.upper_bound
                && step.lower_bound >= upper
            {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.x-scaling.steps[{i}]"),
                    message: format!(
                        "Step lower bound {} must be strictly below upper bound {upper}",
                        step.lower_bound
                    ),
                });
            }
        }
    }

    /// Validates family-level invariants visible at declaration time.
    fn validate_families(document: &ComposeDocument, result: &mut ValidationResult) {
        for family in document.family_names() {
            let members = document.services_in_family(&family);
            let member_names: HashSet<&str> = members.iter().map(|(name, _)| *name).collect();

            if !members.iter().any(|(_, service)| service.essential) {
                result.errors.push(ValidationError {
                    field: format!("families.{family}"),
                    message: String::from("At least one container in a family must be essential"),
                });
            }

            for (name, service) in &members {
                for dep in service.depends_on.names() {
                    if !member_names.contains(dep) {
                        result.errors.push(ValidationError {
                            field: format!("services.{name}.depends_on"),
                            message: format!(
                                "Dependency '{dep}' is not a member of family '{family}'"
                            ),
                        });
                    }
                }
            }
        }
    }

    /// Validates load balancer definitions.
    fn validate_load_balancers(document: &ComposeDocument, result: &mut ValidationResult) {
        for (lb_name, lb) in &document.load_balancers {
            let prefix = format!("x-elbv2.{lb_name}");
            Self::validate_listener_ports(lb, &prefix, result);

            for (i, listener) in lb.listeners.iter().enumerate() {
                let listener_prefix = format!("{prefix}.listeners[{i}]");

                if listener.protocol == ListenerProtocol::Udp && !listener.certificates.is_empty() {
                    result.errors.push(ValidationError {
                        field: listener_prefix.clone(),
                        message: String::from("UDP listeners cannot carry certificates"),
                    });
                }

                for (t, target) in listener.targets.iter().enumerate() {
                    if crate::synth::parse_target_reference(&target.name).is_none() {
                        result.errors.push(ValidationError {
                            field: format!("{listener_prefix}.targets[{t}].name"),
                            message: format!(
                                "Target '{}' must match family:container[:port]",
                                target.name
                            ),
                        });
                    }
                }
            }
        }
    }

    /// Ensures no two listeners of a load balancer share a port.
    fn validate_listener_ports(
        lb: &LoadBalancerSpec,
        prefix: &str,
        result: &mut ValidationResult,
    ) {
        let mut seen = HashSet::new();
        for listener in &lb.listeners {
            if !seen.insert(listener.port) {
                result.errors.push(ValidationError {
                    field: format!("{prefix}.listeners"),
                    message: format!("More than one listener with port {}", listener.port),
                });
            }
        }
    }

    /// Validates the cluster declaration.
    fn validate_cluster(document: &ComposeDocument, result: &mut ValidationResult) {
        if let Some(cluster) = &document.cluster {
            for item in &cluster.default_strategy {
                if !cluster.capacity_providers.contains(&item.provider) {
                    result.errors.push(ValidationError {
                        field: String::from("x-cluster.default_strategy"),
                        message: format!(
                            "Default strategy provider '{}' is not in capacity_providers",
                            item.provider
                        ),
                    });
                }
            }
        }
    }
}

/// Parses a `"min-max"` range string.
#[must_use]
pub fn parse_range(value: &str) -> Option<(u32, u32)> {
    let (min, max) = value.split_once('-')?;
    let min = min.trim().parse::<u32>().ok()?;
    let max = max.trim().parse::<u32>().ok()?;
    (min <= max).then_some((min, max))
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens or underscores,
/// starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::ComposeParser;

    fn parse(yaml: &str) -> ComposeDocument {
        ComposeParser::new().parse_yaml(yaml).unwrap()
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("web"));
        assert!(is_valid_name("log_router"));
        assert!(is_valid_name("api-v2"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Web"));
        assert!(!is_valid_name("2api"));
    }

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("1-10"), Some((1, 10)));
        assert_eq!(parse_range("4-4"), Some((4, 4)));
        assert_eq!(parse_range("10-4"), None);
        assert_eq!(parse_range("nope"), None);
    }

    #[test]
    fn test_validate_minimal_passes() {
        let doc = parse("services:\n  web:\n    image: nginx:1.27\n");
        let result = ComposeValidator::new().validate(&doc).unwrap();
        assert!(result.is_valid());
    }

    #[test]
    fn test_unknown_secret_rejected() {
        let doc = parse(
            r"
services:
  web:
    image: nginx:1.27
    secrets:
      - db_password
",
        );
        assert!(ComposeValidator::new().validate(&doc).is_err());
    }

    #[test]
    fn test_dependency_outside_family_rejected() {
        let doc = parse(
            r"
services:
  web:
    image: nginx:1.27
    depends_on:
      - worker
  worker:
    image: worker:2
",
        );
        assert!(ComposeValidator::new().validate(&doc).is_err());
    }

    #[test]
    fn test_no_essential_container_rejected() {
        let doc = parse(
            r"
services:
  web:
    image: nginx:1.27
    essential: false
",
        );
        assert!(ComposeValidator::new().validate(&doc).is_err());
    }

    #[test]
    fn test_duplicate_listener_ports_rejected() {
        let doc = parse(
            r"
services:
  web:
    image: nginx:1.27
x-elbv2:
  public:
    type: alb
    listeners:
      - port: 80
        protocol: HTTP
      - port: 80
        protocol: HTTP
",
        );
        assert!(ComposeValidator::new().validate(&doc).is_err());
    }

    #[test]
    fn test_udp_listener_with_certificates_rejected() {
        let doc = parse(
            r"
services:
  web:
    image: nginx:1.27
x-elbv2:
  edge:
    type: nlb
    listeners:
      - port: 53
        protocol: UDP
        certificates:
          - arn:aws:acm:eu-west-1:012345678912:certificate/abcd
",
        );
        assert!(ComposeValidator::new().validate(&doc).is_err());
    }

    #[test]
    fn test_bad_step_bounds_rejected() {
        let doc = parse(
            r#"
services:
  web:
    image: nginx:1.27
    x-scaling:
      range: "1-5"
      steps:
        - lower_bound: 10
          upper_bound: 5
          count: 2
"#,
        );
        assert!(ComposeValidator::new().validate(&doc).is_err());
    }
}
