//! Error types for the Stacksmith synthesis and deployment system.
//!
//! This module provides a comprehensive error hierarchy for all operations
//! in the lifecycle: compose document handling, resource synthesis, cloud
//! lookups, and deployment.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Stacksmith system.
#[derive(Debug, Error)]
pub enum StacksmithError {
    /// Compose document errors (parsing, validation).
    #[error("Compose error: {0}")]
    Compose(#[from] ComposeError),

    /// Resource synthesis errors.
    #[error("Synthesis error: {0}")]
    Synth(#[from] SynthError),

    /// Cloud API errors (lookup, cluster description).
    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),

    /// Deployment errors.
    #[error("Deployment error: {0}")]
    Deploy(#[from] DeployError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Compose document errors.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// The compose file was not found.
    #[error("Compose file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The compose file could not be parsed.
    #[error("Failed to parse compose file: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Compose validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// Environment variable is missing.
    #[error("Missing environment variable: {name}")]
    MissingEnvVar {
        /// Name of the missing variable.
        name: String,
    },

    /// Duplicate resource definition.
    #[error("Duplicate {resource_type} name: {name}")]
    DuplicateName {
        /// Type of resource (service, network, listener, etc.).
        resource_type: String,
        /// The duplicated name.
        name: String,
    },

    /// Invalid port specification.
    #[error("Invalid port specification: {spec}")]
    InvalidPort {
        /// The invalid port specification.
        spec: String,
    },

    /// Invalid scaling range specification.
    #[error("Invalid scaling range '{value}': expected 'min-max'")]
    InvalidRange {
        /// The invalid range string.
        value: String,
    },
}

/// Resource synthesis errors.
///
/// These are always configuration errors: fatal, reported with the
/// offending identifiers, never retried.
#[derive(Debug, Error)]
pub enum SynthError {
    /// Circular dependency between containers of a family.
    #[error("{family}: circular container dependency involving '{service}'")]
    CircularDependency {
        /// Family in which the cycle was found.
        family: String,
        /// A service participating in the cycle.
        service: String,
    },

    /// A family has no essential container left.
    #[error("{family}: at least one container must be essential")]
    NoEssentialContainer {
        /// The offending family.
        family: String,
    },

    /// Invalid step-scaling bounds.
    #[error("{family}: invalid scaling step: {detail}")]
    InvalidScalingStep {
        /// The offending family.
        family: String,
        /// What is wrong with the step.
        detail: String,
    },

    /// Family capacity providers are not a subset of the cluster providers.
    #[error(
        "{family}: capacity providers {unmatched:?} not available in cluster \
         (cluster provides {available:?})"
    )]
    CapacityProviderMismatch {
        /// The offending family.
        family: String,
        /// Providers declared by the family but absent from the cluster.
        unmatched: Vec<String>,
        /// Providers the cluster offers.
        available: Vec<String>,
    },

    /// Serverless and autoscaled providers mixed in one declaration.
    #[error("{family}: cannot mix serverless and autoscaling capacity providers: {providers:?}")]
    MixedCapacityProviders {
        /// The offending family.
        family: String,
        /// The declared provider names.
        providers: Vec<String>,
    },

    /// Placement attributes set on an EXTERNAL family.
    #[error("{family}: launch mode is EXTERNAL, conflicting placement setting: {detail}")]
    ConflictingPlacement {
        /// The offending family.
        family: String,
        /// The conflicting setting.
        detail: String,
    },

    /// A listener target reference did not resolve.
    #[error("{listener}: failed to map '{target}' to any family:container:port combination")]
    UnresolvedTarget {
        /// The listener holding the reference.
        listener: String,
        /// The unresolved target string.
        target: String,
    },

    /// A listener target reference is ambiguous.
    #[error("{listener}: target '{target}' is declared more than once; specify the port")]
    AmbiguousTarget {
        /// The listener holding the reference.
        listener: String,
        /// The ambiguous target string.
        target: String,
    },

    /// An access condition string could not be understood.
    #[error("Could not understand access condition '{value}': expected path, domain or domain/path")]
    InvalidAccessCondition {
        /// The invalid access string.
        value: String,
    },

    /// Authentication action attached to a plaintext listener.
    #[error("{listener}: authentication actions require an encrypted listener (HTTPS/TLS)")]
    AuthOnPlaintextListener {
        /// The offending listener.
        listener: String,
    },

    /// Certificates attached to a UDP listener.
    #[error("{listener}: UDP listeners cannot carry certificates")]
    CertificateOnUdpListener {
        /// The offending listener.
        listener: String,
    },

    /// More than one target on a network load balancer listener.
    #[error("{listener}: network load balancers cannot have more than one target per listener")]
    NlbMultipleTargets {
        /// The offending listener.
        listener: String,
    },

    /// Conflicting runtime platform declarations within a family.
    #[error("{family}: conflicting runtime platform declarations: {detail}")]
    ConflictingPlatform {
        /// The offending family.
        family: String,
        /// The conflicting values.
        detail: String,
    },

    /// Compute requirement exceeds the largest serverless size.
    #[error("{family}: cpu={cpu}, memory={memory}MiB exceeds the largest serverless task size")]
    ComputeOutOfBounds {
        /// The offending family.
        family: String,
        /// Requested CPU units.
        cpu: u32,
        /// Requested memory in MiB.
        memory: u32,
    },
}

/// Cloud API errors.
///
/// Environment errors per the taxonomy: propagated to the caller with
/// context, never treated as configuration failures.
#[derive(Debug, Error)]
pub enum CloudError {
    /// Generic API request failure.
    #[error("Cloud API request failed: {message}")]
    ApiError {
        /// Description of the API failure.
        message: String,
    },

    /// A tag-based lookup matched nothing.
    #[error("No {resource_type} found matching tags {filters:?}")]
    NoneFound {
        /// Resource type searched for.
        resource_type: String,
        /// Tag filters used.
        filters: Vec<(String, String)>,
    },

    /// A tag-based lookup matched more than one resource.
    #[error("Expected exactly one {resource_type}, found {count}: {arns:?}")]
    MultipleFound {
        /// Resource type searched for.
        resource_type: String,
        /// Number of matches.
        count: usize,
        /// The matching identifiers.
        arns: Vec<String>,
    },

    /// The referenced cluster does not exist.
    #[error("Cluster '{name}' not found")]
    ClusterNotFound {
        /// The missing cluster name.
        name: String,
    },

    /// Network-level error.
    #[error("Network error communicating with cloud API: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },
}

/// Deployment errors.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The remote API rejected the stack submission.
    #[error("Stack '{stack}' rejected: {message}")]
    StackRejected {
        /// Stack name.
        stack: String,
        /// Rejection reason.
        message: String,
    },

    /// The change set ended in a failed state.
    #[error("Change set '{name}' failed: {reason}")]
    ChangeSetFailed {
        /// Change set name.
        name: String,
        /// Failure reason reported by the API.
        reason: String,
    },

    /// Polling a remote operation exceeded the attempt budget.
    #[error("Timed out waiting for {operation} on stack '{stack}'")]
    Timeout {
        /// Stack name.
        stack: String,
        /// The operation waited for.
        operation: String,
    },

    /// The stack is in a state that allows neither create nor update.
    #[error("Stack '{stack}' is in state {status}, cannot create or update")]
    InvalidStackState {
        /// Stack name.
        stack: String,
        /// Current remote status.
        status: String,
    },

    /// The rendered template exceeds limits and no bucket was configured.
    #[error("Template body is {size} bytes; configure an upload bucket for templates over {limit}")]
    TemplateTooLarge {
        /// Rendered template size.
        size: usize,
        /// Direct-submission limit.
        limit: usize,
    },
}

/// Result type alias for Stacksmith operations.
pub type Result<T> = std::result::Result<T, StacksmithError>;

impl StacksmithError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is retryable.
    ///
    /// Only environment errors are ever retryable; configuration errors
    /// abort synthesis outright.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Cloud(CloudError::NetworkError { .. }))
    }
}

impl ComposeError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }
}

impl CloudError {
    /// Creates an API error with the given message.
    #[must_use]
    pub fn api(message: impl Into<String>) -> Self {
        Self::ApiError {
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }
}

impl SynthError {
    /// Creates an invalid-step error for a family.
    #[must_use]
    pub fn invalid_step(family: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidScalingStep {
            family: family.into(),
            detail: detail.into(),
        }
    }
}
