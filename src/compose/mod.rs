//! Compose document handling.
//!
//! This module covers everything input-side:
//! - Parsing and deserializing the extended compose YAML files
//! - Validation of declarations before synthesis
//! - Deterministic hashing for change detection

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::DocumentHasher;
pub use parser::{find_compose_file, ComposeParser, DEFAULT_COMPOSE_FILES};
pub use spec::{
    CapacityProviderItem, ClusterSpec, CognitoAuthSpec, ComposeDocument, CpuArchitecture,
    DeclaredLaunchType, DefaultActionSpec, DependsCondition, DependsOn, DeploySpec, EcsExtSpec,
    ExtSourceSpec, HealthCheckSpec, IngressSpec, KvMap, LbScheme, LbType, ListenerProtocol,
    ListenerSpec, ListenerTargetSpec, LoadBalancerSpec, NetworkAttachment, NetworkExtSpec,
    NetworkSpec, OidcAuthSpec, OsFamily, PortProtocol, PortSpec, PredefinedAction,
    ResourceBound, ResourcesSpec, RuleConditionSpec, ScalingSpec, ScheduledActionSpec,
    SecretRef, SecretSpec, ServiceNetworks, ServiceSpec, StepSpec, TargetScalingSpec,
    TelemetrySpec, VpcLookupSpec, VpcSpec, FAMILY_LABEL,
};
pub use validator::{parse_range, ComposeValidator, ValidationError, ValidationResult};
