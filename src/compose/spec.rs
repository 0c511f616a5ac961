//! Compose document types for the synthesis engine.
//!
//! This module defines all the structs that map to the extended compose
//! YAML file. These types are declarative and fully describe the desired
//! resource graph; the synthesis engine consumes them as-is.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Deploy label assigning a service to a task family.
pub const FAMILY_LABEL: &str = "ecs.task.family";

/// The root structure for an extended compose document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ComposeDocument {
    /// Service definitions, in declaration order.
    pub services: IndexMap<String, ServiceSpec>,
    /// Named networks.
    #[serde(default)]
    pub networks: IndexMap<String, NetworkSpec>,
    /// Named secrets.
    #[serde(default)]
    pub secrets: IndexMap<String, SecretSpec>,
    /// Cluster settings and capacity declarations.
    #[serde(default, rename = "x-cluster")]
    pub cluster: Option<ClusterSpec>,
    /// VPC settings, including tag-based lookup of an existing VPC.
    #[serde(default, rename = "x-vpc")]
    pub vpc: Option<VpcSpec>,
    /// Load balancer definitions.
    #[serde(default, rename = "x-elbv2")]
    pub load_balancers: IndexMap<String, LoadBalancerSpec>,
    /// Tags stamped on every synthesized resource.
    #[serde(default, rename = "x-tags")]
    pub tags: IndexMap<String, String>,
}

/// One service (container) definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServiceSpec {
    /// Container image.
    #[serde(default)]
    pub image: String,
    /// Port specifications (short string or long map form).
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    /// Environment values (map or `KEY=VAL` list form).
    #[serde(default)]
    pub environment: KvMap,
    /// Secret references injected into the container.
    #[serde(default)]
    pub secrets: Vec<SecretRef>,
    /// Startup ordering relation (list or map form).
    #[serde(default)]
    pub depends_on: DependsOn,
    /// Network attachments (list or map form).
    #[serde(default)]
    pub networks: ServiceNetworks,
    /// Deployment settings (replicas, resources, labels).
    #[serde(default)]
    pub deploy: Option<DeploySpec>,
    /// Container labels.
    #[serde(default)]
    pub labels: KvMap,
    /// Optional command override.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    /// Whether the container is essential to the deployment unit.
    #[serde(default = "default_essential")]
    pub essential: bool,
    /// Scaling declarations for the owning family.
    #[serde(default, rename = "x-scaling")]
    pub scaling: Option<ScalingSpec>,
    /// Networking extensions (family-level ports, ingress sources).
    #[serde(default, rename = "x-network")]
    pub network_ext: Option<NetworkExtSpec>,
    /// Compute placement extensions.
    #[serde(default, rename = "x-ecs")]
    pub ecs_ext: Option<EcsExtSpec>,
    /// Managed side-car requests.
    #[serde(default, rename = "x-telemetry")]
    pub telemetry: Option<TelemetrySpec>,
}

/// A named network declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NetworkSpec {
    /// Marks the network as managed outside this document.
    #[serde(default)]
    pub external: bool,
    /// Driver name (informational).
    #[serde(default)]
    pub driver: Option<String>,
}

/// A named secret declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SecretSpec {
    /// Marks the secret as managed outside this document.
    #[serde(default)]
    pub external: bool,
    /// Identifier of the backing secret (name or ARN).
    #[serde(default)]
    pub name: Option<String>,
}

/// Reference from a service to a secret, with an optional in-container name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "SecretRefDe")]
pub struct SecretRef {
    /// Name of the secret in the top-level `secrets` map.
    pub source: String,
    /// Name exposed to the container (defaults to `source`).
    pub target: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SecretRefDe {
    Short(String),
    Long { source: String, target: Option<String> },
}

impl TryFrom<SecretRefDe> for SecretRef {
    type Error = String;

    fn try_from(de: SecretRefDe) -> Result<Self, Self::Error> {
        match de {
            SecretRefDe::Short(source) => Ok(Self {
                source,
                target: None,
            }),
            SecretRefDe::Long { source, target } => Ok(Self { source, target }),
        }
    }
}

impl SecretRef {
    /// The name the container sees for this secret.
    #[must_use]
    pub fn container_name(&self) -> &str {
        self.target.as_deref().unwrap_or(&self.source)
    }
}

/// A port specification.
///
/// Uniqueness key is `(target, protocol)`; merge semantics are defined by
/// the port merger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "PortDe")]
pub struct PortSpec {
    /// Container-side port.
    pub target: u16,
    /// Published (load-balancer/host side) port, when distinct.
    pub published: Option<u16>,
    /// Transport protocol.
    pub protocol: PortProtocol,
}

/// Transport protocols for service ports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    /// TCP protocol.
    #[default]
    Tcp,
    /// UDP protocol.
    Udp,
}

impl PortProtocol {
    /// Wire name of the protocol.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortDe {
    Short(String),
    Number(u16),
    Long {
        target: u16,
        #[serde(default)]
        published: Option<u16>,
        #[serde(default)]
        protocol: PortProtocol,
    },
}

impl TryFrom<PortDe> for PortSpec {
    type Error = String;

    fn try_from(de: PortDe) -> Result<Self, Self::Error> {
        match de {
            PortDe::Short(s) => Self::parse(&s),
            PortDe::Number(target) => Ok(Self {
                target,
                published: None,
                protocol: PortProtocol::Tcp,
            }),
            PortDe::Long {
                target,
                published,
                protocol,
            } => Ok(Self {
                target,
                published,
                protocol,
            }),
        }
    }
}

impl PortSpec {
    /// Parses a short-form port string like `"8080:80/tcp"`, `"80/udp"`
    /// or `"80"`.
    ///
    /// # Errors
    ///
    /// Returns an error if the port format is invalid.
    pub fn parse(s: &str) -> Result<Self, String> {
        let (ports, protocol) = match s.split_once('/') {
            Some((ports, proto)) => {
                let protocol = match proto.to_lowercase().as_str() {
                    "tcp" => PortProtocol::Tcp,
                    "udp" => PortProtocol::Udp,
                    other => return Err(format!("Invalid protocol: {other}. Expected tcp or udp")),
                };
                (ports, protocol)
            }
            None => (s, PortProtocol::Tcp),
        };

        let (published, target) = match ports.split_once(':') {
            Some((published, target)) => {
                let published = published
                    .parse::<u16>()
                    .map_err(|_| format!("Invalid published port: {published}"))?;
                (Some(published), target)
            }
            None => (None, ports),
        };

        let target = target
            .parse::<u16>()
            .map_err(|_| format!("Invalid port number: {target}"))?;

        Ok(Self {
            target,
            published,
            protocol,
        })
    }

    /// Creates a new port specification with no distinct published port.
    #[must_use]
    pub const fn new(target: u16, protocol: PortProtocol) -> Self {
        Self {
            target,
            published: None,
            protocol,
        }
    }

    /// The externally visible port (published when set, target otherwise).
    #[must_use]
    pub fn exposed(&self) -> u16 {
        self.published.unwrap_or(self.target)
    }
}

/// Ordered key/value map deserialized from either map or `KEY=VAL` list
/// form. Used for environment values and labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "KvMapDe")]
pub struct KvMap(pub IndexMap<String, String>);

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KvScalar {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl KvScalar {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Bool(b) => b.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum KvMapDe {
    Map(IndexMap<String, KvScalar>),
    List(Vec<String>),
}

impl From<KvMapDe> for KvMap {
    fn from(de: KvMapDe) -> Self {
        match de {
            KvMapDe::Map(map) => Self(
                map.into_iter()
                    .map(|(k, v)| (k, v.into_string()))
                    .collect(),
            ),
            KvMapDe::List(entries) => Self(
                entries
                    .into_iter()
                    .map(|entry| match entry.split_once('=') {
                        Some((k, v)) => (k.to_string(), v.to_string()),
                        None => (entry, String::new()),
                    })
                    .collect(),
            ),
        }
    }
}

impl KvMap {
    /// Returns true when the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Looks up a value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// Startup ordering relation, normalized from list or map form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "DependsOnDe")]
pub struct DependsOn(pub IndexMap<String, DependsCondition>);

/// Conditions under which a dependency is considered satisfied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DependsCondition {
    /// The dependency has started.
    #[default]
    ServiceStarted,
    /// The dependency reports healthy.
    ServiceHealthy,
    /// The dependency ran to successful completion.
    ServiceCompletedSuccessfully,
}

#[derive(Debug, Deserialize)]
struct DependsOnEntry {
    #[serde(default)]
    condition: DependsCondition,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DependsOnDe {
    List(Vec<String>),
    Map(IndexMap<String, DependsOnEntry>),
}

impl From<DependsOnDe> for DependsOn {
    fn from(de: DependsOnDe) -> Self {
        match de {
            DependsOnDe::List(names) => Self(
                names
                    .into_iter()
                    .map(|name| (name, DependsCondition::ServiceStarted))
                    .collect(),
            ),
            DependsOnDe::Map(map) => Self(
                map.into_iter()
                    .map(|(name, entry)| (name, entry.condition))
                    .collect(),
            ),
        }
    }
}

impl DependsOn {
    /// Returns true when no dependency is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names of the dependencies.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Network attachments of a service, normalized from list or map form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "ServiceNetworksDe")]
pub struct ServiceNetworks(pub IndexMap<String, NetworkAttachment>);

/// Attachment settings for one network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NetworkAttachment {
    /// Additional names the service answers to on this network.
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ServiceNetworksDe {
    List(Vec<String>),
    Map(IndexMap<String, Option<NetworkAttachment>>),
}

impl From<ServiceNetworksDe> for ServiceNetworks {
    fn from(de: ServiceNetworksDe) -> Self {
        match de {
            ServiceNetworksDe::List(names) => Self(
                names
                    .into_iter()
                    .map(|name| (name, NetworkAttachment::default()))
                    .collect(),
            ),
            ServiceNetworksDe::Map(map) => Self(
                map.into_iter()
                    .map(|(name, attachment)| (name, attachment.unwrap_or_default()))
                    .collect(),
            ),
        }
    }
}

/// Deployment settings for a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DeploySpec {
    /// Desired replica count.
    #[serde(default)]
    pub replicas: Option<u32>,
    /// Compute resource limits and reservations.
    #[serde(default)]
    pub resources: Option<ResourcesSpec>,
    /// Deploy labels; `ecs.task.family` assigns the family name.
    #[serde(default)]
    pub labels: KvMap,
}

/// Resource limits and reservations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResourcesSpec {
    /// Upper bounds.
    #[serde(default)]
    pub limits: Option<ResourceBound>,
    /// Guaranteed reservations.
    #[serde(default)]
    pub reservations: Option<ResourceBound>,
}

/// One bound of a resource declaration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResourceBound {
    /// CPU share, in fractional vCPUs (e.g. `"0.5"`).
    #[serde(default)]
    pub cpus: Option<String>,
    /// Memory amount (e.g. `"512M"`, `"2G"`).
    #[serde(default)]
    pub memory: Option<String>,
}

/// Scaling declarations carried by a service on behalf of its family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ScalingSpec {
    /// Capacity range in `"min-max"` form.
    #[serde(default)]
    pub range: Option<String>,
    /// Target-tracking settings.
    #[serde(default)]
    pub target_scaling: Option<TargetScalingSpec>,
    /// Step-scaling bands.
    #[serde(default)]
    pub steps: Vec<StepSpec>,
    /// Scheduled capacity changes.
    #[serde(default)]
    pub scheduled_actions: Vec<ScheduledActionSpec>,
}

/// Target-tracking scaling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TargetScalingSpec {
    /// Average CPU utilization target, percent.
    #[serde(default)]
    pub cpu_target: Option<u32>,
    /// Average memory utilization target, percent.
    #[serde(default)]
    pub memory_target: Option<u32>,
    /// Request count per load-balancer target.
    #[serde(default)]
    pub targets_count: Option<u32>,
    /// Disables scale-in on the tracking policy.
    #[serde(default)]
    pub disable_scale_in: Option<bool>,
    /// Scale-in cooldown, seconds.
    #[serde(default)]
    pub scale_in_cooldown: Option<u32>,
    /// Scale-out cooldown, seconds.
    #[serde(default)]
    pub scale_out_cooldown: Option<u32>,
}

/// One step-scaling band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepSpec {
    /// Inclusive lower bound of the driving metric.
    pub lower_bound: u32,
    /// Exclusive upper bound; the last step must leave this unset.
    #[serde(default)]
    pub upper_bound: Option<u32>,
    /// Capacity to set inside this band.
    pub count: u32,
}

/// A scheduled capacity change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduledActionSpec {
    /// Action name; synthesized when omitted.
    #[serde(default)]
    pub name: Option<String>,
    /// Schedule expression (cron or rate).
    pub schedule: String,
    /// Minimum capacity during the window.
    pub min_capacity: u32,
    /// Maximum capacity during the window.
    pub max_capacity: u32,
}

/// Networking extensions for the owning family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NetworkExtSpec {
    /// Family-level port declarations; these override same-key ports
    /// inherited from member services.
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    /// Ingress sources.
    #[serde(default)]
    pub ingress: Option<IngressSpec>,
    /// Requests a public IP for the service tasks.
    #[serde(default)]
    pub assign_public_ip: bool,
}

/// Declared ingress sources for a family security group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct IngressSpec {
    /// Allow members of the family to reach each other on merged ports.
    #[serde(default)]
    pub myself: bool,
    /// External CIDR sources.
    #[serde(default)]
    pub ext_sources: Vec<ExtSourceSpec>,
}

/// One external CIDR ingress source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtSourceSpec {
    /// Source CIDR.
    pub ipv4: String,
    /// Description for the emitted rule.
    #[serde(default)]
    pub description: Option<String>,
}

/// Compute placement extensions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EcsExtSpec {
    /// Explicit launch type declaration.
    #[serde(default)]
    pub launch_type: Option<DeclaredLaunchType>,
    /// Capacity provider strategy items.
    #[serde(default)]
    pub capacity_providers: Vec<CapacityProviderItem>,
    /// CPU architecture for the task runtime platform.
    #[serde(default)]
    pub cpu_architecture: Option<CpuArchitecture>,
    /// Operating system family for the task runtime platform.
    #[serde(default)]
    pub os_family: Option<OsFamily>,
    /// Ephemeral storage request, GiB.
    #[serde(default)]
    pub ephemeral_storage_gb: Option<u32>,
    /// Enables interactive command execution on the tasks.
    #[serde(default)]
    pub enable_execute_command: bool,
}

/// Launch types a document may declare directly.
///
/// The mixed placement modes are always derived, never declared.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeclaredLaunchType {
    /// Externally attached capacity.
    External,
    /// Fixed EC2 capacity.
    Ec2,
    /// Managed serverless capacity.
    Fargate,
}

/// One capacity provider strategy item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapacityProviderItem {
    /// Provider name (e.g. `FARGATE`, `FARGATE_SPOT`, or an autoscaling
    /// provider).
    pub provider: String,
    /// Baseline task count served by this provider.
    #[serde(default)]
    pub base: Option<u32>,
    /// Relative weight above the base.
    #[serde(default)]
    pub weight: Option<u32>,
}

/// CPU architectures for the task runtime platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum CpuArchitecture {
    /// 64-bit x86.
    X86_64,
    /// 64-bit ARM.
    Arm64,
}

impl CpuArchitecture {
    /// Wire name of the architecture.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::X86_64 => "X86_64",
            Self::Arm64 => "ARM64",
        }
    }
}

/// Operating system families for the task runtime platform.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OsFamily {
    /// Linux.
    Linux,
    /// Windows Server 2019 Core.
    #[serde(rename = "WINDOWS_SERVER_2019_CORE")]
    WindowsServer2019Core,
}

impl OsFamily {
    /// Wire name of the OS family.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "LINUX",
            Self::WindowsServer2019Core => "WINDOWS_SERVER_2019_CORE",
        }
    }
}

/// Managed side-car requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TelemetrySpec {
    /// Inject the tracing agent side-car.
    #[serde(default)]
    pub tracing: bool,
    /// Inject the metrics agent side-car.
    #[serde(default)]
    pub metrics: bool,
    /// Inject the log router side-car.
    #[serde(default)]
    pub log_routing: bool,
}

/// VPC settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VpcSpec {
    /// Resolve an existing VPC through the tag-based inventory API.
    #[serde(default)]
    pub lookup: Option<VpcLookupSpec>,
}

/// Tag filters identifying an existing VPC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VpcLookupSpec {
    /// Tags the VPC must carry; exactly one match is required.
    #[serde(default)]
    pub tags: IndexMap<String, String>,
}

/// Cluster settings and capacity declarations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ClusterSpec {
    /// Cluster name; defaults to the deployment name.
    #[serde(default)]
    pub name: Option<String>,
    /// Resolve the cluster descriptor from the remote API instead of
    /// this document.
    #[serde(default)]
    pub lookup: bool,
    /// Capacity providers attached to the cluster.
    #[serde(default)]
    pub capacity_providers: Vec<String>,
    /// Default capacity provider strategy.
    #[serde(default)]
    pub default_strategy: Vec<CapacityProviderItem>,
    /// Cluster-wide launch type override; pins every family.
    #[serde(default)]
    pub platform_override: Option<DeclaredLaunchType>,
}

/// A load balancer definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadBalancerSpec {
    /// Load balancer type.
    #[serde(rename = "type", default)]
    pub lb_type: LbType,
    /// Addressing scheme.
    #[serde(default)]
    pub scheme: LbScheme,
    /// Listeners attached to this load balancer.
    #[serde(default)]
    pub listeners: Vec<ListenerSpec>,
}

/// Load balancer types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LbType {
    /// Application load balancer (HTTP routing).
    #[default]
    Alb,
    /// Network load balancer (L4 forwarding).
    Nlb,
}

/// Load balancer addressing schemes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LbScheme {
    /// Reachable only inside the VPC.
    #[default]
    Internal,
    /// Reachable from the internet.
    InternetFacing,
}

/// One listener on a load balancer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListenerSpec {
    /// Listener port.
    pub port: u16,
    /// Listener protocol.
    pub protocol: ListenerProtocol,
    /// Certificate identifiers (ARNs).
    #[serde(default)]
    pub certificates: Vec<String>,
    /// TLS negotiation policy name.
    #[serde(default)]
    pub ssl_policy: Option<String>,
    /// Explicit default actions.
    #[serde(default)]
    pub default_actions: Vec<DefaultActionSpec>,
    /// Target references to route to.
    #[serde(default)]
    pub targets: Vec<ListenerTargetSpec>,
}

/// Listener protocols.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListenerProtocol {
    /// Plaintext HTTP.
    Http,
    /// Encrypted HTTP.
    Https,
    /// Plaintext TCP.
    Tcp,
    /// Encrypted TCP.
    Tls,
    /// UDP.
    Udp,
}

impl ListenerProtocol {
    /// Wire name of the protocol.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
            Self::Tcp => "TCP",
            Self::Tls => "TLS",
            Self::Udp => "UDP",
        }
    }

    /// Whether the transport is encrypted.
    #[must_use]
    pub const fn is_encrypted(self) -> bool {
        matches!(self, Self::Https | Self::Tls)
    }
}

/// Predefined default actions a listener may declare.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DefaultActionSpec {
    /// A predefined redirect or response.
    Redirect(PredefinedAction),
}

/// Predefined redirect/response kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PredefinedAction {
    /// Permanent redirect from HTTP to HTTPS.
    #[serde(rename = "HTTP_TO_HTTPS")]
    HttpToHttps,
    /// Fixed not-found response.
    #[serde(rename = "NOT_FOUND")]
    NotFound,
}

/// A listener target reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListenerTargetSpec {
    /// Target reference in `family:container[:port]` form.
    pub name: String,
    /// Routing condition shorthand: path, domain, or `domain/path`.
    #[serde(default)]
    pub access: Option<String>,
    /// Explicit routing conditions; take precedence over `access`.
    #[serde(default)]
    pub conditions: Vec<RuleConditionSpec>,
    /// OIDC authentication inserted before the forward action.
    #[serde(default)]
    pub authenticate_oidc: Option<OidcAuthSpec>,
    /// Managed-directory authentication inserted before the forward
    /// action.
    #[serde(default)]
    pub authenticate_cognito: Option<CognitoAuthSpec>,
    /// Health check for the synthesized target group.
    #[serde(default)]
    pub health_check: Option<HealthCheckSpec>,
}

/// An explicit routing condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RuleConditionSpec {
    /// Host-header values to match.
    #[serde(default)]
    pub host_header: Vec<String>,
    /// Path patterns to match.
    #[serde(default)]
    pub path_pattern: Vec<String>,
}

/// OIDC authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OidcAuthSpec {
    /// Issuer URL.
    pub issuer: String,
    /// Authorization endpoint.
    pub authorization_endpoint: String,
    /// Token endpoint.
    pub token_endpoint: String,
    /// User info endpoint.
    pub user_info_endpoint: String,
    /// Client identifier.
    pub client_id: String,
    /// Client secret.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Requested scopes.
    #[serde(default)]
    pub scope: Option<String>,
}

/// Managed-directory (user pool) authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CognitoAuthSpec {
    /// User pool ARN.
    pub user_pool_arn: String,
    /// User pool client identifier.
    pub user_pool_client_id: String,
    /// User pool domain.
    pub user_pool_domain: String,
    /// Requested scopes.
    #[serde(default)]
    pub scope: Option<String>,
}

/// Health check settings for a synthesized target group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HealthCheckSpec {
    /// HTTP path to probe.
    #[serde(default)]
    pub path: Option<String>,
    /// Interval between probes, seconds.
    #[serde(default)]
    pub interval_secs: Option<u32>,
    /// Probe timeout, seconds.
    #[serde(default)]
    pub timeout_secs: Option<u32>,
    /// Consecutive successes before healthy.
    #[serde(default)]
    pub healthy_threshold: Option<u32>,
    /// Consecutive failures before unhealthy.
    #[serde(default)]
    pub unhealthy_threshold: Option<u32>,
    /// Expected HTTP status codes (e.g. `"200-299"`).
    #[serde(default)]
    pub matcher: Option<String>,
}

const fn default_essential() -> bool {
    true
}

impl ComposeDocument {
    /// Returns the family name each service belongs to, in declaration
    /// order, de-duplicated.
    #[must_use]
    pub fn family_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for (service_name, service) in &self.services {
            let family = service.family_name(service_name);
            if !names.contains(&family) {
                names.push(family);
            }
        }
        names
    }

    /// Returns the services assigned to the given family, in declaration
    /// order.
    #[must_use]
    pub fn services_in_family(&self, family: &str) -> Vec<(&str, &ServiceSpec)> {
        self.services
            .iter()
            .filter(|(name, service)| service.family_name(name) == family)
            .map(|(name, service)| (name.as_str(), service))
            .collect()
    }
}

impl ServiceSpec {
    /// The family this service belongs to: the `ecs.task.family` deploy
    /// label when present, the service's own name otherwise.
    #[must_use]
    pub fn family_name(&self, service_name: &str) -> String {
        self.deploy
            .as_ref()
            .and_then(|deploy| deploy.labels.get(FAMILY_LABEL))
            .map_or_else(|| service_name.to_string(), ToString::to_string)
    }

    /// Declared replica count, defaulting to one.
    #[must_use]
    pub fn replicas(&self) -> u32 {
        self.deploy
            .as_ref()
            .and_then(|deploy| deploy.replicas)
            .unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_parse_full() {
        let port = PortSpec::parse("8080:80/tcp").unwrap();
        assert_eq!(port.target, 80);
        assert_eq!(port.published, Some(8080));
        assert_eq!(port.protocol, PortProtocol::Tcp);
    }

    #[test]
    fn test_port_parse_target_only() {
        let port = PortSpec::parse("443").unwrap();
        assert_eq!(port.target, 443);
        assert_eq!(port.published, None);
        assert_eq!(port.protocol, PortProtocol::Tcp);
    }

    #[test]
    fn test_port_parse_udp() {
        let port = PortSpec::parse("53/udp").unwrap();
        assert_eq!(port.target, 53);
        assert_eq!(port.protocol, PortProtocol::Udp);
    }

    #[test]
    fn test_port_parse_invalid() {
        assert!(PortSpec::parse("not-a-port").is_err());
        assert!(PortSpec::parse("80/sctp").is_err());
    }

    #[test]
    fn test_kv_map_from_list() {
        let yaml = "- FOO=bar\n- FLAG\n";
        let map: KvMap = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(map.get("FOO"), Some("bar"));
        assert_eq!(map.get("FLAG"), Some(""));
    }

    #[test]
    fn test_kv_map_from_map_with_scalars() {
        let yaml = "PORT: 8000\nDEBUG: true\nNAME: api\n";
        let map: KvMap = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(map.get("PORT"), Some("8000"));
        assert_eq!(map.get("DEBUG"), Some("true"));
        assert_eq!(map.get("NAME"), Some("api"));
    }

    #[test]
    fn test_depends_on_list_form() {
        let yaml = "- db\n- cache\n";
        let deps: DependsOn = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(deps.names().collect::<Vec<_>>(), vec!["db", "cache"]);
        assert_eq!(deps.0["db"], DependsCondition::ServiceStarted);
    }

    #[test]
    fn test_depends_on_map_form() {
        let yaml = "db:\n  condition: service_healthy\n";
        let deps: DependsOn = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(deps.0["db"], DependsCondition::ServiceHealthy);
    }

    #[test]
    fn test_family_name_from_label() {
        let yaml = r"
image: nginx:alpine
deploy:
  labels:
    ecs.task.family: frontend
";
        let service: ServiceSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(service.family_name("web"), "frontend");
    }

    #[test]
    fn test_family_name_defaults_to_service_name() {
        let service = ServiceSpec {
            image: String::from("nginx:alpine"),
            ..ServiceSpec::default()
        };
        assert_eq!(service.family_name("web"), "web");
    }

    #[test]
    fn test_document_family_grouping() {
        let yaml = r"
services:
  web:
    image: nginx:alpine
    deploy:
      labels:
        ecs.task.family: frontend
  proxy:
    image: envoy:v1.30
    deploy:
      labels:
        ecs.task.family: frontend
  worker:
    image: worker:latest
";
        let doc: ComposeDocument = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(doc.family_names(), vec!["frontend", "worker"]);
        assert_eq!(doc.services_in_family("frontend").len(), 2);
        assert_eq!(doc.services_in_family("worker").len(), 1);
    }

    #[test]
    fn test_listener_target_spec_parse() {
        let yaml = r#"
port: 443
protocol: HTTPS
certificates:
  - arn:aws:acm:eu-west-1:012345678912:certificate/abcd
targets:
  - name: frontend:web:80
    access: /
  - name: backend:api
    access: /api
"#;
        let listener: ListenerSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(listener.port, 443);
        assert_eq!(listener.protocol, ListenerProtocol::Https);
        assert_eq!(listener.targets.len(), 2);
        assert_eq!(listener.targets[0].access.as_deref(), Some("/"));
    }
}
