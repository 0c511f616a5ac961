//! The synthesized resource graph.
//!
//! Resources are stored by logical identifier in insertion order, which
//! together with the deterministic merge algorithms gives byte-identical
//! output for identical input. Cross-references between resources are
//! intrinsic-function JSON values built with [`ref_to`] and [`get_att`],
//! never embedded ownership.

use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::debug;

/// Kinds of resources the synthesis engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Compute task definition for a family.
    TaskDefinition,
    /// Long-running service keeping tasks alive.
    Service,
    /// Security group owned by a family or load balancer.
    SecurityGroup,
    /// One ingress rule on a security group.
    SecurityGroupIngress,
    /// IAM role (task or execution).
    Role,
    /// Application-autoscaling scalable target.
    ScalableTarget,
    /// Application-autoscaling policy.
    ScalingPolicy,
    /// Application-autoscaling scheduled action.
    ScheduledAction,
    /// Load balancer.
    LoadBalancer,
    /// Load balancer listener.
    Listener,
    /// Listener routing rule.
    ListenerRule,
    /// Extra listener certificate attachment.
    ListenerCertificate,
    /// Load balancer target group.
    TargetGroup,
    /// Log group backing container logging.
    LogGroup,
}

impl ResourceKind {
    /// The fully qualified type string used in the rendered template.
    #[must_use]
    pub const fn as_type_str(self) -> &'static str {
        match self {
            Self::TaskDefinition => "AWS::ECS::TaskDefinition",
            Self::Service => "AWS::ECS::Service",
            Self::SecurityGroup => "AWS::EC2::SecurityGroup",
            Self::SecurityGroupIngress => "AWS::EC2::SecurityGroupIngress",
            Self::Role => "AWS::IAM::Role",
            Self::ScalableTarget => "AWS::ApplicationAutoScaling::ScalableTarget",
            Self::ScalingPolicy => "AWS::ApplicationAutoScaling::ScalingPolicy",
            Self::ScheduledAction => "AWS::ApplicationAutoScaling::ScheduledAction",
            Self::LoadBalancer => "AWS::ElasticLoadBalancingV2::LoadBalancer",
            Self::Listener => "AWS::ElasticLoadBalancingV2::Listener",
            Self::ListenerRule => "AWS::ElasticLoadBalancingV2::ListenerRule",
            Self::ListenerCertificate => "AWS::ElasticLoadBalancingV2::ListenerCertificate",
            Self::TargetGroup => "AWS::ElasticLoadBalancingV2::TargetGroup",
            Self::LogGroup => "AWS::Logs::LogGroup",
        }
    }

    /// Whether the resource type accepts a `Tags` property.
    #[must_use]
    pub const fn is_taggable(self) -> bool {
        matches!(
            self,
            Self::TaskDefinition
                | Self::Service
                | Self::SecurityGroup
                | Self::Role
                | Self::LoadBalancer
                | Self::TargetGroup
                | Self::LogGroup
        )
    }
}

/// One synthesized resource.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Logical identifier, unique in the graph.
    pub logical_id: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Resource properties as template JSON.
    pub properties: Value,
    /// Logical ids this resource depends on explicitly.
    pub depends_on: Vec<String>,
}

impl Resource {
    /// Creates a resource with no explicit dependencies.
    #[must_use]
    pub fn new(logical_id: impl Into<String>, kind: ResourceKind, properties: Value) -> Self {
        Self {
            logical_id: logical_id.into(),
            kind,
            properties,
            depends_on: Vec::new(),
        }
    }

    /// Adds an explicit dependency on another logical id.
    #[must_use]
    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.push(logical_id.into());
        self
    }
}

/// An output binding exposed for cross-stack composition.
#[derive(Debug, Clone)]
pub struct OutputBinding {
    /// Output value (usually a `Ref` or `Fn::GetAtt`).
    pub value: Value,
    /// Optional export name for cross-stack imports.
    pub export: Option<String>,
}

/// A parameter binding consumed from an enclosing stack.
#[derive(Debug, Clone)]
pub struct ParameterBinding {
    /// Parameter type string (e.g. `String`, `List<AWS::EC2::Subnet::Id>`).
    pub parameter_type: String,
    /// Optional default value.
    pub default: Option<String>,
}

/// The full synthesized graph, keyed by logical resource name.
#[derive(Debug, Default)]
pub struct ResourceGraph {
    resources: IndexMap<String, Resource>,
    parameters: IndexMap<String, ParameterBinding>,
    outputs: IndexMap<String, OutputBinding>,
    /// Tags stamped on every taggable resource at render time.
    pub tags: IndexMap<String, String>,
}

impl ResourceGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a resource with the given logical id exists.
    #[must_use]
    pub fn contains(&self, logical_id: &str) -> bool {
        self.resources.contains_key(logical_id)
    }

    /// Adds a resource to the graph.
    ///
    /// Emission is idempotent: if a resource with the same logical id is
    /// already present, the existing definition is kept and `false` is
    /// returned.
    pub fn add(&mut self, resource: Resource) -> bool {
        if self.resources.contains_key(&resource.logical_id) {
            debug!(
                "Resource {} already in graph, keeping existing definition",
                resource.logical_id
            );
            return false;
        }
        self.resources.insert(resource.logical_id.clone(), resource);
        true
    }

    /// Looks up a resource by logical id.
    #[must_use]
    pub fn get(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    /// Number of resources in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true when the graph has no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Iterates resources in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Declares a stack parameter.
    pub fn add_parameter(
        &mut self,
        name: impl Into<String>,
        parameter_type: impl Into<String>,
        default: Option<String>,
    ) {
        self.parameters.insert(
            name.into(),
            ParameterBinding {
                parameter_type: parameter_type.into(),
                default,
            },
        );
    }

    /// Declares a stack output.
    pub fn add_output(&mut self, name: impl Into<String>, value: Value, export: Option<String>) {
        self.outputs
            .insert(name.into(), OutputBinding { value, export });
    }

    /// Stack parameters in declaration order.
    #[must_use]
    pub const fn parameters(&self) -> &IndexMap<String, ParameterBinding> {
        &self.parameters
    }

    /// Stack outputs in declaration order.
    #[must_use]
    pub const fn outputs(&self) -> &IndexMap<String, OutputBinding> {
        &self.outputs
    }
}

/// Builds a `Ref` intrinsic to another logical id or parameter.
#[must_use]
pub fn ref_to(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// Builds a `Fn::GetAtt` intrinsic.
#[must_use]
pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// Strips non-alphanumeric characters to form a logical id fragment.
#[must_use]
pub fn logical_id(name: &str) -> String {
    name.chars().filter(char::is_ascii_alphanumeric).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_is_idempotent() {
        let mut graph = ResourceGraph::new();
        let first = Resource::new("WebService", ResourceKind::Service, json!({"A": 1}));
        let second = Resource::new("WebService", ResourceKind::Service, json!({"A": 2}));

        assert!(graph.add(first));
        assert!(!graph.add(second));
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.get("WebService").unwrap().properties["A"], 1);
    }

    #[test]
    fn test_logical_id_strips_punctuation() {
        assert_eq!(logical_id("front-end_v2"), "frontendv2");
        assert_eq!(logical_id("api"), "api");
    }

    #[test]
    fn test_intrinsics_shape() {
        assert_eq!(ref_to("Thing"), json!({"Ref": "Thing"}));
        assert_eq!(
            get_att("Thing", "Arn"),
            json!({"Fn::GetAtt": ["Thing", "Arn"]})
        );
    }
}
