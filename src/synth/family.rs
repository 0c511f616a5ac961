//! Family composition: the lifecycle of one deployment unit.
//!
//! A family aggregates the services sharing one compute/network/IAM
//! boundary. Composition orders containers by dependency, injects managed
//! side-cars, merges networking and scaling declarations, selects compute
//! sizing per placement mode, and finally assembles the compute resource
//! definitions.

use indexmap::IndexMap;
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::compose::{
    CapacityProviderItem, ComposeDocument, CpuArchitecture, DeclaredLaunchType, DependsCondition,
    ExtSourceSpec, OsFamily, PortProtocol, ServiceSpec,
};
use crate::error::{Result, StacksmithError, SynthError};
use crate::graph::{get_att, logical_id, ref_to, Resource, ResourceGraph, ResourceKind};

use super::envsort::{sort_environment, sort_secrets};
use super::ingress::{add_ext_sources_ingress, add_self_ingress};
use super::launch::{resolve_launch, ClusterDescriptor, LaunchDecision, LaunchMode};
use super::listener::ServiceTargetBinding;
use super::naming::UniqueNamer;
use super::ports::{merge_family_networking, MergedNetworking};
use super::scaling::{merge_family_scaling, FamilyScaling};

/// Name of the managed tracing agent side-car.
pub const SIDECAR_TRACING: &str = "telemetry-agent";
/// Name of the managed metrics agent side-car.
pub const SIDECAR_METRICS: &str = "metrics-agent";
/// Name of the managed log router side-car.
pub const SIDECAR_LOG_ROUTER: &str = "log-router";

/// Images for the managed side-cars.
const SIDECAR_TRACING_IMAGE: &str = "amazon/aws-xray-daemon";
const SIDECAR_METRICS_IMAGE: &str = "amazon/cloudwatch-agent";
const SIDECAR_LOG_ROUTER_IMAGE: &str = "amazon/aws-for-fluent-bit:stable";

/// Ephemeral storage below this threshold is included for free and the
/// attribute is omitted entirely.
const FREE_EPHEMERAL_STORAGE_GIB: u32 = 21;

/// Valid serverless `(cpu units, memory MiB choices)` combinations, in
/// ascending CPU order.
const FARGATE_COMBINATIONS: &[(u32, &[u32])] = &[
    (256, &[512, 1024, 2048]),
    (512, &[1024, 2048, 3072, 4096]),
    (1024, &[2048, 3072, 4096, 5120, 6144, 7168, 8192]),
    (
        2048,
        &[4096, 5120, 6144, 7168, 8192, 9216, 10240, 11264, 12288, 13312, 14336, 15360, 16384],
    ),
    (
        4096,
        &[
            8192, 9216, 10240, 11264, 12288, 13312, 14336, 15360, 16384, 17408, 18432, 19456,
            20480, 21504, 22528, 23552, 24576, 25600, 26624, 27648, 28672, 29696, 30720,
        ],
    ),
];

/// One container member of a family.
#[derive(Debug, Clone)]
pub struct FamilyService {
    /// Container name.
    pub name: String,
    /// The service declaration.
    pub spec: ServiceSpec,
}

/// An addressable compute target exposed by a family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedTarget {
    /// Owning family name.
    pub family: String,
    /// Container name.
    pub container: String,
    /// Container-side port.
    pub port: u16,
    /// Transport protocol.
    pub protocol: PortProtocol,
}

/// A composed deployment unit.
#[derive(Debug)]
pub struct TaskFamily {
    /// Family name.
    pub name: String,
    /// Logical id fragment (non-alphanumerics stripped).
    pub logical_name: String,
    /// User services, ordered by the dependency relation.
    pub ordered_services: Vec<FamilyService>,
    /// Managed side-cars, injected by the composer.
    pub sidecars: Vec<FamilyService>,
    /// Resolved placement decision.
    pub launch: LaunchDecision,
    /// Merged family networking.
    pub networking: MergedNetworking,
    /// Whether self-ingress is enabled.
    pub ingress_myself: bool,
    /// Declared external CIDR ingress sources.
    pub ext_sources: Vec<ExtSourceSpec>,
    /// Whether tasks receive a public IP.
    pub assign_public_ip: bool,
    /// Merged scaling policy set.
    pub scaling: Option<FamilyScaling>,
    /// Desired task count.
    pub replicas: u32,
    /// Whether interactive command execution is enabled.
    pub enable_execute_command: bool,
    /// Task CPU units.
    pub cpu: u32,
    /// Task memory, MiB.
    pub memory: u32,
    /// Ephemeral storage in GiB; `None` when within the free tier.
    pub ephemeral_storage_gib: Option<u32>,
    /// CPU architecture of the runtime platform.
    pub cpu_architecture: Option<CpuArchitecture>,
    /// OS family of the runtime platform.
    pub os_family: Option<OsFamily>,
    /// Targets exposed to load balancer resolution.
    pub exposed_targets: Vec<ExposedTarget>,
}

impl TaskFamily {
    /// Composes a family from its member services.
    ///
    /// # Errors
    ///
    /// Returns a configuration error on dependency cycles, missing
    /// essential containers, placement conflicts, or invalid scaling
    /// declarations.
    pub fn compose(
        name: &str,
        members: &[(&str, &ServiceSpec)],
        cluster: &ClusterDescriptor,
    ) -> Result<Self> {
        let ordered_services = order_services(name, members)?;

        if !ordered_services.iter().any(|svc| svc.spec.essential) {
            return Err(StacksmithError::Synth(SynthError::NoEssentialContainer {
                family: name.to_string(),
            }));
        }

        let merged_ecs = merge_ecs_ext(name, members)?;
        let launch = resolve_launch(
            name,
            merged_ecs.launch_type,
            &merged_ecs.capacity_providers,
            cluster,
        )?;

        let networking = merge_family_networking(members);

        let scaling_declarations: Vec<_> = members
            .iter()
            .filter_map(|(_, service)| service.scaling.as_ref())
            .collect();
        let scaling = merge_family_scaling(name, &scaling_declarations)?;

        let (cpu, memory) = compute_task_sizing(name, members, &launch)?;
        let (cpu_architecture, os_family) = resolve_platform(name, members)?;

        let max_storage = members
            .iter()
            .filter_map(|(_, service)| service.ecs_ext.as_ref())
            .filter_map(|ext| ext.ephemeral_storage_gb)
            .max()
            .unwrap_or(0);
        let ephemeral_storage_gib =
            (max_storage >= FREE_EPHEMERAL_STORAGE_GIB).then_some(max_storage);

        let (ingress_myself, ext_sources, assign_public_ip) = merge_ingress_settings(members);

        let exposed_targets = ordered_services
            .iter()
            .flat_map(|svc| {
                svc.spec.ports.iter().map(|port| ExposedTarget {
                    family: name.to_string(),
                    container: svc.name.clone(),
                    port: port.target,
                    protocol: port.protocol,
                })
            })
            .collect();

        let mut family = Self {
            name: name.to_string(),
            logical_name: logical_id(name),
            ordered_services,
            sidecars: Vec::new(),
            launch,
            networking,
            ingress_myself,
            ext_sources,
            assign_public_ip,
            scaling,
            replicas: members
                .iter()
                .map(|(_, service)| service.replicas())
                .max()
                .unwrap_or(1),
            enable_execute_command: members
                .iter()
                .filter_map(|(_, service)| service.ecs_ext.as_ref())
                .any(|ext| ext.enable_execute_command),
            cpu,
            memory,
            ephemeral_storage_gib,
            cpu_architecture,
            os_family,
            exposed_targets,
        };
        family.import_sidecars(members);
        family.state_facts();
        Ok(family)
    }

    /// Logs the composed facts about the family.
    fn state_facts(&self) {
        info!("{} - Launch mode set to {:?}", self.name, self.launch.mode);
        info!(
            "{} - Task sizing: cpu={} memory={}MiB ephemeral={:?}",
            self.name, self.cpu, self.memory, self.ephemeral_storage_gib
        );
        info!(
            "{} - Containers: {:?}",
            self.name,
            self.all_services().map(|svc| &svc.name).collect::<Vec<_>>()
        );
    }

    /// All containers: managed side-cars first, then ordered services.
    pub fn all_services(&self) -> impl Iterator<Item = &FamilyService> {
        self.sidecars.iter().chain(self.ordered_services.iter())
    }

    /// Injects the managed side-cars any member requested.
    fn import_sidecars(&mut self, members: &[(&str, &ServiceSpec)]) {
        let wants = |pick: fn(&crate::compose::TelemetrySpec) -> bool| {
            members
                .iter()
                .filter_map(|(_, service)| service.telemetry.as_ref())
                .any(pick)
        };
        if wants(|t| t.tracing) {
            self.add_sidecar(SIDECAR_TRACING, SIDECAR_TRACING_IMAGE);
        }
        if wants(|t| t.metrics) {
            self.add_sidecar(SIDECAR_METRICS, SIDECAR_METRICS_IMAGE);
        }
        if wants(|t| t.log_routing) {
            self.add_sidecar(SIDECAR_LOG_ROUTER, SIDECAR_LOG_ROUTER_IMAGE);
        }
    }

    /// Adds a managed side-car container.
    ///
    /// Injection is idempotent by name: re-adding an already-present
    /// side-car is a no-op.
    pub fn add_sidecar(&mut self, name: &str, image: &str) -> bool {
        if self.sidecars.iter().any(|svc| svc.name == name) {
            debug!("{} - container service {name} is already set. Skipping", self.name);
            return false;
        }
        self.sidecars.push(FamilyService {
            name: name.to_string(),
            spec: ServiceSpec {
                image: image.to_string(),
                essential: false,
                ..ServiceSpec::default()
            },
        });
        true
    }

    /// Logical id of the family security group.
    #[must_use]
    pub fn sg_logical_id(&self) -> String {
        format!("{}Sg", self.logical_name)
    }

    /// Logical id of the family task definition.
    #[must_use]
    pub fn task_definition_logical_id(&self) -> String {
        format!("{}TaskDefinition", self.logical_name)
    }

    /// Logical id of the family service.
    #[must_use]
    pub fn service_logical_id(&self) -> String {
        format!("{}Service", self.logical_name)
    }

    /// Emits the per-family resources that do not depend on cross-family
    /// resolution: log group, IAM roles, security group, task definition,
    /// and the declared ingress rules.
    pub fn emit_task_resources(&self, graph: &mut ResourceGraph) {
        let logical = &self.logical_name;

        graph.add(Resource::new(
            format!("{logical}LogGroup"),
            ResourceKind::LogGroup,
            json!({
                "LogGroupName": format!("/ecs/{}", self.name),
                "RetentionInDays": 30,
            }),
        ));

        self.emit_iam_roles(graph);

        if self.launch.mode != Some(LaunchMode::External) {
            graph.add(Resource::new(
                self.sg_logical_id(),
                ResourceKind::SecurityGroup,
                json!({
                    "GroupDescription": format!("Security group for {}", self.name),
                    "VpcId": ref_to("VpcId"),
                }),
            ));

            if self.ingress_myself {
                add_self_ingress(graph, logical, &self.sg_logical_id(), &self.networking.ports);
            }
            add_ext_sources_ingress(
                graph,
                logical,
                &self.sg_logical_id(),
                &self.ext_sources,
                &self.networking.ports,
            );
        } else {
            debug!("{} - Ingress cannot be set (EXTERNAL mode). Skipping", self.name);
        }

        let properties = self.task_definition_properties(graph);
        graph.add(Resource::new(
            self.task_definition_logical_id(),
            ResourceKind::TaskDefinition,
            properties,
        ));
    }

    /// Emits the task and execution roles, with secret read access on the
    /// execution role when any container uses secrets.
    fn emit_iam_roles(&self, graph: &mut ResourceGraph) {
        let logical = &self.logical_name;
        let assume = json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": "ecs-tasks.amazonaws.com" },
                "Action": "sts:AssumeRole",
            }]
        });

        graph.add(Resource::new(
            format!("{logical}TaskRole"),
            ResourceKind::Role,
            json!({ "AssumeRolePolicyDocument": assume.clone() }),
        ));

        let mut exec_properties = json!({
            "AssumeRolePolicyDocument": assume,
            "ManagedPolicyArns": [
                "arn:aws:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy"
            ],
        });

        let secret_params: Vec<String> = self
            .all_services()
            .flat_map(|svc| svc.spec.secrets.iter())
            .map(|secret| format!("{}Arn", logical_id(&secret.source)))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if !secret_params.is_empty() {
            let mut sorted = secret_params;
            sorted.sort();
            for parameter in &sorted {
                graph.add_parameter(parameter.clone(), "String", None);
            }
            let resources: Vec<Value> = sorted.iter().map(|p| ref_to(p)).collect();
            exec_properties["Policies"] = json!([{
                "PolicyName": "SecretsAccess",
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Action": ["secretsmanager:GetSecretValue"],
                        "Resource": resources,
                    }]
                }
            }]);
        }

        graph.add(Resource::new(
            format!("{logical}ExecRole"),
            ResourceKind::Role,
            exec_properties,
        ));
    }

    /// Builds the task definition properties.
    fn task_definition_properties(&self, graph: &mut ResourceGraph) -> Value {
        let logical = &self.logical_name;
        let containers: Vec<Value> = self
            .all_services()
            .map(|svc| self.container_definition(svc, graph))
            .collect();

        let mut properties = json!({
            "Family": self.name,
            "Cpu": self.cpu.to_string(),
            "Memory": self.memory.to_string(),
            "NetworkMode": self.network_mode(),
            "RequiresCompatibilities": self.requires_compatibilities(),
            "ContainerDefinitions": containers,
            "TaskRoleArn": get_att(&format!("{logical}TaskRole"), "Arn"),
            "ExecutionRoleArn": get_att(&format!("{logical}ExecRole"), "Arn"),
        });

        // Storage within the free tier is omitted, not emitted as zero.
        if let Some(size) = self.ephemeral_storage_gib {
            properties["EphemeralStorage"] = json!({ "SizeInGiB": size });
        }

        if self.cpu_architecture.is_some() || self.os_family.is_some() {
            properties["RuntimePlatform"] = json!({
                "CpuArchitecture": self
                    .cpu_architecture
                    .unwrap_or(CpuArchitecture::X86_64)
                    .as_str(),
                "OperatingSystemFamily": self.os_family.unwrap_or(OsFamily::Linux).as_str(),
            });
        }

        properties
    }

    /// Network mode of the task.
    fn network_mode(&self) -> &'static str {
        if self.launch.mode == Some(LaunchMode::External) {
            warn!(
                "{} - External mode cannot use awsvpc networking. Falling back to bridge",
                self.name
            );
            "bridge"
        } else {
            "awsvpc"
        }
    }

    /// Compatibilities required by the resolved launch mode.
    fn requires_compatibilities(&self) -> Vec<&'static str> {
        match self.launch.mode {
            Some(LaunchMode::External) => vec!["EXTERNAL"],
            Some(LaunchMode::Ec2) => vec!["EC2"],
            Some(LaunchMode::Fargate | LaunchMode::FargateProviders) => vec!["FARGATE"],
            _ => vec!["EC2", "FARGATE"],
        }
    }

    /// Builds one container definition.
    fn container_definition(&self, svc: &FamilyService, graph: &mut ResourceGraph) -> Value {
        let logical = &self.logical_name;

        let secrets: Vec<(String, Value)> = svc
            .spec
            .secrets
            .iter()
            .map(|secret| {
                let parameter = format!("{}Arn", logical_id(&secret.source));
                graph.add_parameter(parameter.clone(), "String", None);
                (secret.container_name().to_string(), ref_to(&parameter))
            })
            .collect();
        let secret_names: HashSet<String> =
            secrets.iter().map(|(name, _)| name.clone()).collect();

        // EXTERNAL capacity has no metadata endpoint for the region, so
        // it is injected explicitly, after the sorted values.
        let extras = if self.launch.mode == Some(LaunchMode::External) {
            vec![json!({ "Name": "AWS_DEFAULT_REGION", "Value": { "Ref": "AWS::Region" } })]
        } else {
            Vec::new()
        };

        let environment = sort_environment(
            svc.spec
                .environment
                .0
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            &secret_names,
            extras,
            &self.name,
        );
        let sorted_secrets = sort_secrets(secrets);

        let mut container = json!({
            "Name": svc.name,
            "Image": svc.spec.image,
            "Essential": svc.spec.essential,
            "LogConfiguration": {
                "LogDriver": "awslogs",
                "Options": {
                    "awslogs-group": ref_to(&format!("{logical}LogGroup")),
                    "awslogs-region": { "Ref": "AWS::Region" },
                    "awslogs-stream-prefix": svc.name,
                }
            },
            "DockerLabels": {
                "container_name": svc.name,
                "task_family": self.name,
            },
        });

        if !svc.spec.ports.is_empty() {
            let mappings: Vec<Value> = svc
                .spec
                .ports
                .iter()
                .map(|port| {
                    json!({
                        "ContainerPort": port.target,
                        "Protocol": port.protocol.as_str(),
                    })
                })
                .collect();
            container["PortMappings"] = json!(mappings);
        }
        if let Some(environment) = environment {
            container["Environment"] = json!(environment);
        }
        if let Some(secrets) = sorted_secrets {
            container["Secrets"] = json!(secrets);
        }
        if let Some(command) = &svc.spec.command {
            container["Command"] = json!(command);
        }
        if !svc.spec.depends_on.is_empty() {
            let depends: Vec<Value> = svc
                .spec
                .depends_on
                .0
                .iter()
                .map(|(dependency, condition)| {
                    json!({
                        "ContainerName": dependency,
                        "Condition": container_condition(*condition),
                    })
                })
                .collect();
            container["DependsOn"] = json!(depends);
        }

        container
    }

    /// Emits the service resource, wired to its resolved load balancer
    /// targets, plus the family outputs.
    pub fn emit_service_resource(
        &self,
        graph: &mut ResourceGraph,
        bindings: &[ServiceTargetBinding],
    ) {
        let logical = &self.logical_name;
        let service_id = self.service_logical_id();

        let mut properties = json!({
            "Cluster": ref_to("ClusterName"),
            "DesiredCount": self.replicas,
            "TaskDefinition": ref_to(&self.task_definition_logical_id()),
            "EnableExecuteCommand": self.enable_execute_command,
            "PropagateTags": "SERVICE",
        });

        match self.launch.mode {
            Some(LaunchMode::External) => {
                properties["LaunchType"] = json!("EXTERNAL");
            }
            Some(LaunchMode::Ec2) => {
                properties["LaunchType"] = json!("EC2");
            }
            Some(LaunchMode::Fargate) => {
                properties["LaunchType"] = json!("FARGATE");
            }
            Some(LaunchMode::FargateProviders | LaunchMode::ServiceProviders) => {
                let strategy: Vec<Value> = if self.launch.strategy.is_empty() {
                    vec![json!({ "CapacityProvider": "FARGATE", "Weight": 1 })]
                } else {
                    self.launch.strategy.iter().map(strategy_item).collect()
                };
                properties["CapacityProviderStrategy"] = json!(strategy);
            }
            Some(LaunchMode::ClusterDefault) | None => {}
        }

        if self.launch.mode != Some(LaunchMode::External) {
            properties["NetworkConfiguration"] = json!({
                "AwsvpcConfiguration": {
                    "Subnets": ref_to("AppSubnets"),
                    "SecurityGroups": [ref_to(&self.sg_logical_id())],
                    "AssignPublicIp": if self.assign_public_ip { "ENABLED" } else { "DISABLED" },
                }
            });
        }

        if !bindings.is_empty() {
            let load_balancers: Vec<Value> = bindings
                .iter()
                .map(|binding| {
                    json!({
                        "ContainerName": binding.container,
                        "ContainerPort": binding.port,
                        "TargetGroupArn": ref_to(&binding.target_group_id),
                    })
                })
                .collect();
            properties["LoadBalancers"] = json!(load_balancers);
        }

        graph.add(Resource::new(&service_id, ResourceKind::Service, properties));

        graph.add_output(
            format!("{logical}ServiceName"),
            get_att(&service_id, "Name"),
            None,
        );
        graph.add_output(format!("{logical}ServiceArn"), ref_to(&service_id), None);
        graph.add_output(
            format!("{logical}TaskDefinition"),
            ref_to(&self.task_definition_logical_id()),
            None,
        );
        if self.launch.mode != Some(LaunchMode::External) {
            graph.add_output(
                format!("{logical}GroupId"),
                get_att(&self.sg_logical_id(), "GroupId"),
                None,
            );
        }
    }

    /// Emits the autoscaling resources: scalable target, tracking and
    /// step policies, and scheduled actions.
    pub fn emit_scaling_resources(&self, graph: &mut ResourceGraph, namer: &mut UniqueNamer) {
        let Some(scaling) = &self.scaling else {
            return;
        };
        let logical = &self.logical_name;
        let target_id = format!("{logical}ScalableTarget");
        let resource_id = json!({
            "Fn::Join": ["", [
                "service/",
                ref_to("ClusterName"),
                "/",
                get_att(&self.service_logical_id(), "Name"),
            ]]
        });

        graph.add(Resource::new(
            &target_id,
            ResourceKind::ScalableTarget,
            json!({
                "MinCapacity": scaling.min_capacity,
                "MaxCapacity": scaling.max_capacity,
                "ResourceId": resource_id,
                "ScalableDimension": "ecs:service:DesiredCount",
                "ServiceNamespace": "ecs",
            }),
        ));
        graph.add_output(target_id.clone(), ref_to(&target_id), None);

        let tracking = &scaling.target_tracking;
        let metrics: &[(&str, Option<u32>, &str)] = &[
            ("Cpu", tracking.cpu_target, "ECSServiceAverageCPUUtilization"),
            (
                "Memory",
                tracking.memory_target,
                "ECSServiceAverageMemoryUtilization",
            ),
            ("Targets", tracking.targets_count, "ALBRequestCountPerTarget"),
        ];
        for (label, target_value, metric_type) in metrics {
            let Some(target_value) = target_value else {
                continue;
            };
            graph.add(Resource::new(
                format!("{logical}{label}TrackingPolicy"),
                ResourceKind::ScalingPolicy,
                json!({
                    "PolicyName": format!("{logical}{label}Tracking"),
                    "PolicyType": "TargetTrackingScaling",
                    "ScalingTargetId": ref_to(&target_id),
                    "TargetTrackingScalingPolicyConfiguration": {
                        "PredefinedMetricSpecification": {
                            "PredefinedMetricType": metric_type,
                        },
                        "TargetValue": target_value,
                        "DisableScaleIn": tracking.disable_scale_in,
                        "ScaleInCooldown": tracking.scale_in_cooldown,
                        "ScaleOutCooldown": tracking.scale_out_cooldown,
                    },
                }),
            ));
        }

        if !scaling.steps.is_empty() {
            self.emit_step_policies(graph, namer, &target_id);
        }

        for action in &scaling.scheduled_actions {
            let action_name = action.name.clone().unwrap_or_else(|| {
                // Synthesized name with a unique suffix so repeated
                // emissions in the same family cannot collide.
                namer.unique_name("scheduled")
            });
            graph.add(Resource::new(
                format!("{logical}{}ScheduledAction", logical_id(&action_name)),
                ResourceKind::ScheduledAction,
                json!({
                    "ScheduledActionName": action_name,
                    "Schedule": action.schedule,
                    "ResourceId": json!({
                        "Fn::Join": ["", [
                            "service/",
                            ref_to("ClusterName"),
                            "/",
                            get_att(&self.service_logical_id(), "Name"),
                        ]]
                    }),
                    "ScalableDimension": "ecs:service:DesiredCount",
                    "ServiceNamespace": "ecs",
                    "ScalableTargetAction": {
                        "MinCapacity": action.min_capacity,
                        "MaxCapacity": action.max_capacity,
                    },
                }),
            ));
        }
    }

    /// Emits the scale-out step policy and its reset-to-zero companion.
    fn emit_step_policies(
        &self,
        graph: &mut ResourceGraph,
        namer: &mut UniqueNamer,
        target_id: &str,
    ) {
        let Some(scaling) = &self.scaling else {
            return;
        };
        let logical = &self.logical_name;

        let adjustments: Vec<Value> = scaling
            .steps
            .iter()
            .map(|step| {
                let mut adjustment = json!({
                    "MetricIntervalLowerBound": step.lower_bound,
                    "ScalingAdjustment": step.count,
                });
                if let Some(upper) = step.upper_bound {
                    adjustment["MetricIntervalUpperBound"] = json!(upper);
                }
                adjustment
            })
            .collect();

        let out_name = namer.unique_name(&format!("ScalingOutPolicy{logical}"));
        graph.add(Resource::new(
            out_name.clone(),
            ResourceKind::ScalingPolicy,
            json!({
                "PolicyName": out_name,
                "PolicyType": "StepScaling",
                "ScalingTargetId": ref_to(target_id),
                "StepScalingPolicyConfiguration": {
                    "AdjustmentType": "ExactCapacity",
                    "StepAdjustments": adjustments,
                    "Cooldown": scaling.target_tracking.scale_out_cooldown,
                },
            }),
        ));

        let in_name = namer.unique_name(&format!("ScalingInPolicy{logical}"));
        graph.add(Resource::new(
            in_name.clone(),
            ResourceKind::ScalingPolicy,
            json!({
                "PolicyName": in_name,
                "PolicyType": "StepScaling",
                "ScalingTargetId": ref_to(target_id),
                "StepScalingPolicyConfiguration": {
                    "AdjustmentType": "ExactCapacity",
                    "Cooldown": scaling.target_tracking.scale_in_cooldown,
                    "StepAdjustments": [{
                        "MetricIntervalUpperBound": 0,
                        "ScalingAdjustment": 0,
                    }],
                },
            }),
        ));
    }
}

/// Maps a compose dependency condition to a container condition.
const fn container_condition(condition: DependsCondition) -> &'static str {
    match condition {
        DependsCondition::ServiceStarted => "START",
        DependsCondition::ServiceHealthy => "HEALTHY",
        DependsCondition::ServiceCompletedSuccessfully => "SUCCESS",
    }
}

/// Renders one capacity provider strategy item.
fn strategy_item(item: &CapacityProviderItem) -> Value {
    let mut value = json!({ "CapacityProvider": item.provider });
    if let Some(base) = item.base {
        value["Base"] = json!(base);
    }
    if let Some(weight) = item.weight {
        value["Weight"] = json!(weight);
    }
    value
}

/// Orders a family's services so dependencies always precede dependents.
///
/// Each service starts at priority 0; a dependent's priority is raised
/// above the maximum priority of its dependencies until a fixpoint. A
/// pass count exceeding the service count means a cycle.
fn order_services(family: &str, members: &[(&str, &ServiceSpec)]) -> Result<Vec<FamilyService>> {
    let mut priorities: IndexMap<&str, u32> =
        members.iter().map(|(name, _)| (*name, 0)).collect();

    let mut passes = 0;
    loop {
        let mut changed = false;
        for (name, service) in members {
            for dependency in service.depends_on.names() {
                let Some(dep_priority) = priorities.get(dependency).copied() else {
                    continue;
                };
                if priorities[*name] <= dep_priority {
                    priorities[*name] = dep_priority + 1;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
        passes += 1;
        if passes > members.len() {
            let culprit = members
                .iter()
                .map(|(name, _)| *name)
                .next_back()
                .unwrap_or_default();
            return Err(StacksmithError::Synth(SynthError::CircularDependency {
                family: family.to_string(),
                service: culprit.to_string(),
            }));
        }
    }

    let mut ordered: Vec<FamilyService> = members
        .iter()
        .map(|(name, service)| FamilyService {
            name: (*name).to_string(),
            spec: (*service).clone(),
        })
        .collect();
    // Stable sort: declaration order is preserved within a priority band.
    ordered.sort_by_key(|svc| priorities[svc.name.as_str()]);
    Ok(ordered)
}

/// Merged `x-ecs` declarations of a family.
#[derive(Debug, Default)]
struct MergedEcsExt {
    launch_type: Option<DeclaredLaunchType>,
    capacity_providers: Vec<CapacityProviderItem>,
}

/// Merges the `x-ecs` blocks of the member services.
fn merge_ecs_ext(family: &str, members: &[(&str, &ServiceSpec)]) -> Result<MergedEcsExt> {
    let mut merged = MergedEcsExt::default();
    for (_, service) in members {
        let Some(ext) = service.ecs_ext.as_ref() else {
            continue;
        };
        if let Some(launch_type) = ext.launch_type {
            match merged.launch_type {
                None => merged.launch_type = Some(launch_type),
                Some(existing) if existing != launch_type => {
                    return Err(StacksmithError::Synth(SynthError::ConflictingPlacement {
                        family: family.to_string(),
                        detail: format!(
                            "launch types {existing:?} and {launch_type:?} both declared"
                        ),
                    }));
                }
                Some(_) => {}
            }
        }
        for item in &ext.capacity_providers {
            if !merged
                .capacity_providers
                .iter()
                .any(|existing| existing.provider == item.provider)
            {
                merged.capacity_providers.push(item.clone());
            }
        }
    }
    Ok(merged)
}

/// Merges the ingress-facing `x-network` settings of the members.
fn merge_ingress_settings(
    members: &[(&str, &ServiceSpec)],
) -> (bool, Vec<ExtSourceSpec>, bool) {
    let mut myself = false;
    let mut ext_sources = Vec::new();
    let mut assign_public_ip = false;
    for (_, service) in members {
        if let Some(ext) = service.network_ext.as_ref() {
            assign_public_ip |= ext.assign_public_ip;
            if let Some(ingress) = &ext.ingress {
                myself |= ingress.myself;
                for source in &ingress.ext_sources {
                    if !ext_sources.contains(source) {
                        ext_sources.push(source.clone());
                    }
                }
            }
        }
    }
    (myself, ext_sources, assign_public_ip)
}

/// Computes the family task sizing from the member declarations.
///
/// CPU sums the reservations, memory sums the limits (falling back to
/// reservations). Serverless placement rounds the pair up to the nearest
/// valid combination.
fn compute_task_sizing(
    family: &str,
    members: &[(&str, &ServiceSpec)],
    launch: &LaunchDecision,
) -> Result<(u32, u32)> {
    let mut cpu = 0_u32;
    let mut memory = 0_u32;

    for (_, service) in members {
        let resources = service.deploy.as_ref().and_then(|d| d.resources.as_ref());
        if let Some(resources) = resources {
            let reservation_cpu = resources
                .reservations
                .as_ref()
                .and_then(|b| b.cpus.as_deref())
                .and_then(parse_cpu_units);
            let limit_cpu = resources
                .limits
                .as_ref()
                .and_then(|b| b.cpus.as_deref())
                .and_then(parse_cpu_units);
            cpu += reservation_cpu.or(limit_cpu).unwrap_or(0);

            let limit_memory = resources
                .limits
                .as_ref()
                .and_then(|b| b.memory.as_deref())
                .and_then(parse_memory_mib);
            let reservation_memory = resources
                .reservations
                .as_ref()
                .and_then(|b| b.memory.as_deref())
                .and_then(parse_memory_mib);
            memory += limit_memory.or(reservation_memory).unwrap_or(0);
        }
    }

    if cpu == 0 {
        cpu = 256;
    }
    if memory == 0 {
        memory = 512;
    }

    if launch.mode.is_some_and(LaunchMode::is_serverless) {
        let Some((rounded_cpu, rounded_memory)) = round_to_fargate(cpu, memory) else {
            return Err(StacksmithError::Synth(SynthError::ComputeOutOfBounds {
                family: family.to_string(),
                cpu,
                memory,
            }));
        };
        if rounded_cpu != cpu || rounded_memory != memory {
            debug!(
                "{family} - Rounded task sizing from {cpu}/{memory} to \
                 {rounded_cpu}/{rounded_memory} for serverless placement"
            );
        }
        return Ok((rounded_cpu, rounded_memory));
    }

    Ok((cpu, memory))
}

/// Parses a compose `cpus` string (fractional vCPUs) into CPU units.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_cpu_units(value: &str) -> Option<u32> {
    let vcpus = value.trim().parse::<f64>().ok()?;
    if vcpus <= 0.0 {
        return None;
    }
    Some((vcpus * 1024.0).round() as u32)
}

/// Parses a compose memory string (`512M`, `2G`, `1024` bytes) into MiB.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_memory_mib(value: &str) -> Option<u32> {
    let value = value.trim();
    let (digits, multiplier_to_mib) = match value.chars().last()? {
        'k' | 'K' => (&value[..value.len() - 1], 1.0 / 1024.0),
        'm' | 'M' => (&value[..value.len() - 1], 1.0),
        'g' | 'G' => (&value[..value.len() - 1], 1024.0),
        c if c.is_ascii_digit() => (value, 1.0 / (1024.0 * 1024.0)),
        _ => return None,
    };
    let amount = digits.parse::<f64>().ok()?;
    if amount <= 0.0 {
        return None;
    }
    Some((amount * multiplier_to_mib).ceil() as u32)
}

/// Rounds a cpu/memory requirement up to the smallest valid serverless
/// combination.
fn round_to_fargate(cpu: u32, memory: u32) -> Option<(u32, u32)> {
    for (valid_cpu, memory_choices) in FARGATE_COMBINATIONS {
        if *valid_cpu < cpu {
            continue;
        }
        if let Some(valid_memory) = memory_choices.iter().find(|choice| **choice >= memory) {
            return Some((*valid_cpu, *valid_memory));
        }
    }
    None
}

/// Resolves the runtime platform declarations of a family.
fn resolve_platform(
    family: &str,
    members: &[(&str, &ServiceSpec)],
) -> Result<(Option<CpuArchitecture>, Option<OsFamily>)> {
    let mut architecture: Option<CpuArchitecture> = None;
    let mut os: Option<OsFamily> = None;
    for (_, service) in members {
        let Some(ext) = service.ecs_ext.as_ref() else {
            continue;
        };
        if let Some(declared) = ext.cpu_architecture {
            match architecture {
                None => architecture = Some(declared),
                Some(existing) if existing != declared => {
                    return Err(StacksmithError::Synth(SynthError::ConflictingPlatform {
                        family: family.to_string(),
                        detail: format!("{} vs {}", existing.as_str(), declared.as_str()),
                    }));
                }
                Some(_) => {}
            }
        }
        if let Some(declared) = ext.os_family {
            match os {
                None => os = Some(declared),
                Some(existing) if existing != declared => {
                    return Err(StacksmithError::Synth(SynthError::ConflictingPlatform {
                        family: family.to_string(),
                        detail: format!("{} vs {}", existing.as_str(), declared.as_str()),
                    }));
                }
                Some(_) => {}
            }
        }
    }
    Ok((architecture, os))
}

/// Composes every family of a document, in declaration order.
///
/// # Errors
///
/// Returns the first composition error; synthesis for the affected unit
/// is aborted, not retried.
pub fn compose_families(
    document: &ComposeDocument,
    cluster: &ClusterDescriptor,
) -> Result<IndexMap<String, TaskFamily>> {
    let mut families = IndexMap::new();
    for family_name in document.family_names() {
        let members = document.services_in_family(&family_name);
        let family = TaskFamily::compose(&family_name, &members, cluster)?;
        families.insert(family_name, family);
    }
    Ok(families)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{ComposeParser, TelemetrySpec};

    fn cluster() -> ClusterDescriptor {
        ClusterDescriptor {
            name: String::from("test"),
            capacity_providers: vec![String::from("FARGATE"), String::from("FARGATE_SPOT")],
            default_strategy_providers: vec![String::from("FARGATE")],
            platform_override: None,
        }
    }

    fn parse(yaml: &str) -> ComposeDocument {
        ComposeParser::new().parse_yaml(yaml).unwrap()
    }

    #[test]
    fn test_container_ordering_dependencies_first() {
        let doc = parse(
            r"
services:
  web:
    image: web:1
    depends_on:
      - api
  api:
    image: api:1
    depends_on:
      - db
  db:
    image: db:1
",
        );
        // All three are separate families by default; regroup manually.
        let all: Vec<(&str, &ServiceSpec)> = doc
            .services
            .iter()
            .map(|(name, spec)| (name.as_str(), spec))
            .collect();
        let ordered = order_services("app", &all).unwrap();
        let names: Vec<&str> = ordered.iter().map(|svc| svc.name.as_str()).collect();
        assert_eq!(names, vec!["db", "api", "web"]);
    }

    #[test]
    fn test_container_ordering_detects_cycles() {
        let doc = parse(
            r"
services:
  a:
    image: a:1
    depends_on:
      - b
  b:
    image: b:1
    depends_on:
      - a
",
        );
        let all: Vec<(&str, &ServiceSpec)> = doc
            .services
            .iter()
            .map(|(name, spec)| (name.as_str(), spec))
            .collect();
        let result = order_services("app", &all);
        assert!(matches!(
            result,
            Err(StacksmithError::Synth(SynthError::CircularDependency { .. }))
        ));
    }

    #[test]
    fn test_ordering_is_stable_for_independent_services() {
        let doc = parse(
            r"
services:
  zeta:
    image: z:1
  alpha:
    image: a:1
",
        );
        let all: Vec<(&str, &ServiceSpec)> = doc
            .services
            .iter()
            .map(|(name, spec)| (name.as_str(), spec))
            .collect();
        let ordered = order_services("app", &all).unwrap();
        let names: Vec<&str> = ordered.iter().map(|svc| svc.name.as_str()).collect();
        // Declaration order, not alphabetical.
        assert_eq!(names, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_sidecar_injection_is_idempotent() {
        let doc = parse("services:\n  web:\n    image: web:1\n");
        let members = doc.services_in_family("web");
        let mut family = TaskFamily::compose("web", &members, &cluster()).unwrap();

        assert!(family.add_sidecar(SIDECAR_TRACING, SIDECAR_TRACING_IMAGE));
        assert!(!family.add_sidecar(SIDECAR_TRACING, SIDECAR_TRACING_IMAGE));
        assert_eq!(family.sidecars.len(), 1);
    }

    #[test]
    fn test_telemetry_requests_inject_sidecars() {
        let mut doc = parse("services:\n  web:\n    image: web:1\n");
        doc.services["web"].telemetry = Some(TelemetrySpec {
            tracing: true,
            metrics: false,
            log_routing: true,
        });
        let members = doc.services_in_family("web");
        let family = TaskFamily::compose("web", &members, &cluster()).unwrap();
        let names: Vec<&str> = family.sidecars.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![SIDECAR_TRACING, SIDECAR_LOG_ROUTER]);
        // Side-cars are never essential.
        assert!(family.sidecars.iter().all(|s| !s.spec.essential));
    }

    #[test]
    fn test_ephemeral_storage_below_free_tier_omitted() {
        let doc = parse(
            r"
services:
  web:
    image: web:1
    x-ecs:
      ephemeral_storage_gb: 20
",
        );
        let members = doc.services_in_family("web");
        let family = TaskFamily::compose("web", &members, &cluster()).unwrap();
        assert_eq!(family.ephemeral_storage_gib, None);
    }

    #[test]
    fn test_ephemeral_storage_max_across_services() {
        let doc = parse(
            r"
services:
  web:
    image: web:1
    deploy:
      labels:
        ecs.task.family: app
    x-ecs:
      ephemeral_storage_gb: 25
  worker:
    image: worker:1
    deploy:
      labels:
        ecs.task.family: app
    x-ecs:
      ephemeral_storage_gb: 50
",
        );
        let members = doc.services_in_family("app");
        let family = TaskFamily::compose("app", &members, &cluster()).unwrap();
        assert_eq!(family.ephemeral_storage_gib, Some(50));
    }

    #[test]
    fn test_fargate_rounding() {
        assert_eq!(round_to_fargate(200, 400), Some((256, 512)));
        assert_eq!(round_to_fargate(300, 1024), Some((512, 1024)));
        assert_eq!(round_to_fargate(1024, 9000), Some((2048, 9216)));
        assert_eq!(round_to_fargate(8192, 1024), None);
    }

    #[test]
    fn test_compute_sizing_sums_members() {
        let doc = parse(
            r#"
services:
  web:
    image: web:1
    deploy:
      labels:
        ecs.task.family: app
      resources:
        reservations:
          cpus: "0.25"
          memory: 512M
  worker:
    image: worker:1
    deploy:
      labels:
        ecs.task.family: app
      resources:
        limits:
          cpus: "0.5"
          memory: 1G
"#,
        );
        let members = doc.services_in_family("app");
        let family = TaskFamily::compose("app", &members, &cluster()).unwrap();
        // 0.25 + 0.5 vCPU = 768 units, rounded up to 1024 for serverless;
        // 512M + 1G = 1536MiB rounded up to 2048.
        assert_eq!(family.cpu, 1024);
        assert_eq!(family.memory, 2048);
    }

    #[test]
    fn test_conflicting_architectures_fatal() {
        let doc = parse(
            r"
services:
  web:
    image: web:1
    deploy:
      labels:
        ecs.task.family: app
    x-ecs:
      cpu_architecture: ARM64
  worker:
    image: worker:1
    deploy:
      labels:
        ecs.task.family: app
    x-ecs:
      cpu_architecture: X86_64
",
        );
        let members = doc.services_in_family("app");
        assert!(matches!(
            TaskFamily::compose("app", &members, &cluster()),
            Err(StacksmithError::Synth(SynthError::ConflictingPlatform { .. }))
        ));
    }

    #[test]
    fn test_exposed_targets_per_service_port() {
        let doc = parse(
            r#"
services:
  web:
    image: web:1
    ports:
      - "80"
      - "443"
"#,
        );
        let members = doc.services_in_family("web");
        let family = TaskFamily::compose("web", &members, &cluster()).unwrap();
        assert_eq!(family.exposed_targets.len(), 2);
        assert_eq!(family.exposed_targets[0].container, "web");
        assert_eq!(family.exposed_targets[0].port, 80);
    }

    #[test]
    fn test_emit_task_resources_shape() {
        let doc = parse(
            r#"
services:
  web:
    image: web:1
    ports:
      - "80"
    x-network:
      ingress:
        myself: true
"#,
        );
        let members = doc.services_in_family("web");
        let family = TaskFamily::compose("web", &members, &cluster()).unwrap();
        let mut graph = ResourceGraph::new();
        family.emit_task_resources(&mut graph);

        assert!(graph.contains("webLogGroup"));
        assert!(graph.contains("webTaskRole"));
        assert!(graph.contains("webExecRole"));
        assert!(graph.contains("webSg"));
        assert!(graph.contains("webTaskDefinition"));
        assert!(graph.contains("AllowingInterCommunicationPort80Tcpweb"));

        let task = graph.get("webTaskDefinition").unwrap();
        assert_eq!(task.properties["NetworkMode"], "awsvpc");
        assert!(task.properties.get("EphemeralStorage").is_none());
    }

    #[test]
    fn test_env_and_secret_ordering_in_container() {
        let doc = parse(
            r"
services:
  web:
    image: web:1
    environment:
      ZETA: z
      ALPHA: a
      DB_PASSWORD: plaintext
    secrets:
      - db_password
secrets:
  db_password:
    name: prod/db
",
        );
        let mut doc_fixed = doc.clone();
        // Rename the secret target so it collides with the env var.
        doc_fixed.services["web"].secrets[0].target = Some(String::from("DB_PASSWORD"));
        let members_fixed: Vec<(&str, &ServiceSpec)> = doc_fixed
            .services
            .iter()
            .map(|(name, spec)| (name.as_str(), spec))
            .collect();

        let family = TaskFamily::compose("web", &members_fixed, &cluster()).unwrap();
        let mut graph = ResourceGraph::new();
        family.emit_task_resources(&mut graph);
        let task = graph.get("webTaskDefinition").unwrap();
        let container = &task.properties["ContainerDefinitions"][0];

        let env = container["Environment"].as_array().unwrap();
        let names: Vec<&str> = env.iter().map(|e| e["Name"].as_str().unwrap()).collect();
        // Sorted, and the colliding plain value is gone.
        assert_eq!(names, vec!["ALPHA", "ZETA"]);

        let secrets = container["Secrets"].as_array().unwrap();
        assert_eq!(secrets[0]["Name"], "DB_PASSWORD");
    }
}
