//! The synthesis context and two-phase pipeline.
//!
//! A [`SynthContext`] is the single registry owning every composed family
//! for one synthesis run; cross-references are logical identifiers
//! resolved through the registry, never embedded ownership. Phase 1
//! composes every family in declaration order; phase 2 resolves
//! inter-family references and synthesizes the dependent resources
//! (listener rules, load balancer ingress, scheduled scaling).

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::compose::ComposeDocument;
use crate::error::Result;
use crate::graph::ResourceGraph;

use super::family::{compose_families, TaskFamily};
use super::launch::ClusterDescriptor;
use super::listener::{resolve_load_balancers, ServiceTargetBinding};
use super::naming::UniqueNamer;

/// Per-run synthesis state: the family registry and the output graph.
#[derive(Debug)]
pub struct SynthContext {
    /// Composed families, keyed by family name, in declaration order.
    pub families: IndexMap<String, TaskFamily>,
    /// The output resource graph.
    pub graph: ResourceGraph,
    /// Resolved service-to-target-group bindings.
    pub bindings: Vec<ServiceTargetBinding>,
}

/// The synthesis engine.
///
/// Synthesis is single-threaded and deterministic: resource ordering is
/// fully determined by declaration order and the merge algorithms, and
/// synthesized names and priorities are stable for a fixed seed.
#[derive(Debug, Default)]
pub struct Synthesizer {
    seed: Option<u64>,
}

impl Synthesizer {
    /// Creates a synthesizer with a random seed.
    #[must_use]
    pub const fn new() -> Self {
        Self { seed: None }
    }

    /// Pins the seed used for synthesized names and rule priorities.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Runs the full two-phase synthesis of a document.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error encountered; synthesis for
    /// the affected unit aborts and is never retried.
    pub fn synthesize(
        &self,
        document: &ComposeDocument,
        cluster: &ClusterDescriptor,
    ) -> Result<SynthContext> {
        let mut namer = self
            .seed
            .map_or_else(UniqueNamer::from_entropy, UniqueNamer::with_seed);

        let mut graph = ResourceGraph::new();
        graph.tags = document.tags.clone();
        graph.add_parameter("ClusterName", "String", Some(cluster.name.clone()));
        graph.add_parameter("VpcId", "AWS::EC2::VPC::Id", None);
        graph.add_parameter("AppSubnets", "List<AWS::EC2::Subnet::Id>", None);

        // Phase 1: compose every family in declaration order.
        let families = compose_families(document, cluster)?;
        info!("Composed {} families", families.len());
        for family in families.values() {
            family.emit_task_resources(&mut graph);
        }

        // Phase 2: resolve inter-family references and synthesize the
        // dependent resources.
        let bindings = resolve_load_balancers(document, &families, &mut graph, &mut namer)?;
        debug!("Resolved {} listener target bindings", bindings.len());

        for family in families.values() {
            let family_bindings: Vec<ServiceTargetBinding> = bindings
                .iter()
                .filter(|binding| binding.family == family.name)
                .cloned()
                .collect();
            family.emit_service_resource(&mut graph, &family_bindings);
            family.emit_scaling_resources(&mut graph, &mut namer);
        }

        info!("Synthesized {} resources", graph.len());
        Ok(SynthContext {
            families,
            graph,
            bindings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::ComposeParser;
    use crate::graph::{TemplateFormat, TemplateRenderer};

    fn cluster() -> ClusterDescriptor {
        ClusterDescriptor {
            name: String::from("test"),
            capacity_providers: vec![String::from("FARGATE"), String::from("FARGATE_SPOT")],
            default_strategy_providers: vec![String::from("FARGATE")],
            platform_override: None,
        }
    }

    const FULL_DOC: &str = r#"
services:
  web:
    image: ghcr.io/acme/web:1.4
    ports:
      - "80"
    depends_on:
      - sync
    deploy:
      labels:
        ecs.task.family: frontend
    x-network:
      ingress:
        myself: true
    x-scaling:
      range: "2-6"
      target_scaling:
        cpu_target: 70
  sync:
    image: ghcr.io/acme/sync:1.4
    essential: false
    deploy:
      labels:
        ecs.task.family: frontend
  api:
    image: ghcr.io/acme/api:2.0
    ports:
      - "8080"

x-tags:
  team: core

x-elbv2:
  public:
    type: alb
    scheme: internet-facing
    listeners:
      - port: 80
        protocol: HTTP
        targets:
          - name: frontend:web:80
            access: /
          - name: api:api:8080
            access: /api
"#;

    #[test]
    fn test_full_synthesis_produces_wired_graph() {
        let doc = ComposeParser::new().parse_yaml(FULL_DOC).unwrap();
        let context = Synthesizer::new()
            .with_seed(3)
            .synthesize(&doc, &cluster())
            .unwrap();

        assert_eq!(context.families.len(), 2);
        assert!(context.graph.contains("frontendTaskDefinition"));
        assert!(context.graph.contains("frontendService"));
        assert!(context.graph.contains("apiService"));
        assert!(context.graph.contains("LbpublicListener80"));
        assert!(context.graph.contains("Tgfrontendweb80"));
        assert!(context.graph.contains("frontendScalableTarget"));

        // The frontend service is wired to its target group.
        let service = context.graph.get("frontendService").unwrap();
        let lbs = service.properties["LoadBalancers"].as_array().unwrap();
        assert_eq!(lbs[0]["ContainerName"], "web");
        assert_eq!(lbs[0]["ContainerPort"], 80);

        // Container ordering: sync precedes its dependent web.
        let task = context.graph.get("frontendTaskDefinition").unwrap();
        let containers = task.properties["ContainerDefinitions"].as_array().unwrap();
        let names: Vec<&str> = containers
            .iter()
            .map(|c| c["Name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["sync", "web"]);
    }

    #[test]
    fn test_synthesis_is_deterministic_for_fixed_seed() {
        let doc = ComposeParser::new().parse_yaml(FULL_DOC).unwrap();
        let synthesize = || {
            let context = Synthesizer::new()
                .with_seed(99)
                .synthesize(&doc, &cluster())
                .unwrap();
            TemplateRenderer::new()
                .render(&context.graph, TemplateFormat::Json)
                .unwrap()
        };
        assert_eq!(synthesize(), synthesize());
    }

    #[test]
    fn test_different_seeds_change_only_synthesized_values() {
        let doc = ComposeParser::new().parse_yaml(FULL_DOC).unwrap();
        let a = Synthesizer::new()
            .with_seed(1)
            .synthesize(&doc, &cluster())
            .unwrap();
        let b = Synthesizer::new()
            .with_seed(2)
            .synthesize(&doc, &cluster())
            .unwrap();
        // The resource set is identical; only synthesized rule
        // priorities may differ.
        let ids_a: Vec<&str> = a.graph.iter().map(|r| r.logical_id.as_str()).collect();
        let ids_b: Vec<&str> = b.graph.iter().map(|r| r.logical_id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_tags_propagate_to_rendered_template() {
        let doc = ComposeParser::new().parse_yaml(FULL_DOC).unwrap();
        let context = Synthesizer::new()
            .with_seed(3)
            .synthesize(&doc, &cluster())
            .unwrap();
        let value = TemplateRenderer::new().to_value(&context.graph);
        let tags = &value["Resources"]["frontendSg"]["Properties"]["Tags"];
        assert_eq!(tags[0]["Key"], "team");
    }
}
