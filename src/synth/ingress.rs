//! Security-group ingress synthesis for a family.
//!
//! Derives intra-family and load-balancer-to-family firewall rules from
//! the merged port set. Rule names are deterministic functions of
//! `(source, family, port, protocol)`; emission through the graph is
//! idempotent, so a rule that already exists is never re-emitted.

use serde_json::json;

use crate::compose::{ExtSourceSpec, PortSpec};
use crate::graph::{ref_to, Resource, ResourceGraph, ResourceKind};

/// Emits one self-referencing ingress rule per distinct merged port,
/// allowing members of the family to reach each other.
pub fn add_self_ingress(
    graph: &mut ResourceGraph,
    family_logical: &str,
    sg_logical_id: &str,
    ports: &[PortSpec],
) {
    for port in ports {
        let target_port = port.exposed();
        let name = format!(
            "AllowingInterCommunicationPort{target_port}{}{family_logical}",
            camel(port.protocol.as_str())
        );
        graph.add(Resource::new(
            name,
            ResourceKind::SecurityGroupIngress,
            json!({
                "FromPort": target_port,
                "ToPort": target_port,
                "IpProtocol": port.protocol.as_str(),
                "GroupId": get_group_id(sg_logical_id),
                "SourceSecurityGroupId": get_group_id(sg_logical_id),
                "Description": format!("Internal traffic on {target_port}/{}", port.protocol.as_str()),
            }),
        ));
    }
}

/// Emits one ingress rule per merged port scoped to a load balancer's
/// security group.
pub fn add_lb_ingress(
    graph: &mut ResourceGraph,
    lb_logical: &str,
    lb_sg_logical_id: &str,
    family_logical: &str,
    family_sg_logical_id: &str,
    ports: &[PortSpec],
) {
    for port in ports {
        let name = format!("FromLb{lb_logical}To{family_logical}OnPort{}", port.target);
        graph.add(Resource::new(
            name,
            ResourceKind::SecurityGroupIngress,
            json!({
                "FromPort": port.target,
                "ToPort": port.target,
                "IpProtocol": port.protocol.as_str(),
                "GroupId": get_group_id(family_sg_logical_id),
                "SourceSecurityGroupId": get_group_id(lb_sg_logical_id),
                "Description": format!(
                    "From load balancer {lb_logical} to {family_logical} on port {}",
                    port.target
                ),
            }),
        ));
    }
}

/// Emits ingress rules for declared external CIDR sources.
pub fn add_ext_sources_ingress(
    graph: &mut ResourceGraph,
    family_logical: &str,
    sg_logical_id: &str,
    sources: &[ExtSourceSpec],
    ports: &[PortSpec],
) {
    for source in sources {
        let source_id: String = source
            .ipv4
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .collect();
        for port in ports {
            let name = format!("From{source_id}To{family_logical}OnPort{}", port.target);
            let description = source.description.clone().unwrap_or_else(|| {
                format!("From {} to {family_logical} on port {}", source.ipv4, port.target)
            });
            graph.add(Resource::new(
                name,
                ResourceKind::SecurityGroupIngress,
                json!({
                    "FromPort": port.target,
                    "ToPort": port.target,
                    "IpProtocol": port.protocol.as_str(),
                    "GroupId": get_group_id(sg_logical_id),
                    "CidrIp": source.ipv4,
                    "Description": description,
                }),
            ));
        }
    }
}

/// `GroupId` value for a security group resource in the same graph.
fn get_group_id(sg_logical_id: &str) -> serde_json::Value {
    ref_to(sg_logical_id)
}

/// Uppercases the first letter of a protocol name.
fn camel(protocol: &str) -> String {
    let mut chars = protocol.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_ascii_uppercase().to_string() + chars.as_str()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::PortProtocol;

    fn ports() -> Vec<PortSpec> {
        vec![
            PortSpec::new(80, PortProtocol::Tcp),
            PortSpec::new(53, PortProtocol::Udp),
        ]
    }

    #[test]
    fn test_self_ingress_one_rule_per_port() {
        let mut graph = ResourceGraph::new();
        add_self_ingress(&mut graph, "App", "AppSg", &ports());
        assert_eq!(graph.len(), 2);
        assert!(graph.contains("AllowingInterCommunicationPort80TcpApp"));
        assert!(graph.contains("AllowingInterCommunicationPort53UdpApp"));
    }

    #[test]
    fn test_self_ingress_is_idempotent() {
        let mut graph = ResourceGraph::new();
        add_self_ingress(&mut graph, "App", "AppSg", &ports());
        add_self_ingress(&mut graph, "App", "AppSg", &ports());
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_lb_ingress_scoped_to_lb_group() {
        let mut graph = ResourceGraph::new();
        add_lb_ingress(
            &mut graph,
            "Public",
            "PublicSg",
            "App",
            "AppSg",
            &[PortSpec::new(80, PortProtocol::Tcp)],
        );
        let rule = graph.get("FromLbPublicToAppOnPort80").unwrap();
        assert_eq!(rule.properties["SourceSecurityGroupId"]["Ref"], "PublicSg");
        assert_eq!(rule.properties["GroupId"]["Ref"], "AppSg");
    }

    #[test]
    fn test_ext_sources_use_cidr() {
        let mut graph = ResourceGraph::new();
        add_ext_sources_ingress(
            &mut graph,
            "App",
            "AppSg",
            &[ExtSourceSpec {
                ipv4: String::from("10.0.0.0/8"),
                description: None,
            }],
            &[PortSpec::new(443, PortProtocol::Tcp)],
        );
        assert_eq!(graph.len(), 1);
        let rule = graph.iter().next().unwrap();
        assert_eq!(rule.properties["CidrIp"], "10.0.0.0/8");
    }
}
