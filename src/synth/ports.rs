//! Port and network merging for a family.
//!
//! Folds the per-service port lists and network attachments of a family
//! into one family-level networking configuration. There is no error
//! path: absent input yields empty structures.

use indexmap::IndexMap;

use crate::compose::{NetworkAttachment, PortSpec, ServiceSpec};

/// The merged networking configuration of a family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergedNetworking {
    /// Deduplicated family-level port list.
    pub ports: Vec<PortSpec>,
    /// Merged network attachments, last declaration winning per network.
    pub networks: IndexMap<String, NetworkAttachment>,
}

/// Merges the port lists and network attachments of the given ordered
/// service list into one family-level configuration.
///
/// Ports merge with symmetric override per `target` key: a later
/// service's declaration replaces an accumulated one with the same
/// target, other accumulated entries are kept. Ports declared at the
/// family level (`x-network.ports`) override same-key entries inherited
/// from member services.
#[must_use]
pub fn merge_family_networking(services: &[(&str, &ServiceSpec)]) -> MergedNetworking {
    let mut merged = MergedNetworking::default();

    for (_, service) in services {
        if !service.ports.is_empty() {
            merged.ports = override_by_target(&merged.ports, &service.ports);
        }
        for (network, attachment) in &service.networks.0 {
            merged.networks.insert(network.clone(), attachment.clone());
        }
    }

    // Family-level explicit declarations always win over inherited ones.
    let family_ports: Vec<PortSpec> = services
        .iter()
        .filter_map(|(_, service)| service.network_ext.as_ref())
        .flat_map(|ext| ext.ports.iter().copied())
        .collect();
    if !family_ports.is_empty() {
        merged.ports = override_by_target(&merged.ports, &family_ports);
    }

    merged.ports = dedupe_ports(&merged.ports);
    merged
}

/// Applies one incoming port set over the accumulated set.
///
/// Incoming entries come first in the result; accumulated entries whose
/// target is not redeclared are kept after them.
fn override_by_target(accumulated: &[PortSpec], incoming: &[PortSpec]) -> Vec<PortSpec> {
    let incoming_targets: Vec<u16> = incoming.iter().map(|port| port.target).collect();
    let mut result: Vec<PortSpec> = incoming.to_vec();
    for port in accumulated {
        if !incoming_targets.contains(&port.target) {
            result.push(*port);
        }
    }
    result
}

/// Removes duplicate entries by `(target, protocol)` key, keeping the
/// first occurrence.
fn dedupe_ports(ports: &[PortSpec]) -> Vec<PortSpec> {
    let mut seen = std::collections::HashSet::new();
    ports
        .iter()
        .filter(|port| seen.insert((port.target, port.protocol)))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{NetworkExtSpec, PortProtocol, ServiceNetworks};

    fn service_with_ports(ports: Vec<PortSpec>) -> ServiceSpec {
        ServiceSpec {
            image: String::from("img"),
            ports,
            ..ServiceSpec::default()
        }
    }

    fn port(target: u16, published: Option<u16>) -> PortSpec {
        PortSpec {
            target,
            published,
            protocol: PortProtocol::Tcp,
        }
    }

    #[test]
    fn test_later_service_overrides_same_target() {
        // Service A declares 80, service B (declared after A) declares
        // 80 and 443: the merged set carries B's values for both keys.
        let a = service_with_ports(vec![port(80, Some(8080))]);
        let b = service_with_ports(vec![port(80, Some(9090)), port(443, None)]);
        let merged = merge_family_networking(&[("a", &a), ("b", &b)]);

        assert_eq!(merged.ports.len(), 2);
        let http = merged.ports.iter().find(|p| p.target == 80).unwrap();
        assert_eq!(http.published, Some(9090));
        assert!(merged.ports.iter().any(|p| p.target == 443));
    }

    #[test]
    fn test_distinct_targets_are_kept() {
        let a = service_with_ports(vec![port(80, None)]);
        let b = service_with_ports(vec![port(443, None)]);
        let merged = merge_family_networking(&[("a", &a), ("b", &b)]);
        assert_eq!(merged.ports.len(), 2);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let a = service_with_ports(vec![port(80, Some(8080))]);
        let b = service_with_ports(vec![port(80, None), port(443, None)]);
        let services: Vec<(&str, &ServiceSpec)> = vec![("a", &a), ("b", &b)];

        let first = merge_family_networking(&services);
        let second = merge_family_networking(&services);
        assert_eq!(first, second);
    }

    #[test]
    fn test_family_level_ports_override_service_ports() {
        let mut a = service_with_ports(vec![port(80, Some(8080))]);
        a.network_ext = Some(NetworkExtSpec {
            ports: vec![port(80, Some(80))],
            ..NetworkExtSpec::default()
        });
        let merged = merge_family_networking(&[("a", &a)]);
        assert_eq!(merged.ports.len(), 1);
        assert_eq!(merged.ports[0].published, Some(80));
    }

    #[test]
    fn test_networks_union_last_wins() {
        let mut a = service_with_ports(vec![]);
        a.networks = ServiceNetworks(
            [(String::from("backend"), NetworkAttachment::default())]
                .into_iter()
                .collect(),
        );
        let mut b = service_with_ports(vec![]);
        b.networks = ServiceNetworks(
            [
                (
                    String::from("backend"),
                    NetworkAttachment {
                        aliases: vec![String::from("api")],
                    },
                ),
                (String::from("frontend"), NetworkAttachment::default()),
            ]
            .into_iter()
            .collect(),
        );

        let merged = merge_family_networking(&[("a", &a), ("b", &b)]);
        assert_eq!(merged.networks.len(), 2);
        assert_eq!(merged.networks["backend"].aliases, vec!["api"]);
    }

    #[test]
    fn test_empty_input_yields_empty_structures() {
        let merged = merge_family_networking(&[]);
        assert!(merged.ports.is_empty());
        assert!(merged.networks.is_empty());
    }
}
