//! Load balancer target resolution and listener rule synthesis.
//!
//! Runs after every family has been composed: target references of the
//! form `family:container[:port]` are resolved against the exposed
//! targets of all families, default actions are selected by precedence,
//! and conditional routing rules receive collision-checked priorities.

use indexmap::IndexMap;
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::compose::{
    CognitoAuthSpec, ComposeDocument, HealthCheckSpec, LbScheme, LbType, ListenerProtocol,
    ListenerSpec, ListenerTargetSpec, OidcAuthSpec, RuleConditionSpec,
};
use crate::error::{Result, StacksmithError, SynthError};
use crate::graph::{logical_id, ref_to, Resource, ResourceGraph, ResourceKind};

use super::family::TaskFamily;
use super::ingress::add_lb_ingress;
use super::naming::{PriorityAllocator, UniqueNamer};

/// A parsed `family:container[:port]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRef {
    /// Family name.
    pub family: String,
    /// Container name.
    pub container: String,
    /// Optional container port.
    pub port: Option<u16>,
}

/// Parses a target reference string.
///
/// Returns `None` when the string does not match
/// `family:container[:port]`.
#[must_use]
pub fn parse_target_reference(value: &str) -> Option<TargetRef> {
    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() != 2 && parts.len() != 3 {
        return None;
    }
    if !is_name(parts[0]) || !is_name(parts[1]) {
        return None;
    }
    let port = match parts.get(2) {
        Some(port) => {
            if port.len() > 5 {
                return None;
            }
            Some(port.parse::<u16>().ok()?)
        }
        None => None,
    };
    Some(TargetRef {
        family: parts[0].to_string(),
        container: parts[1].to_string(),
        port,
    })
}

fn is_name(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// A resolved service-to-target-group binding, consumed by the family
/// composer when the service resource is emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTargetBinding {
    /// Family name.
    pub family: String,
    /// Container name forwarded to.
    pub container: String,
    /// Container port forwarded to.
    pub port: u16,
    /// Logical id of the synthesized target group.
    pub target_group_id: String,
}

/// One listener target after resolution.
#[derive(Debug)]
struct ResolvedTarget<'a> {
    spec: &'a ListenerTargetSpec,
    binding: ServiceTargetBinding,
}

impl ResolvedTarget<'_> {
    /// Whether the target declares no routing condition at all.
    fn has_no_condition(&self) -> bool {
        self.spec.access.is_none() && self.spec.conditions.is_empty()
    }

    fn is_root_access(&self) -> bool {
        self.spec.access.as_deref() == Some("/")
    }
}

/// Resolves every load balancer of the document, emitting load balancer,
/// listener, target group, rule, and ingress resources into the graph.
///
/// Returns the service bindings, for the families to wire into their
/// service resources.
///
/// # Errors
///
/// Returns a configuration error on unresolved or ambiguous target
/// references, authentication on plaintext listeners, and certificate
/// misuse. These abort synthesis.
pub fn resolve_load_balancers(
    document: &ComposeDocument,
    families: &IndexMap<String, TaskFamily>,
    graph: &mut ResourceGraph,
    namer: &mut UniqueNamer,
) -> Result<Vec<ServiceTargetBinding>> {
    let mut bindings: Vec<ServiceTargetBinding> = Vec::new();

    for (lb_name, lb) in &document.load_balancers {
        let lb_logical = format!("Lb{}", logical_id(lb_name));
        let is_alb = lb.lb_type == LbType::Alb;

        let lb_sg_id = format!("{lb_logical}Sg");
        if is_alb {
            emit_lb_security_group(graph, lb_name, lb, &lb_logical, &lb_sg_id);
        }

        emit_load_balancer(graph, lb, &lb_logical, &lb_sg_id, is_alb);

        // Families reached through this load balancer, for ingress rules.
        let mut reached_families: HashSet<String> = HashSet::new();

        for listener in &lb.listeners {
            let listener_name = format!("{lb_name}:{}", listener.port);
            let listener_logical = format!("{lb_logical}Listener{}", listener.port);
            let protocol = effective_protocol(&listener_name, listener)?;

            if lb.lb_type == LbType::Nlb && listener.targets.len() > 1 {
                return Err(StacksmithError::Synth(SynthError::NlbMultipleTargets {
                    listener: listener_name,
                }));
            }

            validate_duplicate_targets(&listener_name, listener)?;

            let resolved =
                resolve_targets(&listener_name, listener, lb.lb_type, families, graph)?;
            for target in &resolved {
                reached_families.insert(target.binding.family.clone());
                if !bindings.contains(&target.binding) {
                    bindings.push(target.binding.clone());
                }
            }

            let (default_actions, rules) =
                define_default_actions(&listener_name, listener, protocol, &resolved)?;

            let mut properties = json!({
                "LoadBalancerArn": ref_to(&lb_logical),
                "Port": listener.port,
                "Protocol": protocol.as_str(),
                "DefaultActions": default_actions,
            });
            if let Some(policy) = &listener.ssl_policy {
                properties["SslPolicy"] = json!(policy);
            }
            if let Some((first, extra)) = listener.certificates.split_first() {
                properties["Certificates"] = json!([{ "CertificateArn": first }]);
                // A listener certificate attachment takes exactly one
                // certificate, so extras get one resource each.
                for (i, certificate) in extra.iter().enumerate() {
                    graph.add(Resource::new(
                        format!("{listener_logical}ExtraCert{i}"),
                        ResourceKind::ListenerCertificate,
                        json!({
                            "ListenerArn": ref_to(&listener_logical),
                            "Certificates": [{ "CertificateArn": certificate }],
                        }),
                    ));
                }
            }

            graph.add(Resource::new(
                &listener_logical,
                ResourceKind::Listener,
                properties,
            ));

            if !rules.is_empty() {
                if is_alb {
                    emit_listener_rules(
                        graph,
                        namer,
                        &listener_name,
                        &listener_logical,
                        protocol,
                        &rules,
                    )?;
                } else {
                    warn!("{listener_name} - Load balancer is NLB. Can't assign listener rules.");
                }
            }
        }

        if is_alb {
            for family_name in &reached_families {
                if let Some(family) = families.get(family_name) {
                    add_lb_ingress(
                        graph,
                        &lb_logical,
                        &lb_sg_id,
                        &family.logical_name,
                        &family.sg_logical_id(),
                        &family.networking.ports,
                    );
                }
            }
        } else {
            debug!("{lb_name} - NLB carries no security group, skipping ingress rules");
        }
    }

    Ok(bindings)
}

/// Emits the security group of an application load balancer, with public
/// ingress per listener port when the scheme is internet-facing.
fn emit_lb_security_group(
    graph: &mut ResourceGraph,
    lb_name: &str,
    lb: &crate::compose::LoadBalancerSpec,
    lb_logical: &str,
    lb_sg_id: &str,
) {
    graph.add(Resource::new(
        lb_sg_id,
        ResourceKind::SecurityGroup,
        json!({
            "GroupDescription": format!("Security group for load balancer {lb_name}"),
            "VpcId": ref_to("VpcId"),
        }),
    ));
    if lb.scheme == LbScheme::InternetFacing {
        for listener in &lb.listeners {
            graph.add(Resource::new(
                format!("ToLb{lb_logical}OnPort{}", listener.port),
                ResourceKind::SecurityGroupIngress,
                json!({
                    "FromPort": listener.port,
                    "ToPort": listener.port,
                    "IpProtocol": "tcp",
                    "GroupId": ref_to(lb_sg_id),
                    "CidrIp": "0.0.0.0/0",
                    "Description": format!("Public ingress on port {}", listener.port),
                }),
            ));
        }
    }
}

/// Emits the load balancer resource.
fn emit_load_balancer(
    graph: &mut ResourceGraph,
    lb: &crate::compose::LoadBalancerSpec,
    lb_logical: &str,
    lb_sg_id: &str,
    is_alb: bool,
) {
    let scheme = match lb.scheme {
        LbScheme::Internal => "internal",
        LbScheme::InternetFacing => "internet-facing",
    };
    let subnets_parameter = if lb.scheme == LbScheme::InternetFacing {
        "PublicSubnets"
    } else {
        "AppSubnets"
    };
    graph.add_parameter(subnets_parameter, "List<AWS::EC2::Subnet::Id>", None);

    let mut properties = json!({
        "Type": if is_alb { "application" } else { "network" },
        "Scheme": scheme,
        "Subnets": ref_to(subnets_parameter),
    });
    if is_alb {
        properties["SecurityGroups"] = json!([ref_to(lb_sg_id)]);
    }
    graph.add(Resource::new(lb_logical, ResourceKind::LoadBalancer, properties));
}

/// Computes the effective listener protocol, upgrading plaintext
/// listeners that carry certificates.
fn effective_protocol(
    listener_name: &str,
    listener: &ListenerSpec,
) -> Result<ListenerProtocol> {
    if listener.certificates.is_empty() {
        return Ok(listener.protocol);
    }
    match listener.protocol {
        ListenerProtocol::Http => {
            warn!(
                "{listener_name} - Protocol is HTTP but certificate(s) defined. \
                 Upgrading to HTTPS"
            );
            Ok(ListenerProtocol::Https)
        }
        ListenerProtocol::Tcp => {
            warn!("{listener_name} - Protocol is TCP but certificate defined. Changing to TLS");
            Ok(ListenerProtocol::Tls)
        }
        ListenerProtocol::Udp => Err(StacksmithError::Synth(
            SynthError::CertificateOnUdpListener {
                listener: listener_name.to_string(),
            },
        )),
        encrypted => Ok(encrypted),
    }
}

/// Rejects duplicate target names declared without an explicit port.
fn validate_duplicate_targets(listener_name: &str, listener: &ListenerSpec) -> Result<()> {
    let names: Vec<&str> = listener.targets.iter().map(|t| t.name.as_str()).collect();
    for target in &listener.targets {
        let occurrences = names.iter().filter(|name| **name == target.name).count();
        if occurrences > 1 {
            let parts = parse_target_reference(&target.name);
            if parts.is_none_or(|p| p.port.is_none()) {
                return Err(StacksmithError::Synth(SynthError::AmbiguousTarget {
                    listener: listener_name.to_string(),
                    target: target.name.clone(),
                }));
            }
        }
    }
    Ok(())
}

/// Resolves the listener targets against every family's exposed targets,
/// synthesizing target groups as needed.
fn resolve_targets<'a>(
    listener_name: &str,
    listener: &'a ListenerSpec,
    lb_type: LbType,
    families: &IndexMap<String, TaskFamily>,
    graph: &mut ResourceGraph,
) -> Result<Vec<ResolvedTarget<'a>>> {
    let mut resolved = Vec::new();

    for target in &listener.targets {
        let Some(reference) = parse_target_reference(&target.name) else {
            return Err(StacksmithError::Synth(SynthError::UnresolvedTarget {
                listener: listener_name.to_string(),
                target: target.name.clone(),
            }));
        };

        let matches: Vec<_> = families
            .values()
            .flat_map(|family| family.exposed_targets.iter())
            .filter(|exposed| {
                exposed.family == reference.family
                    && exposed.container == reference.container
                    && reference.port.is_none_or(|port| port == exposed.port)
            })
            .collect();

        let exposed = match matches.as_slice() {
            [] => {
                return Err(StacksmithError::Synth(SynthError::UnresolvedTarget {
                    listener: listener_name.to_string(),
                    target: target.name.clone(),
                }));
            }
            [single] => *single,
            multiple => {
                let distinct_ports: HashSet<u16> =
                    multiple.iter().map(|exposed| exposed.port).collect();
                if distinct_ports.len() > 1 {
                    return Err(StacksmithError::Synth(SynthError::AmbiguousTarget {
                        listener: listener_name.to_string(),
                        target: target.name.clone(),
                    }));
                }
                multiple[0]
            }
        };

        let target_group_id = format!(
            "Tg{}{}{}",
            logical_id(&exposed.family),
            logical_id(&exposed.container),
            exposed.port
        );
        emit_target_group(
            graph,
            &target_group_id,
            exposed.port,
            lb_type,
            target.health_check.as_ref(),
        );

        info!(
            "{listener_name} - Mapped {} to {}:{}:{}",
            target.name, exposed.family, exposed.container, exposed.port
        );
        resolved.push(ResolvedTarget {
            spec: target,
            binding: ServiceTargetBinding {
                family: exposed.family.clone(),
                container: exposed.container.clone(),
                port: exposed.port,
                target_group_id,
            },
        });
    }

    Ok(resolved)
}

/// Emits a target group resource; emission is idempotent per logical id.
fn emit_target_group(
    graph: &mut ResourceGraph,
    target_group_id: &str,
    port: u16,
    lb_type: LbType,
    health_check: Option<&HealthCheckSpec>,
) {
    let protocol = if lb_type == LbType::Alb { "HTTP" } else { "TCP" };
    let mut properties = json!({
        "Port": port,
        "Protocol": protocol,
        "TargetType": "ip",
        "VpcId": ref_to("VpcId"),
    });
    if let Some(check) = health_check {
        if let Some(path) = &check.path {
            properties["HealthCheckPath"] = json!(path);
        }
        if let Some(interval) = check.interval_secs {
            properties["HealthCheckIntervalSeconds"] = json!(interval);
        }
        if let Some(timeout) = check.timeout_secs {
            properties["HealthCheckTimeoutSeconds"] = json!(timeout);
        }
        if let Some(threshold) = check.healthy_threshold {
            properties["HealthyThresholdCount"] = json!(threshold);
        }
        if let Some(threshold) = check.unhealthy_threshold {
            properties["UnhealthyThresholdCount"] = json!(threshold);
        }
        if let Some(matcher) = &check.matcher {
            properties["Matcher"] = json!({ "HttpCode": matcher });
        }
    }
    graph.add(Resource::new(
        target_group_id,
        ResourceKind::TargetGroup,
        properties,
    ));
}

/// Selects the listener default actions and the targets left for
/// conditional rules, by precedence.
fn define_default_actions<'a>(
    listener_name: &str,
    listener: &ListenerSpec,
    protocol: ListenerProtocol,
    resolved: &'a [ResolvedTarget<'a>],
) -> Result<(Vec<Value>, Vec<&'a ResolvedTarget<'a>>)> {
    // 1. Explicit default actions declared on the listener.
    if !listener.default_actions.is_empty() {
        let actions = listener
            .default_actions
            .iter()
            .map(|action| match action {
                crate::compose::DefaultActionSpec::Redirect(kind) => match kind {
                    crate::compose::PredefinedAction::HttpToHttps => http_to_https_action(),
                    crate::compose::PredefinedAction::NotFound => not_found_action(),
                },
            })
            .collect();
        return Ok((actions, Vec::new()));
    }

    if resolved.is_empty() {
        warn!("{listener_name} - No actions or targets defined. Falling back to not-found.");
        return Ok((vec![not_found_action()], Vec::new()));
    }

    // 2. Exactly one target with no routing condition becomes the sole
    //    default action.
    if resolved.len() == 1 {
        if resolved[0].has_no_condition() {
            info!(
                "{listener_name} - Single unconditioned target. Setting listener default \
                 actions to the service."
            );
            return Ok((
                build_actions(listener_name, protocol, resolved[0].spec, &resolved[0].binding)?,
                Vec::new(),
            ));
        }
        return Ok((vec![not_found_action()], resolved.iter().collect()));
    }

    // 3. Exactly one target with access "/" becomes the default; the
    //    remaining targets become conditional rules.
    let root_targets: Vec<&ResolvedTarget<'_>> =
        resolved.iter().filter(|t| t.is_root_access()).collect();
    if root_targets.len() == 1 {
        let default = root_targets[0];
        let actions =
            build_actions(listener_name, protocol, default.spec, &default.binding)?;
        let rules: Vec<&ResolvedTarget<'_>> = resolved
            .iter()
            .filter(|t| !std::ptr::eq(*t, default))
            .collect();
        return Ok((actions, rules));
    }

    // 4. Nothing matches "/": every target becomes a conditional rule,
    //    the default falls back to a fixed not-found response.
    warn!("{listener_name} - No service path matches /. Defaulting to a not-found response.");
    Ok((vec![not_found_action()], resolved.iter().collect()))
}

/// Emits the conditional rules of a listener with synthesized priorities.
fn emit_listener_rules(
    graph: &mut ResourceGraph,
    namer: &mut UniqueNamer,
    listener_name: &str,
    listener_logical: &str,
    protocol: ListenerProtocol,
    rules: &[&ResolvedTarget<'_>],
) -> Result<()> {
    // A per-listener random base offset keeps synthesized priorities away
    // from user-declared ones across repeated runs; the allocator still
    // checks uniqueness explicitly and bumps on collision.
    let mut allocator = PriorityAllocator::new(namer.priority_offset());

    for (ordinal, target) in rules.iter().enumerate() {
        let priority = allocator.allocate(u32::try_from(ordinal).unwrap_or(u32::MAX));
        let conditions = rule_conditions(target.spec)?;
        let actions = build_actions(listener_name, protocol, target.spec, &target.binding)?;
        graph.add(Resource::new(
            format!(
                "{listener_logical}{}Rule{ordinal}",
                logical_id(&target.spec.name)
            ),
            ResourceKind::ListenerRule,
            json!({
                "ListenerArn": ref_to(listener_logical),
                "Priority": priority,
                "Conditions": conditions,
                "Actions": actions,
            }),
        ));
    }
    Ok(())
}

/// Builds the action list for a target: authentication first when
/// declared, then the forward action, with explicit execution order.
fn build_actions(
    listener_name: &str,
    protocol: ListenerProtocol,
    target: &ListenerTargetSpec,
    binding: &ServiceTargetBinding,
) -> Result<Vec<Value>> {
    let auth_action = auth_action(target);
    if auth_action.is_some() && !protocol.is_encrypted() {
        return Err(StacksmithError::Synth(SynthError::AuthOnPlaintextListener {
            listener: listener_name.to_string(),
        }));
    }

    let forward_order = if auth_action.is_some() { 2 } else { 1 };
    let forward = json!({
        "Type": "forward",
        "Order": forward_order,
        "ForwardConfig": {
            "TargetGroups": [{ "TargetGroupArn": ref_to(&binding.target_group_id) }]
        }
    });

    Ok(match auth_action {
        Some(auth) => vec![auth, forward],
        None => vec![forward],
    })
}

/// Builds the authentication action of a target, when declared.
fn auth_action(target: &ListenerTargetSpec) -> Option<Value> {
    if let Some(oidc) = &target.authenticate_oidc {
        return Some(oidc_action(oidc));
    }
    if let Some(cognito) = &target.authenticate_cognito {
        return Some(cognito_action(cognito));
    }
    None
}

fn oidc_action(oidc: &OidcAuthSpec) -> Value {
    let mut config = json!({
        "Issuer": oidc.issuer,
        "AuthorizationEndpoint": oidc.authorization_endpoint,
        "TokenEndpoint": oidc.token_endpoint,
        "UserInfoEndpoint": oidc.user_info_endpoint,
        "ClientId": oidc.client_id,
    });
    if let Some(secret) = &oidc.client_secret {
        config["ClientSecret"] = json!(secret);
    }
    if let Some(scope) = &oidc.scope {
        config["Scope"] = json!(scope);
    }
    json!({
        "Type": "authenticate-oidc",
        "Order": 1,
        "AuthenticateOidcConfig": config,
    })
}

fn cognito_action(cognito: &CognitoAuthSpec) -> Value {
    let mut config = json!({
        "UserPoolArn": cognito.user_pool_arn,
        "UserPoolClientId": cognito.user_pool_client_id,
        "UserPoolDomain": cognito.user_pool_domain,
    });
    if let Some(scope) = &cognito.scope {
        config["Scope"] = json!(scope);
    }
    json!({
        "Type": "authenticate-cognito",
        "Order": 1,
        "AuthenticateCognitoConfig": config,
    })
}

/// Builds the conditions of a rule from the explicit declarations or the
/// access shorthand.
fn rule_conditions(target: &ListenerTargetSpec) -> Result<Vec<Value>> {
    if !target.conditions.is_empty() {
        return Ok(target
            .conditions
            .iter()
            .flat_map(explicit_conditions)
            .collect());
    }
    if let Some(access) = &target.access {
        return access_conditions(access);
    }
    Ok(Vec::new())
}

fn explicit_conditions(condition: &RuleConditionSpec) -> Vec<Value> {
    let mut values = Vec::new();
    if !condition.host_header.is_empty() {
        values.push(json!({
            "Field": "host-header",
            "HostHeaderConfig": { "Values": condition.host_header },
        }));
    }
    if !condition.path_pattern.is_empty() {
        values.push(json!({
            "Field": "path-pattern",
            "PathPatternConfig": { "Values": condition.path_pattern },
        }));
    }
    values
}

/// Parses an access shorthand into rule conditions.
///
/// Supported: path (`/api`), domain (`app.example.com`), and
/// `domain/path` combinations.
///
/// # Errors
///
/// Returns a configuration error for any other shape.
pub fn access_conditions(access: &str) -> Result<Vec<Value>> {
    if access.starts_with('/') {
        return Ok(vec![json!({
            "Field": "path-pattern",
            "PathPatternConfig": { "Values": [access] },
        })]);
    }

    if let Some((domain, path)) = access.split_once('/') {
        if is_valid_domain(domain) && !path.is_empty() {
            return Ok(vec![
                json!({
                    "Field": "host-header",
                    "HostHeaderConfig": { "Values": [domain] },
                }),
                json!({
                    "Field": "path-pattern",
                    "PathPatternConfig": { "Values": [format!("/{path}")] },
                }),
            ]);
        }
        return Err(StacksmithError::Synth(SynthError::InvalidAccessCondition {
            value: access.to_string(),
        }));
    }

    if is_valid_domain(access) {
        return Ok(vec![json!({
            "Field": "host-header",
            "HostHeaderConfig": { "Values": [access] },
        })]);
    }

    Err(StacksmithError::Synth(SynthError::InvalidAccessCondition {
        value: access.to_string(),
    }))
}

/// Validates a domain name: dot-separated labels of alphanumerics and
/// hyphens, no label starting or ending with a hyphen.
fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 255 {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Predefined redirect from HTTP to HTTPS.
fn http_to_https_action() -> Value {
    json!({
        "Type": "redirect",
        "Order": 50000,
        "RedirectConfig": {
            "Protocol": "HTTPS",
            "Port": "443",
            "Host": "#{host}",
            "Path": "/#{path}",
            "Query": "#{query}",
            "StatusCode": "HTTP_301",
        }
    })
}

/// Fixed not-found fallback response.
fn not_found_action() -> Value {
    json!({
        "Type": "fixed-response",
        "Order": 50000,
        "FixedResponseConfig": {
            "ContentType": "application/json",
            "MessageBody": "{\"Error\": \"Not Found\"}",
            "StatusCode": "404",
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::ComposeParser;
    use crate::synth::family::compose_families;
    use crate::synth::launch::ClusterDescriptor;

    fn cluster() -> ClusterDescriptor {
        ClusterDescriptor {
            name: String::from("test"),
            capacity_providers: vec![String::from("FARGATE")],
            default_strategy_providers: vec![String::from("FARGATE")],
            platform_override: None,
        }
    }

    fn resolve(yaml: &str) -> Result<(ResourceGraph, Vec<ServiceTargetBinding>)> {
        let doc = ComposeParser::new().parse_yaml(yaml).unwrap();
        let families = compose_families(&doc, &cluster())?;
        let mut graph = ResourceGraph::new();
        for family in families.values() {
            family.emit_task_resources(&mut graph);
        }
        let mut namer = UniqueNamer::with_seed(11);
        let bindings = resolve_load_balancers(&doc, &families, &mut graph, &mut namer)?;
        Ok((graph, bindings))
    }

    #[test]
    fn test_parse_target_reference() {
        let parsed = parse_target_reference("frontend:web:80").unwrap();
        assert_eq!(parsed.family, "frontend");
        assert_eq!(parsed.container, "web");
        assert_eq!(parsed.port, Some(80));

        let parsed = parse_target_reference("backend:api").unwrap();
        assert_eq!(parsed.port, None);

        assert!(parse_target_reference("no-colon").is_none());
        assert!(parse_target_reference("a:b:notaport").is_none());
        assert!(parse_target_reference("a:b:c:d").is_none());
    }

    #[test]
    fn test_single_target_no_conditions_becomes_default() {
        // One declared target, no conditions: it becomes the sole
        // default action and zero conditional rules are emitted.
        let (graph, bindings) = resolve(
            r#"
services:
  web:
    image: web:1
    ports:
      - "80"
x-elbv2:
  public:
    type: alb
    listeners:
      - port: 80
        protocol: HTTP
        targets:
          - name: web:web:80
"#,
        )
        .unwrap();

        let listener = graph.get("LbpublicListener80").unwrap();
        let actions = listener.properties["DefaultActions"].as_array().unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0]["Type"], "forward");
        assert_eq!(bindings.len(), 1);
        assert!(!graph.iter().any(|r| r.kind == ResourceKind::ListenerRule));
    }

    #[test]
    fn test_root_access_becomes_default_others_rules() {
        // Two targets, one with access "/", one with "/api": "/" becomes
        // the default and "/api" becomes one conditional rule.
        let (graph, _) = resolve(
            r#"
services:
  web:
    image: web:1
    ports:
      - "80"
  api:
    image: api:1
    ports:
      - "8080"
x-elbv2:
  public:
    type: alb
    listeners:
      - port: 80
        protocol: HTTP
        targets:
          - name: web:web:80
            access: /
          - name: api:api:8080
            access: /api
"#,
        )
        .unwrap();

        let listener = graph.get("LbpublicListener80").unwrap();
        let actions = listener.properties["DefaultActions"].as_array().unwrap();
        assert_eq!(actions[0]["Type"], "forward");

        let rules: Vec<_> = graph
            .iter()
            .filter(|r| r.kind == ResourceKind::ListenerRule)
            .collect();
        assert_eq!(rules.len(), 1);
        let rule = rules[0];
        assert_eq!(
            rule.properties["Conditions"][0]["PathPatternConfig"]["Values"][0],
            "/api"
        );
        // Priority is offset + ordinal + 1, always above the offset.
        assert!(rule.properties["Priority"].as_u64().unwrap() >= 2);
    }

    #[test]
    fn test_no_root_access_defaults_to_not_found() {
        let (graph, _) = resolve(
            r#"
services:
  web:
    image: web:1
    ports:
      - "80"
  api:
    image: api:1
    ports:
      - "8080"
x-elbv2:
  public:
    type: alb
    listeners:
      - port: 80
        protocol: HTTP
        targets:
          - name: web:web:80
            access: /app
          - name: api:api:8080
            access: /api
"#,
        )
        .unwrap();

        let listener = graph.get("LbpublicListener80").unwrap();
        let actions = listener.properties["DefaultActions"].as_array().unwrap();
        assert_eq!(actions[0]["Type"], "fixed-response");
        assert_eq!(actions[0]["FixedResponseConfig"]["StatusCode"], "404");
        let rules = graph
            .iter()
            .filter(|r| r.kind == ResourceKind::ListenerRule)
            .count();
        assert_eq!(rules, 2);
    }

    #[test]
    fn test_unresolved_target_is_fatal() {
        let result = resolve(
            r#"
services:
  web:
    image: web:1
    ports:
      - "80"
x-elbv2:
  public:
    type: alb
    listeners:
      - port: 80
        protocol: HTTP
        targets:
          - name: missing:web:80
"#,
        );
        assert!(matches!(
            result,
            Err(StacksmithError::Synth(SynthError::UnresolvedTarget { .. }))
        ));
    }

    #[test]
    fn test_duplicate_target_without_port_is_fatal() {
        let result = resolve(
            r#"
services:
  web:
    image: web:1
    ports:
      - "80"
      - "8443"
x-elbv2:
  public:
    type: alb
    listeners:
      - port: 80
        protocol: HTTP
        targets:
          - name: web:web
            access: /
          - name: web:web
            access: /other
"#,
        );
        assert!(matches!(
            result,
            Err(StacksmithError::Synth(SynthError::AmbiguousTarget { .. }))
        ));
    }

    #[test]
    fn test_auth_on_plaintext_listener_is_fatal() {
        let result = resolve(
            r#"
services:
  web:
    image: web:1
    ports:
      - "80"
x-elbv2:
  public:
    type: alb
    listeners:
      - port: 80
        protocol: HTTP
        targets:
          - name: web:web:80
            authenticate_cognito:
              user_pool_arn: arn:aws:cognito-idp:eu-west-1:012345678912:userpool/abc
              user_pool_client_id: client
              user_pool_domain: auth.example.com
"#,
        );
        assert!(matches!(
            result,
            Err(StacksmithError::Synth(SynthError::AuthOnPlaintextListener { .. }))
        ));
    }

    #[test]
    fn test_certificate_upgrades_http_listener() {
        let (graph, _) = resolve(
            r#"
services:
  web:
    image: web:1
    ports:
      - "80"
x-elbv2:
  public:
    type: alb
    listeners:
      - port: 443
        protocol: HTTP
        certificates:
          - arn:aws:acm:eu-west-1:012345678912:certificate/abcd
        targets:
          - name: web:web:80
            authenticate_cognito:
              user_pool_arn: arn:aws:cognito-idp:eu-west-1:012345678912:userpool/abc
              user_pool_client_id: client
              user_pool_domain: auth.example.com
"#,
        )
        .unwrap();

        let listener = graph.get("LbpublicListener443").unwrap();
        // Upgraded to HTTPS, so the authentication action is accepted and
        // ordered before the forward action.
        assert_eq!(listener.properties["Protocol"], "HTTPS");
        let actions = listener.properties["DefaultActions"].as_array().unwrap();
        assert_eq!(actions[0]["Type"], "authenticate-cognito");
        assert_eq!(actions[0]["Order"], 1);
        assert_eq!(actions[1]["Type"], "forward");
        assert_eq!(actions[1]["Order"], 2);
    }

    #[test]
    fn test_certificate_on_udp_listener_is_fatal() {
        let listener = ListenerSpec {
            port: 53,
            protocol: ListenerProtocol::Udp,
            certificates: vec![String::from("arn:aws:acm:eu-west-1:0:certificate/x")],
            ssl_policy: None,
            default_actions: vec![],
            targets: vec![],
        };
        assert!(effective_protocol("edge:53", &listener).is_err());
    }

    #[test]
    fn test_nlb_multiple_targets_is_fatal() {
        let result = resolve(
            r#"
services:
  web:
    image: web:1
    ports:
      - "80"
  api:
    image: api:1
    ports:
      - "8080"
x-elbv2:
  edge:
    type: nlb
    listeners:
      - port: 80
        protocol: TCP
        targets:
          - name: web:web:80
          - name: api:api:8080
"#,
        );
        assert!(matches!(
            result,
            Err(StacksmithError::Synth(SynthError::NlbMultipleTargets { .. }))
        ));
    }

    #[test]
    fn test_lb_ingress_emitted_for_reached_families() {
        let (graph, _) = resolve(
            r#"
services:
  web:
    image: web:1
    ports:
      - "80"
x-elbv2:
  public:
    type: alb
    listeners:
      - port: 80
        protocol: HTTP
        targets:
          - name: web:web:80
"#,
        )
        .unwrap();
        assert!(graph.contains("FromLbLbpublicTowebOnPort80"));
    }

    #[test]
    fn test_access_conditions_shapes() {
        let path = access_conditions("/api").unwrap();
        assert_eq!(path[0]["Field"], "path-pattern");

        let domain = access_conditions("app.example.com").unwrap();
        assert_eq!(domain[0]["Field"], "host-header");

        let both = access_conditions("app.example.com/api").unwrap();
        assert_eq!(both.len(), 2);
        assert_eq!(both[1]["PathPatternConfig"]["Values"][0], "/api");

        assert!(access_conditions("!!!").is_err());
    }

    #[test]
    fn test_explicit_conditions_take_precedence_over_access() {
        let target = ListenerTargetSpec {
            name: String::from("a:b"),
            access: Some(String::from("/ignored")),
            conditions: vec![RuleConditionSpec {
                host_header: vec![String::from("api.example.com")],
                path_pattern: vec![],
            }],
            authenticate_oidc: None,
            authenticate_cognito: None,
            health_check: None,
        };
        let conditions = rule_conditions(&target).unwrap();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0]["Field"], "host-header");
    }
}
