//! Configuration validation.
//!
//! # Responsibilities
//! - Require the `api` inbound and every required field
//! - Check referential integrity (rules reference declared tags)
//! - Enforce protocol credential rules for clients and servers
//! - Reject malformed stream envelopes (conflicting blocks)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: &ProxyConfig → Result<(), ValidationErrors>
//! - Unknown protocols pass through unvalidated

use std::collections::HashSet;

use thiserror::Error;

use crate::proxy::model::{
    Client, Inbound, InboundSettings, NextHop, Outbound, OutboundServer, Protocol, ProxyConfig,
    API_TAG,
};
use crate::proxy::stream::{Security, StreamSettings};

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Path of the offending field, e.g. `inbounds[1].settings.clients[0].id`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Every problem found in one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn errors(&self) -> &[ValidationError] {
        &self.0
    }

    pub fn fields(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.field.as_str()).collect()
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "validation failed: ")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Validate a full document.
pub fn validate(config: &ProxyConfig) -> Result<(), ValidationErrors> {
    let mut errors = Vec::new();

    require(&mut errors, "log.loglevel", &config.log.loglevel);

    if config.api.tag.trim().is_empty() {
        errors.push(ValidationError::new("api.tag", "is required"));
    }
    if config.api.services.iter().all(|s| s.trim().is_empty()) {
        errors.push(ValidationError::new("api.services", "at least one service is required"));
    }

    let dns_servers = config.dns.as_ref().map(|d| d.servers.as_slice()).unwrap_or_default();
    if dns_servers.iter().all(|s| s.trim().is_empty()) {
        errors.push(ValidationError::new("dns.servers", "at least one server is required"));
    }

    let mut inbound_tags = HashSet::new();
    for (i, inbound) in config.inbounds.iter().enumerate() {
        let path = format!("inbounds[{}]", i);
        if !inbound.tag.is_empty() && !inbound_tags.insert(inbound.tag.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.tag", path),
                format!("duplicate tag '{}'", inbound.tag),
            ));
        }
        validate_inbound(&path, inbound, &mut errors);
    }

    if config.api_inbound().is_none() {
        errors.push(ValidationError::new(
            "inbounds",
            format!("an inbound tagged '{}' is required", API_TAG),
        ));
    }

    let mut outbound_tags = HashSet::new();
    for (i, outbound) in config.outbounds.iter().enumerate() {
        let path = format!("outbounds[{}]", i);
        if !outbound.tag.is_empty() && !outbound_tags.insert(outbound.tag.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.tag", path),
                format!("duplicate tag '{}'", outbound.tag),
            ));
        }
        validate_outbound(&path, outbound, &mut errors);
    }

    validate_routing(config, &inbound_tags, &outbound_tags, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}

fn validate_inbound(path: &str, inbound: &Inbound, errors: &mut Vec<ValidationError>) {
    require(errors, &format!("{}.listen", path), &inbound.listen);
    require(errors, &format!("{}.tag", path), &inbound.tag);
    require(errors, &format!("{}.protocol", path), &inbound.protocol);
    if inbound.port == 0 {
        errors.push(ValidationError::new(
            format!("{}.port", path),
            "must be between 1 and 65535",
        ));
    }

    let settings_path = format!("{}.settings", path);
    let protocol = Protocol::from_name(&inbound.protocol);
    match &inbound.settings {
        None => errors.push(ValidationError::new(settings_path, "is required")),
        Some(settings) => {
            if protocol == Protocol::Shadowsocks && settings.clients.is_empty() {
                require_opt(errors, &format!("{}.method", settings_path), settings.method.as_deref());
                require_opt(errors, &format!("{}.password", settings_path), settings.password.as_deref());
            }
            for (j, client) in settings.clients.iter().enumerate() {
                let client_path = format!("{}.clients[{}]", settings_path, j);
                validate_client(&client_path, protocol, client, settings, errors);
            }
        }
    }

    if let Some(stream) = &inbound.stream_settings {
        validate_stream(&format!("{}.streamSettings", path), stream, errors);
    }
}

/// Credential rules for one inbound client.
///
/// Shadowsocks clients may inherit `method` and `password` from the
/// enclosing settings block.
pub fn validate_client(
    path: &str,
    protocol: Protocol,
    client: &Client,
    shared: &InboundSettings,
    errors: &mut Vec<ValidationError>,
) {
    match protocol {
        Protocol::Shadowsocks => {
            require(errors, &format!("{}.email", path), &client.email);
            let method = client.method.as_deref().or(shared.method.as_deref());
            require_opt(errors, &format!("{}.method", path), method);
            let password = client.password.as_deref().or(shared.password.as_deref());
            require_opt(errors, &format!("{}.password", path), password);
        }
        Protocol::Vmess | Protocol::Vless => {
            require(errors, &format!("{}.email", path), &client.email);
            require_uuid(errors, &format!("{}.id", path), client.id.as_deref());
        }
        Protocol::Trojan => {
            require(errors, &format!("{}.email", path), &client.email);
            require_opt(errors, &format!("{}.password", path), client.password.as_deref());
        }
        Protocol::Infrastructure | Protocol::Unknown => {}
    }
}

fn validate_outbound(path: &str, outbound: &Outbound, errors: &mut Vec<ValidationError>) {
    require(errors, &format!("{}.tag", path), &outbound.tag);
    require(errors, &format!("{}.protocol", path), &outbound.protocol);

    let protocol = Protocol::from_name(&outbound.protocol);
    let settings_path = format!("{}.settings", path);
    match protocol {
        Protocol::Vmess => {
            let vnext = outbound.settings.as_ref().map(|s| s.vnext.as_slice()).unwrap_or_default();
            if vnext.is_empty() {
                errors.push(ValidationError::new(
                    format!("{}.vnext", settings_path),
                    "at least one next-hop server is required",
                ));
            }
            for (j, hop) in vnext.iter().enumerate() {
                validate_next_hop(&format!("{}.vnext[{}]", settings_path, j), hop, errors);
            }
        }
        Protocol::Vless | Protocol::Trojan | Protocol::Shadowsocks => {
            let servers = outbound.settings.as_ref().map(|s| s.servers.as_slice()).unwrap_or_default();
            if servers.is_empty() {
                errors.push(ValidationError::new(
                    format!("{}.servers", settings_path),
                    "at least one server is required",
                ));
            }
            for (j, server) in servers.iter().enumerate() {
                let server_path = format!("{}.servers[{}]", settings_path, j);
                validate_server(&server_path, protocol, server, errors);
            }
        }
        Protocol::Infrastructure | Protocol::Unknown => {}
    }

    if let Some(stream) = &outbound.stream_settings {
        validate_stream(&format!("{}.streamSettings", path), stream, errors);
    }
}

/// Credential rules for one outbound server.
pub fn validate_server(path: &str, protocol: Protocol, server: &OutboundServer, errors: &mut Vec<ValidationError>) {
    require(errors, &format!("{}.address", path), &server.address);
    if server.port == 0 {
        errors.push(ValidationError::new(
            format!("{}.port", path),
            "must be between 1 and 65535",
        ));
    }
    match protocol {
        Protocol::Shadowsocks => {
            require_opt(errors, &format!("{}.method", path), server.method.as_deref());
            require_opt(errors, &format!("{}.password", path), server.password.as_deref());
        }
        Protocol::Vmess | Protocol::Vless => {
            require_uuid(errors, &format!("{}.id", path), server.id.as_deref());
        }
        Protocol::Trojan => {
            require_opt(errors, &format!("{}.password", path), server.password.as_deref());
        }
        Protocol::Infrastructure | Protocol::Unknown => {}
    }
}

fn validate_next_hop(path: &str, hop: &NextHop, errors: &mut Vec<ValidationError>) {
    require(errors, &format!("{}.address", path), &hop.address);
    if hop.port == 0 {
        errors.push(ValidationError::new(
            format!("{}.port", path),
            "must be between 1 and 65535",
        ));
    }
    if hop.users.is_empty() {
        errors.push(ValidationError::new(
            format!("{}.users", path),
            "at least one user is required",
        ));
    }
    for (k, user) in hop.users.iter().enumerate() {
        let id = Some(user.id.as_str());
        require_uuid(errors, &format!("{}.users[{}].id", path, k), id);
    }
}

fn validate_stream(path: &str, stream: &StreamSettings, errors: &mut Vec<ValidationError>) {
    let populated = stream.populated_transports();
    if populated.len() > 1 {
        let kinds: Vec<&str> = populated.iter().map(|n| n.as_str()).collect();
        errors.push(ValidationError::new(
            path.to_string(),
            format!("conflicting transport blocks: {}", kinds.join(", ")),
        ));
    } else if let Some(kind) = populated.first() {
        if *kind != stream.network {
            errors.push(ValidationError::new(
                format!("{}.network", path),
                format!("is '{}' but {} settings are populated", stream.network, kind),
            ));
        }
    }

    if stream.tls_settings.is_some() && stream.reality_settings.is_some() {
        errors.push(ValidationError::new(
            path.to_string(),
            "tlsSettings and realitySettings are mutually exclusive",
        ));
    }
    match stream.security {
        Security::Tls if stream.reality_settings.is_some() => errors.push(ValidationError::new(
            format!("{}.realitySettings", path),
            "must be empty when security is 'tls'",
        )),
        Security::Reality if stream.tls_settings.is_some() => errors.push(ValidationError::new(
            format!("{}.tlsSettings", path),
            "must be empty when security is 'reality'",
        )),
        Security::None if stream.tls_settings.is_some() || stream.reality_settings.is_some() => {
            errors.push(ValidationError::new(
                format!("{}.security", path),
                "is empty but a security block is populated",
            ))
        }
        _ => {}
    }
}

fn validate_routing(
    config: &ProxyConfig,
    inbound_tags: &HashSet<&str>,
    outbound_tags: &HashSet<&str>,
    errors: &mut Vec<ValidationError>,
) {
    // Reverse bridges act as inbounds and portals as outbounds for routing.
    let reverse = config.reverse.as_ref();
    let bridges: HashSet<&str> = reverse
        .map(|r| r.bridges.iter().map(|b| b.tag.as_str()).collect())
        .unwrap_or_default();
    let portals: HashSet<&str> = reverse
        .map(|r| r.portals.iter().map(|p| p.tag.as_str()).collect())
        .unwrap_or_default();

    let mut balancer_tags = HashSet::new();
    for (i, balancer) in config.routing.balancers.iter().enumerate() {
        let path = format!("routing.balancers[{}]", i);
        require(errors, &format!("{}.tag", path), &balancer.tag);
        if !balancer.tag.is_empty() && !balancer_tags.insert(balancer.tag.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.tag", path),
                format!("duplicate tag '{}'", balancer.tag),
            ));
        }
        if balancer.selector.is_empty() {
            errors.push(ValidationError::new(
                format!("{}.selector", path),
                "at least one selector is required",
            ));
        }
    }

    require(errors, "routing.domainStrategy", &config.routing.domain_strategy);
    require(errors, "routing.domainMatcher", &config.routing.domain_matcher);

    for (i, rule) in config.routing.rules.iter().enumerate() {
        let path = format!("routing.rules[{}]", i);
        if rule.inbound_tag.is_empty() {
            errors.push(ValidationError::new(
                format!("{}.inboundTag", path),
                "at least one inbound tag is required",
            ));
        }
        for tag in &rule.inbound_tag {
            if !inbound_tags.contains(tag.as_str()) && !bridges.contains(tag.as_str()) {
                errors.push(ValidationError::new(
                    format!("{}.inboundTag", path),
                    format!("references undeclared inbound '{}'", tag),
                ));
            }
        }
        if let Some(tag) = &rule.outbound_tag {
            let known = outbound_tags.contains(tag.as_str())
                || portals.contains(tag.as_str())
                || *tag == config.api.tag;
            if !known {
                errors.push(ValidationError::new(
                    format!("{}.outboundTag", path),
                    format!("references undeclared outbound '{}'", tag),
                ));
            }
        }
        if let Some(tag) = &rule.balancer_tag {
            if !balancer_tags.contains(tag.as_str()) {
                errors.push(ValidationError::new(
                    format!("{}.balancerTag", path),
                    format!("references undeclared balancer '{}'", tag),
                ));
            }
        }
        if rule.outbound_tag.is_none() && rule.balancer_tag.is_none() {
            errors.push(ValidationError::new(
                path,
                "either outboundTag or balancerTag is required",
            ));
        }
    }

    if let Some(reverse) = reverse {
        for (i, entry) in reverse.bridges.iter().enumerate() {
            require(errors, &format!("reverse.bridges[{}].tag", i), &entry.tag);
            require(errors, &format!("reverse.bridges[{}].domain", i), &entry.domain);
        }
        for (i, entry) in reverse.portals.iter().enumerate() {
            require(errors, &format!("reverse.portals[{}].tag", i), &entry.tag);
            require(errors, &format!("reverse.portals[{}].domain", i), &entry.domain);
        }
    }
}

fn require(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(ValidationError::new(field, "is required"));
    }
}

fn require_opt(errors: &mut Vec<ValidationError>, field: &str, value: Option<&str>) {
    require(errors, field, value.unwrap_or_default());
}

fn require_uuid(errors: &mut Vec<ValidationError>, field: &str, value: Option<&str>) {
    match value {
        Some(id) if !id.trim().is_empty() => {
            if uuid::Uuid::parse_str(id).is_err() {
                errors.push(ValidationError::new(field, "must be a valid UUID"));
            }
        }
        _ => errors.push(ValidationError::new(field, "is required")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::builders::*;
    use crate::proxy::model::{Balancer, Log, Rule};
    use crate::proxy::stream::{make_tcp_stream_settings, make_websocket_stream_settings, TlsSettings, RealitySettings};

    const ID: &str = "5783a3e7-e373-51cd-8642-c83782b807c5";

    fn base() -> ProxyConfig {
        base_config(10085, Log::default())
    }

    #[test]
    fn test_missing_api_inbound() {
        let mut config = base();
        config.inbounds.clear();
        config.routing.rules.clear();

        let err = validate(&config).unwrap_err();
        assert_eq!(err.fields(), vec!["inbounds"]);
    }

    #[test]
    fn test_duplicate_inbound_tag() {
        let mut config = base();
        config.inbounds.push(make_vless_inbound("api", 443, "u@x", ID));

        let err = validate(&config).unwrap_err();
        assert!(err.fields().contains(&"inbounds[1].tag"));
    }

    #[test]
    fn test_client_rules_per_protocol() {
        let mut config = base();
        let mut ss = make_shadowsocks_inbound("ss", 8388, "u@x", "aes-256-gcm", "pw");
        ss.settings.as_mut().unwrap().clients[0].method = None;
        let mut vmess = make_vmess_inbound("vm", 8443, "u@x", ID);
        vmess.settings.as_mut().unwrap().clients[0].id = Some("not-a-uuid".to_string());
        let mut trojan = make_trojan_inbound("tj", 9443, "u@x", "pw");
        trojan.settings.as_mut().unwrap().clients[0].password = Some(String::new());
        config.inbounds.extend([ss, vmess, trojan]);

        let err = validate(&config).unwrap_err();
        assert_eq!(
            err.fields(),
            vec![
                "inbounds[1].settings.clients[0].method",
                "inbounds[2].settings.clients[0].id",
                "inbounds[3].settings.clients[0].password",
            ]
        );
    }

    #[test]
    fn test_shadowsocks_credentials_at_settings_level() {
        let mut config = base();
        let mut single = make_shadowsocks_inbound("ss", 8388, "u@x", "aes-256-gcm", "pw");
        let settings = single.settings.as_mut().unwrap();
        settings.clients.clear();
        settings.method = Some("aes-256-gcm".to_string());
        settings.password = Some("pw".to_string());

        let mut shared = make_shadowsocks_inbound("ss2022", 8389, "u@x", "", "user-key");
        let settings = shared.settings.as_mut().unwrap();
        settings.clients[0].method = None;
        settings.method = Some("2022-blake3-aes-128-gcm".to_string());
        settings.password = Some("server-key".to_string());
        config.inbounds.extend([single, shared]);
        assert!(validate(&config).is_ok());

        let settings = config.inbounds[1].settings.as_mut().unwrap();
        settings.password = None;
        let settings = config.inbounds[2].settings.as_mut().unwrap();
        settings.method = None;
        let err = validate(&config).unwrap_err();
        assert_eq!(
            err.fields(),
            vec![
                "inbounds[1].settings.password",
                "inbounds[2].settings.clients[0].method",
            ]
        );
    }

    #[test]
    fn test_missing_log_level() {
        let mut config = base();
        config.log.loglevel = String::new();
        assert_eq!(validate(&config).unwrap_err().fields(), vec!["log.loglevel"]);
    }

    #[test]
    fn test_missing_inbound_listen() {
        let mut config = base();
        config.inbounds[0].listen = " ".to_string();
        assert_eq!(validate(&config).unwrap_err().fields(), vec!["inbounds[0].listen"]);
    }

    #[test]
    fn test_missing_inbound_settings() {
        let mut config = base();
        config.inbounds.push(Inbound {
            settings: None,
            ..make_trojan_inbound("tj", 9443, "u@x", "pw")
        });
        assert_eq!(validate(&config).unwrap_err().fields(), vec!["inbounds[1].settings"]);

        let doc = r#"{"listen":"0.0.0.0","port":1,"protocol":"vless","tag":"t"}"#;
        let parsed: Inbound = serde_json::from_str(doc).unwrap();
        assert!(parsed.settings.is_none());
    }

    #[test]
    fn test_missing_dns_servers() {
        let mut config = base();
        config.dns = None;
        assert_eq!(validate(&config).unwrap_err().fields(), vec!["dns.servers"]);

        config.dns = Some(Default::default());
        assert_eq!(validate(&config).unwrap_err().fields(), vec!["dns.servers"]);
    }

    #[test]
    fn test_missing_api_services() {
        let mut config = base();
        config.api.services.clear();
        assert_eq!(validate(&config).unwrap_err().fields(), vec!["api.services"]);
    }

    #[test]
    fn test_missing_domain_strategy() {
        let mut config = base();
        config.routing.domain_strategy = String::new();
        assert_eq!(validate(&config).unwrap_err().fields(), vec!["routing.domainStrategy"]);
    }

    #[test]
    fn test_missing_domain_matcher() {
        let mut config = base();
        config.routing.domain_matcher = String::new();
        assert_eq!(validate(&config).unwrap_err().fields(), vec!["routing.domainMatcher"]);
    }

    #[test]
    fn test_rule_without_inbound_tag() {
        let mut config = base();
        config.routing.rules[0].inbound_tag.clear();
        assert_eq!(validate(&config).unwrap_err().fields(), vec!["routing.rules[0].inboundTag"]);
    }

    #[test]
    fn test_vmess_next_hop_needs_user() {
        let mut config = base();
        let mut outbound = make_vmess_outbound("out", "example.com", 443, ID);
        if let Some(settings) = outbound.settings.as_mut() {
            settings.vnext[0].users.clear();
        }
        config.outbounds.push(outbound);

        let err = validate(&config).unwrap_err();
        assert_eq!(err.fields(), vec!["outbounds[1].settings.vnext[0].users"]);
    }

    #[test]
    fn test_vmess_without_vnext() {
        let mut config = base();
        let mut outbound = make_vmess_outbound("out", "example.com", 443, ID);
        outbound.settings = None;
        config.outbounds.push(outbound);

        let err = validate(&config).unwrap_err();
        assert_eq!(err.fields(), vec!["outbounds[1].settings.vnext"]);
    }

    #[test]
    fn test_infrastructure_and_unknown_pass() {
        let mut config = base();
        config.outbounds.push(Outbound {
            protocol: "blackhole".to_string(),
            tag: "block".to_string(),
            settings: None,
            stream_settings: None,
        });
        config.outbounds.push(Outbound {
            protocol: "hysteria2".to_string(),
            tag: "future".to_string(),
            settings: None,
            stream_settings: None,
        });

        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_rule_references() {
        let mut config = base();
        config.routing.rules.push(Rule {
            kind: "field".to_string(),
            inbound_tag: vec!["ghost".to_string()],
            outbound_tag: Some("nowhere".to_string()),
            ..Default::default()
        });
        config.routing.rules.push(Rule {
            kind: "field".to_string(),
            inbound_tag: vec![API_TAG.to_string()],
            balancer_tag: Some("lb".to_string()),
            ..Default::default()
        });

        let err = validate(&config).unwrap_err();
        assert_eq!(
            err.fields(),
            vec![
                "routing.rules[1].inboundTag",
                "routing.rules[1].outboundTag",
                "routing.rules[2].balancerTag",
            ]
        );

        config.routing.balancers.push(Balancer {
            tag: "lb".to_string(),
            selector: vec!["direct".to_string()],
        });
        config.routing.rules.remove(1);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_conflicting_stream_blocks() {
        let mut config = base();
        let mut stream = make_websocket_stream_settings("/ws", "");
        stream.tcp_settings = make_tcp_stream_settings().tcp_settings;
        config.inbounds.push(make_vless_inbound("in", 443, "u@x", ID).with_stream(stream));

        let mut secured = make_tcp_stream_settings().with_tls(TlsSettings::client("a", "chrome"));
        secured.reality_settings = Some(RealitySettings::client("a", "k", "", "chrome"));
        config.inbounds.push(make_vless_inbound("in2", 444, "u@x", ID).with_stream(secured));

        let err = validate(&config).unwrap_err();
        assert_eq!(
            err.fields(),
            vec![
                "inbounds[1].streamSettings",
                "inbounds[2].streamSettings",
                "inbounds[2].streamSettings.realitySettings",
            ]
        );
    }

    #[test]
    fn test_error_display_lists_all() {
        let mut config = base();
        config.api.tag = String::new();
        config.inbounds.clear();
        config.routing.rules.clear();

        let err = validate(&config).unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("validation failed: "));
        assert!(text.contains("api.tag: is required"));
        assert!(text.contains("inbounds: an inbound tagged 'api' is required"));
    }
}
