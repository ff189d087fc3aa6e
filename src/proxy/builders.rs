//! Protocol-idiomatic constructors.
//!
//! Every builder is pure and returns a complete fragment with the nested
//! defaults the engine expects. Transport/security are attached afterwards
//! with [`Inbound::with_stream`] / [`Outbound::with_stream`] using the
//! fragments from [`crate::proxy::stream`].

use std::collections::BTreeMap;

use crate::proxy::model::{
    Api, Client, Dns, Inbound, InboundSettings, Log, NextHop, NextHopUser, Outbound,
    OutboundServer, OutboundSettings, Policy, PolicyLevel, PolicySystem, ProxyConfig,
    Routing, Rule, Stats, API_TAG,
};
use crate::proxy::stream::{make_tcp_stream_settings, StreamSettings};

const ANY_ADDRESS: &str = "0.0.0.0";
const LOOPBACK: &str = "127.0.0.1";
const DEFAULT_LOG_LEVEL: &str = "warning";
const DNS_SERVERS: [&str; 3] = ["8.8.8.8", "8.8.4.4", "localhost"];

impl Inbound {
    pub fn with_stream(mut self, stream: StreamSettings) -> Self {
        self.stream_settings = Some(stream);
        self
    }
}

impl Outbound {
    pub fn with_stream(mut self, stream: StreamSettings) -> Self {
        self.stream_settings = Some(stream);
        self
    }
}

/// The document the node runs before anything else is applied.
///
/// An empty log level falls back to `warning` so the result always passes
/// [`crate::proxy::validation::validate`].
pub fn base_config(api_port: u16, mut log: Log) -> ProxyConfig {
    if log.loglevel.trim().is_empty() {
        log.loglevel = DEFAULT_LOG_LEVEL.to_string();
    }

    let mut levels = BTreeMap::new();
    levels.insert(
        "0".to_string(),
        PolicyLevel {
            stats_user_uplink: true,
            stats_user_downlink: true,
        },
    );

    ProxyConfig {
        log,
        inbounds: vec![make_api_inbound(api_port)],
        outbounds: vec![make_direct_outbound("direct")],
        dns: Some(Dns {
            servers: DNS_SERVERS.iter().map(|s| s.to_string()).collect(),
        }),
        api: Api {
            tag: API_TAG.to_string(),
            services: vec!["StatsService".to_string()],
        },
        stats: Stats {},
        policy: Policy {
            levels,
            system: PolicySystem {
                stats_inbound_uplink: true,
                stats_inbound_downlink: true,
                stats_outbound_uplink: true,
                stats_outbound_downlink: true,
            },
        },
        routing: Routing {
            domain_strategy: "AsIs".to_string(),
            domain_matcher: "hybrid".to_string(),
            rules: vec![Rule {
                kind: "field".to_string(),
                inbound_tag: vec![API_TAG.to_string()],
                outbound_tag: Some(API_TAG.to_string()),
                ..Default::default()
            }],
            balancers: Vec::new(),
        },
        reverse: None,
        metadata: None,
    }
}

/// Loopback-only control listener for the stats service.
pub fn make_api_inbound(port: u16) -> Inbound {
    Inbound {
        listen: LOOPBACK.to_string(),
        port,
        protocol: "dokodemo-door".to_string(),
        tag: API_TAG.to_string(),
        settings: Some(InboundSettings {
            address: Some(LOOPBACK.to_string()),
            network: Some("tcp".to_string()),
            ..Default::default()
        }),
        stream_settings: None,
    }
}

pub fn make_direct_outbound(tag: &str) -> Outbound {
    Outbound {
        protocol: "freedom".to_string(),
        tag: tag.to_string(),
        settings: None,
        stream_settings: None,
    }
}

pub fn make_shadowsocks_inbound(tag: &str, port: u16, email: &str, method: &str, password: &str) -> Inbound {
    Inbound {
        listen: ANY_ADDRESS.to_string(),
        port,
        protocol: "shadowsocks".to_string(),
        tag: tag.to_string(),
        settings: Some(InboundSettings {
            clients: vec![Client {
                email: email.to_string(),
                method: Some(method.to_string()),
                password: Some(password.to_string()),
                ..Default::default()
            }],
            network: Some("tcp,udp".to_string()),
            ..Default::default()
        }),
        stream_settings: Some(make_tcp_stream_settings()),
    }
}

pub fn make_vless_inbound(tag: &str, port: u16, email: &str, id: &str) -> Inbound {
    Inbound {
        listen: ANY_ADDRESS.to_string(),
        port,
        protocol: "vless".to_string(),
        tag: tag.to_string(),
        settings: Some(InboundSettings {
            clients: vec![Client {
                email: email.to_string(),
                id: Some(id.to_string()),
                ..Default::default()
            }],
            decryption: Some("none".to_string()),
            ..Default::default()
        }),
        stream_settings: Some(make_tcp_stream_settings()),
    }
}

pub fn make_vmess_inbound(tag: &str, port: u16, email: &str, id: &str) -> Inbound {
    Inbound {
        listen: ANY_ADDRESS.to_string(),
        port,
        protocol: "vmess".to_string(),
        tag: tag.to_string(),
        settings: Some(InboundSettings {
            clients: vec![Client {
                email: email.to_string(),
                id: Some(id.to_string()),
                alter_id: Some(0),
                ..Default::default()
            }],
            ..Default::default()
        }),
        stream_settings: Some(make_tcp_stream_settings()),
    }
}

pub fn make_trojan_inbound(tag: &str, port: u16, email: &str, password: &str) -> Inbound {
    Inbound {
        listen: ANY_ADDRESS.to_string(),
        port,
        protocol: "trojan".to_string(),
        tag: tag.to_string(),
        settings: Some(InboundSettings {
            clients: vec![Client {
                email: email.to_string(),
                password: Some(password.to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        stream_settings: Some(make_tcp_stream_settings()),
    }
}

pub fn make_shadowsocks_outbound(tag: &str, address: &str, port: u16, method: &str, password: &str) -> Outbound {
    Outbound {
        protocol: "shadowsocks".to_string(),
        tag: tag.to_string(),
        settings: Some(OutboundSettings {
            servers: vec![OutboundServer {
                address: address.to_string(),
                port,
                method: Some(method.to_string()),
                password: Some(password.to_string()),
                ..Default::default()
            }],
            vnext: Vec::new(),
        }),
        stream_settings: Some(make_tcp_stream_settings()),
    }
}

pub fn make_vless_outbound(tag: &str, address: &str, port: u16, id: &str) -> Outbound {
    Outbound {
        protocol: "vless".to_string(),
        tag: tag.to_string(),
        settings: Some(OutboundSettings {
            servers: vec![OutboundServer {
                address: address.to_string(),
                port,
                id: Some(id.to_string()),
                encryption: Some("none".to_string()),
                ..Default::default()
            }],
            vnext: Vec::new(),
        }),
        stream_settings: Some(make_tcp_stream_settings()),
    }
}

pub fn make_vmess_outbound(tag: &str, address: &str, port: u16, id: &str) -> Outbound {
    Outbound {
        protocol: "vmess".to_string(),
        tag: tag.to_string(),
        settings: Some(OutboundSettings {
            servers: Vec::new(),
            vnext: vec![NextHop {
                address: address.to_string(),
                port,
                users: vec![NextHopUser {
                    id: id.to_string(),
                    alter_id: Some(0),
                    security: Some("auto".to_string()),
                    level: None,
                }],
            }],
        }),
        stream_settings: Some(make_tcp_stream_settings()),
    }
}

pub fn make_trojan_outbound(tag: &str, address: &str, port: u16, password: &str) -> Outbound {
    Outbound {
        protocol: "trojan".to_string(),
        tag: tag.to_string(),
        settings: Some(OutboundSettings {
            servers: vec![OutboundServer {
                address: address.to_string(),
                port,
                password: Some(password.to_string()),
                ..Default::default()
            }],
            vnext: Vec::new(),
        }),
        stream_settings: Some(make_tcp_stream_settings()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::stream::{add_tls, make_websocket_stream_settings, Network, Security, TlsSettings};
    use crate::proxy::validation::validate;

    const ID: &str = "5783a3e7-e373-51cd-8642-c83782b807c5";

    #[test]
    fn test_base_config_is_valid() {
        let config = base_config(10085, Log::default());
        assert!(validate(&config).is_ok());
        assert_eq!(config.api_port(), Some(10085));
        assert_eq!(config.routing.rules[0].outbound_tag.as_deref(), Some(API_TAG));
    }

    #[test]
    fn test_base_config_engine_defaults() {
        let config = base_config(10085, Log::default());
        assert_eq!(config.log.loglevel, "warning");
        assert_eq!(config.routing.domain_matcher, "hybrid");
        assert_eq!(config.dns.unwrap().servers, vec!["8.8.8.8", "8.8.4.4", "localhost"]);

        let api = config.inbounds[0].settings.as_ref().unwrap();
        assert_eq!(api.address.as_deref(), Some("127.0.0.1"));
        assert_eq!(api.network.as_deref(), Some("tcp"));

        let log = Log {
            loglevel: "debug".to_string(),
            ..Default::default()
        };
        assert_eq!(base_config(10085, log).log.loglevel, "debug");
    }

    #[test]
    fn test_vless_inbound_sets_decryption_none() {
        let inbound = make_vless_inbound("in", 443, "u@x", ID);
        assert_eq!(inbound.settings.as_ref().unwrap().decryption.as_deref(), Some("none"));
        assert_eq!(inbound.clients()[0].id.as_deref(), Some(ID));
    }

    #[test]
    fn test_trojan_never_sets_id() {
        let inbound = make_trojan_inbound("in", 443, "u@x", "secret");
        assert!(inbound.clients()[0].id.is_none());

        let outbound = make_trojan_outbound("out", "example.com", 443, "secret");
        let server = &outbound.settings.unwrap().servers[0];
        assert!(server.id.is_none());
        assert_eq!(server.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_vmess_outbound_uses_next_hop_shape() {
        let outbound = make_vmess_outbound("out", "example.com", 443, ID);
        let settings = outbound.settings.unwrap();
        assert!(settings.servers.is_empty());
        assert_eq!(settings.vnext[0].users[0].id, ID);
    }

    #[test]
    fn test_with_stream_chains_transport_and_security() {
        let stream = add_tls(
            make_websocket_stream_settings("/vm", "cdn.example"),
            TlsSettings::client("cdn.example", "chrome"),
        );
        let outbound = make_vmess_outbound("out", "cdn.example", 443, ID).with_stream(stream);
        let stream = outbound.stream_settings.unwrap();

        assert_eq!(stream.network, Network::Ws);
        assert_eq!(stream.security, Security::Tls);
    }

    #[test]
    fn test_shadowsocks_inbound_json() {
        let inbound = make_shadowsocks_inbound("ss", 8388, "u@x", "aes-256-gcm", "pw");
        let json = serde_json::to_value(&inbound).unwrap();

        assert_eq!(json["settings"]["clients"][0]["method"], "aes-256-gcm");
        assert_eq!(json["settings"]["network"], "tcp,udp");
        assert!(json["settings"]["clients"][0].get("id").is_none());
    }
}
