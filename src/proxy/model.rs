//! Typed representation of the engine configuration document.
//!
//! Field names follow the engine's JSON schema (camelCase). Optional
//! sections are skipped on serialization so a document round-trips through
//! the engine without gaining empty keys.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::proxy::stream::StreamSettings;

/// Tag of the internal statistics/control inbound.
pub const API_TAG: &str = "api";

/// Tag of the listener owned by the remote manager.
pub const REMOTE_TAG: &str = "remote";

/// Root document applied to the external engine.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    #[serde(default)]
    pub log: Log,

    #[serde(default)]
    pub inbounds: Vec<Inbound>,

    #[serde(default)]
    pub outbounds: Vec<Outbound>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<Dns>,

    #[serde(default)]
    pub api: Api,

    /// Presence of this (empty) object enables the engine's stats service.
    #[serde(default)]
    pub stats: Stats,

    #[serde(default)]
    pub policy: Policy,

    #[serde(default)]
    pub routing: Routing,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse: Option<Reverse>,

    #[serde(rename = "_metadata", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Log {
    #[serde(default)]
    pub loglevel: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// A listener definition.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inbound {
    #[serde(default)]
    pub listen: String,

    pub port: u16,

    pub protocol: String,

    pub tag: String,

    /// Required by the engine; `None` only when the document omitted it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<InboundSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_settings: Option<StreamSettings>,
}

impl Inbound {
    pub fn clients(&self) -> &[Client] {
        self.settings.as_ref().map(|s| s.clients.as_slice()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundSettings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clients: Vec<Client>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decryption: Option<String>,

    /// Shadowsocks single-user (or 2022 server) cipher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Inbound credential carrier.
///
/// Which fields are meaningful depends on the owning protocol: method and
/// password for Shadowsocks, id (+ alterId) for VMess/VLESS, password for
/// Trojan.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    #[serde(default)]
    pub email: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alter_id: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
}

/// A forwarder definition.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outbound {
    pub protocol: String,

    pub tag: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<OutboundSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_settings: Option<StreamSettings>,
}

/// Either a flat server list (Shadowsocks, VLESS, Trojan) or a next-hop list
/// with nested users (VMess). Only one shape is populated per outbound.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct OutboundSettings {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub servers: Vec<OutboundServer>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vnext: Vec<NextHop>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundServer {
    pub address: String,

    pub port: u16,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,

    /// Shadowsocks UDP over TCP.
    #[serde(default)]
    pub uot: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NextHop {
    pub address: String,

    pub port: u16,

    #[serde(default)]
    pub users: Vec<NextHopUser>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextHopUser {
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alter_id: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Dns {
    #[serde(default)]
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Api {
    #[serde(default)]
    pub tag: String,

    #[serde(default)]
    pub services: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Stats {}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Policy {
    /// Keyed by user level ("0", "1", ...).
    #[serde(default)]
    pub levels: BTreeMap<String, PolicyLevel>,

    #[serde(default)]
    pub system: PolicySystem,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyLevel {
    #[serde(default)]
    pub stats_user_uplink: bool,

    #[serde(default)]
    pub stats_user_downlink: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySystem {
    #[serde(default)]
    pub stats_inbound_uplink: bool,

    #[serde(default)]
    pub stats_inbound_downlink: bool,

    #[serde(default)]
    pub stats_outbound_uplink: bool,

    #[serde(default)]
    pub stats_outbound_downlink: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Routing {
    #[serde(default)]
    pub domain_strategy: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain_matcher: String,

    #[serde(default)]
    pub rules: Vec<Rule>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub balancers: Vec<Balancer>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(rename = "type", default = "default_rule_type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inbound_tag: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound_tag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balancer_tag: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domain: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user: Vec<String>,
}

fn default_rule_type() -> String {
    "field".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Balancer {
    pub tag: String,

    #[serde(default)]
    pub selector: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Reverse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bridges: Vec<ReverseEndpoint>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub portals: Vec<ReverseEndpoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ReverseEndpoint {
    pub tag: String,
    pub domain: String,
}

/// Who last changed the document and when.
///
/// Serialized as `_metadata` with the manager's key spelling; the timestamp
/// is opaque text so values written by other tools survive a round trip.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Metadata {
    #[serde(rename = "updatedAt", default)]
    pub updated_at: String,

    #[serde(rename = "UpdatedBy", default)]
    pub updated_by: String,
}

/// Protocol families the node knows how to validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Vmess,
    Vless,
    Trojan,
    Shadowsocks,
    /// Engine plumbing (direct, blackhole, loopback, ...). Carries no credentials.
    Infrastructure,
    /// Anything else. Passed through unvalidated.
    Unknown,
}

impl Protocol {
    pub fn from_name(name: &str) -> Self {
        match name {
            "vmess" => Protocol::Vmess,
            "vless" => Protocol::Vless,
            "trojan" => Protocol::Trojan,
            "shadowsocks" => Protocol::Shadowsocks,
            "freedom" | "blackhole" | "dokodemo-door" | "loopback" | "dns" | "direct"
            | "reject" => Protocol::Infrastructure,
            _ => Protocol::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Vmess => "vmess",
            Protocol::Vless => "vless",
            Protocol::Trojan => "trojan",
            Protocol::Shadowsocks => "shadowsocks",
            Protocol::Infrastructure => "infrastructure",
            Protocol::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProxyConfig {
    /// Canonical serialized form: object keys sorted, no whitespace.
    ///
    /// Lists keep their order; inbound, outbound and rule order is
    /// meaningful to the engine.
    pub fn canonical(&self) -> String {
        match serde_json::to_value(self) {
            Ok(value) => canonicalize(value).to_string(),
            // Only reachable with non-string map keys, which the model never has.
            Err(e) => format!("<unserializable: {}>", e),
        }
    }

    /// Equality of the canonical serialized forms.
    pub fn equals(&self, other: &ProxyConfig) -> bool {
        self.canonical() == other.canonical()
    }

    pub fn find_inbound(&self, tag: &str) -> Option<&Inbound> {
        self.inbounds.iter().find(|i| i.tag == tag)
    }

    pub fn find_outbound(&self, tag: &str) -> Option<&Outbound> {
        self.outbounds.iter().find(|o| o.tag == tag)
    }

    pub fn find_balancer(&self, tag: &str) -> Option<&Balancer> {
        self.routing.balancers.iter().find(|b| b.tag == tag)
    }

    pub fn api_inbound(&self) -> Option<&Inbound> {
        self.find_inbound(API_TAG)
    }

    /// Port of the statistics/control listener, if declared.
    pub fn api_port(&self) -> Option<u16> {
        self.api_inbound().map(|i| i.port)
    }

    /// Record who changed the document, timestamped in Unix seconds.
    pub fn stamp(&mut self, author: &str) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.metadata = Some(Metadata {
            updated_at: now.to_string(),
            updated_by: author.to_string(),
        });
    }
}

/// Rebuild every object with sorted keys, regardless of the map backing
/// serde_json was compiled with.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
