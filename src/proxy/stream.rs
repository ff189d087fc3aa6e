//! Transport + security envelope shared by inbounds and outbounds.
//!
//! # Responsibilities
//! - Model the six transports and the three security modes
//! - Build transport fragments with the engine's defaults filled in
//! - Attach TLS or REALITY to any transport fragment
//!
//! # Design Decisions
//! - Exactly one transport block is populated, matching `network`
//! - TLS and REALITY blocks are mutually exclusive; attaching one clears the other
//! - Security builders never touch transport fields, so any transport
//!   composes with any security mode

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Stream framing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Network {
    #[default]
    #[serde(rename = "tcp", alias = "raw")]
    Tcp,
    #[serde(rename = "ws", alias = "websocket")]
    Ws,
    #[serde(rename = "grpc")]
    Grpc,
    #[serde(rename = "kcp", alias = "mkcp")]
    Kcp,
    #[serde(rename = "httpupgrade")]
    HttpUpgrade,
    #[serde(rename = "xhttp", alias = "splithttp")]
    Xhttp,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Tcp => "tcp",
            Network::Ws => "ws",
            Network::Grpc => "grpc",
            Network::Kcp => "kcp",
            Network::HttpUpgrade => "httpupgrade",
            Network::Xhttp => "xhttp",
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encryption layer applied atop the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Security {
    #[default]
    #[serde(rename = "", alias = "none")]
    None,
    #[serde(rename = "tls")]
    Tls,
    #[serde(rename = "reality")]
    Reality,
}

impl Security {
    pub fn is_none(&self) -> bool {
        matches!(self, Security::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Security::None => "",
            Security::Tls => "tls",
            Security::Reality => "reality",
        }
    }
}

impl std::fmt::Display for Security {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Security::None => f.write_str("none"),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSettings {
    #[serde(default)]
    pub network: Network,

    #[serde(default, skip_serializing_if = "Security::is_none")]
    pub security: Security,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tcp_settings: Option<TcpSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws_settings: Option<WsSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_settings: Option<GrpcSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kcp_settings: Option<KcpSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub httpupgrade_settings: Option<HttpUpgradeSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xhttp_settings: Option<XhttpSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_settings: Option<TlsSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reality_settings: Option<RealitySettings>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TcpSettings {
    #[serde(default)]
    pub header: HeaderType,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HeaderType {
    #[serde(rename = "type", default = "default_header_type")]
    pub kind: String,
}

impl Default for HeaderType {
    fn default() -> Self {
        Self {
            kind: default_header_type(),
        }
    }
}

fn default_header_type() -> String {
    "none".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct WsSettings {
    #[serde(default)]
    pub path: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrpcSettings {
    #[serde(default)]
    pub service_name: String,

    #[serde(default)]
    pub multi_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KcpSettings {
    pub mtu: u32,
    pub tti: u32,
    pub uplink_capacity: u32,
    pub downlink_capacity: u32,
    pub congestion: bool,
    pub read_buffer_size: u32,
    pub write_buffer_size: u32,
    #[serde(default)]
    pub header: HeaderType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub seed: String,
}

impl Default for KcpSettings {
    fn default() -> Self {
        Self {
            mtu: 1350,
            tti: 50,
            uplink_capacity: 5,
            downlink_capacity: 20,
            congestion: false,
            read_buffer_size: 2,
            write_buffer_size: 2,
            header: HeaderType::default(),
            seed: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct HttpUpgradeSettings {
    #[serde(default)]
    pub path: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct XhttpSettings {
    #[serde(default)]
    pub path: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,

    #[serde(default = "default_xhttp_mode")]
    pub mode: String,
}

fn default_xhttp_mode() -> String {
    "auto".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsSettings {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server_name: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alpn: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub certificates: Vec<Certificate>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fingerprint: String,

    #[serde(default)]
    pub allow_insecure: bool,
}

impl TlsSettings {
    /// Listener side: serve the given certificate pair.
    pub fn server(server_name: &str, certificate_file: &str, key_file: &str) -> Self {
        Self {
            server_name: server_name.to_string(),
            alpn: vec!["h2".to_string(), "http/1.1".to_string()],
            certificates: vec![Certificate {
                certificate_file: certificate_file.to_string(),
                key_file: key_file.to_string(),
            }],
            ..Default::default()
        }
    }

    /// Dialer side: verify `server_name`, mimic a browser fingerprint.
    pub fn client(server_name: &str, fingerprint: &str) -> Self {
        Self {
            server_name: server_name.to_string(),
            fingerprint: fingerprint.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub certificate_file: String,
    pub key_file: String,
}

/// REALITY block. Server-side fields and client-side fields share one shape;
/// unused ones stay empty and are not emitted.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealitySettings {
    #[serde(default)]
    pub show: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dest: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub server_names: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub private_key: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub short_ids: Vec<String>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub server_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub public_key: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub short_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub fingerprint: String,
}

impl RealitySettings {
    pub fn server(dest: &str, server_names: &[&str], private_key: &str, short_ids: &[&str]) -> Self {
        Self {
            dest: dest.to_string(),
            server_names: server_names.iter().map(|s| s.to_string()).collect(),
            private_key: private_key.to_string(),
            short_ids: short_ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn client(server_name: &str, public_key: &str, short_id: &str, fingerprint: &str) -> Self {
        Self {
            server_name: server_name.to_string(),
            public_key: public_key.to_string(),
            short_id: short_id.to_string(),
            fingerprint: fingerprint.to_string(),
            ..Default::default()
        }
    }

    /// Name to verify if this block is ever downgraded to plain TLS.
    pub fn primary_server_name(&self) -> &str {
        if !self.server_name.is_empty() {
            &self.server_name
        } else {
            self.server_names.first().map(String::as_str).unwrap_or_default()
        }
    }
}

impl StreamSettings {
    /// Attach TLS, replacing any REALITY block. Transport fields are untouched.
    pub fn with_tls(mut self, tls: TlsSettings) -> Self {
        self.security = Security::Tls;
        self.tls_settings = Some(tls);
        self.reality_settings = None;
        self
    }

    /// Attach REALITY, replacing any TLS block. Transport fields are untouched.
    pub fn with_reality(mut self, reality: RealitySettings) -> Self {
        self.security = Security::Reality;
        self.reality_settings = Some(reality);
        self.tls_settings = None;
        self
    }

    /// Drop every transport block, keeping security as is.
    pub fn clear_transport(&mut self) {
        self.tcp_settings = None;
        self.ws_settings = None;
        self.grpc_settings = None;
        self.kcp_settings = None;
        self.httpupgrade_settings = None;
        self.xhttp_settings = None;
    }

    /// Networks whose settings block is populated.
    pub fn populated_transports(&self) -> Vec<Network> {
        let mut populated = Vec::new();
        if self.tcp_settings.is_some() {
            populated.push(Network::Tcp);
        }
        if self.ws_settings.is_some() {
            populated.push(Network::Ws);
        }
        if self.grpc_settings.is_some() {
            populated.push(Network::Grpc);
        }
        if self.kcp_settings.is_some() {
            populated.push(Network::Kcp);
        }
        if self.httpupgrade_settings.is_some() {
            populated.push(Network::HttpUpgrade);
        }
        if self.xhttp_settings.is_some() {
            populated.push(Network::Xhttp);
        }
        populated
    }
}

pub fn make_tcp_stream_settings() -> StreamSettings {
    StreamSettings {
        network: Network::Tcp,
        tcp_settings: Some(TcpSettings {
            header: HeaderType::default(),
        }),
        ..Default::default()
    }
}

pub fn make_websocket_stream_settings(path: &str, host: &str) -> StreamSettings {
    StreamSettings {
        network: Network::Ws,
        ws_settings: Some(WsSettings {
            path: path.to_string(),
            host: host.to_string(),
            headers: BTreeMap::new(),
        }),
        ..Default::default()
    }
}

pub fn make_grpc_stream_settings(service_name: &str) -> StreamSettings {
    StreamSettings {
        network: Network::Grpc,
        grpc_settings: Some(GrpcSettings {
            service_name: service_name.to_string(),
            multi_mode: false,
        }),
        ..Default::default()
    }
}

/// mKCP with the engine's stock tuning. An empty `seed` disables obfuscation.
pub fn make_kcp_stream_settings(seed: &str) -> StreamSettings {
    StreamSettings {
        network: Network::Kcp,
        kcp_settings: Some(KcpSettings {
            seed: seed.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn make_httpupgrade_stream_settings(path: &str, host: &str) -> StreamSettings {
    StreamSettings {
        network: Network::HttpUpgrade,
        httpupgrade_settings: Some(HttpUpgradeSettings {
            path: path.to_string(),
            host: host.to_string(),
        }),
        ..Default::default()
    }
}

pub fn make_xhttp_stream_settings(path: &str, host: &str, mode: &str) -> StreamSettings {
    let mode = if mode.is_empty() {
        default_xhttp_mode()
    } else {
        mode.to_string()
    };
    StreamSettings {
        network: Network::Xhttp,
        xhttp_settings: Some(XhttpSettings {
            path: path.to_string(),
            host: host.to_string(),
            mode,
        }),
        ..Default::default()
    }
}

pub fn add_tls(stream: StreamSettings, tls: TlsSettings) -> StreamSettings {
    stream.with_tls(tls)
}

pub fn add_reality(stream: StreamSettings, reality: RealitySettings) -> StreamSettings {
    stream.with_reality(reality)
}
