//! Protocol × transport × security legality.
//!
//! | Protocol    | Transports       | Security        | Fallback      |
//! |-------------|------------------|-----------------|---------------|
//! | VMess       | all but xhttp    | none, tls       | ws / tls      |
//! | VLESS       | all              | all             | -             |
//! | Trojan      | tcp only         | none, tls       | tcp / tls     |
//! | Shadowsocks | all but xhttp    | none, tls       | ws / tls      |
//!
//! `check_compatible` fails closed and guards documents supplied by callers.
//! `sanitize` repairs programmatically generated documents instead of
//! rejecting them and is idempotent.

use thiserror::Error;

use crate::proxy::model::{Protocol, ProxyConfig};
use crate::proxy::stream::{
    make_tcp_stream_settings, HttpUpgradeSettings, Network, Security, StreamSettings, TlsSettings,
    WsSettings,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IncompatibleError {
    #[error("{protocol} does not support transport '{network}'")]
    Transport { protocol: Protocol, network: Network },

    #[error("{protocol} does not support security '{security}'")]
    Security { protocol: Protocol, security: Security },

    #[error("{tag}: {source}")]
    InConfig {
        tag: String,
        source: Box<IncompatibleError>,
    },
}

fn transport_allowed(protocol: Protocol, network: Network) -> bool {
    match protocol {
        Protocol::Vmess | Protocol::Shadowsocks => network != Network::Xhttp,
        Protocol::Trojan => network == Network::Tcp,
        Protocol::Vless | Protocol::Infrastructure | Protocol::Unknown => true,
    }
}

fn security_allowed(protocol: Protocol, security: Security) -> bool {
    match protocol {
        Protocol::Vmess | Protocol::Shadowsocks | Protocol::Trojan => security != Security::Reality,
        Protocol::Vless | Protocol::Infrastructure | Protocol::Unknown => true,
    }
}

fn fallback_transport(protocol: Protocol) -> Network {
    match protocol {
        Protocol::Trojan => Network::Tcp,
        _ => Network::Ws,
    }
}

/// Strict check; the first violation wins.
pub fn check_compatible(protocol: &str, stream: &StreamSettings) -> Result<(), IncompatibleError> {
    let protocol = Protocol::from_name(protocol);
    if !transport_allowed(protocol, stream.network) {
        return Err(IncompatibleError::Transport {
            protocol,
            network: stream.network,
        });
    }
    if !security_allowed(protocol, stream.security) {
        return Err(IncompatibleError::Security {
            protocol,
            security: stream.security,
        });
    }
    Ok(())
}

/// Check every inbound and outbound that carries a stream envelope.
pub fn check_config(config: &ProxyConfig) -> Result<(), IncompatibleError> {
    let inbounds = config
        .inbounds
        .iter()
        .map(|i| (&i.tag, &i.protocol, &i.stream_settings));
    let outbounds = config
        .outbounds
        .iter()
        .map(|o| (&o.tag, &o.protocol, &o.stream_settings));

    for (tag, protocol, stream) in inbounds.chain(outbounds) {
        if let Some(stream) = stream {
            check_compatible(protocol, stream).map_err(|e| IncompatibleError::InConfig {
                tag: tag.clone(),
                source: Box::new(e),
            })?;
        }
    }
    Ok(())
}

/// Rewrite an illegal envelope into the nearest legal one.
pub fn sanitize(protocol: &str, stream: StreamSettings) -> StreamSettings {
    let protocol = Protocol::from_name(protocol);
    let mut stream = stream;

    if !transport_allowed(protocol, stream.network) {
        let (path, host) = carried_path_and_host(&stream);
        let target = fallback_transport(protocol);
        tracing::debug!(
            protocol = %protocol,
            from = %stream.network,
            to = %target,
            "Rewriting disallowed transport"
        );
        stream.clear_transport();
        match target {
            Network::Ws => {
                stream.network = Network::Ws;
                stream.ws_settings = Some(WsSettings {
                    path,
                    host,
                    ..Default::default()
                });
            }
            _ => {
                let tcp = make_tcp_stream_settings();
                stream.network = tcp.network;
                stream.tcp_settings = tcp.tcp_settings;
            }
        }
    }

    if !security_allowed(protocol, stream.security) {
        tracing::debug!(
            protocol = %protocol,
            from = %stream.security,
            "Rewriting disallowed security to tls"
        );
        let tls = match stream.reality_settings.take() {
            Some(reality) => TlsSettings {
                server_name: reality.primary_server_name().to_string(),
                fingerprint: reality.fingerprint.clone(),
                ..Default::default()
            },
            None => TlsSettings::default(),
        };
        stream = stream.with_tls(tls);
    }

    stream
}

/// Apply [`sanitize`] to every envelope in a document.
pub fn sanitize_config(config: ProxyConfig) -> ProxyConfig {
    let mut config = config;
    for inbound in &mut config.inbounds {
        if let Some(stream) = inbound.stream_settings.take() {
            inbound.stream_settings = Some(sanitize(&inbound.protocol, stream));
        }
    }
    for outbound in &mut config.outbounds {
        if let Some(stream) = outbound.stream_settings.take() {
            outbound.stream_settings = Some(sanitize(&outbound.protocol, stream));
        }
    }
    config
}

fn carried_path_and_host(stream: &StreamSettings) -> (String, String) {
    if let Some(x) = &stream.xhttp_settings {
        return (x.path.clone(), x.host.clone());
    }
    if let Some(ws) = &stream.ws_settings {
        return (ws.path.clone(), ws.host.clone());
    }
    if let Some(HttpUpgradeSettings { path, host }) = &stream.httpupgrade_settings {
        return (path.clone(), host.clone());
    }
    ("/".to_string(), String::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::builders::{base_config, make_trojan_inbound, make_vmess_outbound};
    use crate::proxy::model::Log;
    use crate::proxy::stream::*;

    fn stream(network: Network, security: Security) -> StreamSettings {
        StreamSettings {
            network,
            security,
            ..Default::default()
        }
    }

    #[test]
    fn test_trojan_requires_tcp() {
        assert!(check_compatible("trojan", &stream(Network::Ws, Security::None)).is_err());
        assert!(check_compatible("trojan", &stream(Network::Tcp, Security::Tls)).is_ok());
        assert!(check_compatible("trojan", &stream(Network::Tcp, Security::None)).is_ok());
        assert!(check_compatible("trojan", &stream(Network::Tcp, Security::Reality)).is_err());
    }

    #[test]
    fn test_vless_has_no_restrictions() {
        assert!(check_compatible("vless", &stream(Network::Xhttp, Security::Reality)).is_ok());
        assert!(check_compatible("vless", &stream(Network::Kcp, Security::Tls)).is_ok());
    }

    #[test]
    fn test_vmess_and_shadowsocks_rules() {
        for protocol in ["vmess", "shadowsocks"] {
            let err = check_compatible(protocol, &stream(Network::Xhttp, Security::None)).unwrap_err();
            assert!(matches!(err, IncompatibleError::Transport { network: Network::Xhttp, .. }));

            let err = check_compatible(protocol, &stream(Network::Grpc, Security::Reality)).unwrap_err();
            assert!(matches!(err, IncompatibleError::Security { security: Security::Reality, .. }));

            assert!(check_compatible(protocol, &stream(Network::Grpc, Security::Tls)).is_ok());
        }
    }

    #[test]
    fn test_unknown_protocol_passes() {
        assert!(check_compatible("hysteria2", &stream(Network::Xhttp, Security::Reality)).is_ok());
    }

    #[test]
    fn test_error_message() {
        let err = check_compatible("trojan", &stream(Network::Ws, Security::None)).unwrap_err();
        assert_eq!(err.to_string(), "trojan does not support transport 'ws'");
    }

    #[test]
    fn test_sanitize_vmess_reality_to_tls() {
        let input = add_reality(
            make_websocket_stream_settings("/vm", ""),
            RealitySettings::client("www.example.com", "pub", "ab", "chrome"),
        );
        let once = sanitize("vmess", input);

        assert_eq!(once.security, Security::Tls);
        assert!(once.reality_settings.is_none());
        assert_eq!(once.tls_settings.as_ref().unwrap().server_name, "www.example.com");
        assert_eq!(once.network, Network::Ws);

        let twice = sanitize("vmess", once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_sanitize_vmess_xhttp_to_ws() {
        let once = sanitize("vmess", make_xhttp_stream_settings("/x", "h.example", ""));

        assert_eq!(once.network, Network::Ws);
        assert!(once.xhttp_settings.is_none());
        let ws = once.ws_settings.as_ref().unwrap();
        assert_eq!(ws.path, "/x");
        assert_eq!(ws.host, "h.example");

        assert_eq!(sanitize("vmess", once.clone()), once);
    }

    #[test]
    fn test_sanitize_trojan_to_tcp_tls() {
        let input = add_reality(
            make_grpc_stream_settings("svc"),
            RealitySettings::server("a:443", &["a"], "priv", &[""]),
        );
        let out = sanitize("trojan", input);

        assert_eq!(out.network, Network::Tcp);
        assert!(out.grpc_settings.is_none());
        assert!(out.tcp_settings.is_some());
        assert_eq!(out.security, Security::Tls);
        assert!(check_compatible("trojan", &out).is_ok());
    }

    #[test]
    fn test_sanitize_leaves_legal_untouched() {
        let input = add_reality(
            make_xhttp_stream_settings("/x", "", "auto"),
            RealitySettings::client("a", "k", "", "chrome"),
        );
        assert_eq!(sanitize("vless", input.clone()), input);
    }

    #[test]
    fn test_check_config_names_offending_tag() {
        let mut config = base_config(10085, Log::default());
        config.inbounds.push(
            make_trojan_inbound("tj", 443, "u@x", "pw")
                .with_stream(make_websocket_stream_settings("/", "")),
        );

        let err = check_config(&config).unwrap_err();
        assert_eq!(err.to_string(), "tj: trojan does not support transport 'ws'");

        let repaired = sanitize_config(config);
        assert!(check_config(&repaired).is_ok());
    }

    #[test]
    fn test_check_config_covers_outbounds() {
        let mut config = base_config(10085, Log::default());
        config.outbounds.push(
            make_vmess_outbound("vm", "a.example", 443, "5783a3e7-e373-51cd-8642-c83782b807c5")
                .with_stream(make_xhttp_stream_settings("/", "", "")),
        );
        assert!(check_config(&config).is_err());
    }
}
