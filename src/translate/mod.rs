//! Connection descriptor to engine configuration translation.
//!
//! A descriptor looks like:
//! ```text
//! vless://<uuid>@<host>[:<port>]?sni=<name>&pbk=<key>&sid=<id>&flow=<mode>&fp=<fingerprint>
//! ```
//! Translation is a pure function of the URI: no I/O, no clock, no randomness.

pub mod document;

use crate::TunnelgateError;
use document::{
    DnsSection, DnsServer, EngineConfig, Inbound, LogSection, Outbound, RealitySettings,
    RouteRule, RouteSection, TaggedOutbound, TlsSettings, TunInbound, UtlsSettings,
    VlessOutbound, BLOCK_TAG, DIRECT_TAG, DNS_TAG, PROXY_TAG,
};
use percent_encoding::percent_decode_str;
use url::{Host, Url};

/// Descriptor scheme accepted by default.
pub const DEFAULT_SCHEME: &str = "vless";

/// Port applied when the descriptor omits one.
pub const DEFAULT_PORT: u16 = 443;

/// uTLS fingerprint applied when the descriptor omits `fp`.
pub const DEFAULT_FINGERPRINT: &str = "chrome";

/// Fields extracted from a connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyEndpoint {
    /// Upstream host (IPv6 without brackets).
    pub host: String,
    /// Upstream port.
    pub port: u16,
    /// User credential.
    pub uuid: String,
    /// Server name indication (`sni`, falling back to `host`).
    pub server_name: String,
    /// Reality public key (`pbk`).
    pub public_key: String,
    /// Reality short id (`sid`).
    pub short_id: String,
    /// Flow-control mode (`flow`).
    pub flow: String,
    /// uTLS fingerprint (`fp`).
    pub fingerprint: String,
}

/// Translates connection descriptors into engine configurations.
#[derive(Debug, Clone)]
pub struct ConfigTranslator {
    scheme: String,
}

impl Default for ConfigTranslator {
    fn default() -> Self {
        Self::new(DEFAULT_SCHEME)
    }
}

impl ConfigTranslator {
    /// Create a translator accepting descriptors with the given scheme.
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
        }
    }

    /// The accepted scheme.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Parse a descriptor into its endpoint fields.
    ///
    /// # Errors
    /// `ParseError` if the URI is malformed, uses another scheme, or lacks a
    /// host or credential.
    pub fn parse(&self, uri: &str) -> Result<ProxyEndpoint, TunnelgateError> {
        let url = Url::parse(uri.trim())
            .map_err(|e| TunnelgateError::ParseError(format!("invalid URI: {}", e)))?;

        if url.scheme() != self.scheme {
            return Err(TunnelgateError::ParseError(format!(
                "expected {}:// descriptor, got {}://",
                self.scheme,
                url.scheme()
            )));
        }

        let host = match url.host() {
            Some(Host::Ipv6(addr)) => addr.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            _ => return Err(TunnelgateError::ParseError("missing host".to_string())),
        };

        let uuid = percent_decode_str(url.username())
            .decode_utf8()
            .map_err(|e| TunnelgateError::ParseError(format!("invalid credential: {}", e)))?;
        if uuid.is_empty() {
            return Err(TunnelgateError::ParseError(
                "missing credential (uuid)".to_string(),
            ));
        }

        let query = |key: &str| -> Option<String> {
            url.query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
                .filter(|v| !v.is_empty())
        };

        Ok(ProxyEndpoint {
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            uuid: uuid.to_string(),
            server_name: query("sni").or_else(|| query("host")).unwrap_or_default(),
            public_key: query("pbk").unwrap_or_default(),
            short_id: query("sid").unwrap_or_default(),
            flow: query("flow").unwrap_or_default(),
            fingerprint: query("fp").unwrap_or_else(|| DEFAULT_FINGERPRINT.to_string()),
        })
    }

    /// Translate a descriptor into an engine configuration.
    pub fn translate(&self, uri: &str) -> Result<EngineConfig, TunnelgateError> {
        self.parse(uri).map(|endpoint| build_engine_config(&endpoint))
    }
}

/// Translate a descriptor with the default scheme.
pub fn translate(uri: &str) -> Result<EngineConfig, TunnelgateError> {
    ConfigTranslator::default().translate(uri)
}

/// Build the engine document around a parsed endpoint.
pub fn build_engine_config(endpoint: &ProxyEndpoint) -> EngineConfig {
    let dns_server = |address: &str| DnsServer {
        address: address.to_string(),
        strategy: "ipv4_only".to_string(),
        detour: PROXY_TAG.to_string(),
    };

    EngineConfig {
        log: LogSection {
            level: "info".to_string(),
        },
        dns: DnsSection {
            servers: vec![
                dns_server("https://1.1.1.1/dns-query"),
                dns_server("8.8.8.8"),
            ],
        },
        inbounds: vec![Inbound::Tun(TunInbound {
            tag: "tun-in".to_string(),
            interface_name: "svpn".to_string(),
            inet4_address: "172.18.0.1/30".to_string(),
            mtu: 1500,
            auto_route: true,
            strict_route: false,
            endpoint_independent_nat: true,
            stack: "system".to_string(),
            sniff: true,
        })],
        outbounds: vec![
            Outbound::Vless(VlessOutbound {
                tag: PROXY_TAG.to_string(),
                server: endpoint.host.clone(),
                server_port: endpoint.port,
                uuid: endpoint.uuid.clone(),
                flow: endpoint.flow.clone(),
                tls: TlsSettings {
                    enabled: true,
                    server_name: endpoint.server_name.clone(),
                    reality: RealitySettings {
                        enabled: true,
                        public_key: endpoint.public_key.clone(),
                        short_id: endpoint.short_id.clone(),
                    },
                    utls: UtlsSettings {
                        enabled: true,
                        fingerprint: endpoint.fingerprint.clone(),
                    },
                },
                packet_encoding: "xudp".to_string(),
            }),
            Outbound::Dns(TaggedOutbound::new(DNS_TAG)),
            Outbound::Direct(TaggedOutbound::new(DIRECT_TAG)),
            Outbound::Block(TaggedOutbound::new(BLOCK_TAG)),
        ],
        route: RouteSection {
            final_outbound: PROXY_TAG.to_string(),
            auto_detect_interface: true,
            rules: vec![RouteRule {
                protocol: vec!["dns".to_string()],
                outbound: DNS_TAG.to_string(),
            }],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    const FULL: &str = "vless://uuid-1@host.example:8443?sni=example.com&pbk=KEY&sid=01&flow=xtls-rprx-vision&fp=firefox";

    fn json(config: &EngineConfig) -> Value {
        serde_json::from_str(&config.to_json().unwrap()).unwrap()
    }

    #[test]
    fn test_parse_full_descriptor() {
        let endpoint = ConfigTranslator::default().parse(FULL).unwrap();
        assert_eq!(
            endpoint,
            ProxyEndpoint {
                host: "host.example".to_string(),
                port: 8443,
                uuid: "uuid-1".to_string(),
                server_name: "example.com".to_string(),
                public_key: "KEY".to_string(),
                short_id: "01".to_string(),
                flow: "xtls-rprx-vision".to_string(),
                fingerprint: "firefox".to_string(),
            }
        );
    }

    #[test]
    fn test_default_port_only_when_absent() {
        let endpoint = ConfigTranslator::default()
            .parse("vless://u@host.example?sni=a")
            .unwrap();
        assert_eq!(endpoint.port, DEFAULT_PORT);

        let endpoint = ConfigTranslator::default()
            .parse("vless://u@host.example:2053")
            .unwrap();
        assert_eq!(endpoint.port, 2053);

        // Explicit 443 is kept as-is too.
        let endpoint = ConfigTranslator::default()
            .parse("vless://u@host.example:443")
            .unwrap();
        assert_eq!(endpoint.port, 443);
    }

    #[test]
    fn test_optional_params_default_empty() {
        let endpoint = ConfigTranslator::default().parse("vless://u@h").unwrap();
        assert_eq!(endpoint.server_name, "");
        assert_eq!(endpoint.public_key, "");
        assert_eq!(endpoint.short_id, "");
        assert_eq!(endpoint.flow, "");
        assert_eq!(endpoint.fingerprint, DEFAULT_FINGERPRINT);
    }

    #[test]
    fn test_sni_falls_back_to_host_param() {
        let endpoint = ConfigTranslator::default()
            .parse("vless://u@h?host=cdn.example")
            .unwrap();
        assert_eq!(endpoint.server_name, "cdn.example");

        let endpoint = ConfigTranslator::default()
            .parse("vless://u@h?host=cdn.example&sni=real.example")
            .unwrap();
        assert_eq!(endpoint.server_name, "real.example");
    }

    #[test]
    fn test_missing_credential_is_parse_error() {
        let result = translate("vless://host.example:443?sni=a");
        assert!(matches!(result, Err(TunnelgateError::ParseError(_))));

        let result = translate("vless://@host.example:443");
        assert!(matches!(result, Err(TunnelgateError::ParseError(_))));
    }

    #[test]
    fn test_credential_is_percent_decoded() {
        let endpoint = ConfigTranslator::default()
            .parse("vless://ab%2Bcd@host:443")
            .unwrap();
        assert_eq!(endpoint.uuid, "ab+cd");

        let result = ConfigTranslator::default().parse("vless://%FF%FE@host:443");
        assert!(matches!(result, Err(TunnelgateError::ParseError(_))));
    }

    #[test]
    fn test_wrong_scheme_is_parse_error() {
        let result = translate("vmess://u@host.example:443");
        assert!(matches!(result, Err(TunnelgateError::ParseError(_))));

        let result = translate("https://u@host.example:443");
        assert!(matches!(result, Err(TunnelgateError::ParseError(_))));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        assert!(matches!(translate(""), Err(TunnelgateError::ParseError(_))));
        assert!(matches!(translate("not a uri"), Err(TunnelgateError::ParseError(_))));
        assert!(matches!(
            translate("vless://u@host:99999"),
            Err(TunnelgateError::ParseError(_))
        ));
    }

    #[test]
    fn test_missing_host_is_parse_error() {
        let result = translate("vless://u@:443");
        assert!(matches!(result, Err(TunnelgateError::ParseError(_))));
    }

    #[test]
    fn test_custom_scheme() {
        let translator = ConfigTranslator::new("PROXY");
        assert_eq!(translator.scheme(), "proxy");
        let config = translator
            .translate("proxy://uuid@host:443?sni=example.com&pbk=KEY&sid=01&flow=xtls")
            .unwrap();
        let outbound = config.proxy_outbound().unwrap();
        assert_eq!(outbound.server, "host");
        assert_eq!(outbound.server_port, 443);
        assert_eq!(outbound.uuid, "uuid");
        assert_eq!(outbound.tls.server_name, "example.com");
        assert_eq!(outbound.flow, "xtls");

        assert!(translator.translate("vless://uuid@host:443").is_err());
    }

    #[test]
    fn test_ipv6_host_unbracketed() {
        let endpoint = ConfigTranslator::default()
            .parse("vless://u@[2001:db8::1]:443")
            .unwrap();
        assert_eq!(endpoint.host, "2001:db8::1");
    }

    #[test]
    fn test_translate_is_deterministic() {
        let a = translate(FULL).unwrap().to_json().unwrap();
        let b = translate(FULL).unwrap().to_json().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_document_structure() {
        let value = json(&translate(FULL).unwrap());

        assert_eq!(value["log"]["level"], "info");
        assert_eq!(value["dns"]["servers"][0]["detour"], "proxy");
        assert_eq!(value["inbounds"][0]["type"], "tun");
        assert_eq!(value["inbounds"][0]["auto_route"], true);

        let proxy = &value["outbounds"][0];
        assert_eq!(proxy["type"], "vless");
        assert_eq!(proxy["tag"], "proxy");
        assert_eq!(proxy["server"], "host.example");
        assert_eq!(proxy["server_port"], 8443);
        assert_eq!(proxy["uuid"], "uuid-1");
        assert_eq!(proxy["flow"], "xtls-rprx-vision");
        assert_eq!(proxy["tls"]["server_name"], "example.com");
        assert_eq!(proxy["tls"]["reality"]["public_key"], "KEY");
        assert_eq!(proxy["tls"]["reality"]["short_id"], "01");
        assert_eq!(proxy["tls"]["utls"]["fingerprint"], "firefox");
        assert_eq!(proxy["packet_encoding"], "xudp");

        let types: Vec<&str> = value["outbounds"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["type"].as_str().unwrap())
            .collect();
        assert_eq!(types, vec!["vless", "dns", "direct", "block"]);

        assert_eq!(value["route"]["final"], "proxy");
        assert_eq!(value["route"]["rules"][0]["protocol"][0], "dns");
        assert_eq!(value["route"]["rules"][0]["outbound"], "dns-out");
    }

    #[test]
    fn test_query_values_cannot_inject_json() {
        // Percent-decoded quote and brace must stay inside the string value.
        let config = translate("vless://u@h?sni=a%22%2C%22evil%22%3A%7B&pbk=k").unwrap();
        let value = json(&config);
        assert_eq!(value["outbounds"][0]["tls"]["server_name"], "a\",\"evil\":{");
        assert!(value["outbounds"][0].get("evil").is_none());
    }
}
