//! Typed sing-box configuration document.
//!
//! Field order in these structs is the serialized key order, so a given
//! [`EngineConfig`] always renders to the same bytes.

use crate::TunnelgateError;
use serde::Serialize;

/// Tag of the proxy outbound; the route's default target.
pub const PROXY_TAG: &str = "proxy";
/// Tag of the DNS outbound.
pub const DNS_TAG: &str = "dns-out";
/// Tag of the direct outbound.
pub const DIRECT_TAG: &str = "direct";
/// Tag of the block outbound.
pub const BLOCK_TAG: &str = "block";

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineConfig {
    /// Engine log settings.
    pub log: LogSection,
    /// DNS resolution policy.
    pub dns: DnsSection,
    /// Inbound interfaces (the tun device).
    pub inbounds: Vec<Inbound>,
    /// Outbound definitions.
    pub outbounds: Vec<Outbound>,
    /// Routing policy.
    pub route: RouteSection,
}

impl EngineConfig {
    /// Render the document as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, TunnelgateError> {
        serde_json::to_string_pretty(self).map_err(|e| {
            TunnelgateError::ConfigTranslationError(format!("Failed to serialize config: {}", e))
        })
    }

    /// The proxy outbound, if present.
    pub fn proxy_outbound(&self) -> Option<&VlessOutbound> {
        self.outbounds.iter().find_map(|o| match o {
            Outbound::Vless(v) if v.tag == PROXY_TAG => Some(v),
            _ => None,
        })
    }
}

/// `log` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogSection {
    /// Log level.
    pub level: String,
}

/// `dns` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsSection {
    /// Upstream resolvers, tried in order.
    pub servers: Vec<DnsServer>,
}

/// A single DNS upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsServer {
    /// Resolver address (DoH URL or IP).
    pub address: String,
    /// Resolution strategy.
    pub strategy: String,
    /// Outbound used to reach the resolver.
    pub detour: String,
}

/// Inbound definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Inbound {
    /// Virtual tun interface capturing system traffic.
    Tun(TunInbound),
}

/// Tun inbound settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TunInbound {
    /// Inbound tag.
    pub tag: String,
    /// OS-visible interface name.
    pub interface_name: String,
    /// Interface address with prefix.
    pub inet4_address: String,
    /// Interface MTU.
    pub mtu: u32,
    /// Install default routes.
    pub auto_route: bool,
    /// Enforce strict routing.
    pub strict_route: bool,
    /// Endpoint-independent NAT for UDP.
    pub endpoint_independent_nat: bool,
    /// Network stack implementation.
    pub stack: String,
    /// Protocol sniffing.
    pub sniff: bool,
}

/// Outbound definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outbound {
    /// VLESS proxy outbound.
    Vless(VlessOutbound),
    /// DNS hijack outbound.
    Dns(TaggedOutbound),
    /// Direct (bypass) outbound.
    Direct(TaggedOutbound),
    /// Drop outbound.
    Block(TaggedOutbound),
}

/// Outbound that only carries a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaggedOutbound {
    /// Outbound tag.
    pub tag: String,
}

impl TaggedOutbound {
    /// Create a tagged outbound.
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
        }
    }
}

/// VLESS outbound parameterized by the connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VlessOutbound {
    /// Outbound tag.
    pub tag: String,
    /// Upstream host.
    pub server: String,
    /// Upstream port.
    pub server_port: u16,
    /// User credential.
    pub uuid: String,
    /// Flow-control mode (may be empty).
    pub flow: String,
    /// TLS settings.
    pub tls: TlsSettings,
    /// UDP packet encoding.
    pub packet_encoding: String,
}

/// TLS block of the proxy outbound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TlsSettings {
    /// TLS on.
    pub enabled: bool,
    /// Server name indication.
    pub server_name: String,
    /// Reality settings.
    pub reality: RealitySettings,
    /// uTLS fingerprinting.
    pub utls: UtlsSettings,
}

/// Reality handshake parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RealitySettings {
    /// Reality on.
    pub enabled: bool,
    /// Server public key.
    pub public_key: String,
    /// Short id.
    pub short_id: String,
}

/// uTLS client fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UtlsSettings {
    /// uTLS on.
    pub enabled: bool,
    /// Fingerprint name (e.g., "chrome").
    pub fingerprint: String,
}

/// `route` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteSection {
    /// Default outbound tag.
    #[serde(rename = "final")]
    pub final_outbound: String,
    /// Bind outbounds to the default interface.
    pub auto_detect_interface: bool,
    /// Ordered routing rules.
    pub rules: Vec<RouteRule>,
}

/// Route rule matching on sniffed protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteRule {
    /// Protocols matched by this rule.
    pub protocol: Vec<String>,
    /// Target outbound tag.
    pub outbound: String,
}
