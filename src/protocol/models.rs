//! Gateway request and response bodies.

use crate::TunnelgateError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gateway endpoint paths.
pub mod paths {
    /// One-time code redemption.
    pub const REDEEM: &str = "/redeem";
    /// Acquire the single-device usage lock.
    pub const ACQUIRE_LOCK: &str = "/acquireLock";
    /// Release the usage lock.
    pub const RELEASE_LOCK: &str = "/releaseLock";
    /// Keep the usage lock alive.
    pub const HEARTBEAT: &str = "/heartbeat";
    /// Fetch the current connection descriptor for a code.
    pub const FETCH_LATEST_DESCRIPTOR: &str = "/fetchLatestDescriptor";
}

/// Proxy connection URI handed out by the gateway.
///
/// The descriptor carries credentials; its `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionDescriptor(String);

impl ConnectionDescriptor {
    /// Wrap a URI string.
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    /// The raw URI.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = self.0.split("://").next().unwrap_or_default();
        write!(f, "ConnectionDescriptor({}://<redacted>)", scheme)
    }
}

/// Body for `/redeem` and `/acquireLock`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceClaim<'a> {
    /// Redeem code.
    pub code: &'a str,
    /// Hashed device identifier.
    pub device_id: &'a str,
    /// Platform tag.
    pub platform: &'a str,
}

/// Body for `/releaseLock` and `/heartbeat`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRef<'a> {
    /// Redeem code.
    pub code: &'a str,
    /// Hashed device identifier.
    pub device_id: &'a str,
}

/// Body for `/fetchLatestDescriptor`.
#[derive(Debug, Clone, Serialize)]
pub struct CodeRef<'a> {
    /// Redeem code.
    pub code: &'a str,
}

/// Response carrying a connection descriptor.
///
/// Older gateways name the field `vless`.
#[derive(Debug, Clone, Deserialize)]
pub struct DescriptorResponse {
    /// The connection URI.
    #[serde(alias = "vless")]
    pub descriptor: String,
}

impl DescriptorResponse {
    /// Extract the descriptor, rejecting an empty value.
    pub fn into_descriptor(self) -> Result<ConnectionDescriptor, TunnelgateError> {
        let uri = self.descriptor.trim();
        if uri.is_empty() {
            return Err(TunnelgateError::DecodeError(
                "gateway returned an empty descriptor".to_string(),
            ));
        }
        Ok(ConnectionDescriptor::new(uri))
    }
}

/// Optional acknowledgement body on lock and heartbeat endpoints.
///
/// An empty response body decodes to the default (all fields absent).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GatewayAck {
    /// `false` means the gateway refused the request despite a 2xx status.
    #[serde(default)]
    pub ok: Option<bool>,

    /// `false` on a heartbeat means the lock is no longer held by this device.
    #[serde(default)]
    pub allowed: Option<bool>,

    /// Human-readable detail.
    #[serde(default)]
    pub message: Option<String>,
}

impl GatewayAck {
    /// Whether the gateway explicitly refused the request.
    pub fn is_refused(&self) -> bool {
        self.ok == Some(false)
    }
}

/// Parse a descriptor response body.
pub fn parse_descriptor_response(body: &[u8]) -> Result<ConnectionDescriptor, TunnelgateError> {
    let response: DescriptorResponse = serde_json::from_slice(body).map_err(|e| {
        TunnelgateError::DecodeError(format!("Failed to parse descriptor response: {}", e))
    })?;
    response.into_descriptor()
}

/// Parse an acknowledgement body; blank bodies are an empty ack.
pub fn parse_ack(body: &[u8]) -> Result<GatewayAck, TunnelgateError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(GatewayAck::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| TunnelgateError::DecodeError(format!("Failed to parse ack: {}", e)))
}
