//! Reqwest-based HTTP client for the licensing gateway.
//!
//! Every request is a signed JSON `POST`. Responses are classified into
//! transport failures, non-success statuses and decode failures before any
//! caller sees them.

use crate::client::Gateway;
use crate::config::TunnelgateConfig;
use crate::crypto::signing::RequestSigner;
use crate::protocol::models::{
    parse_ack, paths, CodeRef, ConnectionDescriptor, DescriptorResponse, DeviceClaim, DeviceRef,
    GatewayAck,
};
use crate::TunnelgateError;
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Header carrying the hex HMAC signature.
pub const SIGNATURE_HEADER: &str = "X-Simple-Signature";
/// Header carrying the Unix-seconds timestamp.
pub const TIMESTAMP_HEADER: &str = "X-Simple-Timestamp";
/// Header carrying the per-request nonce.
pub const NONCE_HEADER: &str = "X-Simple-Nonce";

/// HTTP response with status and raw body.
#[derive(Debug)]
pub struct GatewayResponse {
    /// HTTP status code.
    pub status: u16,

    /// Raw response body.
    pub body: Vec<u8>,
}

impl GatewayResponse {
    fn from_response(response: Response) -> Result<Self, TunnelgateError> {
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| TunnelgateError::TransportError(format!("Failed to read body: {}", e)))?
            .to_vec();

        Ok(Self { status, body })
    }

    /// Get the body as text, replacing invalid UTF-8.
    pub fn body_lossy(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Signed JSON client for the licensing gateway.
pub struct GatewayClient {
    client: Client,
    base_url: String,
    signer: RequestSigner,
    user_agent: String,
    timeout: Duration,
}

impl GatewayClient {
    /// Create a new gateway client from config.
    pub fn new(config: &TunnelgateConfig) -> Result<Self, TunnelgateError> {
        Self::with_signer(config, RequestSigner::new(config.secret.as_bytes()))
    }

    /// Create a client with a caller-supplied signer.
    pub fn with_signer(
        config: &TunnelgateConfig,
        signer: RequestSigner,
    ) -> Result<Self, TunnelgateError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                TunnelgateError::ConfigError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.gateway_url.trim_end_matches('/').to_string(),
            signer,
            user_agent: build_user_agent(&config.platform),
            timeout: config.request_timeout,
        })
    }

    /// Issue a signed request and return the raw response.
    ///
    /// # Errors
    /// * `TransportError` - no response (connect failure, timeout)
    /// * `GatewayError` - status >= 300
    pub fn send<P: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &P,
    ) -> Result<GatewayResponse, TunnelgateError> {
        let body = serde_json::to_vec(payload).map_err(|e| {
            TunnelgateError::DecodeError(format!("Failed to serialize request: {}", e))
        })?;
        let headers = self.signer.sign("POST", path, &body);
        let url = format!("{}{}", self.base_url, path);

        tracing::debug!(path, nonce = %headers.nonce, "sending gateway request");

        let response = self
            .client
            .post(&url)
            .header(USER_AGENT, &self.user_agent)
            .header(CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, &headers.signature)
            .header(TIMESTAMP_HEADER, &headers.timestamp)
            .header(NONCE_HEADER, &headers.nonce)
            .body(body)
            .send()
            .map_err(|e| {
                TunnelgateError::TransportError(format!("Request to {} failed: {}", path, e))
            })?;

        let response = GatewayResponse::from_response(response)?;
        if response.status >= 300 {
            tracing::debug!(path, status = response.status, "gateway rejected request");
            return Err(TunnelgateError::GatewayError {
                status: response.status,
                body: response.body_lossy(),
            });
        }

        Ok(response)
    }

    /// Issue a signed request and decode the JSON response.
    ///
    /// # Errors
    /// As [`send`](Self::send), plus `DecodeError` for malformed JSON.
    pub fn call<T, P>(&self, path: &str, payload: &P) -> Result<T, TunnelgateError>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let response = self.send(path, payload)?;
        serde_json::from_slice(&response.body).map_err(|e| {
            TunnelgateError::DecodeError(format!("Failed to parse {} response: {}", path, e))
        })
    }

    /// Issue a signed request whose response is empty or an acknowledgement.
    ///
    /// A 2xx response whose ack says `"ok": false` is reported as a
    /// `GatewayError` carrying the gateway's message. Any other 2xx body,
    /// including one that is not JSON, counts as success.
    pub fn call_ack<P: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &P,
    ) -> Result<GatewayAck, TunnelgateError> {
        let response = self.send(path, payload)?;
        let ack = parse_ack(&response.body).unwrap_or_else(|e| {
            tracing::debug!(path, error = %e, "ignoring non-JSON ack body");
            GatewayAck::default()
        });
        if ack.is_refused() {
            return Err(TunnelgateError::GatewayError {
                status: response.status,
                body: ack
                    .message
                    .clone()
                    .unwrap_or_else(|| response.body_lossy()),
            });
        }
        Ok(ack)
    }

    /// Get the configured gateway base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Gateway for GatewayClient {
    fn redeem(
        &self,
        code: &str,
        device_id: &str,
        platform: &str,
    ) -> Result<ConnectionDescriptor, TunnelgateError> {
        let claim = DeviceClaim {
            code,
            device_id,
            platform,
        };
        self.call::<DescriptorResponse, _>(paths::REDEEM, &claim)?
            .into_descriptor()
    }

    fn fetch_latest_descriptor(&self, code: &str) -> Result<ConnectionDescriptor, TunnelgateError> {
        self.call::<DescriptorResponse, _>(paths::FETCH_LATEST_DESCRIPTOR, &CodeRef { code })?
            .into_descriptor()
    }

    fn acquire_lock(
        &self,
        code: &str,
        device_id: &str,
        platform: &str,
    ) -> Result<(), TunnelgateError> {
        let claim = DeviceClaim {
            code,
            device_id,
            platform,
        };
        self.call_ack(paths::ACQUIRE_LOCK, &claim).map(|_| ())
    }

    fn release_lock(&self, code: &str, device_id: &str) -> Result<(), TunnelgateError> {
        self.call_ack(paths::RELEASE_LOCK, &DeviceRef { code, device_id })
            .map(|_| ())
    }

    fn heartbeat(&self, code: &str, device_id: &str) -> Result<GatewayAck, TunnelgateError> {
        self.call_ack(paths::HEARTBEAT, &DeviceRef { code, device_id })
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Build a User-Agent string.
///
/// Format: `tunnelgate/<version> <platform>`
pub fn build_user_agent(platform: &str) -> String {
    format!("tunnelgate/{} {}", env!("CARGO_PKG_VERSION"), platform)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> TunnelgateConfig {
        TunnelgateConfig {
            gateway_url: "http://127.0.0.1:8787/".to_string(),
            secret: "secret".to_string(),
            platform: "windows".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_user_agent_format() {
        let ua = build_user_agent("macos");
        assert_eq!(ua, format!("tunnelgate/{} macos", env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_response_body_lossy() {
        let response = GatewayResponse {
            status: 500,
            body: vec![b'o', b'k', 0xFF],
        };
        assert_eq!(response.body_lossy(), "ok\u{FFFD}");
    }

    #[test]
    fn test_client_creation_trims_base_url() {
        let client = GatewayClient::new(&test_config()).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8787");
        assert_eq!(client.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_transport_error_when_unreachable() {
        // Port 9 (discard) on localhost is closed in test environments.
        let config = TunnelgateConfig {
            gateway_url: "http://127.0.0.1:9".to_string(),
            request_timeout: Duration::from_secs(2),
            ..test_config()
        };
        let client = GatewayClient::new(&config).unwrap();
        let result = client.acquire_lock("ABC123", "d-00", "windows");
        assert!(matches!(result, Err(TunnelgateError::TransportError(_))));
    }
}
