//! Licensing gateway client.

pub mod http;

use crate::protocol::models::{ConnectionDescriptor, GatewayAck};
use crate::TunnelgateError;

/// Operations the session controller needs from the licensing gateway.
///
/// [`http::GatewayClient`] is the production implementation.
pub trait Gateway: Send + Sync {
    /// One-time redemption of a code, returning its connection descriptor.
    fn redeem(
        &self,
        code: &str,
        device_id: &str,
        platform: &str,
    ) -> Result<ConnectionDescriptor, TunnelgateError>;

    /// Fetch the current connection descriptor for a code.
    fn fetch_latest_descriptor(&self, code: &str) -> Result<ConnectionDescriptor, TunnelgateError>;

    /// Claim the single-device lock for a code.
    ///
    /// An error means the code is invalid or locked to another device.
    fn acquire_lock(&self, code: &str, device_id: &str, platform: &str)
        -> Result<(), TunnelgateError>;

    /// Release the lock. Callers treat failures as best-effort.
    fn release_lock(&self, code: &str, device_id: &str) -> Result<(), TunnelgateError>;

    /// Keep the lock alive. Callers treat failures as best-effort.
    fn heartbeat(&self, code: &str, device_id: &str) -> Result<GatewayAck, TunnelgateError>;
}
