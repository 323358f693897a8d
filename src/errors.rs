//! Tunnelgate error types.

use thiserror::Error;

/// Errors surfaced by the gateway client and the session controller.
#[derive(Debug, Error)]
pub enum TunnelgateError {
    /// Configuration is missing or invalid (secret, gateway URL, redeem code).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The gateway could not be reached or did not answer in time.
    #[error("Gateway transport error: {0}")]
    TransportError(String),

    /// The gateway answered with a non-success status.
    #[error("Gateway returned {status}: {body}")]
    GatewayError {
        /// HTTP status code.
        status: u16,
        /// Raw response body (or the gateway's message on a soft denial).
        body: String,
    },

    /// The gateway response could not be decoded.
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// The gateway refused the usage lock.
    #[error("Lock denied: {0}")]
    LockError(String),

    /// Fetching the connection descriptor failed.
    #[error("Descriptor fetch failed: {0}")]
    DescriptorFetchError(String),

    /// The connection descriptor URI is malformed.
    #[error("Descriptor parse error: {0}")]
    ParseError(String),

    /// The connection descriptor could not be turned into an engine config.
    #[error("Engine config translation failed: {0}")]
    ConfigTranslationError(String),

    /// The engine binary is missing or failed to launch.
    #[error("Engine start failed: {0}")]
    EngineStartError(String),

    /// The heartbeat task could not be scheduled.
    #[error("Heartbeat error: {0}")]
    HeartbeatError(String),

    /// A session is already connected.
    #[error("Already connected")]
    AlreadyConnected,

    /// The connect attempt was cancelled before it completed.
    #[error("Connect cancelled")]
    ConnectCancelled,

    /// Local state file I/O failed.
    #[error("State I/O error: {0}")]
    StateIO(String),
}
