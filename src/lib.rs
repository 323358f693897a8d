//! # Tunnelgate
//!
//! **Signed gateway client and session controller for a sing-box based VPN desktop.**
//!
//! Tunnelgate turns a redeem code into a running tunnel. It claims a
//! single-device lock at the licensing gateway, fetches the connection
//! descriptor (a `vless://` URI), translates it into a sing-box
//! configuration, launches the engine, and keeps the lock alive with a
//! periodic heartbeat until disconnect.
//!
//! ## Features
//!
//! - **HMAC-SHA256 request signing**: every gateway call carries a signature,
//!   a timestamp and a strictly increasing nonce
//! - **Stable device identity**: hashed OS machine id with a persisted UUID fallback
//! - **One session at a time**: connect and disconnect are serialized, and
//!   every failure after the lock is granted releases it again
//! - **Descriptor translation**: typed sing-box document, no string templating
//!
//! ## Quickstart
//!
//! ```no_run
//! use tunnelgate::{SessionController, TunnelgateConfig};
//!
//! fn main() -> Result<(), tunnelgate::TunnelgateError> {
//!     let config = TunnelgateConfig::from_env();
//!     let controller = SessionController::new(config)?;
//!
//!     controller.connect("ABC123")?;
//!     println!("state: {}", controller.state());
//!
//!     controller.disconnect();
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! - `SVPN_GATEWAY`: gateway base URL (default `http://localhost:8787`)
//! - `SVPN_SECRET`: shared HMAC secret; connecting fails without it
//! - `SVPN_ENGINE`: path to the sing-box binary
//! - `SVPN_HEARTBEAT_SECS`: heartbeat period (default 7)
//!
//! See [`TunnelgateConfig`] for full documentation.

#![deny(missing_docs)]

// Core modules
pub mod clock;
pub mod config;
pub mod errors;

// Crypto layer
pub mod crypto;

// Protocol layer
pub mod protocol;

// Client layer
pub mod client;

// Local state
pub mod identity;
pub mod state;

// Engine layer
pub mod engine;
pub mod translate;

// Session (main public API)
pub mod session;

// Re-exports for public API
pub use client::http::GatewayClient;
pub use client::Gateway;
pub use clock::{Clock, SystemClock};
pub use config::TunnelgateConfig;
pub use crypto::signing::RequestSigner;
pub use engine::{Engine, ProcessEngine};
pub use errors::TunnelgateError;
pub use identity::DeviceIdentity;
pub use protocol::models::{ConnectionDescriptor, GatewayAck};
pub use session::controller::{CancelToken, SessionController, SessionSnapshot, SessionState};
pub use state::CodeStore;
pub use translate::{translate, ConfigTranslator};

#[cfg(any(test, feature = "test-seams"))]
pub use clock::MockClock;
