//! Basic smoke test over the public surface.

use tunnelgate::{ConfigTranslator, DeviceIdentity, SessionState, TunnelgateConfig};

#[test]
fn crate_compiles() {
    let _ = std::any::type_name::<tunnelgate::SessionController>();
    let _ = std::any::type_name::<tunnelgate::TunnelgateError>();
}

#[test]
fn defaults_are_sane() {
    let config = TunnelgateConfig::default();
    assert_eq!(config.heartbeat_interval.as_secs(), 7);
    assert_eq!(config.request_timeout.as_secs(), 10);
    assert_eq!(ConfigTranslator::default().scheme(), "vless");
    assert_eq!(SessionState::Idle.to_string(), "idle");
}

#[test]
fn device_identity_shape() {
    let id = DeviceIdentity::from_raw("smoke");
    assert!(id.as_str().starts_with("d-"));
    assert_eq!(id.as_str().len(), 34);
}
