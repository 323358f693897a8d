//! Connect with a redeem code, hold the tunnel until Enter, then disconnect.
//!
//! # Running
//!
//! ```bash
//! export SVPN_GATEWAY="https://gw.example.com"
//! export SVPN_SECRET="shared-secret"
//! export SVPN_ENGINE="/opt/sing-box/sing-box"
//! RUST_LOG=tunnelgate=debug cargo run --example connect -- ABC123
//! ```
//!
//! Without a code argument the last successfully connected code is reused.

use std::io::BufRead;
use tracing_subscriber::EnvFilter;
use tunnelgate::{SessionController, TunnelgateConfig, TunnelgateError};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tunnelgate=info")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), TunnelgateError> {
    let controller = SessionController::new(TunnelgateConfig::from_env())?;
    println!("device id: {}", controller.device_id());

    let code = match std::env::args().nth(1).or_else(|| controller.last_code()) {
        Some(code) => code,
        None => {
            return Err(TunnelgateError::ConfigError(
                "usage: connect <redeem-code>".to_string(),
            ))
        }
    };

    match controller.connect(&code) {
        Ok(()) => println!("connected; press Enter to disconnect"),
        Err(TunnelgateError::LockError(reason)) => {
            println!("{}", lock_failure_message(&reason));
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);

    controller.disconnect();
    println!("state: {}", controller.state());
    Ok(())
}

/// `LockError` covers both a refusal and an unreachable gateway.
fn lock_failure_message(reason: &str) -> String {
    format!("could not claim the code: {}", reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_failure_message_does_not_assume_conflict() {
        let message = lock_failure_message("Gateway transport error: connection refused");
        assert!(message.contains("connection refused"));
        assert!(!message.contains("another device"));
    }
}
