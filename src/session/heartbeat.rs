//! Periodic lock heartbeat.
//!
//! One background thread per connected session. The thread waits on a
//! channel with a timeout equal to the interval; a timeout means "beat",
//! anything else (stop message or dropped sender) ends the loop.

use crate::client::Gateway;
use crate::TunnelgateError;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Handle to a running heartbeat schedule.
///
/// Stopping is synchronous: once [`stop`](Self::stop) returns, no new beat
/// starts. A beat already in flight is not awaited.
#[derive(Debug)]
pub struct Heartbeat {
    stop_tx: Option<Sender<()>>,
    stopped: Arc<AtomicBool>,
    beats: Arc<AtomicU64>,
}

impl Heartbeat {
    /// Start beating for `code` every `interval`.
    ///
    /// The first beat fires one interval after start; lock acquisition
    /// already refreshed the lock.
    pub fn spawn(
        gateway: Arc<dyn Gateway>,
        code: String,
        device_id: String,
        interval: Duration,
    ) -> Result<Self, TunnelgateError> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let stopped = Arc::new(AtomicBool::new(false));
        let beats = Arc::new(AtomicU64::new(0));

        let thread_stopped = Arc::clone(&stopped);
        let thread_beats = Arc::clone(&beats);

        thread::Builder::new()
            .name("tunnelgate-heartbeat".to_string())
            .spawn(move || {
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if thread_stopped.load(Ordering::SeqCst) {
                        break;
                    }
                    beat(gateway.as_ref(), &code, &device_id);
                    thread_beats.fetch_add(1, Ordering::Relaxed);
                }
                tracing::debug!("heartbeat loop exited");
            })
            .map_err(|e| {
                TunnelgateError::HeartbeatError(format!("Failed to spawn heartbeat thread: {}", e))
            })?;

        tracing::debug!(interval_ms = interval.as_millis() as u64, "heartbeat scheduled");

        Ok(Self {
            stop_tx: Some(stop_tx),
            stopped,
            beats,
        })
    }

    /// Stop the schedule. Idempotent.
    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(tx) = self.stop_tx.take() {
            // The loop may already be gone; a closed channel is fine.
            let _ = tx.send(());
        }
    }

    /// Whether the schedule is still running.
    pub fn is_active(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    /// Number of beats attempted so far.
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Emit one heartbeat; failures are logged and swallowed.
fn beat(gateway: &dyn Gateway, code: &str, device_id: &str) {
    match gateway.heartbeat(code, device_id) {
        Ok(ack) if ack.allowed == Some(false) => {
            tracing::warn!("gateway reports the lock is held by another device");
        }
        Ok(_) => tracing::trace!("heartbeat ok"),
        Err(e) => tracing::warn!(error = %e, "heartbeat failed; next beat stays scheduled"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::models::{ConnectionDescriptor, GatewayAck};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingGateway {
        beats: AtomicUsize,
        fail: bool,
    }

    impl Gateway for CountingGateway {
        fn redeem(&self, _: &str, _: &str, _: &str) -> Result<ConnectionDescriptor, TunnelgateError> {
            unreachable!()
        }
        fn fetch_latest_descriptor(&self, _: &str) -> Result<ConnectionDescriptor, TunnelgateError> {
            unreachable!()
        }
        fn acquire_lock(&self, _: &str, _: &str, _: &str) -> Result<(), TunnelgateError> {
            unreachable!()
        }
        fn release_lock(&self, _: &str, _: &str) -> Result<(), TunnelgateError> {
            unreachable!()
        }
        fn heartbeat(&self, _: &str, _: &str) -> Result<GatewayAck, TunnelgateError> {
            self.beats.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(TunnelgateError::GatewayError {
                    status: 500,
                    body: "boom".to_string(),
                })
            } else {
                Ok(GatewayAck::default())
            }
        }
    }

    fn spawn(gateway: &Arc<CountingGateway>, interval_ms: u64) -> Heartbeat {
        let gateway: Arc<dyn Gateway> = gateway.clone();
        Heartbeat::spawn(
            gateway,
            "ABC123".to_string(),
            "d-00".to_string(),
            Duration::from_millis(interval_ms),
        )
        .unwrap()
    }

    /// Poll `condition` until it holds or five seconds pass.
    fn wait_until(condition: impl Fn() -> bool) -> bool {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn test_beats_on_schedule() {
        let gateway = Arc::new(CountingGateway::default());
        let mut heartbeat = spawn(&gateway, 20);
        assert!(wait_until(|| gateway.beats.load(Ordering::SeqCst) >= 3));
        assert!(heartbeat.beats() >= 2);
        heartbeat.stop();
    }

    #[test]
    fn test_failures_do_not_stop_schedule() {
        let gateway = Arc::new(CountingGateway {
            fail: true,
            ..Default::default()
        });
        let mut heartbeat = spawn(&gateway, 20);
        assert!(wait_until(|| gateway.beats.load(Ordering::SeqCst) >= 3));
        assert!(heartbeat.is_active());
        heartbeat.stop();
    }

    #[test]
    fn test_stop_suppresses_further_beats() {
        let gateway = Arc::new(CountingGateway::default());
        let mut heartbeat = spawn(&gateway, 20);
        assert!(wait_until(|| gateway.beats.load(Ordering::SeqCst) >= 1));
        heartbeat.stop();
        assert!(!heartbeat.is_active());

        let after_stop = gateway.beats.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(100));
        // At most one beat may have been in flight when stop ran.
        assert!(gateway.beats.load(Ordering::SeqCst) <= after_stop + 1);
    }

    #[test]
    fn test_stop_before_first_beat() {
        let gateway = Arc::new(CountingGateway::default());
        // Long enough that no beat can fire before stop runs.
        let mut heartbeat = spawn(&gateway, 10_000);
        heartbeat.stop();
        heartbeat.stop();
        thread::sleep(Duration::from_millis(120));
        assert_eq!(gateway.beats.load(Ordering::SeqCst), 0);
        assert_eq!(heartbeat.beats(), 0);
    }

    #[test]
    fn test_drop_stops() {
        let gateway = Arc::new(CountingGateway::default());
        drop(spawn(&gateway, 10_000));
        thread::sleep(Duration::from_millis(80));
        assert_eq!(gateway.beats.load(Ordering::SeqCst), 0);
    }
}
