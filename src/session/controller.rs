//! Connect/disconnect state machine.
//!
//! ```text
//! Idle ──connect──> LockPending ──lock ok──> FetchingDescriptor ──> StartingEngine ──> Connected
//!   ^                   │ lock denied              │ fetch failed        │ translate/start failed │
//!   └───────────────────┴──────────────────────────┴─────(release lock)──┘                        │
//!   └──────────────────────────── Disconnecting <──────────disconnect─────────────────────────────┘
//! ```
//!
//! Transitions run under one mutex, so connect and disconnect never
//! interleave. The observable state lives in a separate mutex so that a
//! `disconnect` arriving mid-connect can raise the cancel token instead of
//! waiting for every remaining step.

use crate::client::http::GatewayClient;
use crate::client::Gateway;
use crate::config::TunnelgateConfig;
use crate::engine::{write_engine_config, Engine, ProcessEngine};
use crate::identity::DeviceIdentity;
use crate::protocol::models::ConnectionDescriptor;
use crate::session::heartbeat::Heartbeat;
use crate::state::CodeStore;
use crate::translate::ConfigTranslator;
use crate::TunnelgateError;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No session.
    Idle,
    /// Waiting for the gateway to grant the lock.
    LockPending,
    /// Lock held; obtaining the connection descriptor.
    FetchingDescriptor,
    /// Writing the engine config and launching the engine.
    StartingEngine,
    /// Engine running, heartbeat scheduled.
    Connected,
    /// Tearing down.
    Disconnecting,
}

impl SessionState {
    /// Whether a connect is in progress.
    pub fn is_connecting(self) -> bool {
        matches!(
            self,
            Self::LockPending | Self::FetchingDescriptor | Self::StartingEngine
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::LockPending => "lock-pending",
            Self::FetchingDescriptor => "fetching-descriptor",
            Self::StartingEngine => "starting-engine",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Current state.
    pub state: SessionState,
    /// Code of the live session.
    pub code: Option<String>,
    /// Whether the live session has a descriptor.
    pub has_descriptor: bool,
    /// Whether the gateway lock is held.
    pub lock_held: bool,
    /// Whether the heartbeat schedule is running.
    pub heartbeat_active: bool,
    /// Whether the engine process is alive.
    pub engine_running: bool,
}

/// Shared flag that aborts an in-progress connect at its next step.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The live session record.
struct Session {
    code: String,
    descriptor: Option<ConnectionDescriptor>,
    lock_held: bool,
    heartbeat: Option<Heartbeat>,
    // Held so the file outlives the engine's read; removed on drop.
    engine_config: Option<NamedTempFile>,
}

impl Session {
    fn locked(code: &str) -> Self {
        Self {
            code: code.to_string(),
            descriptor: None,
            lock_held: true,
            heartbeat: None,
            engine_config: None,
        }
    }
}

struct Inner {
    engine: Box<dyn Engine>,
    session: Option<Session>,
    cached_descriptor: Option<(String, ConnectionDescriptor)>,
}

impl Inner {
    fn cached_for(&self, code: &str) -> Option<ConnectionDescriptor> {
        self.cached_descriptor
            .as_ref()
            .filter(|(cached_code, _)| cached_code == code)
            .map(|(_, descriptor)| descriptor.clone())
    }
}

/// Owns the single session and drives it through its states.
///
/// Create one per application run and share it by reference (or `Arc`)
/// with whatever handles UI events. Dropping the controller disconnects.
pub struct SessionController {
    config: TunnelgateConfig,
    gateway: Arc<dyn Gateway>,
    translator: ConfigTranslator,
    device_id: String,
    code_store: Option<CodeStore>,
    state: Mutex<SessionState>,
    cancel: CancelToken,
    inner: Mutex<Inner>,
}

impl SessionController {
    /// Create a controller with the HTTP gateway client and a process engine.
    ///
    /// The device identity is resolved once per process; the last-code
    /// store is attached when the data directory is usable.
    pub fn new(config: TunnelgateConfig) -> Result<Self, TunnelgateError> {
        let gateway = Arc::new(GatewayClient::new(&config)?);
        let engine = Box::new(ProcessEngine::new(config.engine_binary.clone()));
        let device_id = DeviceIdentity::current(&config.state_namespace).to_string();

        let code_store = match CodeStore::new(&config.state_namespace) {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::warn!(error = %e, "last-code store unavailable");
                None
            }
        };

        let mut controller = Self::with_parts(config, gateway, engine, device_id);
        controller.code_store = code_store;
        Ok(controller)
    }

    /// Create a controller from explicit collaborators.
    pub fn with_parts(
        config: TunnelgateConfig,
        gateway: Arc<dyn Gateway>,
        engine: Box<dyn Engine>,
        device_id: impl Into<String>,
    ) -> Self {
        let translator = ConfigTranslator::new(config.descriptor_scheme.clone());
        Self {
            config,
            gateway,
            translator,
            device_id: device_id.into(),
            code_store: None,
            state: Mutex::new(SessionState::Idle),
            cancel: CancelToken::default(),
            inner: Mutex::new(Inner {
                engine,
                session: None,
                cached_descriptor: None,
            }),
        }
    }

    /// Attach a store that remembers the last connected code.
    pub fn with_code_store(mut self, store: CodeStore) -> Self {
        self.code_store = Some(store);
        self
    }

    /// Connect with a redeem code.
    ///
    /// # Errors
    /// - `AlreadyConnected` - a session is live
    /// - `ConfigError` - empty code, missing secret or gateway URL
    /// - `LockError` - the gateway denied the lock (nothing to roll back)
    /// - `DescriptorFetchError`, `ConfigTranslationError`, `EngineStartError`,
    ///   `HeartbeatError`, `ConnectCancelled` - the lock was released
    ///   (best-effort) and the engine stopped before returning
    pub fn connect(&self, code: &str) -> Result<(), TunnelgateError> {
        let code = code.trim();
        let mut inner = self.lock_inner();

        if inner.session.is_some() {
            return Err(TunnelgateError::AlreadyConnected);
        }
        if code.is_empty() {
            return Err(TunnelgateError::ConfigError(
                "redeem code is empty".to_string(),
            ));
        }
        self.config.validate()?;
        self.cancel.reset();

        self.set_state(SessionState::LockPending);
        tracing::info!(code = %redact(code), "acquiring lock");
        if let Err(e) = self
            .gateway
            .acquire_lock(code, &self.device_id, &self.config.platform)
        {
            self.set_state(SessionState::Idle);
            tracing::warn!(error = %e, "lock denied");
            return Err(TunnelgateError::LockError(e.to_string()));
        }

        let mut session = Session::locked(code);
        match self.establish(&mut inner, &mut session) {
            Ok(()) => {
                inner.session = Some(session);
                self.set_state(SessionState::Connected);
                self.remember_code(code);
                tracing::info!("connected");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "connect failed; rolling back");
                self.teardown(&mut inner, session);
                self.set_state(SessionState::Idle);
                Err(e)
            }
        }
    }

    /// Steps after the lock is held. Anything acquired is recorded on
    /// `session` so the caller can roll it back.
    fn establish(&self, inner: &mut Inner, session: &mut Session) -> Result<(), TunnelgateError> {
        self.checkpoint()?;
        self.set_state(SessionState::FetchingDescriptor);

        let descriptor = match inner.cached_for(&session.code) {
            Some(descriptor) => {
                tracing::debug!("using cached descriptor");
                descriptor
            }
            None => {
                let descriptor = self
                    .gateway
                    .fetch_latest_descriptor(&session.code)
                    .map_err(|e| TunnelgateError::DescriptorFetchError(e.to_string()))?;
                inner.cached_descriptor = Some((session.code.clone(), descriptor.clone()));
                descriptor
            }
        };
        session.descriptor = Some(descriptor.clone());
        self.checkpoint()?;

        self.set_state(SessionState::StartingEngine);
        let engine_config = match self.translator.translate(descriptor.as_str()) {
            Ok(config) => config,
            Err(e) => {
                // A descriptor that cannot be translated is not worth reusing.
                inner.cached_descriptor = None;
                return Err(TunnelgateError::ConfigTranslationError(e.to_string()));
            }
        };
        let config_file = write_engine_config(&engine_config)?;
        inner
            .engine
            .start(config_file.path())
            .map_err(|e| match e {
                TunnelgateError::EngineStartError(_) => e,
                other => TunnelgateError::EngineStartError(other.to_string()),
            })?;
        session.engine_config = Some(config_file);
        self.checkpoint()?;

        session.heartbeat = Some(Heartbeat::spawn(
            Arc::clone(&self.gateway),
            session.code.clone(),
            self.device_id.clone(),
            self.config.heartbeat_interval,
        )?);
        Ok(())
    }

    /// Disconnect the live session. A no-op when idle.
    ///
    /// Never fails: release errors are logged. If a connect is in progress
    /// on another thread, it is cancelled at its next step and this call
    /// returns once it has rolled back.
    pub fn disconnect(&self) {
        if self.state().is_connecting() {
            self.cancel.cancel();
        }

        let mut inner = self.lock_inner();
        let Some(session) = inner.session.take() else {
            tracing::debug!("disconnect with no session; nothing to do");
            return;
        };

        self.set_state(SessionState::Disconnecting);
        self.teardown(&mut inner, session);
        self.set_state(SessionState::Idle);
        tracing::info!("disconnected");
    }

    /// Stop heartbeat, release lock, stop engine, drop the config file.
    fn teardown(&self, inner: &mut Inner, mut session: Session) {
        if let Some(mut heartbeat) = session.heartbeat.take() {
            heartbeat.stop();
        }
        if session.lock_held {
            if let Err(e) = self.gateway.release_lock(&session.code, &self.device_id) {
                tracing::warn!(error = %e, "lock release failed; gateway will expire it");
            }
            session.lock_held = false;
        }
        inner.engine.terminate();
        drop(session.engine_config.take());
    }

    /// One-time code redemption; caches the descriptor for later connects.
    pub fn redeem(&self, code: &str) -> Result<ConnectionDescriptor, TunnelgateError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(TunnelgateError::ConfigError(
                "redeem code is empty".to_string(),
            ));
        }
        self.config.validate()?;

        let descriptor = self
            .gateway
            .redeem(code, &self.device_id, &self.config.platform)?;
        self.lock_inner().cached_descriptor = Some((code.to_string(), descriptor.clone()));
        tracing::info!(code = %redact(code), "code redeemed");
        Ok(descriptor)
    }

    /// Drop the cached descriptor so the next connect fetches a fresh one.
    pub fn forget_descriptor(&self) {
        self.lock_inner().cached_descriptor = None;
    }

    /// Current state. Never blocks on an in-progress transition.
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a session is connected.
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Detailed view of the session. Waits for an in-progress transition.
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut inner = self.lock_inner();
        let engine_running = inner.engine.is_running();
        let session = inner.session.as_ref();
        SessionSnapshot {
            state: self.state(),
            code: session.map(|s| s.code.clone()),
            has_descriptor: session.is_some_and(|s| s.descriptor.is_some()),
            lock_held: session.is_some_and(|s| s.lock_held),
            heartbeat_active: session
                .and_then(|s| s.heartbeat.as_ref())
                .is_some_and(Heartbeat::is_active),
            engine_running,
        }
    }

    /// Token that aborts an in-progress connect.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// The last successfully connected code, if a store is attached.
    pub fn last_code(&self) -> Option<String> {
        let store = self.code_store.as_ref()?;
        match store.load() {
            Ok(code) => code,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load last code");
                None
            }
        }
    }

    /// This device's identifier.
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Get the current configuration.
    pub fn config(&self) -> &TunnelgateConfig {
        &self.config
    }

    fn checkpoint(&self) -> Result<(), TunnelgateError> {
        if self.cancel.is_cancelled() {
            return Err(TunnelgateError::ConnectCancelled);
        }
        Ok(())
    }

    fn remember_code(&self, code: &str) {
        if let Some(store) = &self.code_store {
            if let Err(e) = store.save(code) {
                tracing::warn!(error = %e, "failed to save last code");
            }
        }
    }

    fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        tracing::debug!(from = %*state, to = %next, "session transition");
        *state = next;
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.state())
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

/// Mask a redeem code for logs, keeping a short prefix.
fn redact(code: &str) -> String {
    let prefix: String = code.chars().take(2).collect();
    format!("{}***", prefix)
}
