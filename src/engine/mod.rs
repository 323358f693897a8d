//! Tunneling engine process handling.
//!
//! The engine (sing-box) is an external executable. This module writes its
//! configuration to a private temporary file, launches it and kills it. It
//! does not monitor the process beyond answering [`Engine::is_running`].

use crate::translate::document::EngineConfig;
use crate::TunnelgateError;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use tempfile::NamedTempFile;

/// Control surface of the tunneling engine.
pub trait Engine: Send {
    /// Launch the engine with the configuration at `config_path`.
    fn start(&mut self, config_path: &Path) -> Result<(), TunnelgateError>;

    /// Stop the engine if running. Never fails.
    fn terminate(&mut self);

    /// Whether the engine process is still alive.
    fn is_running(&mut self) -> bool;
}

/// Engine backed by a child process.
#[derive(Debug)]
pub struct ProcessEngine {
    binary: PathBuf,
    child: Option<Child>,
}

impl ProcessEngine {
    /// Create an engine handle for the executable at `binary`.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            child: None,
        }
    }

    /// Path of the engine executable.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// OS process id of the running engine.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }
}

impl Engine for ProcessEngine {
    fn start(&mut self, config_path: &Path) -> Result<(), TunnelgateError> {
        // Never leave a previous instance holding the tun device.
        self.terminate();

        if !self.binary.is_file() {
            return Err(TunnelgateError::EngineStartError(format!(
                "engine binary missing at {}",
                self.binary.display()
            )));
        }

        let child = Command::new(&self.binary)
            .arg("run")
            .arg("-c")
            .arg(config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                TunnelgateError::EngineStartError(format!(
                    "failed to launch {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        tracing::info!(pid = child.id(), binary = %self.binary.display(), "engine started");
        self.child = Some(child);
        Ok(())
    }

    fn terminate(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        let pid = child.id();
        if let Err(e) = child.kill() {
            // Already exited; still reap it below.
            tracing::debug!(pid, error = %e, "engine kill failed");
        }
        match child.wait() {
            Ok(status) => tracing::info!(pid, %status, "engine stopped"),
            Err(e) => tracing::warn!(pid, error = %e, "failed to reap engine process"),
        }
    }

    fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        self.terminate();
    }
}

/// Write an engine configuration to a fresh private temporary file.
///
/// The file is removed when the returned handle is dropped.
pub fn write_engine_config(config: &EngineConfig) -> Result<NamedTempFile, TunnelgateError> {
    let json = config.to_json()?;

    let mut file = tempfile::Builder::new()
        .prefix("tunnelgate-engine-")
        .suffix(".json")
        .tempfile()
        .map_err(|e| {
            TunnelgateError::EngineStartError(format!("Failed to create config file: {}", e))
        })?;

    file.write_all(json.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| {
            TunnelgateError::EngineStartError(format!("Failed to write config file: {}", e))
        })?;

    tracing::debug!(path = %file.path().display(), "engine config written");
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::translate;
    use tempfile::TempDir;

    #[test]
    fn test_write_engine_config_roundtrip() {
        let config = translate("vless://u@h:443?sni=s").unwrap();
        let file = write_engine_config(&config).unwrap();

        let written = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(written, config.to_json().unwrap());

        let name = file.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("tunnelgate-engine-"));
        assert!(name.ends_with(".json"));
    }

    #[test]
    fn test_engine_config_removed_on_drop() {
        let config = translate("vless://u@h").unwrap();
        let file = write_engine_config(&config).unwrap();
        let path = file.path().to_path_buf();
        assert!(path.exists());
        drop(file);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_engine_config_private() {
        use std::os::unix::fs::PermissionsExt;
        let file = write_engine_config(&translate("vless://u@h").unwrap()).unwrap();
        let mode = std::fs::metadata(file.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn test_start_missing_binary() {
        let dir = TempDir::new().unwrap();
        let mut engine = ProcessEngine::new(dir.path().join("no-such-engine"));
        let result = engine.start(&dir.path().join("config.json"));
        assert!(matches!(result, Err(TunnelgateError::EngineStartError(_))));
        assert!(!engine.is_running());
        assert!(engine.pid().is_none());
    }

    #[test]
    fn test_terminate_when_idle_is_noop() {
        let mut engine = ProcessEngine::new("/nonexistent/sing-box");
        engine.terminate();
        assert!(!engine.is_running());
    }

    #[cfg(unix)]
    #[test]
    fn test_start_and_terminate_process() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let script = dir.path().join("fake-engine");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut engine = ProcessEngine::new(&script);
        engine.start(&dir.path().join("config.json")).unwrap();
        assert!(engine.is_running());
        assert!(engine.pid().is_some());

        engine.terminate();
        assert!(!engine.is_running());
        assert!(engine.pid().is_none());
    }
}
