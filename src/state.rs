//! Last-used redeem code persistence.
//!
//! Stores the code of the last successful connect under
//! `dirs::data_dir()/<namespace>/last.code` so a UI can prefill it.
//! Uses temp file + rename for atomic writes.

use crate::TunnelgateError;
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the stored code.
pub const LAST_CODE_FILE: &str = "last.code";

/// File-based store for the last redeem code.
#[derive(Debug, Clone)]
pub struct CodeStore {
    /// Directory holding the code file.
    state_dir: PathBuf,
}

impl CodeStore {
    /// Create a store under `dirs::data_dir()/<namespace>/`.
    pub fn new(namespace: &str) -> Result<Self, TunnelgateError> {
        let base_dir = dirs::data_dir()
            .ok_or_else(|| TunnelgateError::StateIO("Could not find data directory".to_string()))?;
        Self::with_path(base_dir.join(namespace))
    }

    /// Create a store at a specific directory.
    pub fn with_path(state_dir: PathBuf) -> Result<Self, TunnelgateError> {
        fs::create_dir_all(&state_dir)
            .map_err(|e| TunnelgateError::StateIO(format!("Failed to create state dir: {}", e)))?;
        Ok(Self { state_dir })
    }

    /// Directory holding the code file.
    pub fn dir(&self) -> &Path {
        &self.state_dir
    }

    fn code_path(&self) -> PathBuf {
        self.state_dir.join(LAST_CODE_FILE)
    }

    /// Save a code atomically.
    pub fn save(&self, code: &str) -> Result<(), TunnelgateError> {
        let target_path = self.code_path();
        let temp_path = self.state_dir.join(format!("{}.tmp", LAST_CODE_FILE));

        fs::write(&temp_path, code.trim())
            .map_err(|e| TunnelgateError::StateIO(format!("Failed to write temp file: {}", e)))?;

        fs::rename(&temp_path, &target_path)
            .map_err(|e| TunnelgateError::StateIO(format!("Failed to rename code file: {}", e)))?;

        Ok(())
    }

    /// Load the stored code, if any.
    pub fn load(&self) -> Result<Option<String>, TunnelgateError> {
        let path = self.code_path();

        if !path.exists() {
            return Ok(None);
        }

        let code = fs::read_to_string(&path)
            .map_err(|e| TunnelgateError::StateIO(format!("Failed to read code file: {}", e)))?;

        let code = code.trim();
        Ok((!code.is_empty()).then(|| code.to_string()))
    }

    /// Forget the stored code.
    pub fn clear(&self) -> Result<(), TunnelgateError> {
        let path = self.code_path();

        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| TunnelgateError::StateIO(format!("Failed to delete code file: {}", e)))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> CodeStore {
        CodeStore::with_path(dir.path().join("simplevpn")).unwrap()
    }

    #[test]
    fn test_code_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.save("ABC123").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("ABC123"));
    }

    #[test]
    fn test_code_store_load_missing() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).load().unwrap().is_none());
    }

    #[test]
    fn test_code_store_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.save("FIRST").unwrap();
        store.save("  SECOND\n").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("SECOND"));
        assert!(!store.dir().join("last.code.tmp").exists());
    }

    #[test]
    fn test_code_store_clear() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.save("ABC123").unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());

        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[test]
    fn test_code_store_blank_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.dir().join(LAST_CODE_FILE), "  \n").unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
