//! Stable device identity.
//!
//! The device id is `d-` followed by the first 32 hex characters of
//! SHA-256 over a raw machine identifier. The raw identifier comes from the
//! OS when possible, otherwise from a random UUID persisted under the user's
//! config directory. Resolution never fails: if the fallback file cannot be
//! read or written, a fresh UUID is used for this process only.

use crate::crypto::digest::sha256_hex;
use once_cell::sync::OnceCell;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix of every device id.
pub const DEVICE_ID_PREFIX: &str = "d-";

/// Number of hex characters kept from the digest.
pub const DEVICE_ID_HEX_LEN: usize = 32;

/// File name of the persisted fallback identifier.
pub const FALLBACK_FILE: &str = "deviceid";

static CURRENT: OnceCell<DeviceIdentity> = OnceCell::new();

/// Hashed, stable device identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Derive the identity from a raw machine identifier.
    pub fn from_raw(raw: &str) -> Self {
        let digest = sha256_hex(raw.as_bytes());
        Self(format!("{}{}", DEVICE_ID_PREFIX, &digest[..DEVICE_ID_HEX_LEN]))
    }

    /// Resolve the identity for this machine.
    ///
    /// `namespace` names the config subdirectory holding the fallback id.
    pub fn resolve(namespace: &str) -> Self {
        if let Some(raw) = native_machine_id() {
            return Self::from_raw(&raw);
        }
        let raw = match fallback_path(namespace) {
            Some(path) => persisted_id(&path),
            None => {
                tracing::warn!("no user config directory; device id will not be stable");
                random_id()
            }
        };
        Self::from_raw(&raw)
    }

    /// Process-wide identity, resolved on first use.
    ///
    /// The namespace of the first call wins.
    pub fn current(namespace: &str) -> &'static DeviceIdentity {
        CURRENT.get_or_init(|| Self::resolve(namespace))
    }

    /// The id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Location of the fallback id: `dirs::config_dir()/<namespace>/deviceid`.
pub fn fallback_path(namespace: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(namespace).join(FALLBACK_FILE))
}

/// Load the persisted fallback id at `path`, creating it on first use.
///
/// I/O failures are logged and yield a fresh, unpersisted id.
pub fn persisted_id(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(existing) if !existing.trim().is_empty() => return existing.trim().to_string(),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read device id");
        }
    }

    let id = random_id();
    let written = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| write_private(path, &id));
    if let Err(e) = written {
        tracing::warn!(path = %path.display(), error = %e, "failed to persist device id");
    }
    id
}

fn random_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?
        .write_all(contents.as_bytes())
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    fs::write(path, contents)
}

/// OS-native stable machine identifier, if one can be read.
pub fn native_machine_id() -> Option<String> {
    let id = platform_machine_id()?;
    let id = id.trim();
    (!id.is_empty()).then(|| id.to_string())
}

#[cfg(target_os = "windows")]
fn platform_machine_id() -> Option<String> {
    let output = std::process::Command::new("reg")
        .args([
            "query",
            r"HKLM\SOFTWARE\Microsoft\Cryptography",
            "/v",
            "MachineGuid",
            "/reg:64",
        ])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .find(|l| l.contains("MachineGuid"))
        .and_then(|l| l.split_whitespace().last())
        .map(String::from)
}

#[cfg(target_os = "macos")]
fn platform_machine_id() -> Option<String> {
    let output = std::process::Command::new("ioreg")
        .args(["-rd1", "-c", "IOPlatformExpertDevice"])
        .output()
        .ok()?;
    parse_between(
        &String::from_utf8_lossy(&output.stdout),
        "\"IOPlatformUUID\" = \"",
        "\"",
    )
    .map(String::from)
}

#[cfg(target_os = "linux")]
fn platform_machine_id() -> Option<String> {
    fs::read_to_string("/etc/machine-id")
        .or_else(|_| fs::read_to_string("/var/lib/dbus/machine-id"))
        .ok()
}

#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
fn platform_machine_id() -> Option<String> {
    None
}

#[cfg_attr(not(any(test, target_os = "macos")), allow(dead_code))]
fn parse_between<'a>(haystack: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = haystack.find(start)? + start.len();
    let len = haystack[from..].find(end)?;
    Some(&haystack[from..from + len])
}
