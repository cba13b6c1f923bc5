//! Anonymous device identity resolution.
//!
//! A stable per-device identifier stands in for a login account and keys
//! every relationship record and the credit ledger. Resolution never fails:
//! when fingerprinting is unavailable the resolver degrades to a locally
//! persisted random identifier, trading trust for availability. Fallback
//! identifiers carry a literal `fallback-` prefix so the server side can
//! weight them differently; both kinds are equally valid ledger keys.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use uuid::Uuid;

use crate::storage::data_dir;

const FALLBACK_PREFIX: &str = "fallback-";
const IDENTITY_FILE: &str = "device_id";

/// Anonymous per-device key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    pub fn new(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this identity came from the degraded fallback path.
    pub fn is_fallback(&self) -> bool {
        self.0.starts_with(FALLBACK_PREFIX)
    }
}

impl std::fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves and caches the device identity for the current process.
pub struct IdentityResolver {
    dir: PathBuf,
    cached: OnceLock<DeviceIdentity>,
}

impl IdentityResolver {
    /// Resolver backed by the default data directory.
    ///
    /// Falls back to the current directory when the home directory cannot be
    /// determined; identity resolution must not fail outright.
    pub fn new() -> Self {
        let dir = data_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::with_dir(dir)
    }

    /// Resolver backed by an explicit directory (for tests).
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cached: OnceLock::new(),
        }
    }

    /// Resolve the device identity, caching it for the session.
    ///
    /// Tries the fingerprint first; on any failure switches to the persisted
    /// fallback identifier. Always yields some identifier.
    pub fn resolve(&self) -> DeviceIdentity {
        self.cached
            .get_or_init(|| fingerprint().unwrap_or_else(|| self.fallback()))
            .clone()
    }

    /// Load or create the persisted fallback identifier.
    ///
    /// The identifier is generated once and written to `<dir>/device_id` so
    /// subsequent sessions on the same device reuse it. A write failure
    /// still yields a usable (session-only) identifier.
    fn fallback(&self) -> DeviceIdentity {
        let path = self.dir.join(IDENTITY_FILE);
        if let Ok(existing) = std::fs::read_to_string(&path) {
            let trimmed = existing.trim();
            if !trimmed.is_empty() {
                return DeviceIdentity(trimmed.to_string());
            }
        }

        let id = format!("{FALLBACK_PREFIX}{}", Uuid::new_v4());
        let _ = std::fs::create_dir_all(&self.dir);
        let _ = std::fs::write(&path, &id);
        DeviceIdentity(id)
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive a high-entropy identifier from stable machine traits.
///
/// Requires a machine-id source; without one the traits are too guessable
/// and the caller should use the persisted fallback instead.
fn fingerprint() -> Option<DeviceIdentity> {
    let machine_id = read_machine_id()?;

    let mut hasher = Sha256::new();
    hasher.update(machine_id.as_bytes());
    hasher.update(std::env::consts::OS.as_bytes());
    hasher.update(std::env::consts::ARCH.as_bytes());
    if let Ok(hostname) = std::fs::read_to_string("/etc/hostname") {
        hasher.update(hostname.trim().as_bytes());
    }

    let digest = hex::encode(hasher.finalize());
    Some(DeviceIdentity(digest[..32].to_string()))
}

fn read_machine_id() -> Option<String> {
    ["/etc/machine-id", "/var/lib/dbus/machine-id"]
        .iter()
        .find_map(|path| read_trimmed_nonempty(Path::new(path)))
}

fn read_trimmed_nonempty(path: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
