//! Credentials and durable storage for the rotating refresh token
//!
//! The client id and secret are fixed for the life of the process. The
//! refresh token is not: the authorization server may hand out a new one on
//! every refresh, and the old one stops working. A [`TokenStore`] keeps the
//! latest value on disk so a restart picks it up.
//!
//! # Storage backends
//!
//! - `EnvFileTokenStore`: dotenv-format `KEY=value` file, rewritten atomically
//! - `MemoryTokenStore`: in-process map that records every write (tests)

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::{CredentialError, Result};

pub const CLIENT_ID_VAR: &str = "TWITTER_OAUTH2_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "TWITTER_OAUTH2_CLIENT_ID_SECRET";
pub const REFRESH_TOKEN_VAR: &str = "TWITTER_REFRESH_TOKEN";
pub const TRANSLATION_KEY_VAR: &str = "DEEPL_API_KEY";

/// OAuth2 client credentials plus the current refresh token
#[derive(Debug)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: SecretString,
    pub refresh_token: SecretString,
}

impl Credentials {
    pub fn new(client_id: String, client_secret: String, refresh_token: String) -> Self {
        Self {
            client_id,
            client_secret: SecretString::from(client_secret),
            refresh_token: SecretString::from(refresh_token),
        }
    }

    /// Read credentials from the process environment
    ///
    /// # Errors
    ///
    /// Returns `CredentialError::Missing` naming every variable that is unset
    /// or empty.
    pub fn from_env() -> Result<Self> {
        let client_id = read_env(CLIENT_ID_VAR);
        let client_secret = read_env(CLIENT_SECRET_VAR);
        let refresh_token = read_env(REFRESH_TOKEN_VAR);

        match (client_id, client_secret, refresh_token) {
            (Some(id), Some(secret), Some(refresh)) => Ok(Self::new(id, secret, refresh)),
            (id, secret, refresh) => {
                let missing: Vec<&str> = [
                    (CLIENT_ID_VAR, id.is_none()),
                    (CLIENT_SECRET_VAR, secret.is_none()),
                    (REFRESH_TOKEN_VAR, refresh.is_none()),
                ]
                .iter()
                .filter(|(_, absent)| *absent)
                .map(|(name, _)| *name)
                .collect();
                Err(CredentialError::Missing(missing.join(", ")).into())
            }
        }
    }

    /// Read credentials from the environment, preferring a rotated refresh
    /// token already written to `store`
    ///
    /// Hosting dashboards keep serving the original environment value after
    /// a rotation, so the stored value is the authoritative one.
    pub fn from_env_with_store(store: &dyn TokenStore) -> Result<Self> {
        if let Some(stored) = store.load(REFRESH_TOKEN_VAR)? {
            if std::env::var(REFRESH_TOKEN_VAR).map(|v| v != stored).unwrap_or(true) {
                tracing::info!(
                    backend = store.backend_name(),
                    "Using refresh token from token store"
                );
            }
            std::env::set_var(REFRESH_TOKEN_VAR, &stored);
        }
        Self::from_env()
    }

    /// Whether `candidate` differs from the refresh token on file
    pub fn is_rotation(&self, candidate: &str) -> bool {
        self.refresh_token.expose_secret() != candidate
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Durable key/value persistence for the refresh token
pub trait TokenStore: Send + Sync {
    /// Replace the value for `key`, or add it if absent
    ///
    /// A failed write must leave the previous value readable.
    fn persist(&self, key: &str, value: &str) -> Result<()>;

    /// Current value for `key`, if any
    fn load(&self, key: &str) -> Result<Option<String>>;

    /// Name of this backend for logging
    fn backend_name(&self) -> &str;
}

/// dotenv-format file store
///
/// Every write goes to a temporary file in the same directory which then
/// replaces the target with a rename, so readers see either the old file or
/// the new one. Unrelated lines (other secrets, comments) are preserved.
pub struct EnvFileTokenStore {
    path: PathBuf,
}

impl EnvFileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// Key of a `KEY=value` or `export KEY=value` line
fn line_key(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    trimmed.split_once('=').map(|(key, _)| key.trim())
}

/// Replace the line for `key` or append one
fn upsert_line(content: &str, key: &str, value: &str) -> String {
    let new_line = format!("{}={}", key, value);
    let mut replaced = false;
    let mut lines: Vec<String> = content
        .lines()
        .filter_map(|line| {
            if line_key(line) == Some(key) {
                if replaced {
                    // Drop duplicates so the file has a single definition
                    return None;
                }
                replaced = true;
                Some(new_line.clone())
            } else {
                Some(line.to_string())
            }
        })
        .collect();

    if !replaced {
        lines.push(new_line);
    }

    let mut out = lines.join("\n").trim().to_string();
    out.push('\n');
    out
}

impl TokenStore for EnvFileTokenStore {
    fn persist(&self, key: &str, value: &str) -> Result<()> {
        let existing = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(CredentialError::Io(e).into()),
        };

        let updated = upsert_line(&existing, key, value);

        let dir = self.parent_dir();
        std::fs::create_dir_all(&dir).map_err(CredentialError::Io)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(CredentialError::Io)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(tmp.path(), perms).map_err(CredentialError::Io)?;
        }

        tmp.write_all(updated.as_bytes())
            .map_err(CredentialError::Io)?;
        tmp.as_file().sync_all().map_err(CredentialError::Io)?;
        tmp.persist(&self.path)
            .map_err(|e| CredentialError::Io(e.error))?;

        tracing::debug!(key, path = %self.path.display(), "Persisted token");
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let iter = dotenvy::from_path_iter(&self.path).map_err(|e| {
            CredentialError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Failed to read {}: {}", self.path.display(), e),
            ))
        })?;

        let mut found = None;
        for item in iter {
            let (name, value) = item.map_err(|e| {
                CredentialError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("Malformed line in {}: {}", self.path.display(), e),
                ))
            })?;
            if name == key && !value.is_empty() {
                found = Some(value);
            }
        }
        Ok(found)
    }

    fn backend_name(&self) -> &str {
        "env_file"
    }
}

/// In-memory store that records writes
///
/// Available in all builds so integration tests can inspect rotation
/// behaviour without touching the filesystem.
#[derive(Default)]
pub struct MemoryTokenStore {
    values: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<(String, String)>>,
    fail_writes: Mutex<bool>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `persist` fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// Every successful `persist` call, in order
    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl TokenStore for MemoryTokenStore {
    fn persist(&self, key: &str, value: &str) -> Result<()> {
        if *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(CredentialError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "memory store configured to fail",
            ))
            .into());
        }
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key.to_string(), value.to_string()));
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        std::env::remove_var(CLIENT_ID_VAR);
        std::env::remove_var(CLIENT_SECRET_VAR);
        std::env::remove_var(REFRESH_TOKEN_VAR);
    }

    #[test]
    fn test_upsert_replaces_existing_line() {
        let content = "DEEPL_API_KEY=abc\nTWITTER_REFRESH_TOKEN=old\nPORT=3000\n";
        let updated = upsert_line(content, REFRESH_TOKEN_VAR, "new");
        assert_eq!(
            updated,
            "DEEPL_API_KEY=abc\nTWITTER_REFRESH_TOKEN=new\nPORT=3000\n"
        );
    }

    #[test]
    fn test_upsert_appends_missing_key() {
        let updated = upsert_line("DEEPL_API_KEY=abc\n", REFRESH_TOKEN_VAR, "fresh");
        assert_eq!(updated, "DEEPL_API_KEY=abc\nTWITTER_REFRESH_TOKEN=fresh\n");
    }

    #[test]
    fn test_upsert_handles_export_and_comments() {
        let content = "# TWITTER_REFRESH_TOKEN=commented\nexport TWITTER_REFRESH_TOKEN=old\n";
        let updated = upsert_line(content, REFRESH_TOKEN_VAR, "new");
        assert_eq!(
            updated,
            "# TWITTER_REFRESH_TOKEN=commented\nTWITTER_REFRESH_TOKEN=new\n"
        );
    }

    #[test]
    fn test_upsert_collapses_duplicates() {
        let content = "TWITTER_REFRESH_TOKEN=a\nTWITTER_REFRESH_TOKEN=b\n";
        let updated = upsert_line(content, REFRESH_TOKEN_VAR, "c");
        assert_eq!(updated, "TWITTER_REFRESH_TOKEN=c\n");
    }

    #[test]
    fn test_env_file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "DEEPL_API_KEY=abc\nTWITTER_REFRESH_TOKEN=old\n").unwrap();

        let store = EnvFileTokenStore::new(&path);
        store.persist(REFRESH_TOKEN_VAR, "rotated").unwrap();

        assert_eq!(
            store.load(REFRESH_TOKEN_VAR).unwrap(),
            Some("rotated".to_string())
        );
        assert_eq!(store.load("DEEPL_API_KEY").unwrap(), Some("abc".to_string()));

        // No temp files left behind next to the target
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_env_file_store_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("tokens.env");

        let store = EnvFileTokenStore::new(&path);
        assert_eq!(store.load(REFRESH_TOKEN_VAR).unwrap(), None);

        store.persist(REFRESH_TOKEN_VAR, "first").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "TWITTER_REFRESH_TOKEN=first\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_env_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".env");
        let store = EnvFileTokenStore::new(&path);
        store.persist(REFRESH_TOKEN_VAR, "secret").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_memory_store_records_writes() {
        let store = MemoryTokenStore::new();
        store.persist("k", "v1").unwrap();
        store.persist("k", "v2").unwrap();

        assert_eq!(store.load("k").unwrap(), Some("v2".to_string()));
        assert_eq!(store.write_count(), 2);

        store.set_fail_writes(true);
        assert!(store.persist("k", "v3").is_err());
        assert_eq!(store.load("k").unwrap(), Some("v2".to_string()));
    }

    #[test]
    #[serial]
    fn test_from_env_reports_all_missing() {
        clear_env();
        std::env::set_var(CLIENT_ID_VAR, "client");

        let err = Credentials::from_env().unwrap_err();
        let message = err.to_string();
        assert!(message.contains(CLIENT_SECRET_VAR));
        assert!(message.contains(REFRESH_TOKEN_VAR));
        assert!(!message.contains(&format!("{},", CLIENT_ID_VAR)));
        assert_eq!(err.exit_code(), 2);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_blank_values() {
        clear_env();
        std::env::set_var(CLIENT_ID_VAR, "client");
        std::env::set_var(CLIENT_SECRET_VAR, "secret");
        std::env::set_var(REFRESH_TOKEN_VAR, "   ");

        assert!(Credentials::from_env().is_err());
        clear_env();
    }

    #[test]
    #[serial]
    fn test_stored_refresh_token_wins_over_env() {
        clear_env();
        std::env::set_var(CLIENT_ID_VAR, "client");
        std::env::set_var(CLIENT_SECRET_VAR, "secret");
        std::env::set_var(REFRESH_TOKEN_VAR, "stale");

        let store = MemoryTokenStore::new();
        store.persist(REFRESH_TOKEN_VAR, "rotated").unwrap();

        let creds = Credentials::from_env_with_store(&store).unwrap();
        assert_eq!(creds.refresh_token.expose_secret(), "rotated");
        assert!(creds.is_rotation("stale"));
        assert!(!creds.is_rotation("rotated"));

        clear_env();
    }
}
