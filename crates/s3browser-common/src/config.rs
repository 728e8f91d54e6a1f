//! Configuration and secret loading for s3browser
//!
//! Resolution order for both secrets is environment variable first, then
//! the file under the data directory. The data directory is created with
//! mode 0700; secret files must be 0600 on Unix.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the vault encryption key.
pub const ENCRYPTION_KEY_ENV: &str = "S3BROWSER_ENCRYPTION_KEY";

/// Environment variable holding the login password.
pub const LOGIN_PASSWORD_ENV: &str = "S3BROWSER_LOGIN_PASSWORD";

/// Minimum encryption key length in characters.
pub const MIN_ENCRYPTION_KEY_LEN: usize = 32;

/// Minimum login password length in characters.
pub const MIN_LOGIN_PASSWORD_LEN: usize = 16;

/// Runtime configuration assembled at startup and shared as part of the
/// application state.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Data directory, normally `~/.s3browser`.
    pub data_dir: PathBuf,
    /// Vault database path inside the data directory.
    pub db_path: PathBuf,
    /// Sliding session lifetime.
    pub session_ttl: Duration,
    /// Budget for data-bearing requests (uploads, downloads, batch
    /// mutations).
    pub data_timeout: Duration,
    /// Budget for control-plane requests (list, presign, metadata).
    pub control_timeout: Duration,
}

impl AppConfig {
    /// Build the configuration rooted at the given data directory.
    #[must_use]
    pub fn new(data_dir: PathBuf) -> Self {
        let db_path = data_dir.join("s3browser.db");
        Self {
            data_dir,
            db_path,
            session_ttl: Duration::from_secs(4 * 60 * 60),
            data_timeout: Duration::from_secs(300),
            control_timeout: Duration::from_secs(30),
        }
    }

    /// Build the configuration under the user's home directory.
    pub fn from_home() -> Result<Self> {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| Error::configuration("HOME is not set"))?;
        Ok(Self::new(home.join(".s3browser")))
    }

    /// Create the data directory (mode 0700) if it does not exist.
    pub fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir).map_err(|e| {
                Error::configuration(format!(
                    "cannot create {}: {e}",
                    self.data_dir.display()
                ))
            })?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(&self.data_dir, perms).map_err(|e| {
                Error::configuration(format!(
                    "cannot restrict {}: {e}",
                    self.data_dir.display()
                ))
            })?;
        }
        Ok(())
    }

    /// Load the vault encryption key: env over `encryption.key` file.
    pub fn load_encryption_key(&self) -> Result<String> {
        let key = load_secret(
            ENCRYPTION_KEY_ENV,
            &self.data_dir.join("encryption.key"),
            "encryption key",
        )?;
        if key.len() < MIN_ENCRYPTION_KEY_LEN {
            return Err(Error::configuration(format!(
                "encryption key must be at least {MIN_ENCRYPTION_KEY_LEN} characters"
            )));
        }
        Ok(key)
    }

    /// Load the login password: env over `login.password` file.
    pub fn load_login_password(&self) -> Result<String> {
        let password = load_secret(
            LOGIN_PASSWORD_ENV,
            &self.data_dir.join("login.password"),
            "login password",
        )?;
        if password.len() < MIN_LOGIN_PASSWORD_LEN {
            return Err(Error::configuration(format!(
                "login password must be at least {MIN_LOGIN_PASSWORD_LEN} characters"
            )));
        }
        Ok(password)
    }
}

/// Read a secret from the environment or, failing that, from a file
/// whose permissions must be 0600 on Unix. Trailing newlines from
/// hand-edited files are stripped.
fn load_secret(env_var: &str, path: &Path, label: &str) -> Result<String> {
    if let Ok(value) = std::env::var(env_var) {
        if !value.is_empty() {
            return Ok(value);
        }
    }
    if !path.exists() {
        return Err(Error::configuration(format!(
            "{label} not configured: set {env_var} or create {}",
            path.display()
        )));
    }
    check_secret_file_mode(path, label)?;
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::configuration(format!("cannot read {}: {e}", path.display())))?;
    let value = raw.trim_end_matches(['\r', '\n']).to_string();
    if value.is_empty() {
        return Err(Error::configuration(format!(
            "{label} file {} is empty",
            path.display()
        )));
    }
    Ok(value)
}

#[cfg(unix)]
fn check_secret_file_mode(path: &Path, label: &str) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let metadata = std::fs::metadata(path)
        .map_err(|e| Error::configuration(format!("cannot stat {}: {e}", path.display())))?;
    let mode = metadata.permissions().mode() & 0o777;
    if mode & 0o077 != 0 {
        return Err(Error::configuration(format!(
            "{label} file {} has mode {mode:o}, expected 0600",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_secret_file_mode(_path: &Path, _label: &str) -> Result<()> {
    Ok(())
}
