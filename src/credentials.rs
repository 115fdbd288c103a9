//! Credential loading from the runtime `.env` file.
//!
//! The one secret this tool needs is the draft service API key. It can live
//! in `~/.draftsmith/.env` (checked for private permissions) or in the
//! process environment, which wins when both are set. A missing key is a
//! configuration error reported at startup, never part of the conversation
//! failure taxonomy.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::config;

/// Environment variable holding the draft service API key.
pub const API_KEY_VAR: &str = "DRAFTSMITH_API_KEY";

/// Variables the process environment may override.
const MANAGED_VARS: [&str; 1] = [API_KEY_VAR];

/// Runtime credentials loaded from the `.env` file.
#[derive(Clone, Default)]
pub struct Credentials {
    vars: BTreeMap<String, String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("keys", &self.vars.keys().collect::<Vec<_>>())
            .field("values", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    /// Build credentials from a key-value map.
    pub fn from_map(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }

    /// Returns a credential value for a key, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Returns a required credential or an error when missing.
    ///
    /// # Errors
    ///
    /// Returns an error when the key does not exist in loaded credentials.
    pub fn require(&self, key: &str) -> anyhow::Result<String> {
        self.vars
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing required credential: {key}"))
    }

    /// Returns the draft service API key.
    ///
    /// # Errors
    ///
    /// Returns an error when no key was found in the `.env` file or the
    /// process environment.
    pub fn api_key(&self) -> anyhow::Result<String> {
        self.require(API_KEY_VAR).context(
            "set DRAFTSMITH_API_KEY in the environment or in ~/.draftsmith/.env",
        )
    }

    /// Overlay managed variables from an environment resolver. Present values
    /// replace file values.
    ///
    /// Takes a resolver function for testability.
    pub fn overlay_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        for key in MANAGED_VARS {
            if let Some(value) = env(key) {
                self.vars.insert(key.to_owned(), value);
            }
        }
    }
}

/// Load credentials from a specific `.env` path.
///
/// # Errors
///
/// Returns an error if the file does not exist, permissions are too broad,
/// or parsing fails.
pub fn load_credentials(path: &Path) -> anyhow::Result<Credentials> {
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "credentials file does not exist: {}",
            path.display()
        ));
    }

    validate_private_permissions(path)?;

    let mut vars = BTreeMap::new();
    let iter = dotenvy::from_path_iter(path)
        .with_context(|| format!("failed to read credentials at {}", path.display()))?;

    for item in iter {
        let (key, value) = item.with_context(|| {
            format!(
                "failed to parse key-value entry in credentials file {}",
                path.display()
            )
        })?;
        vars.insert(key, value);
    }

    Ok(Credentials { vars })
}

/// Load credentials from `~/.draftsmith/.env`, overlaid with the process
/// environment. The file is optional; the environment alone is enough.
///
/// # Errors
///
/// Returns an error when the home directory cannot be resolved or an existing
/// credentials file is unreadable or too widely readable.
pub fn load_default_credentials() -> anyhow::Result<Credentials> {
    let env_file = config::data_dir()?.join(".env");
    let mut credentials = if env_file.exists() {
        load_credentials(&env_file)?
    } else {
        Credentials::default()
    };
    credentials.overlay_env(|key| std::env::var(key).ok());
    Ok(credentials)
}

/// Ensure a file has private permissions when supported.
///
/// # Errors
///
/// Returns an error if permissions cannot be updated.
pub fn enforce_private_file_permissions(path: &Path) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let perms = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

#[cfg(unix)]
fn validate_private_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path)
        .with_context(|| format!("failed to inspect credentials file {}", path.display()))?;
    let mode = metadata.permissions().mode() & 0o777;

    if mode & 0o077 != 0 {
        return Err(anyhow::anyhow!(
            "credentials file {} must be 0600, found {:o}",
            path.display(),
            mode
        ));
    }

    Ok(())
}

#[cfg(not(unix))]
fn validate_private_permissions(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}
