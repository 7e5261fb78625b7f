//! Tool settings stored at `<home>/.idsync/config.yaml`.
//!
//! # API pattern
//!
//! - `load_at(home)`: explicit home; used in tests with `TempDir`
//! - `home()`: resolves the real home via `dirs::home_dir()` for the CLI
//!
//! A missing file is not an error: every field has a default except the
//! tenant, which the CLI can also take from `--tenant`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};

/// Default ceiling on simultaneous remote calls within one phase.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default environment variable holding the management API token.
pub const DEFAULT_TOKEN_ENV: &str = "IDSYNC_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Tenant domain, e.g. `acme.eu.auth0.com`.
    pub tenant: Option<String>,
    pub concurrency: usize,
    pub token_env: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tenant: None,
            concurrency: DEFAULT_CONCURRENCY,
            token_env: DEFAULT_TOKEN_ENV.to_string(),
        }
    }
}

impl Settings {
    /// Reject values that parse but cannot drive a deployment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(tenant) = &self.tenant {
            if tenant.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    key: "tenant",
                    reason: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// `<home>/.idsync/`
pub fn root_at(home: &Path) -> PathBuf {
    home.join(".idsync")
}

/// `<home>/.idsync/config.yaml`: pure, no I/O.
pub fn path_at(home: &Path) -> PathBuf {
    root_at(home).join("config.yaml")
}

/// Load settings from `<home>/.idsync/config.yaml`, falling back to defaults.
pub fn load_at(home: &Path) -> Result<Settings, ConfigError> {
    let path = path_at(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let settings: Settings =
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    settings.validate()?;
    Ok(settings)
}

/// Resolve the user's home directory.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}
