//! Deployment manifest: the desired state for one tenant.
//!
//! ```yaml
//! databases:
//!   - name: users-db
//!     scripts:
//!       - stage: login
//!         contents: |
//!           function login(email, password, callback) { ... }
//! rules:
//!   - name: enrich-profile
//!     script: |
//!       function (user, context, callback) { callback(null, user, context); }
//!     metadata:
//!       stage: login_success
//!       order: 2
//! ```
//!
//! Script stages are a closed set: a manifest naming an unknown stage fails
//! to parse instead of having that script dropped.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::types::{DesiredDatabase, DesiredRule};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub databases: Vec<DesiredDatabase>,
    #[serde(default)]
    pub rules: Vec<DesiredRule>,
}

impl Manifest {
    /// Parse a manifest from YAML text. `origin` only labels errors.
    pub fn from_yaml(origin: &Path, text: &str) -> Result<Self, ConfigError> {
        let manifest: Manifest = serde_yaml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            source: e,
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Names must be unique per kind: both synchronizers match remote
    /// entities by name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for db in &self.databases {
            if !seen.insert(db.name.as_str()) {
                return Err(ConfigError::Invalid {
                    key: "databases",
                    reason: format!("duplicate database '{}'", db.name),
                });
            }
            let mut stages = HashSet::new();
            for script in &db.scripts {
                if !stages.insert(script.stage) {
                    return Err(ConfigError::Invalid {
                        key: "databases",
                        reason: format!(
                            "database '{}' declares stage '{}' twice",
                            db.name, script.stage
                        ),
                    });
                }
            }
        }

        let mut seen = HashSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.name.as_str()) {
                return Err(ConfigError::Invalid {
                    key: "rules",
                    reason: format!("duplicate rule '{}'", rule.name),
                });
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty() && self.rules.is_empty()
    }
}

/// Load and validate the manifest at `path`.
pub fn load(path: &Path) -> Result<Manifest, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ManifestNotFound {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    Manifest::from_yaml(path, &text)
}
