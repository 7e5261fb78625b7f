//! Rollback journal: compensation state that outlived a failed rollback.
//!
//! Persists a `JournalFile` JSON document at
//! `<home>/.idsync/journal/<tenant>.json` so a later `idsync rollback` can
//! finish the job. Writes use an atomic `.tmp` + rename. The file name comes
//! from [`tenant_key`], so every spelling of one tenant shares one journal.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use idsync_core::settings;

use crate::error::{journal_err, DeployError};
use crate::ledger::Compensation;

/// On-disk journal payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalFile {
    pub tenant: String,
    pub recorded_at: DateTime<Utc>,
    pub compensation: Compensation,
}

/// File-name form of a tenant: scheme and trailing slashes dropped, host
/// lowercased, anything that is not a plain host character replaced by `_`.
///
/// `acme.auth0.com`, `ACME.auth0.com` and `https://acme.auth0.com/` all map
/// to `acme.auth0.com`.
pub fn tenant_key(tenant: &str) -> String {
    let tenant = tenant.trim();
    let host = tenant
        .strip_prefix("https://")
        .or_else(|| tenant.strip_prefix("http://"))
        .unwrap_or(tenant)
        .trim_end_matches('/');
    host.chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '.' | '-' | '_' => c,
            'A'..='Z' => c.to_ascii_lowercase(),
            _ => '_',
        })
        .collect()
}

/// `<home>/.idsync/journal/<tenant key>.json`
pub fn journal_path_at(home: &Path, tenant: &str) -> PathBuf {
    settings::root_at(home)
        .join("journal")
        .join(format!("{}.json", tenant_key(tenant)))
}

/// Save the compensation state for `tenant` atomically.
pub fn save_at(
    home: &Path,
    tenant: &str,
    compensation: &Compensation,
) -> Result<PathBuf, DeployError> {
    let path = journal_path_at(home, tenant);
    let Some(dir) = path.parent() else {
        return Err(journal_err(
            path.clone(),
            std::io::Error::other("invalid journal path"),
        ));
    };
    std::fs::create_dir_all(dir).map_err(|e| journal_err(dir, e))?;

    let file = JournalFile {
        tenant: tenant.to_string(),
        recorded_at: Utc::now(),
        compensation: compensation.clone(),
    };
    let json = serde_json::to_string_pretty(&file)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| journal_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(journal_err(&path, e));
    }
    tracing::warn!(path = %path.display(), "rollback journal written");
    Ok(path)
}

/// Load the journal for `tenant`, if one exists.
pub fn load_at(home: &Path, tenant: &str) -> Result<Option<JournalFile>, DeployError> {
    let path = journal_path_at(home, tenant);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| journal_err(&path, e))?;
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Remove the journal for `tenant`. Missing journals are fine.
pub fn remove_at(home: &Path, tenant: &str) -> Result<(), DeployError> {
    let path = journal_path_at(home, tenant);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(journal_err(&path, e)),
    }
}
