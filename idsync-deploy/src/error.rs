//! Error types for idsync-deploy.

use std::path::PathBuf;

use thiserror::Error;

/// Mistakes in the desired state. Never retryable; abort the deployment.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// A desired database has no username/password connection of that name.
    #[error("no database connection named '{name}' exists on the tenant")]
    MissingConnection { name: String },

    /// Rule metadata could not be merged into a valid creation payload.
    #[error("rule '{name}' has invalid metadata: {source}")]
    InvalidRuleMetadata {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A failed gateway operation.
#[derive(Debug, Clone, Error)]
#[error("{operation} {target} failed: {message}")]
pub struct RemoteCallError {
    pub operation: &'static str,
    pub target: String,
    pub message: String,
}

impl RemoteCallError {
    pub fn new(
        operation: &'static str,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            target: target.into(),
            message: message.into(),
        }
    }
}

/// All errors that can arise from a deployment or its rollback.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("remote call error: {0}")]
    Remote(#[from] RemoteCallError),

    /// First failing item of a bounded batch.
    #[error("{phase} item #{index} failed: {source}")]
    Batch {
        phase: &'static str,
        index: usize,
        #[source]
        source: Box<DeployError>,
    },

    /// Compensation itself failed.
    #[error("rollback failed: {0}")]
    Rollback(#[source] Box<DeployError>),

    /// An I/O error on the rollback journal, with annotated path for context.
    #[error("journal I/O error at {path}: {source}")]
    Journal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("journal JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DeployError {
    /// Walk through batch wrappers to the error that actually occurred.
    pub fn root(&self) -> &DeployError {
        match self {
            DeployError::Batch { source, .. } => source.root(),
            other => other,
        }
    }
}

pub(crate) fn journal_err(path: impl Into<PathBuf>, source: std::io::Error) -> DeployError {
    DeployError::Journal {
        path: path.into(),
        source,
    }
}
