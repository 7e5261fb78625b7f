//! Remote gateway capability consumed by the orchestrator.
//!
//! Implementations own transport, authentication and retries. The
//! orchestrator only sequences calls and records their outcomes.

use async_trait::async_trait;

use idsync_core::types::{Connection, ConnectionOptions, NewRule, Rule, RuleStage};

use crate::error::RemoteCallError;

/// Strategy name of the tenant's username/password databases.
pub const DATABASE_STRATEGY: &str = "auth0";

#[async_trait]
pub trait Gateway: Send + Sync {
    /// All connections using `strategy`.
    async fn list_connections(&self, strategy: &str) -> Result<Vec<Connection>, RemoteCallError>;

    /// Replace the whole `options` object of connection `id`.
    async fn update_connection(
        &self,
        id: &str,
        options: &ConnectionOptions,
    ) -> Result<Connection, RemoteCallError>;

    /// All rules deployed at `stage`.
    async fn list_rules(&self, stage: RuleStage) -> Result<Vec<Rule>, RemoteCallError>;

    async fn delete_rule(&self, id: &str) -> Result<(), RemoteCallError>;

    async fn create_rule(&self, rule: &NewRule) -> Result<Rule, RemoteCallError>;
}

/// List rules across every stage, flattened in stage order.
pub async fn list_all_rules<G: Gateway + ?Sized>(gateway: &G) -> Result<Vec<Rule>, RemoteCallError> {
    let per_stage =
        futures::future::try_join_all(RuleStage::ALL.into_iter().map(|stage| gateway.list_rules(stage)))
            .await?;
    Ok(per_stage.into_iter().flatten().collect())
}
