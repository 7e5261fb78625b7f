//! Dry-run gateway: real reads, simulated writes.
//!
//! Wraps another gateway, forwards list calls to it, and answers writes
//! locally while recording them as [`PlannedChange`]s. A deployment run
//! against it computes and logs every payload without touching the tenant.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;

use idsync_core::types::{Connection, ConnectionOptions, NewRule, Rule, RuleStage};

use crate::error::RemoteCallError;
use crate::gateway::Gateway;

/// A write the deployment would have made.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedChange {
    UpdateConnection {
        id: String,
        name: String,
        options: ConnectionOptions,
    },
    DeleteRule {
        id: String,
        name: String,
    },
    CreateRule(NewRule),
}

pub struct DryRunGateway<G> {
    inner: G,
    seen_connections: Mutex<HashMap<String, Connection>>,
    seen_rules: Mutex<HashMap<String, Rule>>,
    planned: Mutex<Vec<PlannedChange>>,
    next_id: AtomicU64,
}

impl<G: Gateway> DryRunGateway<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            seen_connections: Mutex::new(HashMap::new()),
            seen_rules: Mutex::new(HashMap::new()),
            planned: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Writes recorded so far, in call order.
    pub fn planned(&self) -> Vec<PlannedChange> {
        self.planned
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn plan(&self, change: PlannedChange) {
        self.planned
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(change);
    }
}

#[async_trait]
impl<G: Gateway> Gateway for DryRunGateway<G> {
    async fn list_connections(&self, strategy: &str) -> Result<Vec<Connection>, RemoteCallError> {
        let connections = self.inner.list_connections(strategy).await?;
        let mut seen = self
            .seen_connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for connection in &connections {
            seen.insert(connection.id.clone(), connection.clone());
        }
        Ok(connections)
    }

    async fn update_connection(
        &self,
        id: &str,
        options: &ConnectionOptions,
    ) -> Result<Connection, RemoteCallError> {
        let known = self
            .seen_connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned();
        let mut connection = known.ok_or_else(|| {
            RemoteCallError::new("update connection", id, "connection was never listed")
        })?;
        connection.options = options.clone();
        tracing::info!(id, name = %connection.name, "[dry-run] would update connection");
        self.plan(PlannedChange::UpdateConnection {
            id: id.to_string(),
            name: connection.name.clone(),
            options: options.clone(),
        });
        Ok(connection)
    }

    async fn list_rules(&self, stage: RuleStage) -> Result<Vec<Rule>, RemoteCallError> {
        let rules = self.inner.list_rules(stage).await?;
        let mut seen = self
            .seen_rules
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for rule in &rules {
            seen.insert(rule.id.clone(), rule.clone());
        }
        Ok(rules)
    }

    async fn delete_rule(&self, id: &str) -> Result<(), RemoteCallError> {
        let name = self
            .seen_rules
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .map(|rule| rule.name.clone())
            .unwrap_or_default();
        tracing::info!(id, name = %name, "[dry-run] would delete rule");
        self.plan(PlannedChange::DeleteRule {
            id: id.to_string(),
            name,
        });
        Ok(())
    }

    async fn create_rule(&self, rule: &NewRule) -> Result<Rule, RemoteCallError> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(name = %rule.name, stage = %rule.stage, "[dry-run] would create rule");
        self.plan(PlannedChange::CreateRule(rule.clone()));
        Ok(Rule {
            id: format!("dry-run-{n}"),
            name: rule.name.clone(),
            stage: rule.stage,
            order: rule.order.unwrap_or(0),
            enabled: rule.enabled.unwrap_or(true),
            script: rule.script.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DeployContext;
    use crate::ledger::Ledger;
    use crate::memory::MemoryGateway;
    use crate::pipeline::deploy;
    use idsync_core::types::{DesiredDatabase, DesiredRule, DesiredScript, ScriptStage};
    use idsync_core::Manifest;
    use serde_json::json;

    #[tokio::test]
    async fn dry_run_plans_but_never_writes() {
        let tenant = MemoryGateway::new();
        tenant
            .insert_connection(
                serde_json::from_value(json!({ "id": "c1", "name": "db1", "options": {} }))
                    .unwrap(),
            )
            .await;
        tenant
            .insert_rule(Rule {
                id: "rul_1".into(),
                name: "old".into(),
                stage: RuleStage::LoginSuccess,
                order: 1,
                enabled: true,
                script: "// old".into(),
            })
            .await;

        let dry = DryRunGateway::new(tenant.clone());
        let ledger = Ledger::new();
        let ctx = DeployContext::new(&dry, &ledger, 3);
        let manifest = Manifest {
            databases: vec![DesiredDatabase {
                name: "db1".into(),
                scripts: vec![DesiredScript {
                    stage: ScriptStage::Login,
                    contents: "X".into(),
                }],
            }],
            rules: vec![DesiredRule {
                name: "new".into(),
                script: "// new".into(),
                metadata: Default::default(),
            }],
        };

        let report = deploy(&ctx, &manifest).await.expect("dry-run deploy");
        assert_eq!(report.counts.connections_updated, 1);
        assert_eq!(report.counts.rules_deleted, 1);
        assert_eq!(report.counts.rules_created, 1);

        assert!(tenant.writes().await.is_empty(), "dry-run must not write");
        let planned = dry.planned();
        assert_eq!(planned.len(), 3);
        assert!(planned.iter().any(
            |c| matches!(c, PlannedChange::DeleteRule { name, .. } if name == "old")
        ));
        assert!(planned
            .iter()
            .any(|c| matches!(c, PlannedChange::CreateRule(r) if r.name == "new")));
    }
}
