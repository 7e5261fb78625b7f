//! In-memory tenant for tests and local rehearsal.
//!
//! Holds connections and rules behind a `tokio` mutex, records every call
//! made against it, and can be told to fail specific operations.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use idsync_core::types::{Connection, ConnectionOptions, NewRule, Rule, RuleStage};

use crate::error::RemoteCallError;
use crate::gateway::Gateway;

/// Gateway operations, used for the call log and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListConnections,
    UpdateConnection,
    ListRules,
    DeleteRule,
    CreateRule,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Operation::ListConnections => "list connections",
            Operation::UpdateConnection => "update connection",
            Operation::ListRules => "list rules",
            Operation::DeleteRule => "delete rule",
            Operation::CreateRule => "create rule",
        }
    }

    pub fn is_write(self) -> bool {
        matches!(
            self,
            Operation::UpdateConnection | Operation::DeleteRule | Operation::CreateRule
        )
    }
}

/// One recorded gateway call. `target` is the strategy, stage, entity id, or
/// (for creates) the rule name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    pub target: String,
}

#[derive(Debug, Clone)]
struct Injected {
    message: String,
    once: bool,
}

#[derive(Debug, Default)]
struct Tenant {
    connections: Vec<Connection>,
    rules: Vec<Rule>,
    next_rule_id: u64,
    calls: Vec<Call>,
    /// `(operation, target)`; a `None` target fails every call of that operation.
    failures: HashMap<(Operation, Option<String>), Injected>,
}

impl Tenant {
    fn enter(&mut self, operation: Operation, target: &str) -> Result<(), RemoteCallError> {
        self.calls.push(Call {
            operation,
            target: target.to_string(),
        });
        let Some(key) = [(operation, Some(target.to_string())), (operation, None)]
            .into_iter()
            .find(|key| self.failures.contains_key(key))
        else {
            return Ok(());
        };
        let injected = match self.failures.get(&key) {
            Some(injected) if !injected.once => injected.clone(),
            _ => match self.failures.remove(&key) {
                Some(injected) => injected,
                None => return Ok(()),
            },
        };
        Err(RemoteCallError::new(
            operation.as_str(),
            target,
            injected.message,
        ))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    tenant: Arc<Mutex<Tenant>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_connection(&self, connection: Connection) {
        self.tenant.lock().await.connections.push(connection);
    }

    /// Seed a rule as if it were already deployed.
    pub async fn insert_rule(&self, rule: Rule) {
        self.tenant.lock().await.rules.push(rule);
    }

    /// Make every call of `operation` on `target` (or on anything, if `None`) fail.
    pub async fn fail(&self, operation: Operation, target: Option<&str>, message: &str) {
        self.inject(operation, target, message, false).await;
    }

    /// Like [`fail`](Self::fail), but only the next matching call fails.
    pub async fn fail_once(&self, operation: Operation, target: Option<&str>, message: &str) {
        self.inject(operation, target, message, true).await;
    }

    async fn inject(&self, operation: Operation, target: Option<&str>, message: &str, once: bool) {
        self.tenant.lock().await.failures.insert(
            (operation, target.map(str::to_string)),
            Injected {
                message: message.to_string(),
                once,
            },
        );
    }

    pub async fn clear_failures(&self) {
        self.tenant.lock().await.failures.clear();
    }

    pub async fn connections(&self) -> Vec<Connection> {
        self.tenant.lock().await.connections.clone()
    }

    pub async fn connection_named(&self, name: &str) -> Option<Connection> {
        self.tenant
            .lock()
            .await
            .connections
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    /// Deployed rules ordered by stage, then order, then name.
    pub async fn rules(&self) -> Vec<Rule> {
        let mut rules = self.tenant.lock().await.rules.clone();
        rules.sort_by(|a, b| (a.stage, a.order, &a.name).cmp(&(b.stage, b.order, &b.name)));
        rules
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.tenant.lock().await.calls.clone()
    }

    pub async fn writes(&self) -> Vec<Call> {
        self.calls()
            .await
            .into_iter()
            .filter(|call| call.operation.is_write())
            .collect()
    }

    pub async fn reset_calls(&self) {
        self.tenant.lock().await.calls.clear();
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn list_connections(&self, strategy: &str) -> Result<Vec<Connection>, RemoteCallError> {
        let mut tenant = self.tenant.lock().await;
        tenant.enter(Operation::ListConnections, strategy)?;
        Ok(tenant
            .connections
            .iter()
            .filter(|c| c.strategy.as_deref().map_or(true, |s| s == strategy))
            .cloned()
            .collect())
    }

    async fn update_connection(
        &self,
        id: &str,
        options: &ConnectionOptions,
    ) -> Result<Connection, RemoteCallError> {
        let mut tenant = self.tenant.lock().await;
        tenant.enter(Operation::UpdateConnection, id)?;
        let connection = tenant
            .connections
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| RemoteCallError::new("update connection", id, "connection not found"))?;
        connection.options = options.clone();
        Ok(connection.clone())
    }

    async fn list_rules(&self, stage: RuleStage) -> Result<Vec<Rule>, RemoteCallError> {
        let mut tenant = self.tenant.lock().await;
        tenant.enter(Operation::ListRules, stage.as_str())?;
        Ok(tenant
            .rules
            .iter()
            .filter(|r| r.stage == stage)
            .cloned()
            .collect())
    }

    async fn delete_rule(&self, id: &str) -> Result<(), RemoteCallError> {
        let mut tenant = self.tenant.lock().await;
        tenant.enter(Operation::DeleteRule, id)?;
        let before = tenant.rules.len();
        tenant.rules.retain(|r| r.id != id);
        if tenant.rules.len() == before {
            return Err(RemoteCallError::new("delete rule", id, "rule not found"));
        }
        Ok(())
    }

    async fn create_rule(&self, rule: &NewRule) -> Result<Rule, RemoteCallError> {
        let mut tenant = self.tenant.lock().await;
        tenant.enter(Operation::CreateRule, &rule.name)?;
        if tenant.rules.iter().any(|r| r.name == rule.name) {
            return Err(RemoteCallError::new(
                "create rule",
                rule.name.as_str(),
                "a rule with this name already exists",
            ));
        }
        tenant.next_rule_id += 1;
        let order = rule.order.unwrap_or_else(|| {
            tenant
                .rules
                .iter()
                .filter(|r| r.stage == rule.stage)
                .map(|r| r.order)
                .max()
                .unwrap_or(0)
                + 1
        });
        let created = Rule {
            id: format!("rul_{}", tenant.next_rule_id),
            name: rule.name.clone(),
            stage: rule.stage,
            order,
            enabled: rule.enabled.unwrap_or(true),
            script: rule.script.clone(),
        };
        tenant.rules.push(created.clone());
        Ok(created)
    }
}
