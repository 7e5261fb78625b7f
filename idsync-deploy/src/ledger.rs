//! Progress ledger: what one deployment has changed so far.
//!
//! A single [`Ledger`] is created per deployment and handed by reference to
//! every phase. Item workers of a batch record into it concurrently, so all
//! mutation goes through an internal mutex that is never held across an
//! `.await`.
//!
//! The compensation state (`updated_connections`, `deleted_rules`,
//! `rule_creation_started`) is only cleared after a successful rollback or a
//! fully successful deployment.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use idsync_core::types::{Connection, Rule};

/// Everything rollback needs to restore the pre-deployment state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Compensation {
    /// Connection snapshots taken before each update, in update order.
    pub updated_connections: Vec<Connection>,
    /// Full records of rules removed by the replace-all step.
    pub deleted_rules: Vec<Rule>,
    /// Rules may have been created on the tenant, by the deployment or by a
    /// rollback recreating `deleted_rules`. Every deployed rule is then
    /// suspect and rollback wipes the rule set before recreating.
    pub rule_creation_started: bool,
}

impl Compensation {
    pub fn is_empty(&self) -> bool {
        self.updated_connections.is_empty()
            && self.deleted_rules.is_empty()
            && !self.rule_creation_started
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LedgerCounts {
    pub connections_updated: u64,
    pub rules_created: u64,
    pub rules_updated: u64,
    pub rules_deleted: u64,
}

#[derive(Debug, Default)]
struct LedgerState {
    counts: LedgerCounts,
    compensation: Compensation,
    log: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Ledger {
    state: Mutex<LedgerState>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A ledger seeded with compensation state recovered from a journal.
    pub fn from_compensation(compensation: Compensation) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                compensation,
                ..LedgerState::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        // A panicking worker cannot leave a half-written entry behind: every
        // mutation below is a single push or increment.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a message to the audit log.
    pub fn log(&self, message: impl Into<String>) {
        self.state().log.push(message.into());
    }

    /// Record a connection about to be updated, as it was before the update.
    pub fn record_connection_update(&self, snapshot: Connection) {
        let mut state = self.state();
        state.counts.connections_updated += 1;
        state.compensation.updated_connections.push(snapshot);
    }

    /// Record a rule the tenant confirmed as deleted.
    pub fn record_rule_deleted(&self, rule: Rule) {
        let mut state = self.state();
        state.counts.rules_deleted += 1;
        state.compensation.deleted_rules.push(rule);
    }

    pub fn record_rule_created(&self) {
        self.state().counts.rules_created += 1;
    }

    pub fn record_rule_updated(&self) {
        self.state().counts.rules_updated += 1;
    }

    /// Record that rule creates are about to be dispatched.
    pub fn mark_rule_creation_started(&self) {
        self.state().compensation.rule_creation_started = true;
    }

    pub fn counts(&self) -> LedgerCounts {
        self.state().counts
    }

    pub fn compensation(&self) -> Compensation {
        self.state().compensation.clone()
    }

    pub fn has_compensation(&self) -> bool {
        !self.state().compensation.is_empty()
    }

    /// Names of rules removed by the replace-all step.
    pub fn deleted_rule_names(&self) -> HashSet<String> {
        self.state()
            .compensation
            .deleted_rules
            .iter()
            .map(|rule| rule.name.clone())
            .collect()
    }

    pub fn clear_compensation(&self) {
        self.state().compensation = Compensation::default();
    }

    pub fn log_lines(&self) -> Vec<String> {
        self.state().log.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idsync_core::types::{ConnectionOptions, RuleStage};
    use std::sync::Arc;

    fn connection(id: &str) -> Connection {
        Connection {
            id: id.to_string(),
            name: format!("db-{id}"),
            strategy: None,
            options: ConnectionOptions::default(),
        }
    }

    fn rule(id: &str) -> Rule {
        Rule {
            id: id.to_string(),
            name: format!("rule-{id}"),
            stage: RuleStage::LoginSuccess,
            order: 1,
            enabled: true,
            script: "s".to_string(),
        }
    }

    #[test]
    fn counters_track_recorded_entities() {
        let ledger = Ledger::new();
        ledger.record_connection_update(connection("c1"));
        ledger.record_rule_deleted(rule("r1"));
        ledger.record_rule_deleted(rule("r2"));
        ledger.record_rule_created();
        ledger.record_rule_updated();

        let counts = ledger.counts();
        let compensation = ledger.compensation();
        assert_eq!(counts.connections_updated, 1);
        assert_eq!(counts.rules_deleted, 2);
        assert_eq!(counts.rules_created, 1);
        assert_eq!(counts.rules_updated, 1);
        assert_eq!(compensation.updated_connections.len(), 1);
        assert_eq!(compensation.deleted_rules.len(), 2);
        assert!(ledger.deleted_rule_names().contains("rule-r2"));
    }

    #[test]
    fn clearing_keeps_counts_and_log() {
        let ledger = Ledger::new();
        ledger.log("updated db-c1");
        ledger.record_connection_update(connection("c1"));
        ledger.mark_rule_creation_started();
        assert!(ledger.has_compensation());

        ledger.clear_compensation();
        assert!(!ledger.has_compensation());
        assert_eq!(ledger.counts().connections_updated, 1);
        assert_eq!(ledger.log_lines(), vec!["updated db-c1".to_string()]);
    }

    #[test]
    fn rule_creation_alone_needs_compensation() {
        let ledger = Ledger::new();
        ledger.mark_rule_creation_started();
        assert!(ledger.has_compensation());
    }

    #[test]
    fn deleted_rules_alone_need_compensation() {
        let ledger = Ledger::new();
        assert!(!ledger.has_compensation());
        ledger.record_rule_deleted(rule("r1"));
        assert!(ledger.has_compensation());
        assert!(!ledger.compensation().rule_creation_started);
    }

    #[test]
    fn concurrent_records_are_not_lost() {
        let ledger = Arc::new(Ledger::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        ledger.record_rule_deleted(rule(&format!("{t}-{i}")));
                        ledger.log(format!("deleted {t}-{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker thread");
        }

        assert_eq!(ledger.counts().rules_deleted, 400);
        assert_eq!(ledger.compensation().deleted_rules.len(), 400);
        assert_eq!(ledger.log_lines().len(), 400);
    }
}
