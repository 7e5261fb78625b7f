//! Deployment driver shared by the CLI commands.
//!
//! Runs connections → rules-delete → rules-update in sequence and rolls the
//! tenant back if any phase fails.

use std::time::{Duration, Instant};

use serde::Serialize;

use idsync_core::Manifest;

use crate::context::DeployContext;
use crate::databases::update_databases;
use crate::error::DeployError;
use crate::ledger::LedgerCounts;
use crate::rollback::{abort, rollback};
use crate::rules::{delete_rules, update_rules};

/// Outcome of a successful deployment, captured before the ledger is cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployReport {
    pub counts: LedgerCounts,
    pub updated_connections: usize,
    pub deleted_rules: usize,
    pub duration_ms: u128,
}

/// Apply `manifest` to the tenant.
///
/// On failure the tenant is rolled back and the deployment error is
/// returned. If the rollback itself fails, the error is logged and the
/// ledger keeps its compensation state (see [`DeployContext::ledger`]) so the
/// host can persist it and retry with [`revert`].
pub async fn deploy(
    ctx: &DeployContext<'_>,
    manifest: &Manifest,
) -> Result<DeployReport, DeployError> {
    let started = Instant::now();
    tracing::info!(
        databases = manifest.databases.len(),
        rules = manifest.rules.len(),
        concurrency = ctx.concurrency,
        "starting deployment"
    );

    if let Err(err) = apply(ctx, manifest).await {
        tracing::error!(error = %err, "deployment failed");
        ctx.ledger.log(format!("deployment failed: {err}"));
        return Err(abort(ctx, err).await);
    }

    let report = build_report(ctx, started.elapsed());
    ctx.ledger.clear_compensation();
    tracing::info!(
        connections_updated = report.counts.connections_updated,
        rules_created = report.counts.rules_created,
        rules_updated = report.counts.rules_updated,
        rules_deleted = report.counts.rules_deleted,
        duration_ms = report.duration_ms,
        "deployment complete"
    );
    ctx.ledger.log("deployment complete");
    Ok(report)
}

/// Roll back whatever the ledger still holds, with no deployment error to
/// report. Used to replay a journal left by a failed rollback.
pub async fn revert(ctx: &DeployContext<'_>) -> Result<(), DeployError> {
    rollback(ctx, None).await
}

async fn apply(ctx: &DeployContext<'_>, manifest: &Manifest) -> Result<(), DeployError> {
    update_databases(ctx, &manifest.databases).await?;
    delete_rules(ctx, &manifest.rules).await?;
    update_rules(ctx, &manifest.rules).await?;
    Ok(())
}

fn build_report(ctx: &DeployContext<'_>, elapsed: Duration) -> DeployReport {
    let compensation = ctx.ledger.compensation();
    DeployReport {
        counts: ctx.ledger.counts(),
        updated_connections: compensation.updated_connections.len(),
        deleted_rules: compensation.deleted_rules.len(),
        duration_ms: elapsed.as_millis(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use crate::memory::{MemoryGateway, Operation};
    use idsync_core::types::{DesiredRule, Rule, RuleStage};

    #[tokio::test]
    async fn empty_manifest_is_a_noop() {
        let gateway = MemoryGateway::new();
        let ledger = Ledger::new();
        let ctx = DeployContext::new(&gateway, &ledger, 5);

        let report = deploy(&ctx, &Manifest::default()).await.expect("deploy");
        assert_eq!(report.counts, LedgerCounts::default());
        assert!(gateway.calls().await.is_empty());
    }

    #[tokio::test]
    async fn failed_create_rolls_rules_back() {
        let gateway = MemoryGateway::new();
        gateway
            .insert_rule(Rule {
                id: "rul_1".into(),
                name: "keep".into(),
                stage: RuleStage::LoginSuccess,
                order: 1,
                enabled: true,
                script: "// keep".into(),
            })
            .await;
        gateway
            .fail(Operation::CreateRule, Some("broken"), "syntax error")
            .await;
        let ledger = Ledger::new();
        let ctx = DeployContext::new(&gateway, &ledger, 1);

        let manifest = Manifest {
            databases: vec![],
            rules: vec![
                DesiredRule {
                    name: "fresh".into(),
                    script: "// fresh".into(),
                    metadata: Default::default(),
                },
                DesiredRule {
                    name: "broken".into(),
                    script: "// broken".into(),
                    metadata: Default::default(),
                },
            ],
        };

        let err = deploy(&ctx, &manifest).await.unwrap_err();
        assert!(matches!(err, DeployError::Batch { phase: "create rule", .. }), "got: {err}");

        let rules = gateway.rules().await;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "keep");
        assert!(!ledger.has_compensation());
    }

    fn original(id: &str, name: &str, order: i64) -> Rule {
        Rule {
            id: id.into(),
            name: name.into(),
            stage: RuleStage::LoginSuccess,
            order,
            enabled: order % 2 == 0,
            script: format!("// {name} v1"),
        }
    }

    fn only(name: &str) -> Manifest {
        Manifest {
            databases: vec![],
            rules: vec![DesiredRule {
                name: name.into(),
                script: format!("// {name} v2"),
                metadata: Default::default(),
            }],
        }
    }

    #[tokio::test]
    async fn interrupted_delete_keeps_rules_it_never_reached() {
        let gateway = MemoryGateway::new();
        let originals: Vec<Rule> = ["a", "b", "c", "d", "e"]
            .into_iter()
            .zip(1..)
            .map(|(name, order)| original(&format!("rul_{name}"), name, order))
            .collect();
        for rule in &originals {
            gateway.insert_rule(rule.clone()).await;
        }
        gateway
            .fail(Operation::DeleteRule, Some("rul_c"), "transient")
            .await;
        let ledger = Ledger::new();
        let ctx = DeployContext::new(&gateway, &ledger, 1);

        let err = deploy(&ctx, &only("a")).await.unwrap_err();
        assert!(matches!(err, DeployError::Batch { phase: "delete rule", .. }), "got: {err}");
        assert!(!ledger.has_compensation());

        let restored: Vec<(String, RuleStage, i64, bool, String)> = gateway
            .rules()
            .await
            .into_iter()
            .map(|r| (r.name, r.stage, r.order, r.enabled, r.script))
            .collect();
        let expected: Vec<(String, RuleStage, i64, bool, String)> = originals
            .into_iter()
            .map(|r| (r.name, r.stage, r.order, r.enabled, r.script))
            .collect();
        assert_eq!(restored, expected);
        assert!(
            !gateway.writes().await.iter().any(|call| call.target == "rul_d"),
            "rules after the failure are never touched"
        );
    }

    #[tokio::test]
    async fn failed_rollback_still_reports_the_deployment_error() {
        let gateway = MemoryGateway::new();
        gateway.insert_rule(original("rul_1", "keep", 1)).await;
        gateway
            .fail(Operation::CreateRule, Some("fresh"), "syntax error")
            .await;
        gateway
            .fail(Operation::CreateRule, Some("keep"), "quota")
            .await;
        let ledger = Ledger::new();
        let ctx = DeployContext::new(&gateway, &ledger, 1);

        let err = deploy(&ctx, &only("fresh")).await.unwrap_err();
        assert!(matches!(err, DeployError::Batch { phase: "create rule", .. }), "got: {err}");
        assert!(ledger.has_compensation());
        assert!(ledger
            .log_lines()
            .iter()
            .any(|line| line.starts_with("rollback: compensation kept for retry")));
    }
}
