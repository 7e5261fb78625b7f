//! Rollback coordinator.
//!
//! Replays compensating actions from the ledger: connection options are
//! written back from their snapshots, then the pre-deployment rules are
//! recreated. The two sub-phases run one after the other; items within a
//! sub-phase go through the bounded batch executor.
//!
//! Once rule creation has started, restoring rules first deletes *every*
//! deployed rule, not only the ones this deployment created. Only one
//! deployment may target a tenant at a time. Before that point the delete
//! phase is the only thing that touched rules, so the rules it never reached
//! are left in place and only the missing originals are recreated.

use std::collections::HashSet;

use idsync_core::types::{Connection, NewRule, Rule};

use crate::batch::run_bounded;
use crate::context::DeployContext;
use crate::error::DeployError;
use crate::gateway::list_all_rules;
use crate::ledger::Compensation;

/// Undo what the ledger recorded.
///
/// With a `cause`, that error is always what comes back, whether or not the
/// rollback succeeded; a rollback failure is logged, never returned in its
/// place. Without a cause (explicit revert), a rollback failure is returned
/// as [`DeployError::Rollback`].
pub async fn rollback(
    ctx: &DeployContext<'_>,
    cause: Option<DeployError>,
) -> Result<(), DeployError> {
    match cause {
        Some(cause) => Err(abort(ctx, cause).await),
        None => restore(ctx)
            .await
            .map_err(|err| DeployError::Rollback(Box::new(err))),
    }
}

/// Roll back after `cause` ended a deployment, and hand `cause` back.
pub(crate) async fn abort(ctx: &DeployContext<'_>, cause: DeployError) -> DeployError {
    if restore(ctx).await.is_err() {
        ctx.ledger
            .log(format!("rollback: compensation kept for retry after: {cause}"));
    }
    cause
}

/// Run the compensation and clear the ledger on success.
///
/// Failures are logged here and handed back; the ledger keeps its
/// compensation state so the rollback can be retried.
async fn restore(ctx: &DeployContext<'_>) -> Result<(), DeployError> {
    let compensation = ctx.ledger.compensation();
    if compensation.is_empty() {
        tracing::info!("nothing to roll back");
        ctx.ledger.log("rollback: nothing to roll back");
        return Ok(());
    }

    tracing::warn!(
        connections = compensation.updated_connections.len(),
        rules = compensation.deleted_rules.len(),
        wipe_rules = compensation.rule_creation_started,
        "rolling back deployment"
    );
    ctx.ledger.log(format!(
        "rollback: restoring {} connection(s) and {} rule(s)",
        compensation.updated_connections.len(),
        compensation.deleted_rules.len()
    ));

    match compensate(ctx, &compensation).await {
        Ok(()) => {
            ctx.ledger.clear_compensation();
            tracing::info!("rollback complete");
            ctx.ledger.log("rollback: complete");
            Ok(())
        }
        Err(err) => {
            tracing::error!(error = %err, "rollback failed");
            ctx.ledger.log(format!("rollback: failed: {err}"));
            Err(err)
        }
    }
}

async fn compensate(
    ctx: &DeployContext<'_>,
    compensation: &Compensation,
) -> Result<(), DeployError> {
    rollback_connections(ctx, &compensation.updated_connections).await?;
    if compensation.rule_creation_started || !compensation.deleted_rules.is_empty() {
        rollback_rules(ctx, compensation).await?;
    }
    Ok(())
}

async fn rollback_connections(
    ctx: &DeployContext<'_>,
    snapshots: &[Connection],
) -> Result<(), DeployError> {
    run_bounded(
        "restore connection",
        snapshots.iter().collect(),
        ctx.concurrency,
        |snapshot| restore_connection(ctx, snapshot),
    )
    .await?;
    Ok(())
}

async fn restore_connection(
    ctx: &DeployContext<'_>,
    snapshot: &Connection,
) -> Result<(), DeployError> {
    ctx.gateway
        .update_connection(&snapshot.id, &snapshot.options)
        .await?;
    tracing::info!(id = %snapshot.id, name = %snapshot.name, "restored database connection");
    ctx.ledger.log(format!(
        "rollback: restored database {} ({})",
        snapshot.name, snapshot.id
    ));
    Ok(())
}

async fn rollback_rules(
    ctx: &DeployContext<'_>,
    compensation: &Compensation,
) -> Result<(), DeployError> {
    let deployed = list_all_rules(ctx.gateway).await?;
    let missing: Vec<&Rule> = if compensation.rule_creation_started {
        run_bounded("remove rule", deployed, ctx.concurrency, |rule| {
            remove_rule(ctx, rule)
        })
        .await?;
        compensation.deleted_rules.iter().collect()
    } else {
        // Names are unique per tenant; a present name was never deleted or
        // was already recreated by an earlier attempt.
        let present: HashSet<String> = deployed.into_iter().map(|rule| rule.name).collect();
        compensation
            .deleted_rules
            .iter()
            .filter(|rule| !present.contains(&rule.name))
            .collect()
    };

    let payloads: Vec<NewRule> = missing.into_iter().cloned().map(NewRule::from).collect();
    run_bounded("recreate rule", payloads, ctx.concurrency, |payload| {
        recreate_rule(ctx, payload)
    })
    .await?;
    Ok(())
}

async fn remove_rule(ctx: &DeployContext<'_>, rule: Rule) -> Result<(), DeployError> {
    ctx.gateway.delete_rule(&rule.id).await?;
    tracing::info!(id = %rule.id, name = %rule.name, "rollback removed rule");
    ctx.ledger
        .log(format!("rollback: removed rule {} ({})", rule.name, rule.id));
    Ok(())
}

async fn recreate_rule(ctx: &DeployContext<'_>, payload: NewRule) -> Result<(), DeployError> {
    let created = ctx.gateway.create_rule(&payload).await?;
    tracing::info!(
        id = %created.id,
        name = %created.name,
        stage = %created.stage,
        order = created.order,
        "rollback recreated rule"
    );
    ctx.ledger.log(format!(
        "rollback: recreated rule {} ({})",
        created.name, created.id
    ));
    Ok(())
}
