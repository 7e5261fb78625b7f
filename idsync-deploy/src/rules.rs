//! Rule synchronizer: replace-all.
//!
//! Rule order is a flat list per stage with no stable key besides the name,
//! so rules are never edited in place. [`delete_rules`] captures and removes
//! every deployed rule, then [`update_rules`] recreates the desired set.
//! Creation order decides the resulting order unless metadata pins it.

use std::collections::HashSet;

use serde_json::{Map, Value};

use idsync_core::types::{DesiredRule, NewRule, Rule, RuleStage};

use crate::batch::run_bounded;
use crate::context::DeployContext;
use crate::error::{ConfigurationError, DeployError};
use crate::gateway::list_all_rules;

/// Delete every rule deployed on the tenant, recording each one in full.
///
/// An empty desired set means "no rule changes requested" and leaves the
/// tenant alone.
pub async fn delete_rules(
    ctx: &DeployContext<'_>,
    desired: &[DesiredRule],
) -> Result<(), DeployError> {
    if desired.is_empty() {
        return Ok(());
    }

    let existing = list_all_rules(ctx.gateway).await?;
    tracing::info!(existing = existing.len(), "deleting deployed rules");
    ctx.ledger
        .log(format!("deleting {} deployed rule(s)", existing.len()));

    run_bounded("delete rule", existing, ctx.concurrency, |rule| {
        delete_one(ctx, rule)
    })
    .await?;
    Ok(())
}

async fn delete_one(ctx: &DeployContext<'_>, rule: Rule) -> Result<(), DeployError> {
    ctx.gateway.delete_rule(&rule.id).await?;
    tracing::info!(
        id = %rule.id,
        name = %rule.name,
        stage = %rule.stage,
        order = rule.order,
        "deleted rule"
    );
    ctx.ledger.log(format!(
        "deleted rule {} ({}, {} #{})",
        rule.name, rule.id, rule.stage, rule.order
    ));
    ctx.ledger.record_rule_deleted(rule);
    Ok(())
}

/// Create every desired rule. Rules whose name was just deleted count as
/// updated, the rest as created; the remote call is a create either way.
pub async fn update_rules(
    ctx: &DeployContext<'_>,
    desired: &[DesiredRule],
) -> Result<(), DeployError> {
    if desired.is_empty() {
        return Ok(());
    }

    let payloads = desired
        .iter()
        .map(rule_payload)
        .collect::<Result<Vec<_>, _>>()?;
    let previously_deployed = ctx.ledger.deleted_rule_names();

    ctx.ledger.mark_rule_creation_started();
    let previously_deployed = &previously_deployed;
    run_bounded("create rule", payloads, ctx.concurrency, |payload| {
        create_one(ctx, previously_deployed, payload)
    })
    .await?;
    Ok(())
}

async fn create_one(
    ctx: &DeployContext<'_>,
    previously_deployed: &HashSet<String>,
    payload: NewRule,
) -> Result<(), DeployError> {
    let replaces_existing = previously_deployed.contains(&payload.name);
    let body = serde_json::to_string(&payload)?;
    let created = ctx.gateway.create_rule(&payload).await?;

    if replaces_existing {
        ctx.ledger.record_rule_updated();
    } else {
        ctx.ledger.record_rule_created();
    }
    let verb = if replaces_existing { "updated" } else { "created" };
    tracing::info!(
        id = %created.id,
        name = %created.name,
        stage = %created.stage,
        %body,
        "{verb} rule"
    );
    ctx.ledger
        .log(format!("{verb} rule {} ({}): {body}", created.name, created.id));
    Ok(())
}

/// Creation payload: `{enabled: true, stage: login_success}`, overridden by
/// the rule's metadata, with `name` and `script` always taken from the rule.
pub fn rule_payload(rule: &DesiredRule) -> Result<NewRule, ConfigurationError> {
    let mut body = Map::new();
    body.insert("enabled".to_string(), Value::Bool(true));
    body.insert(
        "stage".to_string(),
        Value::String(RuleStage::default().as_str().to_string()),
    );
    for (key, value) in &rule.metadata {
        body.insert(key.clone(), value.clone());
    }
    body.insert("name".to_string(), Value::String(rule.name.clone()));
    body.insert("script".to_string(), Value::String(rule.script.clone()));

    serde_json::from_value(Value::Object(body)).map_err(|source| {
        ConfigurationError::InvalidRuleMetadata {
            name: rule.name.clone(),
            source,
        }
    })
}
