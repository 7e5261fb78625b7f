//! Database-connection synchronizer.
//!
//! Resolves every desired database against the tenant's username/password
//! connections with a single list call, then rewrites each connection's
//! custom scripts through the bounded batch executor.

use std::collections::{HashMap, HashSet};

use idsync_core::types::{Connection, ConnectionOptions, CustomScripts, DesiredDatabase};

use crate::batch::run_bounded;
use crate::context::DeployContext;
use crate::error::{ConfigurationError, DeployError};
use crate::gateway::DATABASE_STRATEGY;

/// Push the desired custom scripts onto their connections.
///
/// Each connection snapshot is recorded in the ledger before its update is
/// issued, so a failed call may leave a redundant entry; restoring it is a
/// no-op on the tenant.
pub async fn update_databases(
    ctx: &DeployContext<'_>,
    desired: &[DesiredDatabase],
) -> Result<(), DeployError> {
    if desired.is_empty() {
        return Ok(());
    }

    let wanted: HashSet<&str> = desired.iter().map(|db| db.name.as_str()).collect();
    let existing: HashMap<String, Connection> = ctx
        .gateway
        .list_connections(DATABASE_STRATEGY)
        .await?
        .into_iter()
        .filter(|c| wanted.contains(c.name.as_str()))
        .map(|c| (c.name.clone(), c))
        .collect();

    tracing::info!(
        desired = desired.len(),
        matched = existing.len(),
        "resolved database connections"
    );
    ctx.ledger.log(format!(
        "resolved {} of {} database connection(s)",
        existing.len(),
        desired.len()
    ));

    // Unknown names abort before any connection is touched.
    if let Some(missing) = desired.iter().find(|db| !existing.contains_key(&db.name)) {
        return Err(ConfigurationError::MissingConnection {
            name: missing.name.clone(),
        }
        .into());
    }

    let existing = &existing;
    run_bounded(
        "update database",
        desired.iter().collect(),
        ctx.concurrency,
        |db| update_one(ctx, existing, db),
    )
    .await?;
    Ok(())
}

async fn update_one(
    ctx: &DeployContext<'_>,
    existing: &HashMap<String, Connection>,
    db: &DesiredDatabase,
) -> Result<(), DeployError> {
    let connection = existing
        .get(&db.name)
        .ok_or_else(|| ConfigurationError::MissingConnection {
            name: db.name.clone(),
        })?;
    let options = desired_options(connection, db);
    let payload = serde_json::to_string(&options)?;

    ctx.ledger.record_connection_update(connection.clone());
    tracing::info!(
        id = %connection.id,
        name = %connection.name,
        %payload,
        "updating database connection"
    );
    ctx.ledger.log(format!(
        "updating database {} ({}): {payload}",
        connection.name, connection.id
    ));

    ctx.gateway
        .update_connection(&connection.id, &options)
        .await?;
    Ok(())
}

/// Current options with every recognised script stage reset to `null`, then
/// the desired scripts applied.
pub fn desired_options(connection: &Connection, db: &DesiredDatabase) -> ConnectionOptions {
    let mut options = connection.options.clone();
    let mut scripts = options
        .custom_scripts
        .as_ref()
        .map(CustomScripts::cleared)
        .unwrap_or_else(|| CustomScripts::default().cleared());
    for script in &db.scripts {
        scripts.set(script.stage, script.contents.clone());
    }
    options.custom_scripts = Some(scripts);
    options
}
