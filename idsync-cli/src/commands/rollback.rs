//! `idsync rollback`: replay a journal left behind by a failed rollback.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use idsync_core::settings;
use idsync_deploy::{journal, revert, DeployContext, Ledger};

use crate::commands::{block_on, resolve_tenant};
use crate::gateway::HttpGateway;

/// Arguments for `idsync rollback`.
#[derive(Args, Debug)]
pub struct RollbackArgs {
    /// Tenant domain; overrides `tenant:` in ~/.idsync/config.yaml.
    #[arg(long)]
    pub tenant: Option<String>,
}

impl RollbackArgs {
    pub fn run(self) -> Result<()> {
        let home = settings::home()?;
        let settings = settings::load_at(&home).context("failed to load settings")?;
        let tenant = resolve_tenant(self.tenant, &settings)?;

        let Some(pending) = journal::load_at(&home, &tenant)
            .with_context(|| format!("failed to read rollback journal for '{tenant}'"))?
        else {
            println!("{} '{tenant}': nothing to roll back", "✓".green());
            return Ok(());
        };

        tracing::info!(
            tenant = %tenant,
            recorded_at = %pending.recorded_at,
            connections = pending.compensation.updated_connections.len(),
            rules = pending.compensation.deleted_rules.len(),
            "replaying rollback journal"
        );

        let http = HttpGateway::from_settings(&tenant, &settings)?;
        let ledger = Ledger::from_compensation(pending.compensation);
        let outcome = block_on(async {
            let ctx = DeployContext::new(&http, &ledger, settings.concurrency);
            revert(&ctx).await
        })?;

        if let Err(err) = outcome {
            // Keep whatever is still outstanding for the next attempt.
            journal::save_at(&home, &tenant, &ledger.compensation())?;
            return Err(anyhow::Error::new(err).context(format!("rollback of '{tenant}' failed")));
        }

        journal::remove_at(&home, &tenant)?;
        println!("{} '{tenant}' restored", "✓".green());
        Ok(())
    }
}
