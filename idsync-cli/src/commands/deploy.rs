//! `idsync deploy`: apply a manifest, rolling back on failure.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use idsync_core::{manifest, settings, Manifest};
use idsync_deploy::{
    deploy, journal, DeployContext, DeployError, DeployReport, DryRunGateway, Gateway, Ledger,
    PlannedChange,
};

use crate::commands::{block_on, resolve_tenant};
use crate::gateway::HttpGateway;

/// Arguments for `idsync deploy`.
#[derive(Args, Debug)]
pub struct DeployArgs {
    /// Path to the manifest YAML.
    #[arg(long)]
    pub manifest: PathBuf,

    /// Tenant domain; overrides `tenant:` in ~/.idsync/config.yaml.
    #[arg(long)]
    pub tenant: Option<String>,

    /// Maximum simultaneous API calls per phase.
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: Option<u16>,

    /// Read the tenant and report what would change without writing.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit JSON log lines and a JSON report.
    #[arg(long)]
    pub json: bool,
}

impl DeployArgs {
    pub fn run(self) -> Result<()> {
        let home = settings::home()?;
        let settings = settings::load_at(&home).context("failed to load settings")?;
        let manifest = manifest::load(&self.manifest)
            .with_context(|| format!("invalid manifest '{}'", self.manifest.display()))?;
        let tenant = resolve_tenant(self.tenant.clone(), &settings)?;
        let concurrency = self
            .concurrency
            .map(usize::from)
            .unwrap_or(settings.concurrency);

        if let Some(pending) = journal::load_at(&home, &tenant)? {
            bail!(
                "tenant '{tenant}' has an unfinished rollback from {}; run `idsync rollback` first",
                pending.recorded_at.to_rfc3339()
            );
        }

        let http = HttpGateway::from_settings(&tenant, &settings)?;
        let ledger = Ledger::new();
        if self.dry_run {
            let gateway = DryRunGateway::new(http);
            let report = run_deploy(&gateway, &ledger, &manifest, concurrency)?
                .with_context(|| format!("dry-run against '{tenant}' failed"))?;
            return self.print_dry_run(&tenant, &report, &gateway.planned());
        }

        let outcome = run_deploy(&http, &ledger, &manifest, concurrency)?;
        match outcome {
            Ok(report) => self.print_report(&tenant, &report),
            Err(err) => {
                if ledger.has_compensation() {
                    save_journal(&home, &tenant, &ledger)?;
                }
                Err(anyhow::Error::new(err).context(format!("deployment to '{tenant}' failed")))
            }
        }
    }

    fn print_report(&self, tenant: &str, report: &DeployReport) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(report)?);
            return Ok(());
        }
        println!(
            "{} deployed to '{tenant}' in {} ms",
            "✓".green(),
            report.duration_ms
        );
        println!("{}", summary_table(report));
        Ok(())
    }

    fn print_dry_run(
        &self,
        tenant: &str,
        report: &DeployReport,
        planned: &[PlannedChange],
    ) -> Result<()> {
        if self.json {
            #[derive(Serialize)]
            struct DryRunJson<'a> {
                report: &'a DeployReport,
                planned: &'a [PlannedChange],
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&DryRunJson { report, planned })?
            );
            return Ok(());
        }

        if planned.is_empty() {
            println!("[dry-run] {} '{tenant}': nothing to do", "✓".green());
            return Ok(());
        }
        println!(
            "[dry-run] {} '{tenant}': {} change(s) planned",
            "~".yellow(),
            planned.len()
        );
        for change in planned {
            match change {
                PlannedChange::UpdateConnection { id, name, .. } => {
                    println!("  ✎  update database {name} ({id})")
                }
                PlannedChange::DeleteRule { id, name } => {
                    println!("  {}  delete rule {name} ({id})", "-".red())
                }
                PlannedChange::CreateRule(rule) => {
                    println!("  {}  create rule {} [{}]", "+".green(), rule.name, rule.stage)
                }
            }
        }
        println!("{}", summary_table(report));
        Ok(())
    }
}

fn run_deploy(
    gateway: &dyn Gateway,
    ledger: &Ledger,
    manifest: &Manifest,
    concurrency: usize,
) -> Result<Result<DeployReport, DeployError>> {
    block_on(async {
        let ctx = DeployContext::new(gateway, ledger, concurrency);
        deploy(&ctx, manifest).await
    })
}

fn save_journal(home: &Path, tenant: &str, ledger: &Ledger) -> Result<()> {
    let path = journal::save_at(home, tenant, &ledger.compensation())
        .context("rollback failed and the rollback journal could not be written")?;
    eprintln!(
        "{} rollback did not finish; state saved to {}. Run `idsync rollback --tenant {tenant}` to retry.",
        "!".red().bold(),
        path.display()
    );
    Ok(())
}

#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "change")]
    change: &'static str,
    #[tabled(rename = "count")]
    count: u64,
}

fn summary_table(report: &DeployReport) -> String {
    let counts = report.counts;
    let rows = vec![
        SummaryRow {
            change: "databases updated",
            count: counts.connections_updated,
        },
        SummaryRow {
            change: "rules deleted",
            count: counts.rules_deleted,
        },
        SummaryRow {
            change: "rules updated",
            count: counts.rules_updated,
        },
        SummaryRow {
            change: "rules created",
            count: counts.rules_created,
        },
    ];
    Table::new(rows).with(Style::rounded()).to_string()
}
