//! `idsync validate`: check a manifest offline.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use idsync_core::manifest;

/// Arguments for `idsync validate`.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the manifest YAML.
    #[arg(long)]
    pub manifest: PathBuf,
}

impl ValidateArgs {
    pub fn run(self) -> Result<()> {
        let manifest = manifest::load(&self.manifest)
            .with_context(|| format!("invalid manifest '{}'", self.manifest.display()))?;

        let scripts: usize = manifest.databases.iter().map(|db| db.scripts.len()).sum();
        println!(
            "{} {}: {} database(s), {} script(s), {} rule(s)",
            "✓".green(),
            self.manifest.display(),
            manifest.databases.len(),
            scripts,
            manifest.rules.len()
        );
        if manifest.is_empty() {
            println!("  manifest is empty; a deploy would change nothing");
        }
        Ok(())
    }
}
