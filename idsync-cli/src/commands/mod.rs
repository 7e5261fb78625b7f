pub mod deploy;
pub mod rollback;
pub mod validate;

use std::future::Future;

use anyhow::{bail, Context, Result};

use idsync_core::Settings;

/// Drive `future` to completion on a fresh multi-threaded runtime.
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    Ok(runtime.block_on(future))
}

/// `--tenant` wins over `tenant:` in the settings file.
pub(crate) fn resolve_tenant(flag: Option<String>, settings: &Settings) -> Result<String> {
    match flag.or_else(|| settings.tenant.clone()) {
        Some(tenant) if !tenant.trim().is_empty() => Ok(tenant),
        _ => bail!("no tenant configured; pass --tenant or set `tenant:` in ~/.idsync/config.yaml"),
    }
}
