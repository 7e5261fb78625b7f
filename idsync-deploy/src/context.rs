//! Per-deployment handles shared by every phase.

use crate::gateway::Gateway;
use crate::ledger::Ledger;

/// What every phase needs: the tenant, the ledger, and the concurrency ceiling.
#[derive(Clone, Copy)]
pub struct DeployContext<'a> {
    pub gateway: &'a dyn Gateway,
    pub ledger: &'a Ledger,
    pub concurrency: usize,
}

impl<'a> DeployContext<'a> {
    pub fn new(gateway: &'a dyn Gateway, ledger: &'a Ledger, concurrency: usize) -> Self {
        Self {
            gateway,
            ledger,
            concurrency,
        }
    }
}
