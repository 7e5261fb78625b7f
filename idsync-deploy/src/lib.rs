//! Deployment engine: pushes a [`Manifest`](idsync_core::Manifest) to an
//! identity tenant and rolls the tenant back when any step fails.
//!
//! Entry points are [`deploy`] and [`revert`]. Both take a
//! [`DeployContext`] holding the [`Gateway`], the [`Ledger`] and the batch
//! concurrency.

pub mod batch;
pub mod context;
pub mod databases;
pub mod dry_run;
pub mod error;
pub mod gateway;
pub mod journal;
pub mod ledger;
pub mod memory;
pub mod pipeline;
pub mod rollback;
pub mod rules;

pub use batch::run_bounded;
pub use context::DeployContext;
pub use dry_run::{DryRunGateway, PlannedChange};
pub use error::{ConfigurationError, DeployError, RemoteCallError};
pub use gateway::Gateway;
pub use ledger::{Compensation, Ledger, LedgerCounts};
pub use memory::MemoryGateway;
pub use pipeline::{deploy, revert, DeployReport};
pub use rollback::rollback;
