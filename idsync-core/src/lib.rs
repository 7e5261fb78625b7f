//! idsync core library: domain types, settings and manifest loading.
//!
//! - [`types`]: remote entities and desired state
//! - [`settings`]: `~/.idsync/config.yaml`
//! - [`manifest`]: the desired-state document handed to a deployment
//! - [`error`]: [`ConfigError`]

pub mod error;
pub mod manifest;
pub mod settings;
pub mod types;

pub use error::ConfigError;
pub use manifest::Manifest;
pub use settings::Settings;
pub use types::{
    Connection, ConnectionOptions, CustomScripts, DesiredDatabase, DesiredRule, DesiredScript,
    NewRule, Rule, RuleStage, ScriptStage,
};
