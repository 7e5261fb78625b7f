//! Domain types shared by the manifest loader and the deployment orchestrator.
//!
//! Remote entities (`Connection`, `Rule`) use the tenant's JSON field names.
//! Option maps keep every key they do not recognise in an `extra` map, so a
//! snapshot serializes back to the document it was read from.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// A custom-script slot on a username/password database connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptStage {
    Login,
    GetUser,
    Create,
    Verify,
    ChangePassword,
    Delete,
    ChangeEmail,
}

impl ScriptStage {
    /// Every recognised stage, in the order the tenant documents them.
    pub const ALL: [ScriptStage; 7] = [
        ScriptStage::Login,
        ScriptStage::GetUser,
        ScriptStage::Create,
        ScriptStage::Verify,
        ScriptStage::ChangePassword,
        ScriptStage::Delete,
        ScriptStage::ChangeEmail,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ScriptStage::Login => "login",
            ScriptStage::GetUser => "get_user",
            ScriptStage::Create => "create",
            ScriptStage::Verify => "verify",
            ScriptStage::ChangePassword => "change_password",
            ScriptStage::Delete => "delete",
            ScriptStage::ChangeEmail => "change_email",
        }
    }
}

impl fmt::Display for ScriptStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScriptStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScriptStage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown script stage '{s}'"))
    }
}

/// Execution stage of a rule. Rules are ordered per stage on the tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RuleStage {
    #[default]
    LoginSuccess,
    LoginFailure,
    PreAuthorize,
    UserRegistration,
    UserBlocked,
}

impl RuleStage {
    pub const ALL: [RuleStage; 5] = [
        RuleStage::LoginSuccess,
        RuleStage::LoginFailure,
        RuleStage::PreAuthorize,
        RuleStage::UserRegistration,
        RuleStage::UserBlocked,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RuleStage::LoginSuccess => "login_success",
            RuleStage::LoginFailure => "login_failure",
            RuleStage::PreAuthorize => "pre_authorize",
            RuleStage::UserRegistration => "user_registration",
            RuleStage::UserBlocked => "user_blocked",
        }
    }
}

impl fmt::Display for RuleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// The `customScripts` object of a connection.
///
/// Keys naming a [`ScriptStage`] with a string or `null` value land in
/// `stages`; anything else is carried through `extra` untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct CustomScripts {
    pub stages: BTreeMap<ScriptStage, Option<String>>,
    pub extra: Map<String, Value>,
}

impl CustomScripts {
    /// Copy of `self` with every recognised stage explicitly set to `null`.
    pub fn cleared(&self) -> Self {
        Self {
            stages: ScriptStage::ALL.into_iter().map(|s| (s, None)).collect(),
            extra: self.extra.clone(),
        }
    }

    pub fn set(&mut self, stage: ScriptStage, contents: impl Into<String>) {
        self.stages.insert(stage, Some(contents.into()));
    }

    pub fn get(&self, stage: ScriptStage) -> Option<&str> {
        self.stages.get(&stage).and_then(|s| s.as_deref())
    }
}

impl From<Map<String, Value>> for CustomScripts {
    fn from(map: Map<String, Value>) -> Self {
        let mut scripts = CustomScripts::default();
        for (key, value) in map {
            match (key.parse::<ScriptStage>(), value) {
                (Ok(stage), Value::String(body)) => {
                    scripts.stages.insert(stage, Some(body));
                }
                (Ok(stage), Value::Null) => {
                    scripts.stages.insert(stage, None);
                }
                (_, value) => {
                    scripts.extra.insert(key, value);
                }
            }
        }
        scripts
    }
}

impl From<CustomScripts> for Map<String, Value> {
    fn from(scripts: CustomScripts) -> Self {
        let mut map = scripts.extra;
        for (stage, body) in scripts.stages {
            map.insert(
                stage.as_str().to_owned(),
                body.map(Value::String).unwrap_or(Value::Null),
            );
        }
        map
    }
}

/// The `options` object of a connection.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectionOptions {
    #[serde(
        rename = "customScripts",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_scripts: Option<CustomScripts>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A database connection on the tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default)]
    pub options: ConnectionOptions,
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// A rule as returned by the tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub stage: RuleStage,
    pub order: i64,
    pub enabled: bool,
    pub script: String,
}

/// Creation payload for a rule. The tenant assigns `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRule {
    pub name: String,
    pub script: String,
    pub stage: RuleStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl From<Rule> for NewRule {
    fn from(rule: Rule) -> Self {
        Self {
            name: rule.name,
            script: rule.script,
            stage: rule.stage,
            order: Some(rule.order),
            enabled: Some(rule.enabled),
        }
    }
}

// ---------------------------------------------------------------------------
// Desired state
// ---------------------------------------------------------------------------

/// One script body for one stage of a desired database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredScript {
    pub stage: ScriptStage,
    pub contents: String,
}

/// Desired custom scripts for a database connection, matched by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredDatabase {
    pub name: String,
    #[serde(default)]
    pub scripts: Vec<DesiredScript>,
}

/// Desired rule. `metadata` may carry `stage`, `order` and `enabled`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredRule {
    pub name: String,
    pub script: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
