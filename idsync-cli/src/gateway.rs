//! Management API v2 client.
//!
//! `ureq` is blocking, so every call runs on `tokio::task::spawn_blocking`
//! and the batch executor's concurrency ceiling still bounds the number of
//! requests in flight.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;

use idsync_core::types::{Connection, ConnectionOptions, NewRule, Rule, RuleStage};
use idsync_core::Settings;
use idsync_deploy::{Gateway, RemoteCallError};

const TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct HttpGateway {
    agent: ureq::Agent,
    base_url: String,
    authorization: String,
}

impl HttpGateway {
    pub fn new(tenant: &str, token: &str) -> Self {
        let base = tenant.trim_end_matches('/');
        let base_url = if base.starts_with("http://") || base.starts_with("https://") {
            base.to_string()
        } else {
            format!("https://{base}")
        };
        Self {
            agent: ureq::AgentBuilder::new().timeout(TIMEOUT).build(),
            base_url,
            authorization: format!("Bearer {token}"),
        }
    }

    /// Build a client for `tenant`, reading the token from the environment
    /// variable named by `settings.token_env`.
    pub fn from_settings(tenant: &str, settings: &Settings) -> Result<Self> {
        let token = std::env::var(&settings.token_env).with_context(|| {
            format!(
                "management API token missing; set ${} (see `token_env` in settings)",
                settings.token_env
            )
        })?;
        Ok(Self::new(tenant, &token))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v2/{path}", self.base_url)
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        self.agent
            .request(method, &self.url(path))
            .set("Authorization", &self.authorization)
    }

    /// Run `call` on the blocking pool and tag any failure with
    /// `operation`/`target`.
    async fn blocking<T, F>(
        &self,
        operation: &'static str,
        target: &str,
        call: F,
    ) -> Result<T, RemoteCallError>
    where
        T: Send + 'static,
        F: FnOnce(HttpGateway) -> Result<T, String> + Send + 'static,
    {
        let this = self.clone();
        let outcome = tokio::task::spawn_blocking(move || call(this))
            .await
            .map_err(|e| RemoteCallError::new(operation, target, e.to_string()))?;
        outcome.map_err(|message| RemoteCallError::new(operation, target, message))
    }
}

fn describe(err: ureq::Error) -> String {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            format!("HTTP {code}: {body}")
        }
        ureq::Error::Transport(transport) => transport.to_string(),
    }
}

fn decode<T: DeserializeOwned>(response: ureq::Response) -> Result<T, String> {
    response
        .into_json()
        .map_err(|e| format!("unexpected response body: {e}"))
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn list_connections(&self, strategy: &str) -> Result<Vec<Connection>, RemoteCallError> {
        let strategy_param = strategy.to_string();
        self.blocking("list connections", strategy, move |gw| {
            let response = gw
                .request("GET", "connections")
                .query("strategy", &strategy_param)
                .call()
                .map_err(describe)?;
            decode(response)
        })
        .await
    }

    async fn update_connection(
        &self,
        id: &str,
        options: &ConnectionOptions,
    ) -> Result<Connection, RemoteCallError> {
        let path = format!("connections/{id}");
        let body = json!({ "options": options });
        self.blocking("update connection", id, move |gw| {
            let response = gw
                .request("PATCH", &path)
                .send_json(body)
                .map_err(describe)?;
            decode(response)
        })
        .await
    }

    async fn list_rules(&self, stage: RuleStage) -> Result<Vec<Rule>, RemoteCallError> {
        self.blocking("list rules", stage.as_str(), move |gw| {
            let response = gw
                .request("GET", "rules")
                .query("stage", stage.as_str())
                .call()
                .map_err(describe)?;
            decode(response)
        })
        .await
    }

    async fn delete_rule(&self, id: &str) -> Result<(), RemoteCallError> {
        let path = format!("rules/{id}");
        self.blocking("delete rule", id, move |gw| {
            gw.request("DELETE", &path).call().map_err(describe)?;
            Ok(())
        })
        .await
    }

    async fn create_rule(&self, rule: &NewRule) -> Result<Rule, RemoteCallError> {
        let body = serde_json::to_value(rule)
            .map_err(|e| RemoteCallError::new("create rule", rule.name.as_str(), e.to_string()))?;
        self.blocking("create rule", &rule.name, move |gw| {
            let response = gw
                .request("POST", "rules")
                .send_json(body)
                .map_err(describe)?;
            decode(response)
        })
        .await
    }
}
