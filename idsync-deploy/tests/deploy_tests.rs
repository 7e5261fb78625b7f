//! End-to-end deployment and rollback against an in-memory tenant.

use idsync_core::types::{
    Connection, DesiredDatabase, DesiredRule, DesiredScript, Rule, RuleStage, ScriptStage,
};
use idsync_core::Manifest;
use idsync_deploy::journal;
use idsync_deploy::memory::Operation;
use idsync_deploy::{deploy, revert, DeployContext, DeployError, Ledger, MemoryGateway};
use rstest::rstest;
use serde_json::json;
use tempfile::TempDir;

fn connection(id: &str, name: &str, login: &str) -> Connection {
    serde_json::from_value(json!({
        "id": id,
        "name": name,
        "strategy": "auth0",
        "options": {
            "customScripts": { "login": login, "get_user": "// get_user v1" },
            "brute_force_protection": true
        }
    }))
    .expect("connection fixture")
}

fn rule(id: &str, name: &str, stage: RuleStage, order: i64) -> Rule {
    Rule {
        id: id.to_string(),
        name: name.to_string(),
        stage,
        order,
        enabled: true,
        script: format!("// {name} v1"),
    }
}

async fn tenant() -> MemoryGateway {
    let gateway = MemoryGateway::new();
    gateway.insert_connection(connection("con_1", "users", "// login v1")).await;
    gateway.insert_connection(connection("con_2", "partners", "// login v1")).await;
    gateway
        .insert_connection(
            serde_json::from_value(json!({
                "id": "con_g", "name": "google", "strategy": "google-oauth2", "options": {}
            }))
            .unwrap(),
        )
        .await;
    gateway.insert_rule(rule("rul_a", "audit", RuleStage::LoginSuccess, 1)).await;
    gateway.insert_rule(rule("rul_b", "geo", RuleStage::LoginSuccess, 2)).await;
    gateway.insert_rule(rule("rul_c", "lockout", RuleStage::LoginFailure, 1)).await;
    gateway
}

fn manifest() -> Manifest {
    Manifest {
        databases: vec![
            DesiredDatabase {
                name: "users".into(),
                scripts: vec![
                    DesiredScript {
                        stage: ScriptStage::Login,
                        contents: "// login v2".into(),
                    },
                    DesiredScript {
                        stage: ScriptStage::Create,
                        contents: "// create v1".into(),
                    },
                ],
            },
            DesiredDatabase {
                name: "partners".into(),
                scripts: vec![],
            },
        ],
        rules: vec![
            DesiredRule {
                name: "audit".into(),
                script: "// audit v2".into(),
                metadata: Default::default(),
            },
            DesiredRule {
                name: "mfa".into(),
                script: "// mfa v1".into(),
                metadata: serde_json::from_value(json!({ "stage": "pre_authorize", "order": 4 }))
                    .unwrap(),
            },
        ],
    }
}

#[tokio::test]
async fn deploy_applies_manifest_and_counts_every_change() {
    let gateway = tenant().await;
    let ledger = Ledger::new();
    let ctx = DeployContext::new(&gateway, &ledger, 2);

    let report = deploy(&ctx, &manifest()).await.expect("deploy");

    assert_eq!(report.counts.connections_updated, 2);
    assert_eq!(report.counts.rules_deleted, 3);
    assert_eq!(report.counts.rules_updated, 1);
    assert_eq!(report.counts.rules_created, 1);
    assert_eq!(report.updated_connections, 2);
    assert_eq!(report.deleted_rules, 3);
    assert!(!ledger.has_compensation(), "success clears compensation");

    let users = gateway.connection_named("users").await.unwrap();
    let scripts = users.options.custom_scripts.unwrap();
    assert_eq!(scripts.get(ScriptStage::Login), Some("// login v2"));
    assert_eq!(scripts.get(ScriptStage::Create), Some("// create v1"));
    assert_eq!(scripts.get(ScriptStage::GetUser), None, "unlisted stages are cleared");
    assert_eq!(users.options.extra["brute_force_protection"], json!(true));

    let partners = gateway.connection_named("partners").await.unwrap();
    let scripts = partners.options.custom_scripts.unwrap();
    assert!(ScriptStage::ALL.iter().all(|s| scripts.get(*s).is_none()));

    let google = gateway.connection_named("google").await.unwrap();
    assert!(google.options.custom_scripts.is_none(), "social connections untouched");

    let names: Vec<String> = gateway.rules().await.into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["audit".to_string(), "mfa".to_string()]);
}

/// Transient failures: the call fails once and the rollback's own calls go through.
#[rstest]
#[case::list_connections(Operation::ListConnections, None)]
#[case::update_connection(Operation::UpdateConnection, Some("con_2"))]
#[case::list_rules(Operation::ListRules, Some("login_failure"))]
#[case::delete_rule(Operation::DeleteRule, Some("rul_b"))]
#[case::create_rule(Operation::CreateRule, Some("mfa"))]
#[tokio::test]
async fn any_failure_restores_the_tenant(
    #[case] operation: Operation,
    #[case] target: Option<&str>,
) {
    let gateway = tenant().await;
    let connections_before = gateway.connections().await;
    let rules_before = gateway.rules().await;
    gateway.fail_once(operation, target, "injected").await;

    let ledger = Ledger::new();
    let ctx = DeployContext::new(&gateway, &ledger, 1);
    let err = deploy(&ctx, &manifest()).await.unwrap_err();
    assert!(
        matches!(err.root(), DeployError::Remote(e) if e.message == "injected"),
        "got: {err}"
    );

    assert_eq!(gateway.connections().await, connections_before);
    let strip_ids = |rules: Vec<Rule>| -> Vec<(String, RuleStage, i64, bool, String)> {
        rules
            .into_iter()
            .map(|r| (r.name, r.stage, r.order, r.enabled, r.script))
            .collect()
    };
    assert_eq!(strip_ids(gateway.rules().await), strip_ids(rules_before));
    assert!(!ledger.has_compensation());
}

#[tokio::test]
async fn missing_connection_fails_before_any_write() {
    let gateway = tenant().await;
    let ledger = Ledger::new();
    let ctx = DeployContext::new(&gateway, &ledger, 4);

    let mut wanted = manifest();
    wanted.databases.push(DesiredDatabase {
        name: "ghost".into(),
        scripts: vec![],
    });

    let err = deploy(&ctx, &wanted).await.unwrap_err();
    assert!(err.to_string().contains("ghost"), "got: {err}");
    assert!(gateway.writes().await.is_empty());
}

#[tokio::test]
async fn failed_rollback_survives_through_the_journal() {
    let home = TempDir::new().unwrap();
    let gateway = tenant().await;
    let connections_before = gateway.connections().await;

    // The deployment fails creating `mfa`; its rollback then fails recreating `lockout`.
    gateway.fail(Operation::CreateRule, Some("mfa"), "quota").await;
    gateway.fail(Operation::CreateRule, Some("lockout"), "read-only").await;
    let ledger = Ledger::new();
    let ctx = DeployContext::new(&gateway, &ledger, 1);
    let err = deploy(&ctx, &manifest()).await.unwrap_err();
    assert!(matches!(err.root(), DeployError::Remote(e) if e.message == "quota"));
    assert!(ledger.has_compensation(), "rollback could not recreate lockout");

    let path = journal::save_at(home.path(), "acme", &ledger.compensation()).unwrap();
    assert!(path.exists());

    // Later, with the tenant healthy again.
    gateway.clear_failures().await;
    let saved = journal::load_at(home.path(), "acme").unwrap().expect("journal");
    let replay = Ledger::from_compensation(saved.compensation);
    let ctx = DeployContext::new(&gateway, &replay, 3);
    revert(&ctx).await.expect("revert");
    journal::remove_at(home.path(), "acme").unwrap();

    assert!(!replay.has_compensation());
    assert_eq!(gateway.connections().await, connections_before);
    let mut names: Vec<String> = gateway.rules().await.into_iter().map(|r| r.name).collect();
    names.sort();
    assert_eq!(names, vec!["audit", "geo", "lockout"]);
    assert!(journal::load_at(home.path(), "acme").unwrap().is_none());
}

#[tokio::test]
async fn revert_with_nothing_recorded_makes_no_calls() {
    let gateway = tenant().await;
    let ledger = Ledger::new();
    let ctx = DeployContext::new(&gateway, &ledger, 2);

    revert(&ctx).await.expect("noop revert");
    assert!(gateway.calls().await.is_empty());
}

#[tokio::test]
async fn rollback_failure_keeps_ledger_and_reports_deploy_error() {
    let gateway = tenant().await;
    gateway.fail(Operation::UpdateConnection, Some("con_2"), "rate limited").await;
    let ledger = Ledger::new();
    let ctx = DeployContext::new(&gateway, &ledger, 1);

    let err = deploy(&ctx, &manifest()).await.unwrap_err();
    assert!(matches!(err, DeployError::Batch { phase: "update database", .. }), "got: {err}");
    assert!(ledger.has_compensation());
    assert_eq!(ledger.compensation().updated_connections.len(), 2);
    assert!(ledger
        .log_lines()
        .iter()
        .any(|line| line.starts_with("rollback: failed")));
}
