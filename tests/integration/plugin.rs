//! Host RPCs driven through `PluginServer::handle`.

use crate::common::fixtures;
use okta_provider::PluginServer;
use okta_provider::schema::UNKNOWN_SENTINEL;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn call(server: &PluginServer, rpc: &str, params: Value) -> Value {
    server.handle(rpc, params, CancellationToken::new()).await
}

async fn configured(mock: &MockServer) -> PluginServer {
    let server = PluginServer::standard().unwrap();
    let response = call(
        &server,
        "Configure",
        json!({"config": {"base_url": mock.uri(), "api_token": "test-token", "max_retries": 0}}),
    )
    .await;
    assert_eq!(response["diagnostics"], json!([]), "{response}");
    server
}

fn no_errors(response: &Value) {
    let errors: Vec<&Value> = response["diagnostics"]
        .as_array()
        .map(|all| all.iter().filter(|d| d["severity"] == "error").collect())
        .unwrap_or_default();
    assert!(errors.is_empty(), "{response}");
}

#[tokio::test]
async fn test_get_schema_lists_every_type() {
    let server = PluginServer::standard().unwrap();
    let response = call(&server, "GetSchema", Value::Null).await;

    let resources = response["schema"]["resources"].as_object().unwrap();
    for type_name in [
        "okta_group",
        "okta_group_rule",
        "okta_group_memberships",
        "okta_policy_rule_password",
        "okta_policy_rule_signon",
        "okta_authenticator",
    ] {
        assert!(resources.contains_key(type_name), "missing {type_name}");
    }
    assert!(response["schema"]["data_sources"]["okta_group"].is_object());
}

#[tokio::test]
async fn test_validate_reports_legacy_alias() {
    let server = PluginServer::standard().unwrap();
    let response = call(
        &server,
        "ValidateConfig",
        json!({
            "type_name": "okta_policy_rule_signon",
            "config": {"policy_id": "00p1", "name": "Rule", "risc_level": "HIGH"},
        }),
    )
    .await;
    let diagnostics = response["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0]["severity"], "warning");

    let conflicting = call(
        &server,
        "ValidateConfig",
        json!({
            "type_name": "okta_policy_rule_signon",
            "config": {"policy_id": "00p1", "name": "Rule", "risc_level": "HIGH", "risk_level": "LOW"},
        }),
    )
    .await;
    assert_eq!(conflicting["diagnostics"][0]["severity"], "error");
}

#[tokio::test]
async fn test_group_plan_apply_read_import() {
    let mock = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::group("00g1", "Engineers")))
        .expect(1)
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/groups/00g1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::group("00g1", "Engineers")))
        .mount(&mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/mappings"))
        .and(query_param("sourceId", "00g1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "prm1"}])))
        .mount(&mock)
        .await;
    let server = configured(&mock).await;

    let plan = call(
        &server,
        "PlanChange",
        json!({"type_name": "okta_group", "config": {"name": "Engineers"}}),
    )
    .await;
    no_errors(&plan);
    assert_eq!(plan["action"], "create");
    assert_eq!(plan["planned_state"]["type"], UNKNOWN_SENTINEL);

    let applied = call(
        &server,
        "ApplyChange",
        json!({"type_name": "okta_group", "planned_state": plan["planned_state"]}),
    )
    .await;
    no_errors(&applied);
    let state = applied["new_state"].clone();
    assert_eq!(state["id"], "00g1");
    assert_eq!(state["profile_mapping_id"], "prm1");

    let read = call(
        &server,
        "ReadResource",
        json!({"type_name": "okta_group", "current_state": state}),
    )
    .await;
    no_errors(&read);
    assert_eq!(read["new_state"]["id"], "00g1");

    let replan = call(
        &server,
        "PlanChange",
        json!({
            "type_name": "okta_group",
            "prior_state": read["new_state"],
            "config": {"name": "Engineers", "description": "Managed by tests"},
        }),
    )
    .await;
    assert_eq!(replan["action"], "noop", "{replan}");

    let imported = call(
        &server,
        "ImportResource",
        json!({"type_name": "okta_group", "id": "00g1"}),
    )
    .await;
    no_errors(&imported);
    assert_eq!(imported["new_state"]["name"], "Engineers");
}

#[tokio::test]
async fn test_group_data_source_exact_match() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/groups"))
        .and(query_param("q", "Eng"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            fixtures::group("00g1", "Engineers"),
            fixtures::group("00g2", "Eng"),
        ])))
        .mount(&mock)
        .await;
    let server = configured(&mock).await;

    let response = call(
        &server,
        "ReadDataSource",
        json!({"type_name": "okta_group", "config": {"name": "Eng"}}),
    )
    .await;
    no_errors(&response);
    assert_eq!(response["new_state"]["id"], "00g2");
    assert_eq!(response["new_state"]["description"], "Managed by tests");
}

#[tokio::test]
async fn test_destroy_plan_and_apply() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/groups/00g1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::group("00g1", "Engineers")))
        .mount(&mock)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/groups/00g1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock)
        .await;
    let server = configured(&mock).await;
    let prior = json!({"id": "00g1", "name": "Engineers"});

    let plan = call(
        &server,
        "PlanChange",
        json!({"type_name": "okta_group", "prior_state": prior}),
    )
    .await;
    assert_eq!(plan["action"], "delete");
    assert!(plan["planned_state"].is_null());

    let applied = call(
        &server,
        "ApplyChange",
        json!({"type_name": "okta_group", "prior_state": prior}),
    )
    .await;
    no_errors(&applied);
    assert!(applied["new_state"].is_null());
}
