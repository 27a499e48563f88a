//! Single-object reconciliation against a mock org.

use crate::common::fixtures;
use crate::common::{assert_ok, context};
use okta_provider::reconciler::{PlanAction, object};
use okta_provider::resource::{ObjectDescriptor, STATUS_ACTIVE, STATUS_INACTIVE, STATUS_INVALID};
use okta_provider::resources::{group, group_rule, policy_rule};
use okta_provider::schema::{AttrValue, StateValue};
use serde_json::json;
use wiremock::matchers::{any, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn planned(desc: &ObjectDescriptor, config: StateValue) -> StateValue {
    let result = object::plan(desc, &StateValue::new(), Some(&config));
    assert_eq!(result.action, PlanAction::Create);
    result.planned.expect("create plan carries a planned state")
}

fn rule_state(id: &str, status: &str) -> StateValue {
    StateValue::with_id(id)
        .with("name", "Engineering")
        .with("group_assignments", AttrValue::string_list(["00g1"]))
        .with("expression_type", "urn:okta:expression:1.0")
        .with("expression_value", "user.department == \"Engineering\"")
        .with("status", status)
        .with("remove_assigned_users", false)
}

async fn mock_group(server: &MockServer, id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/groups/{id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::group(id, "Engineers")))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_group_create_reads_back_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::group("00g1", "Engineers")))
        .expect(1)
        .mount(&server)
        .await;
    mock_group(&server, "00g1").await;
    Mock::given(method("GET"))
        .and(path("/api/v1/mappings"))
        .and(query_param("sourceId", "00g1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "prm1"}])))
        .mount(&server)
        .await;

    let desc = group::descriptor();
    let plan = planned(&desc, StateValue::new().with("name", "Engineers"));
    assert!(plan.get("type").is_unknown());

    let outcome = object::create(&context(&server), &desc, &plan).await;
    assert_ok(&outcome);
    let state = outcome.state.unwrap();
    assert_eq!(state.id, "00g1");
    assert_eq!(state.str("name"), Some("Engineers"));
    assert_eq!(state.str("type"), Some("OKTA_GROUP"));
    assert_eq!(state.str("profile_mapping_id"), Some("prm1"));
}

#[tokio::test]
async fn test_unauthorized_supplemental_read_is_a_warning() {
    let server = MockServer::start().await;
    mock_group(&server, "00g1").await;
    Mock::given(method("GET"))
        .and(path("/api/v1/mappings"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(fixtures::api_error("E0000011", "Invalid token provided")),
        )
        .mount(&server)
        .await;

    let prior = StateValue::with_id("00g1").with("name", "Engineers");
    let outcome = object::read(&context(&server), &group::descriptor(), &prior).await;

    assert_ok(&outcome);
    assert_eq!(outcome.diagnostics.warnings().count(), 1);
    let state = outcome.state.unwrap();
    assert_eq!(state.id, "00g1");
    assert!(state.get("profile_mapping_id").is_null());
}

#[tokio::test]
async fn test_policy_rule_created_inactive() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/policies/00p1/rules"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(fixtures::password_rule("0pr1", STATUS_ACTIVE, 1)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/policies/00p1/rules/0pr1/lifecycle/deactivate"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/policies/00p1/rules/0pr1/lifecycle/activate"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/policies/00p1/rules/0pr1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(fixtures::password_rule("0pr1", STATUS_INACTIVE, 1)),
        )
        .mount(&server)
        .await;

    let desc = policy_rule::password_descriptor();
    let plan = planned(
        &desc,
        StateValue::new()
            .with("policy_id", "00p1")
            .with("name", "Rule")
            .with("status", STATUS_INACTIVE),
    );
    let outcome = object::create(&context(&server), &desc, &plan).await;

    assert_ok(&outcome);
    let state = outcome.state.unwrap();
    assert_eq!(state.id, "0pr1");
    assert_eq!(state.str("status"), Some(STATUS_INACTIVE));
    assert_eq!(state.str("policy_id"), Some("00p1"));
    assert_eq!(state.int("priority"), Some(1));
}

#[tokio::test]
async fn test_group_rule_activated_after_create() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/groups/rules"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(fixtures::group_rule("r1", STATUS_INACTIVE)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/groups/rules/r1/lifecycle/activate"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/groups/rules/r1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(fixtures::group_rule("r1", STATUS_ACTIVE)),
        )
        .mount(&server)
        .await;

    let desc = group_rule::descriptor();
    let mut config = rule_state("", STATUS_ACTIVE);
    config.values.remove("remove_assigned_users");
    let outcome = object::create(&context(&server), &desc, &planned(&desc, config)).await;

    assert_ok(&outcome);
    let state = outcome.state.unwrap();
    assert_eq!(state.str("status"), Some(STATUS_ACTIVE));
    assert_eq!(state.bool("remove_assigned_users"), Some(false));
}

#[tokio::test]
async fn test_group_rule_update_deactivates_first() {
    let server = MockServer::start().await;
    for (verb, route) in [
        ("POST", "/api/v1/groups/rules/r1/lifecycle/deactivate"),
        ("PUT", "/api/v1/groups/rules/r1"),
        ("POST", "/api/v1/groups/rules/r1/lifecycle/activate"),
    ] {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/api/v1/groups/rules/r1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(fixtures::group_rule("r1", STATUS_ACTIVE)),
        )
        .mount(&server)
        .await;

    let desc = group_rule::descriptor();
    let prior = rule_state("r1", STATUS_ACTIVE);
    let config = rule_state("", STATUS_ACTIVE).with("expression_value", "user.title == \"Engineer\"");
    let plan = object::plan(&desc, &prior, Some(&config));
    assert_eq!(plan.action, PlanAction::Update);

    let outcome = object::apply(&context(&server), &desc, &prior, plan.planned.as_ref()).await;
    assert_ok(&outcome);
    assert_eq!(outcome.state.unwrap().id, "r1");
}

#[tokio::test]
async fn test_invalid_rule_is_replaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/groups/rules/r1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(fixtures::group_rule("r1", STATUS_INVALID)),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/groups/rules/r1/lifecycle/deactivate"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/groups/rules/r1"))
        .and(query_param("removeUsers", "false"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/groups/rules"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(fixtures::group_rule("r2", STATUS_INACTIVE)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/groups/rules/r2/lifecycle/activate"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/groups/rules/r2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(fixtures::group_rule("r2", STATUS_ACTIVE)),
        )
        .mount(&server)
        .await;

    let desc = group_rule::descriptor();
    let prior = rule_state("r1", STATUS_INVALID);
    let config = rule_state("", STATUS_ACTIVE).with("name", "Engineering v2");
    let plan = object::plan(&desc, &prior, Some(&config));
    assert_eq!(plan.action, PlanAction::Replace);
    assert_eq!(plan.requires_replace, vec!["status".to_string()]);

    let outcome = object::apply(&context(&server), &desc, &prior, plan.planned.as_ref()).await;
    assert_ok(&outcome);
    let state = outcome.state.unwrap();
    assert_eq!(state.id, "r2");
    assert_eq!(state.str("status"), Some(STATUS_ACTIVE));
}

#[tokio::test]
async fn test_vanished_object_is_tainted_silently() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/groups/00g1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(fixtures::api_error(
            "E0000007",
            "Not found: Resource not found: 00g1 (UserGroup)",
        )))
        .mount(&server)
        .await;

    let prior = StateValue::with_id("00g1").with("name", "Engineers");
    let outcome = object::read(&context(&server), &group::descriptor(), &prior).await;

    assert!(outcome.diagnostics.is_empty());
    let state = outcome.state.unwrap();
    assert!(!state.exists());
    assert_eq!(state.str("name"), Some("Engineers"));
}

#[tokio::test]
async fn test_unchanged_apply_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let prior = StateValue::with_id("00g1")
        .with("name", "Engineers")
        .with("description", "Managed by tests")
        .with("type", "OKTA_GROUP");
    let outcome = object::apply(&context(&server), &group::descriptor(), &prior, Some(&prior)).await;

    assert_ok(&outcome);
    assert_eq!(outcome.state, Some(prior));
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/groups/00g1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let ctx = context(&server);
    let desc = group::descriptor();
    let prior = StateValue::with_id("00g1").with("name", "Engineers");
    for _ in 0..2 {
        let outcome = object::delete(&ctx, &desc, &prior).await;
        assert_ok(&outcome);
        assert!(outcome.state.is_none());
    }
}

#[tokio::test]
async fn test_retained_object_is_only_forgotten() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let desc = group::descriptor().retain_on_destroy();
    let prior = StateValue::with_id("00g1").with("name", "Engineers");
    let outcome = object::delete(&context(&server), &desc, &prior).await;

    assert_ok(&outcome);
    assert!(outcome.state.is_none());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_referenced_group_delete_is_a_warning() {
    let server = MockServer::start().await;
    mock_group(&server, "00g1").await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/groups/00g1"))
        .respond_with(ResponseTemplate::new(403).set_body_json(fixtures::api_error(
            "E0000006",
            "This group cannot be deleted because it is assigned to an app",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let prior = StateValue::with_id("00g1").with("name", "Engineers");
    let outcome = object::delete(&context(&server), &group::descriptor(), &prior).await;

    assert_ok(&outcome);
    assert!(outcome.state.is_none());
    assert_eq!(outcome.diagnostics.warnings().count(), 1);
}

#[tokio::test]
async fn test_import_parent_child_identifier() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/policies/00p1/rules/0pr1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(fixtures::password_rule("0pr1", STATUS_ACTIVE, 2)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let desc = policy_rule::password_descriptor();
    let outcome = object::import(&context(&server), &desc, "00p1/0pr1").await;

    assert_ok(&outcome);
    let state = outcome.state.unwrap();
    assert_eq!(state.id, "0pr1");
    assert_eq!(state.str("policy_id"), Some("00p1"));
    assert_eq!(state.int("priority"), Some(2));
    assert_eq!(state.str("password_unlock"), Some("DENY"));
}

#[tokio::test]
async fn test_import_missing_object_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/policies/00p1/rules/0pr9"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let desc = policy_rule::password_descriptor();
    let outcome = object::import(&context(&server), &desc, "00p1/0pr9").await;

    assert!(outcome.state.is_none());
    let error = outcome.diagnostics.errors().next().unwrap();
    assert_eq!(error.summary, "Cannot import non-existent remote object");
}

#[tokio::test]
async fn test_malformed_import_identifier_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let desc = policy_rule::password_descriptor();
    let outcome = object::import(&context(&server), &desc, "0pr1").await;
    assert!(outcome.has_errors());
    assert!(outcome.state.is_none());
}
