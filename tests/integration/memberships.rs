//! Group membership sets in both tracking modes.

use crate::common::fixtures;
use crate::common::{assert_ok, context};
use okta_provider::reconciler::{PlanAction, object};
use okta_provider::resources::group_memberships;
use okta_provider::schema::{AttrValue, StateValue};
use serde_json::json;
use std::collections::BTreeSet;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USERS_PATH: &str = "/api/v1/groups/00g1/users";

fn members(ids: &[&str]) -> AttrValue {
    AttrValue::set(ids.iter().copied())
}

fn set(ids: &[&str]) -> BTreeSet<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

fn tracked(ids: &[&str], track_all_users: bool) -> StateValue {
    StateValue::with_id("00g1")
        .with("group_id", "00g1")
        .with("users", members(ids))
        .with("track_all_users", track_all_users)
}

async fn mock_listing(server: &MockServer, ids: &[&str], times: Option<u64>) {
    let mock = Mock::given(method("GET"))
        .and(path(USERS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::users(ids)));
    match times {
        Some(times) => mock.up_to_n_times(times).mount(server).await,
        None => mock.mount(server).await,
    }
}

async fn expect_write(server: &MockServer, verb: &str, user: &str, times: u64) {
    Mock::given(method(verb))
        .and(path(format!("{USERS_PATH}/{user}")))
        .respond_with(ResponseTemplate::new(204))
        .expect(times)
        .mount(server)
        .await;
}

/// Catch-all for writes no test expects; mounted after the specific mocks.
async fn forbid_other_writes(server: &MockServer) {
    for verb in ["PUT", "DELETE"] {
        Mock::given(method(verb))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(server)
            .await;
    }
}

#[tokio::test]
async fn test_create_adds_every_member() {
    let server = MockServer::start().await;
    expect_write(&server, "PUT", "u1", 1).await;
    Mock::given(method("PUT"))
        .and(path(format!("{USERS_PATH}/u2")))
        .respond_with(ResponseTemplate::new(400).set_body_json(fixtures::api_error(
            "E0000001",
            "Api validation failed: user is already a member of the group",
        )))
        .expect(1)
        .mount(&server)
        .await;
    forbid_other_writes(&server).await;
    mock_listing(&server, &["u1", "u2"], None).await;

    let desc = group_memberships::descriptor();
    let config = StateValue::new()
        .with("group_id", "00g1")
        .with("users", members(&["u1", "u2"]));
    let plan = object::plan(&desc, &StateValue::new(), Some(&config));
    assert_eq!(plan.action, PlanAction::Create);

    let outcome = object::create(&context(&server), &desc, &plan.planned.unwrap()).await;
    assert_ok(&outcome);
    let state = outcome.state.unwrap();
    assert_eq!(state.id, "00g1");
    assert_eq!(state.strings("users"), set(&["u1", "u2"]));
    assert_eq!(state.bool("track_all_users"), Some(false));
}

#[tokio::test]
async fn test_create_under_missing_group_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/groups/00gMISSING/users"))
        .respond_with(ResponseTemplate::new(404).set_body_json(fixtures::api_error(
            "E0000007",
            "Not found: Resource not found: 00gMISSING (UserGroup)",
        )))
        .mount(&server)
        .await;
    forbid_other_writes(&server).await;

    let desc = group_memberships::descriptor();
    let config = StateValue::new()
        .with("group_id", "00gMISSING")
        .with("users", members(&[]));
    let plan = object::plan(&desc, &StateValue::new(), Some(&config));

    let outcome = object::create(&context(&server), &desc, &plan.planned.unwrap()).await;
    assert!(outcome.state.is_none());
    let error = outcome.diagnostics.errors().next().unwrap();
    assert!(error.detail.contains("00gMISSING"), "{error:?}");
}

#[tokio::test]
async fn test_additive_update_leaves_untracked_members() {
    let server = MockServer::start().await;
    expect_write(&server, "DELETE", "u2", 1).await;
    expect_write(&server, "PUT", "u4", 1).await;
    forbid_other_writes(&server).await;
    mock_listing(&server, &["u1", "u3", "u4", "outsider"], None).await;

    let desc = group_memberships::descriptor();
    let prior = tracked(&["u1", "u2", "u3"], false);
    let config = StateValue::new()
        .with("group_id", "00g1")
        .with("users", members(&["u1", "u3", "u4"]));
    let plan = object::plan(&desc, &prior, Some(&config));
    assert_eq!(plan.action, PlanAction::Update);

    let outcome = object::apply(&context(&server), &desc, &prior, plan.planned.as_ref()).await;
    assert_ok(&outcome);
    assert_eq!(
        outcome.state.unwrap().strings("users"),
        set(&["u1", "u3", "u4"])
    );
}

#[tokio::test]
async fn test_authoritative_update_removes_outsiders() {
    let server = MockServer::start().await;
    expect_write(&server, "PUT", "u3", 1).await;
    expect_write(&server, "DELETE", "u2", 1).await;
    expect_write(&server, "DELETE", "outsider", 1).await;
    forbid_other_writes(&server).await;
    mock_listing(&server, &["u1", "u2", "outsider"], Some(1)).await;
    mock_listing(&server, &["u1", "u3"], None).await;

    let desc = group_memberships::descriptor();
    let prior = tracked(&["u1", "u2"], true);
    let config = StateValue::new()
        .with("group_id", "00g1")
        .with("users", members(&["u1", "u3"]))
        .with("track_all_users", true);
    let plan = object::plan(&desc, &prior, Some(&config));

    let outcome = object::apply(&context(&server), &desc, &prior, plan.planned.as_ref()).await;
    assert_ok(&outcome);
    assert_eq!(outcome.state.unwrap().strings("users"), set(&["u1", "u3"]));
}

#[tokio::test]
async fn test_authoritative_read_reports_drift() {
    let server = MockServer::start().await;
    mock_listing(&server, &["u1", "u2", "outsider"], None).await;

    let prior = tracked(&["u1", "u2"], true);
    let outcome = object::read(&context(&server), &group_memberships::descriptor(), &prior).await;

    assert_ok(&outcome);
    assert_eq!(
        outcome.state.unwrap().strings("users"),
        set(&["u1", "u2", "outsider"])
    );
}

#[tokio::test]
async fn test_additive_read_drops_removed_members() {
    let server = MockServer::start().await;
    mock_listing(&server, &["u1", "outsider"], None).await;

    let prior = tracked(&["u1", "u2"], false);
    let outcome = object::read(&context(&server), &group_memberships::descriptor(), &prior).await;

    assert_ok(&outcome);
    assert_eq!(outcome.state.unwrap().strings("users"), set(&["u1"]));
}

#[tokio::test]
async fn test_read_taints_when_group_is_gone() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(USERS_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let prior = tracked(&["u1"], false);
    let outcome = object::read(&context(&server), &group_memberships::descriptor(), &prior).await;

    assert!(outcome.diagnostics.is_empty());
    assert!(!outcome.state.unwrap().exists());
}

#[tokio::test]
async fn test_import_drains_every_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(USERS_PATH))
        .and(query_param("after", "u2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::users(&["u3"])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(USERS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(fixtures::users(&["u1", "u2"]))
                .insert_header(
                    "link",
                    format!(
                        "<{}{USERS_PATH}?limit=200>; rel=\"self\", <{}{USERS_PATH}?after=u2&limit=200>; rel=\"next\"",
                        server.uri(),
                        server.uri()
                    )
                    .as_str(),
                ),
        )
        .expect(1)
        .mount(&server)
        .await;

    let desc = group_memberships::descriptor();
    let outcome = object::import(&context(&server), &desc, "00g1/true").await;

    assert_ok(&outcome);
    let state = outcome.state.unwrap();
    assert_eq!(state.id, "00g1");
    assert_eq!(state.str("group_id"), Some("00g1"));
    assert_eq!(state.bool("track_all_users"), Some(true));
    assert_eq!(state.strings("users"), set(&["u1", "u2", "u3"]));
}

#[tokio::test]
async fn test_delete_removes_tracked_members_only() {
    let server = MockServer::start().await;
    expect_write(&server, "DELETE", "u1", 1).await;
    Mock::given(method("DELETE"))
        .and(path(format!("{USERS_PATH}/u2")))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"errorCode": "E0000007"})))
        .expect(1)
        .mount(&server)
        .await;
    forbid_other_writes(&server).await;

    let prior = tracked(&["u1", "u2"], true);
    let outcome = object::delete(&context(&server), &group_memberships::descriptor(), &prior).await;

    assert_ok(&outcome);
    assert!(outcome.state.is_none());
}
