//! Write serialization, the classic/modern gate and cancellation.

use crate::common::{assert_ok, context, fixtures, meta};
use okta_provider::reconciler::{OrgKind, object};
use okta_provider::resource::{RequestContext, STATUS_ACTIVE};
use okta_provider::resources::{authenticator, group, policy_rule};
use okta_provider::schema::StateValue;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CREATE_DELAY: Duration = Duration::from_millis(300);

fn rule_plan(policy_id: &str, name: &str) -> StateValue {
    let desc = policy_rule::password_descriptor();
    let config = StateValue::new().with("policy_id", policy_id).with("name", name);
    object::plan(&desc, &StateValue::new(), Some(&config))
        .planned
        .unwrap()
}

#[tokio::test]
async fn test_policy_rule_writes_are_serialized() {
    let server = MockServer::start().await;
    for (policy, rule) in [("00p1", "0pr1"), ("00p2", "0pr2")] {
        Mock::given(method("POST"))
            .and(path(format!("/api/v1/policies/{policy}/rules")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(fixtures::password_rule(rule, STATUS_ACTIVE, 1))
                    .set_delay(CREATE_DELAY),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/policies/{policy}/rules/{rule}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(fixtures::password_rule(rule, STATUS_ACTIVE, 1)),
            )
            .mount(&server)
            .await;
    }

    let ctx = context(&server);
    let desc = policy_rule::password_descriptor();
    let first = rule_plan("00p1", "First");
    let second = rule_plan("00p2", "Second");

    let started = Instant::now();
    let (a, b) = tokio::join!(
        object::create(&ctx, &desc, &first),
        object::create(&ctx, &desc, &second)
    );

    assert_ok(&a);
    assert_ok(&b);
    assert_eq!(a.state.unwrap().id, "0pr1");
    assert_eq!(b.state.unwrap().id, "0pr2");
    assert!(
        started.elapsed() >= CREATE_DELAY * 2,
        "creates overlapped: {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_unrelated_types_are_not_serialized() {
    let server = MockServer::start().await;
    for id in ["00g1", "00g2"] {
        Mock::given(method("GET"))
            .and(path(format!("/api/v1/groups/{id}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(fixtures::group(id, "Engineers"))
                    .set_delay(CREATE_DELAY),
            )
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/api/v1/mappings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let ctx = context(&server);
    let desc = group::descriptor();
    let started = Instant::now();
    let state_a = StateValue::with_id("00g1");
    let state_b = StateValue::with_id("00g2");
    let (a, b) = tokio::join!(
        object::read(&ctx, &desc, &state_a),
        object::read(&ctx, &desc, &state_b)
    );

    assert_ok(&a);
    assert_ok(&b);
    assert!(started.elapsed() < CREATE_DELAY * 2);
}

#[tokio::test]
async fn test_modern_only_type_refused_on_classic_org() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let ctx = RequestContext::new(meta(&server, Some(OrgKind::Classic)), CancellationToken::new());
    let desc = authenticator::descriptor();
    let plan = StateValue::new()
        .with("key", "security_key")
        .with("name", "Security Key")
        .with("status", STATUS_ACTIVE);
    let outcome = object::create(&ctx, &desc, &plan).await;

    assert!(outcome.state.is_none());
    let error = outcome.diagnostics.errors().next().unwrap();
    assert!(error.detail.contains(authenticator::DOCS_URL), "{error:?}");
}

#[tokio::test]
async fn test_org_kind_is_probed_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/okta-organization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "00o1",
            "pipeline": "v1",
            "_links": {"organization": {"href": server.uri()}},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = RequestContext::new(meta(&server, None), CancellationToken::new());
    let desc = authenticator::descriptor();
    let prior = StateValue::with_id("aut1").with("key", "security_key");
    for _ in 0..2 {
        let outcome = object::read(&ctx, &desc, &prior).await;
        assert!(outcome.has_errors());
        assert_eq!(outcome.state.as_ref().map(|state| state.id.as_str()), Some("aut1"));
    }
}

#[tokio::test]
async fn test_authenticator_managed_on_modern_org() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/okta-organization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"pipeline": "idx"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/authenticators/aut1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "aut1",
            "key": "security_key",
            "name": "Security Key",
            "status": "ACTIVE",
            "type": "security_key",
            "settings": {"userVerification": "DISCOURAGED"},
        })))
        .mount(&server)
        .await;

    let ctx = RequestContext::new(meta(&server, None), CancellationToken::new());
    let prior = StateValue::with_id("aut1").with("key", "security_key");
    let outcome = object::read(&ctx, &authenticator::descriptor(), &prior).await;

    assert_ok(&outcome);
    let state = outcome.state.unwrap();
    assert_eq!(state.str("type"), Some("security_key"));
    assert!(!state.get("settings").is_null());
}

#[tokio::test]
async fn test_cancelled_request_makes_no_calls() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let ctx = RequestContext::new(meta(&server, Some(OrgKind::Modern)), cancel);
    let prior = StateValue::with_id("00g1").with("name", "Engineers");
    let outcome = object::read(&ctx, &group::descriptor(), &prior).await;

    assert!(outcome.has_errors());
    assert_eq!(outcome.state, Some(prior));
}
