//! Retry, rate-limit and error classification behaviour of the client.

use crate::common::{context, fixtures};
use chrono::Utc;
use okta_provider::ProviderError;
use okta_provider::transport::{ErrorClass, RequestOptions};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rate_limited() -> ResponseTemplate {
    let now = Utc::now();
    ResponseTemplate::new(429)
        .insert_header("date", now.to_rfc2822().as_str())
        .insert_header("x-rate-limit-reset", (now.timestamp() + 2).to_string().as_str())
        .set_body_json(fixtures::api_error("E0000047", "API call exceeded rate limit due to too many requests."))
}

#[tokio::test]
async fn test_rate_limit_waits_for_reset() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/groups/00g1"))
        .respond_with(rate_limited())
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/groups/00g1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::group("00g1", "Engineers")))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context(&server);
    let started = Instant::now();
    let response = ctx.get("/api/v1/groups/00g1").await.unwrap();

    assert_eq!(response.status, 200);
    assert!(
        started.elapsed() >= Duration::from_secs(4),
        "returned after {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/groups"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/groups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let response = context(&server).get("/api/v1/groups").await.unwrap();
    assert_eq!(response.value().unwrap(), serde_json::json!([]));
}

#[tokio::test]
async fn test_permanent_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/groups"))
        .respond_with(ResponseTemplate::new(400).set_body_json(fixtures::api_error(
            "E0000001",
            "Api validation failed: name",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let error = context(&server)
        .post("/api/v1/groups", Some(&serde_json::json!({})))
        .await
        .unwrap_err();
    let api = error.api_error().expect("service error");
    assert_eq!(api.class, ErrorClass::Permanent);
    assert!(error.to_string().contains("E0000001"));
}

#[tokio::test]
async fn test_extra_retry_status_for_one_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/authenticators"))
        .respond_with(ResponseTemplate::new(409))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/authenticators"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context(&server);
    let options = ctx.options().retry_on(409);
    let response = ctx
        .client()
        .get(&ctx.cancel, "/api/v1/authenticators", &options)
        .await
        .unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn test_cancellation_interrupts_retry_wait() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/groups/00g1"))
        .respond_with(rate_limited())
        .mount(&server)
        .await;

    let ctx = context(&server);
    let cancel: CancellationToken = ctx.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
    });

    let started = Instant::now();
    let error = ctx
        .client()
        .get(&ctx.cancel, "/api/v1/groups/00g1", &RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(error, ProviderError::Cancelled { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
}
