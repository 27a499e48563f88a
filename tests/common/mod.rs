//! Shared helpers for the integration suite.
//!
//! Every test runs against a wiremock [`MockServer`] standing in for the
//! Okta org. [`context`] wires a client, mutex registry and org gate to it.

pub mod fixtures;

use okta_provider::config::ProviderConfig;
use okta_provider::reconciler::{OrgKind, OrgKindGate, Outcome};
use okta_provider::resource::{ProviderMeta, RequestContext};
use okta_provider::transport::{Credentials, OktaClient, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::MockServer;

/// Provider state pointed at `server` with a fast, non-random retry policy.
pub fn meta(server: &MockServer, kind: Option<OrgKind>) -> Arc<ProviderMeta> {
    let client = OktaClient::with_parts(
        reqwest::Client::new(),
        server.uri(),
        Credentials::ApiToken("test-token".into()),
        RetryPolicy::default()
            .with_initial_interval(Duration::from_millis(10))
            .without_randomization(),
        100,
    );
    let gate = match kind {
        Some(kind) => OrgKindGate::with_kind(kind),
        None => OrgKindGate::new(),
    };
    Arc::new(ProviderMeta::new(ProviderConfig::default(), client).with_org_gate(gate))
}

/// Context on a modern org.
pub fn context(server: &MockServer) -> RequestContext {
    RequestContext::new(meta(server, Some(OrgKind::Modern)), CancellationToken::new())
}

/// Fail with every diagnostic when `outcome` carries an error.
pub fn assert_ok(outcome: &Outcome) {
    assert!(
        !outcome.has_errors(),
        "unexpected errors: {:?}",
        outcome.diagnostics
    );
}
