//! Request context for provider operations.
//!
//! Every RPC runs with a [`RequestContext`]: a request id for log
//! correlation, the host's cancellation token, an optional deadline, and the
//! shared [`ProviderMeta`] built at configure time.

use crate::config::ProviderConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::mutex::MutexRegistry;
use crate::reconciler::org_gate::OrgKindGate;
use crate::transport::retry::{LONG_MAX_ELAPSED, SHORT_MAX_ELAPSED};
use crate::transport::{ApiResponse, OktaClient, PageCursor, RequestOptions};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Operations a managed object goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Import,
}

impl Operation {
    /// Default transport max elapsed time for calls made by this operation.
    pub fn max_elapsed(self) -> Duration {
        match self {
            Self::Read | Self::Import => SHORT_MAX_ELAPSED,
            Self::Create | Self::Update | Self::Delete => LONG_MAX_ELAPSED,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Import => "import",
        };
        f.write_str(name)
    }
}

/// Process-wide state shared by every RPC once the provider is configured.
#[derive(Debug)]
pub struct ProviderMeta {
    pub config: ProviderConfig,
    pub client: OktaClient,
    pub mutexes: MutexRegistry,
    pub org_gate: OrgKindGate,
}

impl ProviderMeta {
    /// Validate settings and build the shared client.
    pub fn from_config(config: ProviderConfig) -> ProviderResult<Self> {
        let client = OktaClient::from_config(&config)?;
        Ok(Self::new(config, client))
    }

    pub fn new(config: ProviderConfig, client: OktaClient) -> Self {
        Self {
            config,
            client,
            mutexes: MutexRegistry::new(),
            org_gate: OrgKindGate::new(),
        }
    }

    pub fn with_org_gate(mut self, org_gate: OrgKindGate) -> Self {
        self.org_gate = org_gate;
        self
    }
}

/// Per-RPC context.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique identifier for this request
    pub request_id: String,
    pub cancel: CancellationToken,
    pub deadline: Option<Instant>,
    /// Operation the context was started for; drives retry budgets
    pub operation: Operation,
    pub meta: Arc<ProviderMeta>,
}

impl RequestContext {
    pub fn new(meta: Arc<ProviderMeta>, cancel: CancellationToken) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            cancel,
            deadline: None,
            operation: Operation::Read,
            meta,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Context for `operation` with a deadline `timeout` from now.
    pub fn for_operation(&self, operation: Operation, timeout: Duration) -> Self {
        Self {
            operation,
            deadline: Some(Instant::now() + timeout),
            ..self.clone()
        }
    }

    pub fn client(&self) -> &OktaClient {
        &self.meta.client
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Fail fast when cancelled or past the deadline.
    pub fn check_cancelled(&self) -> ProviderResult<()> {
        if self.cancel.is_cancelled() {
            return Err(ProviderError::cancelled("cancelled by host"));
        }
        if self.remaining() == Some(Duration::ZERO) {
            return Err(ProviderError::cancelled("deadline exceeded"));
        }
        Ok(())
    }

    /// Request options bounded by the operation's budget and the deadline.
    pub fn options(&self) -> RequestOptions {
        let budget = self.operation.max_elapsed();
        let max_elapsed = match self.remaining() {
            Some(remaining) => budget.min(remaining),
            None => budget,
        };
        RequestOptions::new().max_elapsed(max_elapsed)
    }

    pub async fn get(&self, path: &str) -> ProviderResult<ApiResponse> {
        self.client().get(&self.cancel, path, &self.options()).await
    }

    pub async fn post(&self, path: &str, body: Option<&Value>) -> ProviderResult<ApiResponse> {
        self.client()
            .post(&self.cancel, path, body, &self.options())
            .await
    }

    pub async fn put(&self, path: &str, body: &Value) -> ProviderResult<ApiResponse> {
        self.client()
            .put(&self.cancel, path, body, &self.options())
            .await
    }

    pub async fn delete(&self, path: &str) -> ProviderResult<ApiResponse> {
        self.client()
            .delete(&self.cancel, path, &self.options())
            .await
    }

    pub async fn list_page(
        &self,
        path: &str,
        cursor: Option<&PageCursor>,
        options: &RequestOptions,
    ) -> ProviderResult<ApiResponse> {
        let options = RequestOptions {
            max_elapsed: self.options().max_elapsed,
            ..options.clone()
        };
        self.client()
            .list_page(&self.cancel, path, cursor, &options)
            .await
    }
}
