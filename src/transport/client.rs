//! HTTP client for the Okta management API.
//!
//! [`OktaClient`] exposes one method per verb plus [`OktaClient::list_page`].
//! Every call authenticates, waits on the capacity governor, classifies the
//! response, and retries transient failures under the [`RetryPolicy`] while
//! watching the caller's cancellation token.

use super::auth::{Authenticator, Credentials};
use super::classify::{ApiError, ErrorClass};
use super::pagination::{PageCursor, parse_next_link};
use super::rate_limit::{CapacityGovernor, RateLimitSnapshot};
use super::retry::{RetryPolicy, reset_wait};
use crate::config::ProviderConfig;
use crate::error::{ProviderError, ProviderResult};
use chrono::{DateTime, Utc};
use log::{debug, trace, warn};
use reqwest::header::{self, HeaderMap};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const USER_AGENT: &str = concat!("okta-provider/", env!("CARGO_PKG_VERSION"));

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Query parameters appended to the path
    pub query: Vec<(String, String)>,
    /// Extra statuses retried for this call only
    pub retry_on_status: Vec<u16>,
    /// Overrides the policy's max elapsed time
    pub max_elapsed: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn retry_on(mut self, status: u16) -> Self {
        self.retry_on_status.push(status);
        self
    }

    pub fn max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = Some(max_elapsed);
        self
    }
}

/// A successful response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
    /// Cursor for the next page, when the response carried `rel="next"`
    pub next: Option<PageCursor>,
}

impl ApiResponse {
    /// Decode the body as `T`.
    pub fn json<T: DeserializeOwned>(&self) -> ProviderResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Decode the body as a JSON value; an empty body decodes to `null`.
    pub fn value(&self) -> ProviderResult<Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        self.json()
    }
}

/// Shared HTTP client.
#[derive(Debug)]
pub struct OktaClient {
    http: reqwest::Client,
    base_url: String,
    auth: Authenticator,
    retry: RetryPolicy,
    governor: CapacityGovernor,
}

impl OktaClient {
    /// Build a client from validated provider settings.
    pub fn from_config(config: &ProviderConfig) -> ProviderResult<Self> {
        let source = config.validate()?;
        let credentials = Credentials::from_config(config, source)?;

        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(Self::with_parts(
            http,
            config.org_url(),
            credentials,
            RetryPolicy::from_config(config),
            config.max_api_capacity,
        ))
    }

    pub fn with_parts(
        http: reqwest::Client,
        base_url: impl Into<String>,
        credentials: Credentials,
        retry: RetryPolicy,
        capacity: u32,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let auth = Authenticator::new(credentials, &base_url, http.clone());
        Self {
            http,
            base_url,
            auth,
            retry,
            governor: CapacityGovernor::new(capacity),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn get(
        &self,
        cancel: &CancellationToken,
        path: &str,
        options: &RequestOptions,
    ) -> ProviderResult<ApiResponse> {
        let url = self.url(path);
        self.execute(cancel, Method::GET, &url, None, options).await
    }

    pub async fn post(
        &self,
        cancel: &CancellationToken,
        path: &str,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> ProviderResult<ApiResponse> {
        let url = self.url(path);
        self.execute(cancel, Method::POST, &url, body, options).await
    }

    pub async fn put(
        &self,
        cancel: &CancellationToken,
        path: &str,
        body: &Value,
        options: &RequestOptions,
    ) -> ProviderResult<ApiResponse> {
        let url = self.url(path);
        self.execute(cancel, Method::PUT, &url, Some(body), options)
            .await
    }

    pub async fn delete(
        &self,
        cancel: &CancellationToken,
        path: &str,
        options: &RequestOptions,
    ) -> ProviderResult<ApiResponse> {
        let url = self.url(path);
        self.execute(cancel, Method::DELETE, &url, None, options)
            .await
    }

    /// Fetch one page of a collection.
    ///
    /// With no cursor the first page of `path` is requested; otherwise the
    /// cursor's URL is followed as-is and `options.query` is ignored.
    pub async fn list_page(
        &self,
        cancel: &CancellationToken,
        path: &str,
        cursor: Option<&PageCursor>,
        options: &RequestOptions,
    ) -> ProviderResult<ApiResponse> {
        match cursor {
            None => self.get(cancel, path, options).await,
            Some(cursor) => {
                let options = RequestOptions {
                    query: Vec::new(),
                    ..options.clone()
                };
                self.execute(cancel, Method::GET, cursor.as_str(), None, &options)
                    .await
            }
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    async fn execute(
        &self,
        cancel: &CancellationToken,
        method: Method,
        url: &str,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> ProviderResult<ApiResponse> {
        let path = path_of(url);
        let policy = match options.max_elapsed {
            Some(max_elapsed) => self.retry.clone().with_max_elapsed(max_elapsed),
            None => self.retry.clone(),
        };
        let mut state = policy.start();
        let mut reauthenticated = false;

        loop {
            if cancel.is_cancelled() {
                return Err(ProviderError::cancelled(format!("{method} {path}")));
            }

            if let Some(wait) = self.governor.wait_for(&path, Utc::now()) {
                sleep_or_cancel(wait, cancel).await?;
            }

            let authorization = self.auth.authorization_header().await?;
            let mut request = self
                .http
                .request(method.clone(), url)
                .header(header::AUTHORIZATION, authorization)
                .header(header::ACCEPT, "application/json");
            if !options.query.is_empty() {
                request = request.query(&options.query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!("{} {} (attempt {})", method, path, state.retries() + 1);
            let sent = tokio::select! {
                result = request.send() => result,
                _ = cancel.cancelled() => {
                    return Err(ProviderError::cancelled(format!("{method} {path}")));
                }
            };

            let response = match sent {
                Ok(response) => response,
                Err(e) if e.is_timeout() || e.is_connect() => match state.next_delay(None) {
                    Some(delay) => {
                        warn!("{} {} failed ({}), retrying in {:?}", method, path, e, delay);
                        sleep_or_cancel(delay, cancel).await?;
                        continue;
                    }
                    None => return Err(e.into()),
                },
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            let headers = response.headers().clone();
            if let Some(snapshot) = rate_limit_snapshot(&headers) {
                self.governor.observe(&path, snapshot);
            }
            let next = parse_next_link(
                headers
                    .get_all(header::LINK)
                    .iter()
                    .filter_map(|value| value.to_str().ok()),
            );
            let bytes = response.bytes().await?;
            trace!("{} {} -> {} ({} bytes)", method, path, status, bytes.len());

            if status.is_success() {
                return Ok(ApiResponse {
                    status: status.as_u16(),
                    body: bytes.to_vec(),
                    next,
                });
            }

            let error = ApiError::from_body(status.as_u16(), path.clone(), &bytes);

            if error.class == ErrorClass::Unauthorized
                && self.auth.is_refreshable()
                && !reauthenticated
            {
                debug!("{} {} returned 401, refreshing access token", method, path);
                self.auth.invalidate().await;
                reauthenticated = true;
                continue;
            }

            if policy.is_retryable(error.status, error.class, &options.retry_on_status) {
                let advised = advised_wait(status, &headers, &policy);
                if let Some(delay) = state.next_delay(advised) {
                    warn!(
                        "{} {} returned {}, retry {} in {:?}",
                        method,
                        path,
                        status.as_u16(),
                        state.retries(),
                        delay
                    );
                    sleep_or_cancel(delay, cancel).await?;
                    continue;
                }
                debug!(
                    "{} {} giving up after {} retries",
                    method,
                    path,
                    state.retries()
                );
            }

            return Err(error.into());
        }
    }
}

/// Sleep for `wait` unless the token fires first.
pub async fn sleep_or_cancel(wait: Duration, cancel: &CancellationToken) -> ProviderResult<()> {
    tokio::select! {
        _ = tokio::time::sleep(wait) => Ok(()),
        _ = cancel.cancelled() => Err(ProviderError::cancelled("cancelled while waiting to retry")),
    }
}

fn path_of(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    }
}

fn header_i64(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn rate_limit_snapshot(headers: &HeaderMap) -> Option<RateLimitSnapshot> {
    Some(RateLimitSnapshot {
        limit: u32::try_from(header_i64(headers, "x-rate-limit-limit")?).ok()?,
        remaining: u32::try_from(header_i64(headers, "x-rate-limit-remaining")?).ok()?,
        reset_epoch: header_i64(headers, "x-rate-limit-reset")?,
    })
}

/// Server clock from the `Date` header, falling back to the local clock.
fn server_now(headers: &HeaderMap) -> DateTime<Utc> {
    headers
        .get(header::DATE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
        .map(|date| date.with_timezone(&Utc))
        .unwrap_or_else(Utc::now)
}

/// Wait advised by a 429's reset header, measured against the server clock.
///
/// Returns `None` for other statuses so the exponential sequence applies.
fn advised_wait(status: StatusCode, headers: &HeaderMap, policy: &RetryPolicy) -> Option<Duration> {
    if status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    match header_i64(headers, "x-rate-limit-reset") {
        Some(reset) => Some(reset_wait(reset, server_now(headers))),
        None => Some(policy.rate_limit_wait),
    }
}
