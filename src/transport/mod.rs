//! HTTP transport for the Okta management API.
//!
//! Authentication, retries with rate-limit-aware backoff, Link-header
//! pagination and error classification. The transport never drains pages
//! itself; callers accumulate typed results page by page.

pub mod auth;
pub mod classify;
pub mod client;
pub mod pagination;
pub mod rate_limit;
pub mod retry;

pub use auth::{Authenticator, Credentials};
pub use classify::{ApiError, ErrorClass};
pub use client::{ApiResponse, OktaClient, RequestOptions, sleep_or_cancel};
pub use pagination::{Page, PageCursor};
pub use rate_limit::CapacityGovernor;
pub use retry::RetryPolicy;
