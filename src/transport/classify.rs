//! Error classification for service responses.
//!
//! Okta error bodies share one envelope:
//!
//! ```json
//! {"errorCode": "E0000001", "errorSummary": "Api validation failed",
//!  "errorCauses": [{"errorSummary": "name: An object with this field already exists"}]}
//! ```
//!
//! [`classify`] maps a status code plus that envelope onto an [`ErrorClass`].

use serde::Deserialize;
use std::fmt;

/// Cause fragments that mark a 4xx as transient server-side work in flight.
const TRANSIENT_CAUSES: &[&str] = &[
    "deletion is in progress",
    "deletion of the attribute is in progress",
    "is currently being deleted",
    "operation is still in progress",
];

/// Fragments of the summary/causes that mean a membership already exists.
const ALREADY_ASSIGNED: &[&str] = &["already assigned", "already a member", "already exists"];

/// Fragments that mean the service refuses to delete an object that is still referenced.
const CANNOT_DELETE: &[&str] = &["cannot be deleted", "cannot delete", "can't be deleted"];

/// Classification of a non-success response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    NotFound,
    Unauthorized,
    RateLimited,
    ServerError,
    DeletionInProgress,
    Permanent,
}

impl ErrorClass {
    /// True for classes the retry loop may retry.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError | Self::DeletionInProgress
        )
    }
}

/// One entry of `errorCauses`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorCause {
    #[serde(rename = "errorSummary", default)]
    pub summary: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(rename = "errorCode", default)]
    code: Option<String>,
    #[serde(rename = "errorSummary", default)]
    summary: Option<String>,
    #[serde(rename = "errorId", default)]
    error_id: Option<String>,
    #[serde(rename = "errorCauses", default)]
    causes: Vec<ErrorCause>,
}

/// A non-success response from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: u16,
    pub class: ErrorClass,
    pub path: String,
    pub code: Option<String>,
    pub summary: Option<String>,
    pub error_id: Option<String>,
    pub causes: Vec<ErrorCause>,
}

impl ApiError {
    /// Error carrying only a status, classified without a body.
    pub fn new(status: u16, path: impl Into<String>) -> Self {
        Self::from_body(status, path, b"")
    }

    /// Parse the error envelope (if any) and classify.
    pub fn from_body(status: u16, path: impl Into<String>, body: &[u8]) -> Self {
        let envelope: ErrorEnvelope = serde_json::from_slice(body).unwrap_or_default();
        let mut error = Self {
            status,
            class: ErrorClass::Permanent,
            path: path.into(),
            code: envelope.code,
            summary: envelope.summary,
            error_id: envelope.error_id,
            causes: envelope.causes,
        };
        error.class = classify(&error);
        error
    }

    /// Human-readable detail: the service summary followed by each cause.
    pub fn detail(&self) -> String {
        let mut detail = self
            .summary
            .clone()
            .unwrap_or_else(|| format!("HTTP {}", self.status));
        if let Some(code) = &self.code {
            detail.push_str(&format!(" ({code})"));
        }
        for cause in &self.causes {
            detail.push_str("; ");
            detail.push_str(&cause.summary);
        }
        detail
    }

    /// True if the summary or any cause contains one of `fragments`.
    pub fn mentions(&self, fragments: &[&str]) -> bool {
        let summary = self.summary.as_deref().unwrap_or_default().to_lowercase();
        fragments.iter().any(|f| summary.contains(f))
            || self.causes.iter().any(|cause| {
                let cause = cause.summary.to_lowercase();
                fragments.iter().any(|f| cause.contains(f))
            })
    }

    /// 4xx telling us the membership being added already exists.
    pub fn is_already_assigned(&self) -> bool {
        matches!(self.status, 400 | 409) && self.mentions(ALREADY_ASSIGNED)
    }

    /// 4xx telling us the object is still referenced and cannot be deleted.
    pub fn is_delete_forbidden(&self) -> bool {
        matches!(self.status, 400 | 403 | 405 | 409) && self.mentions(CANNOT_DELETE)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "the API returned an error: {} (HTTP {} {})",
            self.detail(),
            self.status,
            self.path
        )
    }
}

impl std::error::Error for ApiError {}

/// Map a status code and decoded body onto the error taxonomy.
pub fn classify(error: &ApiError) -> ErrorClass {
    match error.status {
        404 => ErrorClass::NotFound,
        401 => ErrorClass::Unauthorized,
        429 => ErrorClass::RateLimited,
        500..=599 => ErrorClass::ServerError,
        400..=499 if error.mentions(TRANSIENT_CAUSES) => ErrorClass::DeletionInProgress,
        _ => ErrorClass::Permanent,
    }
}
