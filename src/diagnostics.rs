//! Diagnostics accumulated across one RPC.
//!
//! An RPC succeeds iff its [`Diagnostics`] bag holds no error-severity entry.
//! Sub-steps append to the bag instead of short-circuiting so the operator
//! sees every correctable issue in one round trip.

use crate::error::{ErrorKind, ProviderError, ValidationError};
use serde::{Deserialize, Serialize};

/// Diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A single diagnostic returned to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub summary: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
    /// Attribute the diagnostic is attached to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    pub fn warning(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    /// Attach the diagnostic to an attribute path.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl From<&ValidationError> for Diagnostic {
    fn from(error: &ValidationError) -> Self {
        let diagnostic = Diagnostic::error("Invalid configuration", error.to_string());
        match error.attribute() {
            Some(attribute) => diagnostic.with_attribute(attribute),
            None => diagnostic,
        }
    }
}

impl From<&ProviderError> for Diagnostic {
    fn from(error: &ProviderError) -> Self {
        match error {
            ProviderError::Api(api) => Diagnostic::error(
                format!("Okta API error: {} {}", api.status, api.path),
                api.detail(),
            ),
            ProviderError::Validation(validation) => validation.into(),
            ProviderError::FeatureUnavailable { type_name, docs_url } => Diagnostic::error(
                format!("{type_name} requires an Identity Engine org"),
                format!(
                    "The org is a classic org and does not support {type_name}. See {docs_url}"
                ),
            ),
            other => {
                let summary = match other.kind() {
                    ErrorKind::Cancelled => "Operation cancelled",
                    _ => "Provider error",
                };
                Diagnostic::error(summary, other.to_string())
            }
        }
    }
}

/// Ordered bag of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bag holding the diagnostic for a single error.
    pub fn from_error(error: &ProviderError) -> Self {
        let mut diags = Self::new();
        diags.push_error(error);
        diags
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.0.push(diagnostic);
    }

    pub fn push_error(&mut self, error: &ProviderError) {
        self.0.push(error.into());
    }

    pub fn error(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.0.push(Diagnostic::error(summary, detail));
    }

    pub fn warning(&mut self, summary: impl Into<String>, detail: impl Into<String>) {
        self.0.push(Diagnostic::warning(summary, detail));
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn has_errors(&self) -> bool {
        self.0.iter().any(Diagnostic::is_error)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter().filter(|d| !d.is_error())
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = Diagnostic>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
