//! Error types for provider operations.
//!
//! Every failure the reconciler can observe is represented by [`ProviderError`],
//! which projects onto the coarse [`ErrorKind`] taxonomy used to decide whether
//! a failure is retried, tolerated, downgraded to a warning, or surfaced.

use crate::transport::classify::{ApiError, ErrorClass};

/// Coarse error taxonomy shared by the transport and the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 429, 5xx, and known-cause 4xx responses; retried under the retry policy
    TransientRetryable,
    /// 404 from the service
    NotFound,
    /// 401 from the service
    Unauthorized,
    /// The org kind does not support the requested object type
    FeatureUnavailable,
    /// Rejected before any HTTP call was made
    Validation,
    /// The RPC was cancelled by the host
    Cancelled,
    /// Anything else
    Permanent,
}

/// Main error type for provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The service answered with a non-success status
    #[error("{0}")]
    Api(#[from] ApiError),

    /// The request never produced a response (DNS, TLS, connection reset)
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Attribute or configuration validation failed
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The object type is not available on this org kind
    #[error("{type_name} is not supported on classic orgs, see {docs_url}")]
    FeatureUnavailable { type_name: String, docs_url: String },

    /// The host cancelled the RPC or its deadline passed
    #[error("operation cancelled: {reason}")]
    Cancelled { reason: String },

    /// The parent object a membership set hangs off does not exist
    #[error("{type_name} parent '{parent}' does not exist")]
    ParentNotFound { type_name: String, parent: String },

    /// Unknown managed or data type name
    #[error("Unsupported object type: {0}")]
    UnsupportedType(String),

    /// Failed to obtain an access token
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Provider settings are invalid
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// The provider has not been configured yet
    #[error("provider is not configured")]
    NotConfigured,

    /// Internal invariant violations
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ProviderError {
    /// Project the error onto the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Api(err) => match err.class {
                ErrorClass::NotFound => ErrorKind::NotFound,
                ErrorClass::Unauthorized => ErrorKind::Unauthorized,
                ErrorClass::RateLimited
                | ErrorClass::ServerError
                | ErrorClass::DeletionInProgress => ErrorKind::TransientRetryable,
                ErrorClass::Permanent => ErrorKind::Permanent,
            },
            Self::Http(err) if err.is_timeout() || err.is_connect() => {
                ErrorKind::TransientRetryable
            }
            Self::ParentNotFound { .. } => ErrorKind::NotFound,
            Self::Validation(_) | Self::Config(_) => ErrorKind::Validation,
            Self::FeatureUnavailable { .. } => ErrorKind::FeatureUnavailable,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            _ => ErrorKind::Permanent,
        }
    }

    /// True when the service reported 404.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// True when the service reported 401.
    pub fn is_unauthorized(&self) -> bool {
        self.kind() == ErrorKind::Unauthorized
    }

    /// The API error payload, if this error came from a service response.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }

    /// Create a feature-unavailable error for a descriptor.
    pub fn feature_unavailable(type_name: impl Into<String>, docs_url: impl Into<String>) -> Self {
        Self::FeatureUnavailable {
            type_name: type_name.into(),
            docs_url: docs_url.into(),
        }
    }

    pub fn parent_not_found(type_name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self::ParentNotFound {
            type_name: type_name.into(),
            parent: parent.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }
}

/// Validation errors raised before any HTTP call is made.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Required attribute is missing
    #[error("Required attribute '{attribute}' is missing")]
    MissingRequiredAttribute { attribute: String },

    /// Attribute value doesn't match the declared kind
    #[error("Attribute '{attribute}' has invalid type, expected {expected}, got {actual}")]
    InvalidAttributeType {
        attribute: String,
        expected: String,
        actual: String,
    },

    /// Attribute is not declared by the descriptor
    #[error("Unknown attribute '{attribute}' for '{type_name}'")]
    UnknownAttribute {
        attribute: String,
        type_name: String,
    },

    /// Computed-only attribute was set in configuration
    #[error("Attribute '{attribute}' is computed and cannot be configured")]
    ComputedAttributeSet { attribute: String },

    /// Value outside the allowed set
    #[error("Attribute '{attribute}' has invalid value '{value}', allowed values: {allowed:?}")]
    InvalidValue {
        attribute: String,
        value: String,
        allowed: Vec<String>,
    },

    /// Raw JSON attribute does not parse
    #[error("Attribute '{attribute}' is not valid JSON: {details}")]
    InvalidJson { attribute: String, details: String },

    /// Legacy and canonical spellings disagree
    #[error("Attributes '{canonical}' and '{legacy}' are both set with different values")]
    ConflictingAlias { canonical: String, legacy: String },

    /// Malformed import identifier
    #[error("Invalid import id '{id}', expected {expected}")]
    InvalidImportId { id: String, expected: String },

    /// General validation error with custom message
    #[error("Validation failed: {message}")]
    Custom { message: String },
}

impl ValidationError {
    /// Create a missing required attribute error
    pub fn missing_required(attribute: impl Into<String>) -> Self {
        Self::MissingRequiredAttribute {
            attribute: attribute.into(),
        }
    }

    /// Create an invalid type error
    pub fn invalid_type(
        attribute: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidAttributeType {
            attribute: attribute.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a custom validation error
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
        }
    }

    /// Name of the attribute the error refers to, if any.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            Self::MissingRequiredAttribute { attribute }
            | Self::InvalidAttributeType { attribute, .. }
            | Self::UnknownAttribute { attribute, .. }
            | Self::ComputedAttributeSet { attribute }
            | Self::InvalidValue { attribute, .. }
            | Self::InvalidJson { attribute, .. } => Some(attribute),
            Self::ConflictingAlias { canonical, .. } => Some(canonical),
            Self::InvalidImportId { .. } | Self::Custom { .. } => None,
        }
    }
}

/// Errors raised while declaring descriptors or building the registry.
///
/// These are programming errors and are fatal at process start.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The same type name was registered twice
    #[error("Duplicate registration of '{type_name}'")]
    DuplicateRegistration { type_name: String },

    /// An attribute declaration violates the presence/default/force-new rules
    #[error("Invalid attribute '{attribute}' on '{type_name}': {message}")]
    InvalidAttribute {
        type_name: String,
        attribute: String,
        message: String,
    },

    /// A descriptor references an attribute it does not declare
    #[error("Descriptor '{type_name}' references undeclared attribute '{attribute}'")]
    UndeclaredAttribute {
        type_name: String,
        attribute: String,
    },
}

// Result type aliases for convenience
pub type ProviderResult<T> = Result<T, ProviderError>;
pub type ValidationResult<T> = Result<T, ValidationError>;
pub type BuildResult<T> = Result<T, BuildError>;
