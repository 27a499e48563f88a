//! Reconciliation engine for a declarative Okta configuration plugin.
//!
//! A host drives the plugin through a small set of RPCs (schema discovery,
//! validation, planning, apply, read and import). This crate turns each
//! declared object type into a descriptor and reconciles desired state
//! against the Okta management API.
//!
//! # Core Components
//!
//! - [`PluginServer`] - RPC surface the host talks to
//! - [`ObjectRegistry`] - every object type and data source the plugin serves
//! - [`reconciler`] - plan/apply/read/import for objects and memberships
//! - [`transport`] - authenticated HTTP client with retries and rate limiting
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use okta_provider::PluginServer;
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = PluginServer::standard()?;
//! let schema = server.handle("GetSchema", json!({}), CancellationToken::new()).await;
//! println!("{schema}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod mutex;
pub mod plugin;
pub mod reconciler;
pub mod registry;
pub mod resource;
pub mod resources;
pub mod schema;
pub mod transport;

pub use config::{CredentialSource, ProviderConfig};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::{
    BuildError, BuildResult, ProviderError, ProviderResult, ValidationError, ValidationResult,
};
pub use mutex::MutexRegistry;
pub use plugin::PluginServer;
pub use reconciler::{OrgKind, OrgKindGate, Outcome, PlanAction, PlanResult};
pub use registry::ObjectRegistry;
pub use resource::{ObjectDescriptor, ProviderMeta, RequestContext};
pub use schema::{AttrValue, AttributeDescriptor, AttributeKind, StateValue};
pub use transport::OktaClient;
