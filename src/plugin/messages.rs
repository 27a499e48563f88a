//! Request and response bodies of the host RPCs.
//!
//! States and configurations travel in the host encoding (see
//! [`crate::schema::marshal`]); a `null` document means "no object".

use crate::diagnostics::Diagnostics;
use crate::reconciler::PlanAction;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Host RPC names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    GetSchema,
    Configure,
    ValidateConfig,
    PlanChange,
    ApplyChange,
    ReadResource,
    ImportResource,
    ReadDataSource,
}

impl Method {
    pub fn parse(name: &str) -> Option<Self> {
        serde_json::from_value(Value::String(name.to_string())).ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigureRequest {
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateConfigRequest {
    pub type_name: String,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanChangeRequest {
    pub type_name: String,
    #[serde(default)]
    pub prior_state: Value,
    /// `null` plans destruction
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyChangeRequest {
    pub type_name: String,
    #[serde(default)]
    pub prior_state: Value,
    /// `null` destroys the object
    #[serde(default)]
    pub planned_state: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResourceRequest {
    pub type_name: String,
    #[serde(default)]
    pub current_state: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResourceRequest {
    pub type_name: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadDataSourceRequest {
    pub type_name: String,
    #[serde(default)]
    pub config: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaResponse {
    pub schema: Value,
    #[serde(default)]
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsResponse {
    #[serde(default)]
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanChangeResponse {
    pub planned_state: Value,
    pub action: PlanAction,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires_replace: Vec<String>,
    #[serde(default)]
    pub diagnostics: Diagnostics,
}

/// Response of the state-returning RPCs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateResponse {
    /// `null` once the object is gone
    pub new_state: Value,
    #[serde(default)]
    pub diagnostics: Diagnostics,
}

impl StateResponse {
    pub fn failed(diagnostics: Diagnostics) -> Self {
        Self {
            new_state: Value::Null,
            diagnostics,
        }
    }
}
