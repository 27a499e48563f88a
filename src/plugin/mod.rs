//! Host RPC surface.
//!
//! [`PluginServer`] decodes host documents, dispatches to the reconciler by
//! type name and encodes the results. It is transport agnostic; the
//! `okta-provider` binary drives it over newline-delimited JSON.
//!
//! # Examples
//!
//! ```rust,no_run
//! use okta_provider::plugin::PluginServer;
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = PluginServer::standard()?;
//! server
//!     .handle("Configure", json!({"config": {"org_name": "dev-123", "api_token": "..."}}), CancellationToken::new())
//!     .await;
//! let plan = server
//!     .handle(
//!         "PlanChange",
//!         json!({"type_name": "okta_group", "config": {"name": "Engineers"}}),
//!         CancellationToken::new(),
//!     )
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod messages;

use crate::config::ProviderConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{BuildResult, ProviderError, ProviderResult};
use crate::reconciler::{Outcome, object};
use crate::registry::ObjectRegistry;
use crate::resource::{Operation, ProviderMeta, RequestContext};
use crate::schema::{StateValue, decode_host, encode_host, validate_config};
use log::{debug, info, warn};
use messages::*;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

pub use messages::Method;

/// Serves the host RPCs for one provider process.
#[derive(Debug)]
pub struct PluginServer {
    registry: Arc<ObjectRegistry>,
    meta: RwLock<Option<Arc<ProviderMeta>>>,
    /// Whether `Configure` may change the global log threshold
    apply_log_level: bool,
}

impl PluginServer {
    pub fn new(registry: ObjectRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            meta: RwLock::new(None),
            apply_log_level: true,
        }
    }

    /// Server over every built-in type.
    pub fn standard() -> BuildResult<Self> {
        Ok(Self::new(ObjectRegistry::standard()?))
    }

    /// Server that is already configured.
    pub fn with_meta(registry: ObjectRegistry, meta: Arc<ProviderMeta>) -> Self {
        Self {
            registry: Arc::new(registry),
            meta: RwLock::new(Some(meta)),
            apply_log_level: true,
        }
    }

    /// Leave the log threshold alone on `Configure`.
    pub fn with_fixed_log_level(mut self) -> Self {
        self.apply_log_level = false;
        self
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    /// Configured worker count, once `Configure` has succeeded.
    pub async fn parallelism(&self) -> Option<usize> {
        self.meta
            .read()
            .await
            .as_ref()
            .map(|meta| meta.config.parallelism)
    }

    /// Dispatch one RPC by name; the result is the encoded response body.
    pub async fn handle(&self, method: &str, params: Value, cancel: CancellationToken) -> Value {
        let Some(parsed) = Method::parse(method) else {
            warn!("Unknown RPC method '{}'", method);
            let mut diagnostics = Diagnostics::new();
            diagnostics.error("Unknown method", format!("'{method}' is not a provider RPC"));
            return encode(&DiagnosticsResponse { diagnostics });
        };
        debug!("Handling {:?}", parsed);

        match parsed {
            Method::GetSchema => encode(&self.get_schema()),
            Method::Configure => match decode::<ConfigureRequest>(params) {
                Ok(request) => encode(&self.configure(request).await),
                Err(diagnostics) => encode(&DiagnosticsResponse { diagnostics }),
            },
            Method::ValidateConfig => match decode::<ValidateConfigRequest>(params) {
                Ok(request) => encode(&self.validate_config(request)),
                Err(diagnostics) => encode(&DiagnosticsResponse { diagnostics }),
            },
            Method::PlanChange => match decode::<PlanChangeRequest>(params) {
                Ok(request) => match self.plan_change(request) {
                    Ok(response) => encode(&response),
                    Err(diagnostics) => encode(&DiagnosticsResponse { diagnostics }),
                },
                Err(diagnostics) => encode(&DiagnosticsResponse { diagnostics }),
            },
            Method::ApplyChange => match decode::<ApplyChangeRequest>(params) {
                Ok(request) => encode(&self.apply_change(request, cancel).await),
                Err(diagnostics) => encode(&StateResponse::failed(diagnostics)),
            },
            Method::ReadResource => match decode::<ReadResourceRequest>(params) {
                Ok(request) => encode(&self.read_resource(request, cancel).await),
                Err(diagnostics) => encode(&StateResponse::failed(diagnostics)),
            },
            Method::ImportResource => match decode::<ImportResourceRequest>(params) {
                Ok(request) => encode(&self.import_resource(request, cancel).await),
                Err(diagnostics) => encode(&StateResponse::failed(diagnostics)),
            },
            Method::ReadDataSource => match decode::<ReadDataSourceRequest>(params) {
                Ok(request) => encode(&self.read_data_source(request, cancel).await),
                Err(diagnostics) => encode(&StateResponse::failed(diagnostics)),
            },
        }
    }

    pub fn get_schema(&self) -> SchemaResponse {
        SchemaResponse {
            schema: self.registry.schema(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Validate provider settings and build the shared client.
    ///
    /// Unset settings fall back to `OKTA_*` environment variables. A new
    /// configuration replaces the client, token cache and org-kind cache.
    pub async fn configure(&self, request: ConfigureRequest) -> DiagnosticsResponse {
        let document = if request.config.is_null() {
            Value::Object(Default::default())
        } else {
            request.config
        };
        let config = match serde_json::from_value::<ProviderConfig>(document) {
            Ok(config) => config.with_env_fallback(|key| std::env::var(key).ok()),
            Err(e) => {
                return DiagnosticsResponse {
                    diagnostics: Diagnostics::from_error(&ProviderError::Json(e)),
                };
            }
        };

        match ProviderMeta::from_config(config) {
            Ok(meta) => {
                if self.apply_log_level {
                    log::set_max_level(meta.config.log_level_filter());
                }
                info!("Provider configured for {}", meta.client.base_url());
                *self.meta.write().await = Some(Arc::new(meta));
                DiagnosticsResponse::default()
            }
            Err(e) => {
                warn!("Provider configuration rejected: {}", e);
                DiagnosticsResponse {
                    diagnostics: Diagnostics::from_error(&e),
                }
            }
        }
    }

    pub fn validate_config(&self, request: ValidateConfigRequest) -> DiagnosticsResponse {
        let diagnostics = match self.registry.object(&request.type_name) {
            Ok(desc) => match decode_host(&desc.attributes, &request.config) {
                Ok(config) => object::validate(&desc, &config).1,
                Err(diagnostics) => diagnostics,
            },
            Err(_) => match self.registry.data(&request.type_name) {
                Ok(desc) => match decode_host(&desc.attributes, &request.config) {
                    Ok(config) => validate_config(&desc.type_name, &desc.attributes, &config.values),
                    Err(diagnostics) => diagnostics,
                },
                Err(e) => Diagnostics::from_error(&e),
            },
        };
        DiagnosticsResponse { diagnostics }
    }

    pub fn plan_change(&self, request: PlanChangeRequest) -> Result<PlanChangeResponse, Diagnostics> {
        let desc = self
            .registry
            .object(&request.type_name)
            .map_err(|e| Diagnostics::from_error(&e))?;
        let prior = decode_host(&desc.attributes, &request.prior_state)?;
        let config = if request.config.is_null() {
            None
        } else {
            Some(decode_host(&desc.attributes, &request.config)?)
        };

        let result = object::plan(&desc, &prior, config.as_ref());
        Ok(PlanChangeResponse {
            planned_state: result
                .planned
                .as_ref()
                .map_or(Value::Null, |planned| encode_host(&desc.attributes, planned)),
            action: result.action,
            requires_replace: result.requires_replace,
            diagnostics: result.diagnostics,
        })
    }

    pub async fn apply_change(
        &self,
        request: ApplyChangeRequest,
        cancel: CancellationToken,
    ) -> StateResponse {
        let desc = match self.registry.object(&request.type_name) {
            Ok(desc) => desc,
            Err(e) => return StateResponse::failed(Diagnostics::from_error(&e)),
        };
        let ctx = match self.context(cancel).await {
            Ok(ctx) => ctx,
            Err(e) => return StateResponse::failed(Diagnostics::from_error(&e)),
        };
        let prior = match decode_host(&desc.attributes, &request.prior_state) {
            Ok(prior) => prior,
            Err(diagnostics) => return StateResponse::failed(diagnostics),
        };
        let planned = if request.planned_state.is_null() {
            None
        } else {
            match decode_host(&desc.attributes, &request.planned_state) {
                Ok(planned) => Some(planned),
                Err(diagnostics) => return StateResponse::failed(diagnostics),
            }
        };

        info!(
            "[{}] ApplyChange {} {}",
            ctx.request_id,
            desc.type_name,
            if prior.exists() { prior.id.as_str() } else { "(new)" }
        );
        let outcome = object::apply(&ctx, &desc, &prior, planned.as_ref()).await;
        respond(&desc.attributes, outcome)
    }

    pub async fn read_resource(
        &self,
        request: ReadResourceRequest,
        cancel: CancellationToken,
    ) -> StateResponse {
        let desc = match self.registry.object(&request.type_name) {
            Ok(desc) => desc,
            Err(e) => return StateResponse::failed(Diagnostics::from_error(&e)),
        };
        let ctx = match self.context(cancel).await {
            Ok(ctx) => ctx,
            Err(e) => return StateResponse::failed(Diagnostics::from_error(&e)),
        };
        let prior = match decode_host(&desc.attributes, &request.current_state) {
            Ok(prior) => prior,
            Err(diagnostics) => return StateResponse::failed(diagnostics),
        };
        let outcome = object::read(&ctx, &desc, &prior).await;
        respond(&desc.attributes, outcome)
    }

    pub async fn import_resource(
        &self,
        request: ImportResourceRequest,
        cancel: CancellationToken,
    ) -> StateResponse {
        let desc = match self.registry.object(&request.type_name) {
            Ok(desc) => desc,
            Err(e) => return StateResponse::failed(Diagnostics::from_error(&e)),
        };
        let ctx = match self.context(cancel).await {
            Ok(ctx) => ctx,
            Err(e) => return StateResponse::failed(Diagnostics::from_error(&e)),
        };
        let outcome = object::import(&ctx, &desc, &request.id).await;
        respond(&desc.attributes, outcome)
    }

    pub async fn read_data_source(
        &self,
        request: ReadDataSourceRequest,
        cancel: CancellationToken,
    ) -> StateResponse {
        let desc = match self.registry.data(&request.type_name) {
            Ok(desc) => desc,
            Err(e) => return StateResponse::failed(Diagnostics::from_error(&e)),
        };
        let config = match decode_host(&desc.attributes, &request.config) {
            Ok(config) => config,
            Err(diagnostics) => return StateResponse::failed(diagnostics),
        };
        let diagnostics = validate_config(&desc.type_name, &desc.attributes, &config.values);
        if diagnostics.has_errors() {
            return StateResponse::failed(diagnostics);
        }
        let ctx = match self.context(cancel).await {
            Ok(ctx) => ctx.for_operation(Operation::Read, desc.timeout),
            Err(e) => return StateResponse::failed(Diagnostics::from_error(&e)),
        };

        let read = tokio::time::timeout(desc.timeout, desc.handler.read(&ctx, &desc, &config)).await;
        match read {
            Ok(Ok(state)) => StateResponse {
                new_state: encode_host(&desc.attributes, &state),
                diagnostics,
            },
            Ok(Err(e)) => StateResponse::failed(Diagnostics::from_error(&e)),
            Err(_) => StateResponse::failed(Diagnostics::from_error(&ProviderError::cancelled(
                format!("read of {} timed out", desc.type_name),
            ))),
        }
    }

    async fn context(&self, cancel: CancellationToken) -> ProviderResult<RequestContext> {
        let meta = self
            .meta
            .read()
            .await
            .clone()
            .ok_or(ProviderError::NotConfigured)?;
        Ok(RequestContext::new(meta, cancel))
    }
}

fn respond(attributes: &[crate::schema::AttributeDescriptor], outcome: Outcome) -> StateResponse {
    StateResponse {
        new_state: outcome
            .state
            .as_ref()
            .map_or(Value::Null, |state: &StateValue| encode_host(attributes, state)),
        diagnostics: outcome.diagnostics,
    }
}

fn decode<T: DeserializeOwned>(params: Value) -> Result<T, Diagnostics> {
    serde_json::from_value(params).map_err(|e| {
        let mut diagnostics = Diagnostics::new();
        diagnostics.error("Malformed request", e.to_string());
        diagnostics
    })
}

fn encode<T: Serialize>(response: &T) -> Value {
    serde_json::to_value(response).unwrap_or_else(|e| {
        serde_json::json!({
            "diagnostics": [{"severity": "error", "summary": "Failed to encode response", "detail": e.to_string()}]
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn server() -> PluginServer {
        PluginServer::standard().unwrap()
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let response = server()
            .handle("Teleport", Value::Null, CancellationToken::new())
            .await;
        assert_eq!(response["diagnostics"][0]["severity"], "error");
    }

    #[tokio::test]
    async fn test_read_requires_configure() {
        let response = server()
            .handle(
                "ReadResource",
                json!({"type_name": "okta_group", "current_state": {"id": "00g1", "name": "a"}}),
                CancellationToken::new(),
            )
            .await;
        assert!(response["new_state"].is_null());
        assert_eq!(
            response["diagnostics"][0]["detail"],
            "provider is not configured"
        );
    }

    #[test]
    fn test_plan_change_create() {
        let response = server()
            .plan_change(PlanChangeRequest {
                type_name: "okta_group".into(),
                prior_state: Value::Null,
                config: json!({"name": "Engineers"}),
            })
            .unwrap();
        assert_eq!(response.action, crate::reconciler::PlanAction::Create);
        assert_eq!(response.planned_state["name"], "Engineers");
        assert_eq!(
            response.planned_state["type"],
            crate::schema::UNKNOWN_SENTINEL
        );
    }

    #[test]
    fn test_validate_unknown_attribute() {
        let response = server().validate_config(ValidateConfigRequest {
            type_name: "okta_group".into(),
            config: json!({"name": "Engineers", "colour": "blue"}),
        });
        assert!(response.diagnostics.has_errors());
    }

    #[test]
    fn test_validate_unknown_type() {
        let response = server().validate_config(ValidateConfigRequest {
            type_name: "okta_spaceship".into(),
            config: json!({}),
        });
        assert!(response.diagnostics.has_errors());
    }

    #[tokio::test]
    async fn test_configure_rejects_conflicting_credentials() {
        let response = server()
            .configure(ConfigureRequest {
                config: json!({
                    "org_name": "dev-1",
                    "api_token": "a",
                    "access_token": "b",
                }),
            })
            .await;
        assert!(response.diagnostics.has_errors());
    }

    #[tokio::test]
    async fn test_configure_applies_log_level_and_parallelism() {
        let server = server();
        assert_eq!(server.parallelism().await, None);

        let response = server
            .configure(ConfigureRequest {
                config: json!({
                    "base_url": "https://dev-1.okta.example",
                    "api_token": "a",
                    "log_level": "debug",
                    "parallelism": 4,
                }),
            })
            .await;
        assert!(!response.diagnostics.has_errors(), "{:?}", response.diagnostics);
        assert_eq!(log::max_level(), log::LevelFilter::Debug);
        assert_eq!(server.parallelism().await, Some(4));
    }
}
