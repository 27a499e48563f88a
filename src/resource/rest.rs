//! Generic REST handler.
//!
//! Most Okta objects follow one pattern: POST to a collection, GET/PUT/DELETE
//! on an item path, payload built from the attribute graph. [`RestHandler`]
//! implements [`ObjectHandler`] for that pattern; descriptors configure the
//! paths, a static payload fragment, and supplemental reads.

use super::context::RequestContext;
use super::descriptor::{ObjectDescriptor, ObjectHandler, PathTemplate};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{ProviderError, ProviderResult};
use crate::schema::marshal::{from_wire, marshal, unmarshal};
use crate::schema::StateValue;
use async_trait::async_trait;
use log::{debug, warn};
use serde_json::Value;

/// An extra GET whose response populates one attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct SupplementalRead {
    pub attribute: String,
    pub path: PathTemplate,
    /// JSON pointer into the response
    pub pointer: String,
}

/// [`ObjectHandler`] for collection/item REST objects.
#[derive(Debug, Clone)]
pub struct RestHandler {
    pub collection: PathTemplate,
    pub item: PathTemplate,
    /// Overrides `item` for DELETE; `None` leaves deletion to the lifecycle
    pub delete: Option<PathTemplate>,
    /// Merged into every write payload
    pub static_body: Option<Value>,
    pub create_query: Vec<(String, String)>,
    pub supplemental: Vec<SupplementalRead>,
    /// Statuses retried for writes in addition to the transient set
    pub retry_on_status: Vec<u16>,
}

impl RestHandler {
    pub fn new(collection: impl Into<PathTemplate>, item: impl Into<PathTemplate>) -> Self {
        let item = item.into();
        Self {
            collection: collection.into(),
            delete: Some(item.clone()),
            item,
            static_body: None,
            create_query: Vec::new(),
            supplemental: Vec::new(),
            retry_on_status: Vec::new(),
        }
    }

    pub fn static_body(mut self, body: Value) -> Self {
        self.static_body = Some(body);
        self
    }

    pub fn create_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.create_query.push((key.into(), value.into()));
        self
    }

    pub fn delete_path(mut self, path: impl Into<PathTemplate>) -> Self {
        self.delete = Some(path.into());
        self
    }

    /// Objects the service cannot delete; delete only deactivates.
    pub fn without_delete(mut self) -> Self {
        self.delete = None;
        self
    }

    pub fn supplemental(
        mut self,
        attribute: impl Into<String>,
        path: impl Into<PathTemplate>,
        pointer: impl Into<String>,
    ) -> Self {
        self.supplemental.push(SupplementalRead {
            attribute: attribute.into(),
            path: path.into(),
            pointer: pointer.into(),
        });
        self
    }

    pub fn retry_on(mut self, status: u16) -> Self {
        self.retry_on_status.push(status);
        self
    }

    /// Write payload for `state`.
    pub fn payload(&self, desc: &ObjectDescriptor, state: &StateValue) -> Value {
        let mut payload = marshal(&desc.attributes, &state.values);
        if let Some(Value::Object(fragment)) = &self.static_body {
            if let Value::Object(target) = &mut payload {
                for (key, value) in fragment {
                    target.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
        }
        payload
    }

    fn write_options(&self, ctx: &RequestContext) -> crate::transport::RequestOptions {
        let mut options = ctx.options();
        options.retry_on_status.extend(&self.retry_on_status);
        options
    }

    async fn read_supplemental(
        &self,
        ctx: &RequestContext,
        desc: &ObjectDescriptor,
        id: &str,
        state: &mut StateValue,
        diags: &mut Diagnostics,
    ) -> ProviderResult<()> {
        for read in &self.supplemental {
            let Some(attribute) = desc.attribute_named(&read.attribute) else {
                continue;
            };
            let path = read.path.render(id, state)?;
            match ctx.get(&path).await {
                Ok(response) => {
                    let body = response.value()?;
                    let value = body
                        .pointer(&read.pointer)
                        .map(|raw| from_wire(&attribute.kind, raw))
                        .unwrap_or_default();
                    state.set(read.attribute.clone(), value);
                }
                Err(e) if e.is_unauthorized() => {
                    warn!(
                        "[{}] {} read of '{}' unauthorized, leaving it unset",
                        ctx.request_id, desc.type_name, read.attribute
                    );
                    diags.push(
                        Diagnostic::warning(
                            format!("Unable to read {}", read.attribute),
                            format!(
                                "The API token is not authorized to read {path}; '{}' is left unset.",
                                read.attribute
                            ),
                        )
                        .with_attribute(read.attribute.clone()),
                    );
                }
                Err(e) if e.is_not_found() => {
                    debug!("[{}] {} not found, leaving '{}' unset", ctx.request_id, path, read.attribute);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectHandler for RestHandler {
    async fn create(
        &self,
        ctx: &RequestContext,
        desc: &ObjectDescriptor,
        plan: &StateValue,
    ) -> ProviderResult<String> {
        let path = self.collection.render("", plan)?;
        let body = self.payload(desc, plan);
        let mut options = self.write_options(ctx);
        options.query.extend(self.create_query.iter().cloned());
        let response = ctx
            .client()
            .post(&ctx.cancel, &path, Some(&body), &options)
            .await?;
        let created = response.value()?;
        created
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ProviderError::internal(format!(
                    "{} create response from {path} carried no id",
                    desc.type_name
                ))
            })
    }

    async fn read(
        &self,
        ctx: &RequestContext,
        desc: &ObjectDescriptor,
        id: &str,
        prior: &StateValue,
        diags: &mut Diagnostics,
    ) -> ProviderResult<Option<StateValue>> {
        let path = self.item.render(id, prior)?;
        let body = match ctx.get(&path).await {
            Ok(response) => response.value()?,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut state = StateValue {
            id: id.to_string(),
            values: unmarshal(&desc.attributes, &body),
        };
        self.read_supplemental(ctx, desc, id, &mut state, diags)
            .await?;
        Ok(Some(state))
    }

    async fn update(
        &self,
        ctx: &RequestContext,
        desc: &ObjectDescriptor,
        id: &str,
        plan: &StateValue,
        _prior: &StateValue,
    ) -> ProviderResult<()> {
        let path = self.item.render(id, plan)?;
        let body = self.payload(desc, plan);
        ctx.client()
            .put(&ctx.cancel, &path, &body, &self.write_options(ctx))
            .await?;
        Ok(())
    }

    async fn delete(
        &self,
        ctx: &RequestContext,
        _desc: &ObjectDescriptor,
        id: &str,
        prior: &StateValue,
    ) -> ProviderResult<()> {
        let Some(template) = &self.delete else {
            return Ok(());
        };
        let path = template.render(id, prior)?;
        ctx.client()
            .delete(&ctx.cancel, &path, &self.write_options(ctx))
            .await?;
        Ok(())
    }
}
