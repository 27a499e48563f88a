//! `okta_group` resource and data source.

use crate::error::{ProviderError, ProviderResult};
use crate::resource::{DataDescriptor, DataHandler, ObjectDescriptor, RequestContext, RestHandler};
use crate::schema::marshal::unmarshal;
use crate::schema::validation::non_empty;
use crate::schema::{AttributeDescriptor, AttributeKind, StateValue};
use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::sync::Arc;

pub const TYPE_NAME: &str = "okta_group";

fn profile_attributes() -> Vec<AttributeDescriptor> {
    vec![
        AttributeDescriptor::required("name", AttributeKind::String)
            .wire("profile.name")
            .validate(non_empty())
            .describe("Name of the group"),
        AttributeDescriptor::optional("description", AttributeKind::String)
            .wire("profile.description")
            .describe("Description of the group"),
    ]
}

/// Managed `OKTA_GROUP` groups.
///
/// Groups still referenced by an app or rule cannot be deleted; the refusal
/// is reported as a warning and the group is dropped from state.
pub fn descriptor() -> ObjectDescriptor {
    let handler = RestHandler::new("/api/v1/groups", "/api/v1/groups/{id}").supplemental(
        "profile_mapping_id",
        "/api/v1/mappings?sourceId={id}",
        "/0/id",
    );

    ObjectDescriptor::new(TYPE_NAME, Arc::new(handler))
        .describe("Creates an Okta group.")
        .attributes(profile_attributes())
        .attributes([
            AttributeDescriptor::output("type", AttributeKind::String),
            AttributeDescriptor::output("profile_mapping_id", AttributeKind::String)
                .describe("Profile mapping sourced from this group, if readable"),
        ])
        .soft_delete()
}

/// Exact-name lookup.
#[derive(Debug, Default)]
pub struct GroupLookup;

#[async_trait]
impl DataHandler for GroupLookup {
    async fn read(
        &self,
        ctx: &RequestContext,
        desc: &DataDescriptor,
        config: &StateValue,
    ) -> ProviderResult<StateValue> {
        let name = config
            .str("name")
            .ok_or_else(|| ProviderError::internal("group lookup needs a name"))?;
        let options = ctx.options().query("q", name).query("limit", "200");
        let response = ctx
            .client()
            .get(&ctx.cancel, "/api/v1/groups", &options)
            .await?;
        let groups: Vec<Value> = response.json()?;
        debug!(
            "[{}] group search for '{}' returned {} candidate(s)",
            ctx.request_id,
            name,
            groups.len()
        );

        let group = groups
            .iter()
            .find(|group| group.pointer("/profile/name").and_then(Value::as_str) == Some(name))
            .ok_or_else(|| ProviderError::internal(format!("no group named '{name}'")))?;
        Ok(StateValue {
            id: group
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            values: unmarshal(&desc.attributes, group),
        })
    }
}

pub fn data_descriptor() -> DataDescriptor {
    DataDescriptor::new(TYPE_NAME, Arc::new(GroupLookup))
        .describe("Looks up an Okta group by exact name.")
        .attributes(profile_attributes().into_iter().map(|attribute| {
            if attribute.name == "description" {
                AttributeDescriptor::output("description", AttributeKind::String)
                    .wire("profile.description")
            } else {
                attribute
            }
        }))
        .attributes([AttributeDescriptor::output("type", AttributeKind::String)])
}
