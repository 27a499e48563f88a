//! `okta_group_memberships` resource.
//!
//! Tracks a set of users in one group. With `track_all_users = true` the
//! declared set is authoritative and users added outside the configuration
//! show up as drift; otherwise only the declared users are managed.

use crate::error::ProviderResult;
use crate::reconciler::{ImportPattern, MembershipApi, MembershipSpec};
use crate::resource::{ObjectDescriptor, RequestContext};
use crate::schema::{AttributeDescriptor, AttributeKind};
use crate::transport::{Page, PageCursor, RequestOptions};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub const TYPE_NAME: &str = "okta_group_memberships";

const PAGE_LIMIT: &str = "200";

#[derive(Debug, Deserialize)]
struct GroupUser {
    id: String,
}

/// `/api/v1/groups/{group}/users` endpoints.
#[derive(Debug, Default)]
pub struct GroupUsersApi;

#[async_trait]
impl MembershipApi for GroupUsersApi {
    async fn list_page(
        &self,
        ctx: &RequestContext,
        parent: &str,
        cursor: Option<&PageCursor>,
    ) -> ProviderResult<Option<Page<String>>> {
        let path = format!("/api/v1/groups/{parent}/users");
        let options = RequestOptions::new().query("limit", PAGE_LIMIT);
        let response = match ctx.list_page(&path, cursor, &options).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let users: Vec<GroupUser> = response.json()?;
        Ok(Some(Page {
            items: users.into_iter().map(|user| user.id).collect(),
            next: response.next,
        }))
    }

    async fn add(&self, ctx: &RequestContext, parent: &str, member: &str) -> ProviderResult<()> {
        ctx.put(&format!("/api/v1/groups/{parent}/users/{member}"), &json!({}))
            .await?;
        Ok(())
    }

    async fn remove(&self, ctx: &RequestContext, parent: &str, member: &str) -> ProviderResult<()> {
        ctx.delete(&format!("/api/v1/groups/{parent}/users/{member}"))
            .await?;
        Ok(())
    }
}

pub fn spec() -> MembershipSpec {
    MembershipSpec::new("group_id", "users", Arc::new(GroupUsersApi)).mode_attribute("track_all_users")
}

pub fn descriptor() -> ObjectDescriptor {
    ObjectDescriptor::membership(TYPE_NAME, spec())
        .describe("Manages a set of users in a group.")
        .attributes([
            AttributeDescriptor::required("group_id", AttributeKind::String)
                .force_new()
                .local()
                .describe("ID of the group"),
            AttributeDescriptor::required("users", AttributeKind::StringSet)
                .describe("IDs of the users in the group"),
            AttributeDescriptor::optional("track_all_users", AttributeKind::Bool)
                .local()
                .default_value(false)
                .describe("Manage every user of the group, not only the listed ones"),
        ])
        .import_pattern(ImportPattern::id_with_optional_flag("track_all_users"))
        .id_attribute("group_id")
}
