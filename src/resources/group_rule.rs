//! `okta_group_rule` resource.
//!
//! Rules are created INACTIVE and must be deactivated before any change.
//! A rule whose expression no longer compiles reports status INVALID and can
//! only be replaced.

use crate::resource::{
    ObjectDescriptor, RestHandler, STATUS_ACTIVE, STATUS_INACTIVE, StatusLifecycle,
};
use crate::schema::validation::{non_empty, string_in_slice};
use crate::schema::{AttributeDescriptor, AttributeKind, DiffSuppress};
use serde_json::json;
use std::sync::Arc;

pub const TYPE_NAME: &str = "okta_group_rule";

const EXPRESSION_TYPE: &str = "urn:okta:expression:1.0";

pub fn descriptor() -> ObjectDescriptor {
    let handler = RestHandler::new("/api/v1/groups/rules", "/api/v1/groups/rules/{id}")
        .static_body(json!({"type": "group_rule"}))
        .delete_path("/api/v1/groups/rules/{id}?removeUsers={remove_assigned_users}");

    ObjectDescriptor::new(TYPE_NAME, Arc::new(handler))
        .describe("Creates an Okta group rule.")
        .attributes([
            AttributeDescriptor::required("name", AttributeKind::String).validate(non_empty()),
            AttributeDescriptor::required("group_assignments", AttributeKind::StringList)
                .wire("actions.assignUserToGroups.groupIds")
                .suppress(DiffSuppress::UnorderedList)
                .describe("Groups users matching the expression are assigned to"),
            AttributeDescriptor::optional("expression_type", AttributeKind::String)
                .wire("conditions.expression.type")
                .default_value(EXPRESSION_TYPE),
            AttributeDescriptor::required("expression_value", AttributeKind::String)
                .wire("conditions.expression.value"),
            AttributeDescriptor::optional("status", AttributeKind::String)
                .default_value(STATUS_ACTIVE)
                .validate(string_in_slice(&[STATUS_ACTIVE, STATUS_INACTIVE])),
            AttributeDescriptor::optional("users_excluded", AttributeKind::StringSet)
                .wire("conditions.people.users.exclude"),
            AttributeDescriptor::optional("remove_assigned_users", AttributeKind::Bool)
                .local()
                .default_value(false)
                .describe("Remove users added by this rule when it is deleted"),
        ])
        .status_lifecycle(
            StatusLifecycle::under("/api/v1/groups/rules/{id}")
                .created_inactive()
                .deactivate_for_update()
                .deactivate_before_delete()
                .invalid_forces_replace(),
        )
}
