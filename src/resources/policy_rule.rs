//! Policy rule resources.
//!
//! Rules live under their policy (`/api/v1/policies/{policy_id}/rules`). The
//! service renumbers priorities when two rules collide, so writes to rules
//! of any policy are serialized through the `policy-rule` mutex and the
//! priority is read back after every write.

use crate::mutex::POLICY_RULE;
use crate::reconciler::ImportPattern;
use crate::resource::{
    ObjectDescriptor, RestHandler, STATUS_ACTIVE, STATUS_INACTIVE, StatusLifecycle,
};
use crate::schema::validation::{int_at_least, int_between, non_empty, string_in_slice};
use crate::schema::{AttrValue, AttributeDescriptor, AttributeKind, DiffSuppress};
use serde_json::json;
use std::sync::Arc;

pub const PASSWORD_TYPE_NAME: &str = "okta_policy_rule_password";
pub const SIGNON_TYPE_NAME: &str = "okta_policy_rule_signon";

const COLLECTION: &str = "/api/v1/policies/{policy_id}/rules";
const ITEM: &str = "/api/v1/policies/{policy_id}/rules/{id}";

const ACCESS: &[&str] = &["ALLOW", "DENY"];
const NETWORK_CONNECTIONS: &[&str] = &["ANYWHERE", "ZONE", "ON_NETWORK", "OFF_NETWORK"];
const RISK_LEVELS: &[&str] = &["ANY", "LOW", "MEDIUM", "HIGH"];

/// Attributes shared by every policy rule type.
fn common_attributes() -> Vec<AttributeDescriptor> {
    vec![
        AttributeDescriptor::required("policy_id", AttributeKind::String)
            .local()
            .force_new()
            .describe("Policy the rule belongs to"),
        AttributeDescriptor::required("name", AttributeKind::String).validate(non_empty()),
        AttributeDescriptor::optional_computed("priority", AttributeKind::Int)
            .validate(int_at_least(1))
            .suppress(DiffSuppress::DefaultValue(AttrValue::Int(1)))
            .describe("Rule priority; lower is evaluated first"),
        AttributeDescriptor::optional("status", AttributeKind::String)
            .default_value(STATUS_ACTIVE)
            .validate(string_in_slice(&[STATUS_ACTIVE, STATUS_INACTIVE])),
        AttributeDescriptor::optional("network_connection", AttributeKind::String)
            .wire("conditions.network.connection")
            .default_value("ANYWHERE")
            .validate(string_in_slice(NETWORK_CONNECTIONS)),
        AttributeDescriptor::optional("users_excluded", AttributeKind::StringSet)
            .wire("conditions.people.users.exclude"),
    ]
}

fn rule_descriptor(type_name: &str, rule_type: &str) -> ObjectDescriptor {
    let handler = RestHandler::new(COLLECTION, ITEM).static_body(json!({"type": rule_type}));
    ObjectDescriptor::new(type_name, Arc::new(handler))
        .attributes(common_attributes())
        .status_lifecycle(StatusLifecycle::under(ITEM))
        .mutex(POLICY_RULE)
        .import_pattern(ImportPattern::parent_child("policy_id"))
}

pub fn password_descriptor() -> ObjectDescriptor {
    rule_descriptor(PASSWORD_TYPE_NAME, "PASSWORD")
        .describe("Creates a password policy rule.")
        .attributes([
            AttributeDescriptor::optional("password_change", AttributeKind::String)
                .wire("actions.passwordChange.access")
                .default_value("ALLOW")
                .validate(string_in_slice(ACCESS)),
            AttributeDescriptor::optional("password_reset", AttributeKind::String)
                .wire("actions.selfServicePasswordReset.access")
                .default_value("ALLOW")
                .validate(string_in_slice(ACCESS)),
            AttributeDescriptor::optional("password_unlock", AttributeKind::String)
                .wire("actions.selfServiceUnlock.access")
                .default_value("DENY")
                .validate(string_in_slice(ACCESS)),
        ])
}

pub fn signon_descriptor() -> ObjectDescriptor {
    rule_descriptor(SIGNON_TYPE_NAME, "SIGN_ON")
        .describe("Creates a sign-on policy rule.")
        .attributes([
            AttributeDescriptor::optional("access", AttributeKind::String)
                .wire("actions.signon.access")
                .default_value("ALLOW")
                .validate(string_in_slice(ACCESS)),
            AttributeDescriptor::optional("mfa_required", AttributeKind::Bool)
                .wire("actions.signon.requireFactor")
                .default_value(false),
            AttributeDescriptor::optional("session_idle", AttributeKind::Int)
                .wire("actions.signon.session.maxSessionIdleMinutes")
                .default_value(120i64)
                .validate(int_between(1, 43200)),
            AttributeDescriptor::optional("risk_level", AttributeKind::String)
                .wire("conditions.riskScore.level")
                .validate(string_in_slice(RISK_LEVELS)),
            AttributeDescriptor::optional("risc_level", AttributeKind::String)
                .local()
                .validate(string_in_slice(RISK_LEVELS))
                .describe("Deprecated spelling of risk_level"),
        ])
        .alias("risk_level", "risc_level")
}
