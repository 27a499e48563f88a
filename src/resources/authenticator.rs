//! `okta_authenticator` resource.
//!
//! Authenticators exist only on Identity Engine orgs. The service never
//! deletes them: destroying one deactivates it and forgets it.

use crate::resource::{
    ObjectDescriptor, RestHandler, STATUS_ACTIVE, STATUS_INACTIVE, StatusLifecycle,
};
use crate::schema::validation::{json_object, string_in_slice};
use crate::schema::{AttributeDescriptor, AttributeKind, DiffSuppress};
use std::sync::Arc;

pub const TYPE_NAME: &str = "okta_authenticator";

pub const DOCS_URL: &str =
    "https://developer.okta.com/docs/guides/oie-intro/main/#authenticators";

const KEYS: &[&str] = &[
    "custom_app",
    "custom_otp",
    "duo",
    "external_idp",
    "google_otp",
    "okta_email",
    "okta_password",
    "okta_verify",
    "onprem_mfa",
    "phone_number",
    "rsa_token",
    "security_key",
    "security_question",
    "smart_card_idp",
    "symantec_vip",
    "webauthn",
    "yubikey_token",
];

pub fn descriptor() -> ObjectDescriptor {
    let handler = RestHandler::new("/api/v1/authenticators", "/api/v1/authenticators/{id}")
        .create_query("activate", "true")
        .without_delete();

    ObjectDescriptor::new(TYPE_NAME, Arc::new(handler))
        .describe("Manages an authenticator on an Identity Engine org.")
        .attributes([
            AttributeDescriptor::required("key", AttributeKind::String)
                .force_new()
                .validate(string_in_slice(KEYS)),
            AttributeDescriptor::required("name", AttributeKind::String),
            AttributeDescriptor::optional("status", AttributeKind::String)
                .default_value(STATUS_ACTIVE)
                .validate(string_in_slice(&[STATUS_ACTIVE, STATUS_INACTIVE])),
            AttributeDescriptor::optional("settings", AttributeKind::Json)
                .suppress(DiffSuppress::NormalizeJson)
                .validate(json_object())
                .describe("Authenticator settings as a JSON document"),
            AttributeDescriptor::optional("provider_json", AttributeKind::Json)
                .wire("provider")
                .suppress(DiffSuppress::NormalizeJson)
                .validate(json_object())
                .describe("Provider block as a JSON document"),
            AttributeDescriptor::output("type", AttributeKind::String),
        ])
        .status_lifecycle(
            StatusLifecycle::under("/api/v1/authenticators/{id}").deactivate_before_delete(),
        )
        .modern_only(DOCS_URL)
}
