//! Response bodies shaped like the Okta management API.

use serde_json::{Value, json};

pub fn group(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "type": "OKTA_GROUP",
        "profile": {"name": name, "description": "Managed by tests"},
    })
}

pub fn group_rule(id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "type": "group_rule",
        "name": "Engineering",
        "status": status,
        "conditions": {
            "expression": {
                "type": "urn:okta:expression:1.0",
                "value": "user.department == \"Engineering\"",
            }
        },
        "actions": {"assignUserToGroups": {"groupIds": ["00g1"]}},
    })
}

pub fn password_rule(id: &str, status: &str, priority: i64) -> Value {
    json!({
        "id": id,
        "type": "PASSWORD",
        "name": "Rule",
        "priority": priority,
        "status": status,
        "conditions": {"network": {"connection": "ANYWHERE"}},
        "actions": {
            "passwordChange": {"access": "ALLOW"},
            "selfServicePasswordReset": {"access": "ALLOW"},
            "selfServiceUnlock": {"access": "DENY"},
        },
    })
}

pub fn users(ids: &[&str]) -> Value {
    Value::Array(ids.iter().map(|id| json!({"id": id, "status": "ACTIVE"})).collect())
}

pub fn api_error(code: &str, summary: &str) -> Value {
    json!({
        "errorCode": code,
        "errorSummary": summary,
        "errorId": "oaeTest",
        "errorCauses": [],
    })
}
