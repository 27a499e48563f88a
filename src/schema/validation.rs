//! Configuration validation.
//!
//! [`validate_config`] checks a decoded configuration against the attribute
//! declarations: unknown names, missing required values, output-only values
//! that were set, kind mismatches, and every declared [`Validator`]. All
//! problems are collected; nothing short-circuits.

use super::types::{AttributeDescriptor, AttributeKind, Validator};
use super::value::{AttrValue, normalize_json};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::ValidationError;
use std::collections::BTreeMap;

/// Validate `values` against `attributes`.
pub fn validate_config(
    type_name: &str,
    attributes: &[AttributeDescriptor],
    values: &BTreeMap<String, AttrValue>,
) -> Diagnostics {
    let mut diags = Diagnostics::new();
    validate_level(type_name, "", attributes, values, &mut diags);
    diags
}

fn validate_level(
    type_name: &str,
    prefix: &str,
    attributes: &[AttributeDescriptor],
    values: &BTreeMap<String, AttrValue>,
    diags: &mut Diagnostics,
) {
    for name in values.keys() {
        if !attributes.iter().any(|a| &a.name == name) {
            let error = ValidationError::UnknownAttribute {
                attribute: join(prefix, name),
                type_name: type_name.to_string(),
            };
            diags.push(Diagnostic::from(&error));
        }
    }

    for attribute in attributes {
        let path = join(prefix, &attribute.name);
        let value = values.get(&attribute.name).unwrap_or(&AttrValue::Null);
        validate_attribute(type_name, &path, attribute, value, diags);
    }
}

fn validate_attribute(
    type_name: &str,
    path: &str,
    attribute: &AttributeDescriptor,
    value: &AttrValue,
    diags: &mut Diagnostics,
) {
    match value {
        AttrValue::Null => {
            if attribute.required {
                diags.push(Diagnostic::from(&ValidationError::missing_required(path)));
            }
            return;
        }
        AttrValue::Unknown => return,
        _ => {}
    }

    if attribute.output_only {
        let error = ValidationError::ComputedAttributeSet {
            attribute: path.to_string(),
        };
        diags.push(Diagnostic::from(&error));
        return;
    }

    if !attribute.kind.accepts(value) {
        let error = ValidationError::invalid_type(
            path,
            attribute.kind.type_name(),
            value.kind_name(),
        );
        diags.push(Diagnostic::from(&error));
        return;
    }

    match (&attribute.kind, value) {
        (AttributeKind::Json, AttrValue::Json(text) | AttrValue::String(text)) => {
            if let Err(e) = normalize_json(text) {
                let error = ValidationError::InvalidJson {
                    attribute: path.to_string(),
                    details: e.to_string(),
                };
                diags.push(Diagnostic::from(&error));
                return;
            }
        }
        (AttributeKind::Object(nested), AttrValue::Object(fields)) => {
            validate_level(type_name, path, nested, fields, diags);
        }
        _ => {}
    }

    if value.is_fully_known() {
        for validator in &attribute.validators {
            diags.extend(validator.check(path, value));
        }
    }
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn invalid_value(path: &str, value: &AttrValue, allowed: Vec<String>) -> Diagnostics {
    let rendered = value
        .to_path_segment()
        .unwrap_or_else(|| value.kind_name().to_string());
    let error = ValidationError::InvalidValue {
        attribute: path.to_string(),
        value: rendered,
        allowed,
    };
    let mut diags = Diagnostics::new();
    diags.push(Diagnostic::from(&error));
    diags
}

/// String must be one of `allowed`; set and list members are checked individually.
pub fn string_in_slice(allowed: &'static [&'static str]) -> Validator {
    Validator::new("string_in_slice", move |path, value| {
        let allowed_list = || allowed.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        match value {
            AttrValue::String(s) if !allowed.contains(&s.as_str()) => {
                invalid_value(path, value, allowed_list())
            }
            AttrValue::Set(items) => items
                .iter()
                .filter(|item| !allowed.contains(&item.as_str()))
                .map(|item| invalid_value(path, &AttrValue::string(item.clone()), allowed_list()))
                .fold(Diagnostics::new(), |mut acc, d| {
                    acc.extend(d);
                    acc
                }),
            _ => Diagnostics::new(),
        }
    })
}

/// Integer must be at least `min`.
pub fn int_at_least(min: i64) -> Validator {
    Validator::new("int_at_least", move |path, value| match value {
        AttrValue::Int(i) if *i < min => {
            invalid_value(path, value, vec![format!(">= {min}")])
        }
        _ => Diagnostics::new(),
    })
}

/// Integer must lie in `min..=max`.
pub fn int_between(min: i64, max: i64) -> Validator {
    Validator::new("int_between", move |path, value| match value {
        AttrValue::Int(i) if *i < min || *i > max => {
            invalid_value(path, value, vec![format!("{min}..={max}")])
        }
        _ => Diagnostics::new(),
    })
}

/// String must not be empty or whitespace.
pub fn non_empty() -> Validator {
    Validator::new("non_empty", |path, value| match value {
        AttrValue::String(s) if s.trim().is_empty() => {
            let mut diags = Diagnostics::new();
            diags.push(
                Diagnostic::error("Invalid configuration", format!("'{path}' must not be empty"))
                    .with_attribute(path),
            );
            diags
        }
        _ => Diagnostics::new(),
    })
}

/// String must parse as a JSON object.
pub fn json_object() -> Validator {
    Validator::new("json_object", |path, value| {
        let text = match value.as_str() {
            Some(text) => text,
            None => return Diagnostics::new(),
        };
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(serde_json::Value::Object(_)) => Diagnostics::new(),
            Ok(_) => {
                let error = ValidationError::InvalidJson {
                    attribute: path.to_string(),
                    details: "expected a JSON object".to_string(),
                };
                let mut diags = Diagnostics::new();
                diags.push(Diagnostic::from(&error));
                diags
            }
            // Parse errors are reported by the kind check.
            Err(_) => Diagnostics::new(),
        }
    })
}
