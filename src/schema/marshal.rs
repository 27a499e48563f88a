//! Conversions between [`AttrValue`] trees and JSON.
//!
//! Two encodings exist. The host encoding is the state/config document the
//! plugin host exchanges over RPC: one key per logical attribute name, the
//! identifier under `id`, and unknown values as [`UNKNOWN_SENTINEL`]. The
//! wire encoding is the service payload: attributes live at their dotted
//! wire paths, raw JSON attributes are embedded as documents, and output-only
//! or local attributes are never sent.

use super::types::{AttributeDescriptor, AttributeKind};
use super::value::{AttrValue, StateValue, UNKNOWN_SENTINEL, sort_keys};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::ValidationError;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

const ID_KEY: &str = "id";

/// Decode a host document into state.
///
/// Undeclared keys are decoded loosely so that validation can report them.
pub fn decode_host(
    attributes: &[AttributeDescriptor],
    document: &Value,
) -> Result<StateValue, Diagnostics> {
    let mut state = StateValue::new();
    let object = match document {
        Value::Null => return Ok(state),
        Value::Object(object) => object,
        other => {
            let mut diags = Diagnostics::new();
            diags.error(
                "Invalid state document",
                format!("expected an object, got {other}"),
            );
            return Err(diags);
        }
    };

    let mut diags = Diagnostics::new();
    for (key, value) in object {
        if key == ID_KEY {
            state.id = value.as_str().unwrap_or_default().to_string();
            continue;
        }
        let decoded = match attributes.iter().find(|a| &a.name == key) {
            Some(attribute) => decode_value(key, &attribute.kind, value),
            None => Ok(decode_loose(value)),
        };
        match decoded {
            Ok(AttrValue::Null) => {}
            Ok(decoded) => state.set(key.clone(), decoded),
            Err(error) => diags.push(Diagnostic::from(&error)),
        }
    }

    if diags.has_errors() {
        Err(diags)
    } else {
        Ok(state)
    }
}

fn decode_value(path: &str, kind: &AttributeKind, value: &Value) -> Result<AttrValue, ValidationError> {
    if is_sentinel(value) {
        return Ok(AttrValue::Unknown);
    }
    let mismatch = || ValidationError::invalid_type(path, kind.type_name(), json_kind(value));

    Ok(match (kind, value) {
        (_, Value::Null) => AttrValue::Null,
        (AttributeKind::String, Value::String(s)) => AttrValue::String(s.clone()),
        (AttributeKind::Int, Value::Number(n)) => AttrValue::Int(n.as_i64().ok_or_else(mismatch)?),
        (AttributeKind::Bool, Value::Bool(b)) => AttrValue::Bool(*b),
        (AttributeKind::StringSet, Value::Array(items)) => {
            if items.iter().any(is_sentinel) {
                return Ok(AttrValue::Unknown);
            }
            let mut set = BTreeSet::new();
            for item in items {
                set.insert(item.as_str().ok_or_else(mismatch)?.to_string());
            }
            AttrValue::Set(set)
        }
        (AttributeKind::StringList, Value::Array(items)) => {
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                list.push(decode_value(path, &AttributeKind::String, item)?);
            }
            AttrValue::List(list)
        }
        (AttributeKind::Object(nested), Value::Object(fields)) => {
            let mut decoded = BTreeMap::new();
            for (key, field) in fields {
                let child = format!("{path}.{key}");
                let value = match nested.iter().find(|n| &n.name == key) {
                    Some(n) => decode_value(&child, &n.kind, field)?,
                    None => decode_loose(field),
                };
                if !value.is_null() {
                    decoded.insert(key.clone(), value);
                }
            }
            AttrValue::Object(decoded)
        }
        (AttributeKind::Json, Value::String(s)) => AttrValue::Json(s.clone()),
        (AttributeKind::Json, other) => AttrValue::Json(other.to_string()),
        _ => return Err(mismatch()),
    })
}

fn decode_loose(value: &Value) -> AttrValue {
    match value {
        Value::Null => AttrValue::Null,
        Value::Bool(b) => AttrValue::Bool(*b),
        Value::Number(n) => n.as_i64().map(AttrValue::Int).unwrap_or_else(|| AttrValue::Json(n.to_string())),
        Value::String(s) if s == UNKNOWN_SENTINEL => AttrValue::Unknown,
        Value::String(s) => AttrValue::String(s.clone()),
        Value::Array(items) => AttrValue::List(items.iter().map(decode_loose).collect()),
        Value::Object(fields) => AttrValue::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), decode_loose(v)))
                .collect(),
        ),
    }
}

fn is_sentinel(value: &Value) -> bool {
    value.as_str() == Some(UNKNOWN_SENTINEL)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Encode state into a host document.
pub fn encode_host(attributes: &[AttributeDescriptor], state: &StateValue) -> Value {
    let mut object = Map::new();
    object.insert(ID_KEY.to_string(), Value::String(state.id.clone()));
    for attribute in attributes {
        object.insert(
            attribute.name.clone(),
            encode_value(&attribute.kind, state.get(&attribute.name)),
        );
    }
    Value::Object(object)
}

/// Host encoding of one attribute value.
pub fn encode_attribute(attribute: &AttributeDescriptor, value: &AttrValue) -> Value {
    encode_value(&attribute.kind, value)
}

fn encode_value(kind: &AttributeKind, value: &AttrValue) -> Value {
    match value {
        AttrValue::Null => Value::Null,
        AttrValue::Unknown => Value::String(UNKNOWN_SENTINEL.to_string()),
        AttrValue::String(s) | AttrValue::Json(s) => Value::String(s.clone()),
        AttrValue::Int(i) => Value::from(*i),
        AttrValue::Bool(b) => Value::Bool(*b),
        AttrValue::Set(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        AttrValue::List(items) => Value::Array(
            items
                .iter()
                .map(|item| encode_value(&AttributeKind::String, item))
                .collect(),
        ),
        AttrValue::Object(fields) => {
            let nested: &[AttributeDescriptor] = match kind {
                AttributeKind::Object(nested) => nested,
                _ => &[],
            };
            let mut object = Map::new();
            for attribute in nested {
                object.insert(
                    attribute.name.clone(),
                    encode_value(
                        &attribute.kind,
                        fields.get(&attribute.name).unwrap_or(&AttrValue::Null),
                    ),
                );
            }
            Value::Object(object)
        }
    }
}

/// Build the service payload for the writable attributes of `values`.
pub fn marshal(attributes: &[AttributeDescriptor], values: &BTreeMap<String, AttrValue>) -> Value {
    let mut payload = Value::Object(Map::new());
    for attribute in attributes {
        if attribute.output_only || attribute.local {
            continue;
        }
        let value = match values.get(&attribute.name) {
            Some(value) if !value.is_null() && value.is_fully_known() => value,
            _ => continue,
        };
        insert_path(&mut payload, attribute.wire_path(), to_wire(&attribute.kind, value));
    }
    payload
}

fn to_wire(kind: &AttributeKind, value: &AttrValue) -> Value {
    match (kind, value) {
        (AttributeKind::Json, AttrValue::Json(text) | AttrValue::String(text)) => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
        }
        (AttributeKind::Object(nested), AttrValue::Object(fields)) => marshal(nested, fields),
        _ => encode_value(kind, value),
    }
}

fn insert_path(target: &mut Value, path: &str, value: Value) {
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Some(map) = target.as_object_mut() else {
        return;
    };
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            insert_path(child, rest, value);
        }
    }
}

/// Look up a dotted path in a payload.
pub fn lookup_path<'a>(source: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(source, |current, segment| current.get(segment))
}

/// Decode the non-local attributes of a service payload.
pub fn unmarshal(
    attributes: &[AttributeDescriptor],
    payload: &Value,
) -> BTreeMap<String, AttrValue> {
    let mut values = BTreeMap::new();
    for attribute in attributes {
        if attribute.local {
            continue;
        }
        let value = lookup_path(payload, attribute.wire_path())
            .map(|raw| from_wire(&attribute.kind, raw))
            .unwrap_or_default();
        if !value.is_null() {
            values.insert(attribute.name.clone(), value);
        }
    }
    values
}

/// Decode one wire value by kind; shapes that do not fit decode to `Null`.
pub fn from_wire(kind: &AttributeKind, raw: &Value) -> AttrValue {
    match (kind, raw) {
        (_, Value::Null) => AttrValue::Null,
        (AttributeKind::String, Value::String(s)) => AttrValue::String(s.clone()),
        (AttributeKind::String, Value::Number(n)) => AttrValue::String(n.to_string()),
        (AttributeKind::String, Value::Bool(b)) => AttrValue::String(b.to_string()),
        (AttributeKind::Int, Value::Number(n)) => n.as_i64().map(AttrValue::Int).unwrap_or_default(),
        (AttributeKind::Int, Value::String(s)) => s.parse().map(AttrValue::Int).unwrap_or_default(),
        (AttributeKind::Bool, Value::Bool(b)) => AttrValue::Bool(*b),
        (AttributeKind::StringSet, Value::Array(items)) => AttrValue::Set(
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
        ),
        (AttributeKind::StringList, Value::Array(items)) => AttrValue::List(
            items
                .iter()
                .filter_map(|item| item.as_str().map(AttrValue::string))
                .collect(),
        ),
        (AttributeKind::Object(nested), Value::Object(_)) => AttrValue::Object(unmarshal(nested, raw)),
        (AttributeKind::Json, other) => AttrValue::Json(sort_keys(other.clone()).to_string()),
        _ => AttrValue::Null,
    }
}
