//! Attribute values and object state.
//!
//! [`AttrValue`] is the tagged tree every attribute kind decodes into, with a
//! dedicated [`AttrValue::Unknown`] leaf for values only known after apply.
//! [`StateValue`] pairs an identifier with the attribute map and is used for
//! prior state, configuration and planned state alike.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Host-encoding marker for a value that is not known until apply.
pub const UNKNOWN_SENTINEL: &str = "74D93920-ED26-11E3-AC10-0800200C9A66";

static NULL: AttrValue = AttrValue::Null;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AttrValue {
    /// Unset
    #[default]
    Null,
    /// Known only after apply
    Unknown,
    String(String),
    Int(i64),
    Bool(bool),
    Set(BTreeSet<String>),
    List(Vec<AttrValue>),
    Object(BTreeMap<String, AttrValue>),
    /// Raw JSON document kept as text
    Json(String),
}

impl AttrValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Set(items.into_iter().map(Into::into).collect())
    }

    pub fn string_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(|s| Self::String(s.into())).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    /// True when neither this value nor anything nested in it is unknown.
    pub fn is_fully_known(&self) -> bool {
        match self {
            Self::Unknown => false,
            Self::List(items) => items.iter().all(Self::is_fully_known),
            Self::Object(fields) => fields.values().all(Self::is_fully_known),
            _ => true,
        }
    }

    /// Set, list or object with no elements.
    pub fn is_empty_collection(&self) -> bool {
        match self {
            Self::Set(items) => items.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Object(fields) => fields.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Json(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[AttrValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, AttrValue>> {
        match self {
            Self::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Name used in type-mismatch messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Unknown => "unknown",
            Self::String(_) => "string",
            Self::Int(_) => "integer",
            Self::Bool(_) => "boolean",
            Self::Set(_) => "set",
            Self::List(_) => "list",
            Self::Object(_) => "object",
            Self::Json(_) => "json",
        }
    }

    /// Render a scalar for use in a URL path or query.
    pub fn to_path_segment(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Int(i) => Some(i.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<BTreeSet<String>> for AttrValue {
    fn from(value: BTreeSet<String>) -> Self {
        Self::Set(value)
    }
}

/// Identifier plus attribute values for one object.
///
/// An empty `id` means the object does not exist (not yet created, or
/// tainted after the service reported it gone).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StateValue {
    pub id: String,
    pub values: BTreeMap<String, AttrValue>,
}

impl StateValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: BTreeMap::new(),
        }
    }

    /// Builder-style attribute assignment.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn exists(&self) -> bool {
        !self.id.is_empty()
    }

    /// Value of `name`, or `Null` when absent.
    pub fn get(&self, name: &str) -> &AttrValue {
        self.values.get(name).unwrap_or(&NULL)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<AttrValue>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> AttrValue {
        self.values.remove(name).unwrap_or_default()
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).as_int()
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).as_bool()
    }

    /// String members of a set or list attribute; empty when unset.
    pub fn strings(&self, name: &str) -> BTreeSet<String> {
        match self.get(name) {
            AttrValue::Set(items) => items.clone(),
            AttrValue::List(items) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => BTreeSet::new(),
        }
    }

    /// Clear the identifier, keeping attributes; the host plans a create next.
    pub fn taint(&mut self) {
        self.id.clear();
    }

    pub fn is_fully_known(&self) -> bool {
        self.values.values().all(AttrValue::is_fully_known)
    }
}

/// Canonical text of a JSON document: parsed and re-encoded with sorted keys.
pub fn normalize_json(text: &str) -> Result<String, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    serde_json::to_string(&sort_keys(value))
}

/// Recursively order object keys.
pub fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
