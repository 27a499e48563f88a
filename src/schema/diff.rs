//! Attribute diffing and planned-value computation.

use super::types::{AttributeDescriptor, AttributeKind, DiffSuppress};
use super::value::{AttrValue, StateValue, normalize_json};
use std::collections::BTreeMap;

/// Outcome of diffing prior state against configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributeDiff {
    /// Planned attribute values
    pub planned: BTreeMap<String, AttrValue>,
    /// Attributes whose planned value differs from prior state
    pub changed: Vec<String>,
    /// Changed attributes that force replacement
    pub force_new: Vec<String>,
}

impl AttributeDiff {
    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }
}

/// Compare two values of `attribute` under its diff-suppression rule.
pub fn values_equal(attribute: &AttributeDescriptor, prior: &AttrValue, planned: &AttrValue) -> bool {
    if prior.is_unknown() || planned.is_unknown() {
        return false;
    }
    if is_absent(prior) && is_absent(planned) {
        return true;
    }

    match &attribute.diff_suppress {
        Some(DiffSuppress::NormalizeJson) => match (prior.as_str(), planned.as_str()) {
            (Some(a), Some(b)) => match (normalize_json(a), normalize_json(b)) {
                (Ok(a), Ok(b)) => a == b,
                _ => a == b,
            },
            _ => false,
        },
        Some(DiffSuppress::UnorderedList) => match (prior.as_list(), planned.as_list()) {
            (Some(a), Some(b)) => sorted_strings(a) == sorted_strings(b),
            _ => is_absent(prior) && is_absent(planned),
        },
        Some(DiffSuppress::DefaultValue(default)) => {
            prior == planned
                || (planned.is_null() && prior == default)
                || (prior.is_null() && planned == default)
        }
        None => match (&attribute.kind, prior, planned) {
            (AttributeKind::Object(nested), AttrValue::Object(a), AttrValue::Object(b)) => {
                nested.iter().all(|n| {
                    values_equal(
                        n,
                        a.get(&n.name).unwrap_or(&AttrValue::Null),
                        b.get(&n.name).unwrap_or(&AttrValue::Null),
                    )
                })
            }
            _ => prior == planned,
        },
    }
}

fn is_absent(value: &AttrValue) -> bool {
    value.is_null() || value.is_empty_collection()
}

fn sorted_strings(items: &[AttrValue]) -> Vec<&str> {
    let mut strings: Vec<&str> = items.iter().filter_map(AttrValue::as_str).collect();
    strings.sort_unstable();
    strings
}

/// Planned value for one attribute.
///
/// `creating` is true when the object does not exist yet, in which case
/// computed values the configuration leaves unset become unknown.
pub fn planned_value(
    attribute: &AttributeDescriptor,
    prior: &AttrValue,
    config: &AttrValue,
    creating: bool,
) -> AttrValue {
    if attribute.output_only {
        return if creating || prior.is_null() {
            AttrValue::Unknown
        } else {
            prior.clone()
        };
    }

    if config.is_null() {
        if attribute.computed {
            return if creating || prior.is_null() {
                AttrValue::Unknown
            } else {
                prior.clone()
            };
        }
        if let Some(default) = &attribute.default {
            return default.clone();
        }
        if !creating && values_equal(attribute, prior, config) {
            return prior.clone();
        }
        return AttrValue::Null;
    }

    // Keep the prior spelling when the two are equivalent so the plan is stable.
    if !creating && values_equal(attribute, prior, config) {
        return prior.clone();
    }
    config.clone()
}

/// Diff `config` against `prior` for every declared attribute.
pub fn diff_attributes(
    attributes: &[AttributeDescriptor],
    prior: &StateValue,
    config: &StateValue,
) -> AttributeDiff {
    let creating = !prior.exists();
    let mut diff = AttributeDiff::default();

    for attribute in attributes {
        let prior_value = prior.get(&attribute.name);
        let planned = planned_value(attribute, prior_value, config.get(&attribute.name), creating);

        if !creating && !attribute.output_only && !values_equal(attribute, prior_value, &planned) {
            diff.changed.push(attribute.name.clone());
            if attribute.force_new {
                diff.force_new.push(attribute.name.clone());
            }
        }
        if !planned.is_null() {
            diff.planned.insert(attribute.name.clone(), planned);
        }
    }
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::types::AttributeKind;

    #[test]
    fn test_normalize_json_suppresses_formatting() {
        let attribute = AttributeDescriptor::optional("settings", AttributeKind::Json)
            .suppress(DiffSuppress::NormalizeJson);
        assert!(values_equal(
            &attribute,
            &AttrValue::Json(r#"{"b":1,"a":2}"#.into()),
            &AttrValue::string("{ \"a\": 2,\n \"b\": 1 }"),
        ));
        assert!(!values_equal(
            &attribute,
            &AttrValue::Json(r#"{"a":1}"#.into()),
            &AttrValue::string(r#"{"a":2}"#),
        ));
    }

    #[test]
    fn test_unordered_list() {
        let attribute = AttributeDescriptor::optional("groups", AttributeKind::StringList)
            .suppress(DiffSuppress::UnorderedList);
        assert!(values_equal(
            &attribute,
            &AttrValue::string_list(["b", "a"]),
            &AttrValue::string_list(["a", "b"]),
        ));
        assert!(!values_equal(
            &attribute,
            &AttrValue::string_list(["a"]),
            &AttrValue::string_list(["a", "b"]),
        ));
    }

    #[test]
    fn test_default_value_suppression() {
        let attribute = AttributeDescriptor::optional("priority", AttributeKind::Int)
            .suppress(DiffSuppress::DefaultValue(AttrValue::Int(1)));
        assert!(values_equal(&attribute, &AttrValue::Int(1), &AttrValue::Null));
        assert!(!values_equal(&attribute, &AttrValue::Int(3), &AttrValue::Null));
        assert!(!values_equal(&attribute, &AttrValue::Int(3), &AttrValue::Int(1)));
    }

    #[test]
    fn test_empty_collection_equals_null() {
        let attribute = AttributeDescriptor::optional("users", AttributeKind::StringSet);
        assert!(values_equal(&attribute, &AttrValue::set(Vec::<String>::new()), &AttrValue::Null));
    }

    #[test]
    fn test_computed_values_on_create_are_unknown() {
        let attributes = vec![
            AttributeDescriptor::required("name", AttributeKind::String),
            AttributeDescriptor::output("type", AttributeKind::String),
            AttributeDescriptor::optional("status", AttributeKind::String).default_value("ACTIVE"),
        ];
        let config = StateValue::new().with("name", "a");
        let diff = diff_attributes(&attributes, &StateValue::new(), &config);
        assert_eq!(diff.planned.get("type"), Some(&AttrValue::Unknown));
        assert_eq!(diff.planned.get("status"), Some(&AttrValue::string("ACTIVE")));
        assert!(diff.changed.is_empty());
    }

    #[test]
    fn test_update_diff_and_force_new() {
        let attributes = vec![
            AttributeDescriptor::required("name", AttributeKind::String),
            AttributeDescriptor::required("key", AttributeKind::String).force_new(),
            AttributeDescriptor::output("type", AttributeKind::String),
        ];
        let prior = StateValue::with_id("x")
            .with("name", "a")
            .with("key", "k1")
            .with("type", "OKTA_GROUP");
        let config = StateValue::new().with("name", "b").with("key", "k2");
        let diff = diff_attributes(&attributes, &prior, &config);
        assert_eq!(diff.changed, vec!["name".to_string(), "key".to_string()]);
        assert_eq!(diff.force_new, vec!["key".to_string()]);
        assert_eq!(diff.planned.get("type"), Some(&AttrValue::string("OKTA_GROUP")));
    }

    #[test]
    fn test_identical_state_has_no_changes() {
        let attributes = vec![
            AttributeDescriptor::required("name", AttributeKind::String),
            AttributeDescriptor::optional_computed("priority", AttributeKind::Int),
        ];
        let prior = StateValue::with_id("x").with("name", "a").with("priority", 4);
        let config = StateValue::new().with("name", "a");
        let diff = diff_attributes(&attributes, &prior, &config);
        assert!(!diff.has_changes());
        assert_eq!(diff.planned.get("priority"), Some(&AttrValue::Int(4)));
    }
}
