//! Import identifier parsing.
//!
//! Import ids are `/`-separated. Each descriptor declares the shape it
//! accepts; segments map onto the identifier, plain attributes, or boolean
//! flags. Trailing segments past the required count are optional.

use crate::error::{ValidationError, ValidationResult};
use crate::schema::{AttrValue, StateValue};

/// Meaning of one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSegment {
    /// The object identifier
    Id,
    /// A string attribute
    Attribute(String),
    /// A boolean attribute spelled `true` / `false`
    Flag(String),
}

/// Accepted shape of an import identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportPattern {
    segments: Vec<ImportSegment>,
    required: usize,
}

impl ImportPattern {
    /// `<id>`
    pub fn single() -> Self {
        Self {
            segments: vec![ImportSegment::Id],
            required: 1,
        }
    }

    /// `<parent>/<id>`
    pub fn parent_child(parent: impl Into<String>) -> Self {
        Self {
            segments: vec![ImportSegment::Attribute(parent.into()), ImportSegment::Id],
            required: 2,
        }
    }

    /// `<parent>/<id>/<flag>`
    pub fn parent_child_flag(parent: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            segments: vec![
                ImportSegment::Attribute(parent.into()),
                ImportSegment::Id,
                ImportSegment::Flag(flag.into()),
            ],
            required: 3,
        }
    }

    /// `<id>` with an optional trailing `/<flag>`
    pub fn id_with_optional_flag(flag: impl Into<String>) -> Self {
        Self {
            segments: vec![ImportSegment::Id, ImportSegment::Flag(flag.into())],
            required: 1,
        }
    }

    /// Attributes the pattern assigns.
    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            ImportSegment::Attribute(name) | ImportSegment::Flag(name) => Some(name.as_str()),
            ImportSegment::Id => None,
        })
    }

    /// Human-readable shape, e.g. `<policy_id>/<id>[/<flag>]`.
    pub fn template(&self) -> String {
        let render = |segment: &ImportSegment| match segment {
            ImportSegment::Id => "<id>".to_string(),
            ImportSegment::Attribute(name) => format!("<{name}>"),
            ImportSegment::Flag(name) => format!("<{name}: true|false>"),
        };
        let mut template = String::new();
        for (index, segment) in self.segments.iter().enumerate() {
            let rendered = render(segment);
            if index == 0 {
                template.push_str(&rendered);
            } else if index < self.required {
                template.push('/');
                template.push_str(&rendered);
            } else {
                template.push_str(&format!("[/{rendered}]"));
            }
        }
        template
    }

    /// Parse `raw` into a state holding the identifier and assigned attributes.
    pub fn parse(&self, raw: &str) -> ValidationResult<StateValue> {
        let invalid = || ValidationError::InvalidImportId {
            id: raw.to_string(),
            expected: self.template(),
        };

        let parts: Vec<&str> = raw.split('/').collect();
        if parts.len() < self.required
            || parts.len() > self.segments.len()
            || parts.iter().any(|part| part.trim().is_empty())
        {
            return Err(invalid());
        }

        let mut state = StateValue::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            let part = part.trim();
            match segment {
                ImportSegment::Id => state.id = part.to_string(),
                ImportSegment::Attribute(name) => state.set(name.clone(), part),
                ImportSegment::Flag(name) => {
                    let flag = match part {
                        "true" => true,
                        "false" => false,
                        _ => return Err(invalid()),
                    };
                    state.set(name.clone(), AttrValue::Bool(flag));
                }
            }
        }
        Ok(state)
    }
}
