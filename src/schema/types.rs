//! Attribute declarations.
//!
//! An [`AttributeDescriptor`] states what an attribute holds, whether the
//! practitioner must, may, or cannot set it, how it is validated and diffed,
//! and where it lives in the service's JSON payloads.

use super::value::AttrValue;
use crate::diagnostics::Diagnostics;
use crate::error::{BuildError, BuildResult};
use std::fmt;
use std::sync::Arc;

/// Value kind of an attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeKind {
    String,
    Int,
    Bool,
    StringSet,
    StringList,
    /// Nested block with its own attributes
    Object(Vec<AttributeDescriptor>),
    /// Raw JSON document carried as a string
    Json,
}

impl AttributeKind {
    /// Type name reported by GetSchema.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "number",
            Self::Bool => "bool",
            Self::StringSet => "set(string)",
            Self::StringList => "list(string)",
            Self::Object(_) => "object",
            Self::Json => "string",
        }
    }

    /// Whether `value` has the shape this kind decodes into.
    pub fn accepts(&self, value: &AttrValue) -> bool {
        matches!(
            (self, value),
            (_, AttrValue::Null | AttrValue::Unknown)
                | (Self::String, AttrValue::String(_))
                | (Self::Int, AttrValue::Int(_))
                | (Self::Bool, AttrValue::Bool(_))
                | (Self::StringSet, AttrValue::Set(_))
                | (Self::StringList, AttrValue::List(_))
                | (Self::Object(_), AttrValue::Object(_))
                | (Self::Json, AttrValue::Json(_) | AttrValue::String(_))
        )
    }
}

/// How two values of an attribute are compared when planning.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffSuppress {
    /// Compare raw JSON by its key-sorted canonical encoding
    NormalizeJson,
    /// Compare a list as a set; the service does not keep its order
    UnorderedList,
    /// Omitted in config and equal to this value upstream counts as no change
    DefaultValue(AttrValue),
}

type CheckFn = dyn Fn(&str, &AttrValue) -> Diagnostics + Send + Sync;

/// A named predicate over a configured value.
///
/// Receives the attribute path and a known, non-null value.
#[derive(Clone)]
pub struct Validator {
    name: &'static str,
    check: Arc<CheckFn>,
}

impl Validator {
    pub fn new<F>(name: &'static str, check: F) -> Self
    where
        F: Fn(&str, &AttrValue) -> Diagnostics + Send + Sync + 'static,
    {
        Self {
            name,
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn check(&self, path: &str, value: &AttrValue) -> Diagnostics {
        (self.check)(path, value)
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Validator").field(&self.name).finish()
    }
}

impl PartialEq for Validator {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.check, &other.check)
    }
}

/// Declaration of one attribute of a managed object.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    /// Logical name used in configuration
    pub name: String,
    pub kind: AttributeKind,
    pub required: bool,
    pub optional: bool,
    /// The service may supply the value when configuration leaves it unset
    pub computed: bool,
    /// Never set by configuration and never sent to the service
    pub output_only: bool,
    /// A change forces destroy and create
    pub force_new: bool,
    /// Kept in state but absent from service payloads (path parameters, modes)
    pub local: bool,
    pub default: Option<AttrValue>,
    pub validators: Vec<Validator>,
    pub diff_suppress: Option<DiffSuppress>,
    /// Dotted path in the service payload; defaults to `name`
    pub wire_name: Option<String>,
    pub description: String,
}

impl AttributeDescriptor {
    fn base(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            optional: false,
            computed: false,
            output_only: false,
            force_new: false,
            local: false,
            default: None,
            validators: Vec::new(),
            diff_suppress: None,
            wire_name: None,
            description: String::new(),
        }
    }

    pub fn required(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            required: true,
            ..Self::base(name, kind)
        }
    }

    pub fn optional(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            optional: true,
            ..Self::base(name, kind)
        }
    }

    /// Optional; the service fills it when configuration leaves it unset.
    pub fn optional_computed(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            optional: true,
            computed: true,
            ..Self::base(name, kind)
        }
    }

    /// Read-only attribute reported by the service.
    pub fn output(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            optional: true,
            computed: true,
            output_only: true,
            ..Self::base(name, kind)
        }
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn local(mut self) -> Self {
        self.local = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<AttrValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn suppress(mut self, suppress: DiffSuppress) -> Self {
        self.diff_suppress = Some(suppress);
        self
    }

    pub fn wire(mut self, path: impl Into<String>) -> Self {
        self.wire_name = Some(path.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Dotted payload path of the attribute.
    pub fn wire_path(&self) -> &str {
        self.wire_name.as_deref().unwrap_or(&self.name)
    }

    /// Nested attributes of an object attribute.
    pub fn nested(&self) -> &[AttributeDescriptor] {
        match &self.kind {
            AttributeKind::Object(attributes) => attributes,
            _ => &[],
        }
    }

    /// Check the declaration rules for presence, defaults and force-new.
    pub fn check(&self, type_name: &str) -> BuildResult<()> {
        let invalid = |message: &str| BuildError::InvalidAttribute {
            type_name: type_name.to_string(),
            attribute: self.name.clone(),
            message: message.to_string(),
        };

        if self.name.is_empty() || self.name == "id" {
            return Err(invalid("attribute name must be non-empty and not 'id'"));
        }
        if self.required == self.optional {
            return Err(invalid("exactly one of required/optional must be set"));
        }
        if self.computed && self.required {
            return Err(invalid("computed attributes cannot be required"));
        }
        if self.output_only && !self.computed {
            return Err(invalid("output-only attributes must be computed"));
        }
        if self.default.is_some() && (!self.optional || self.computed) {
            return Err(invalid(
                "defaults are only valid on optional, non-computed attributes",
            ));
        }
        if self.force_new && self.computed {
            return Err(invalid("force-new and computed are mutually exclusive"));
        }
        if let Some(default) = &self.default {
            if !self.kind.accepts(default) {
                return Err(invalid("default value does not match the attribute kind"));
            }
        }
        if matches!(self.diff_suppress, Some(DiffSuppress::NormalizeJson))
            && self.kind != AttributeKind::Json
        {
            return Err(invalid("JSON normalisation requires a JSON attribute"));
        }
        if matches!(self.diff_suppress, Some(DiffSuppress::UnorderedList))
            && self.kind != AttributeKind::StringList
        {
            return Err(invalid("unordered comparison requires a list attribute"));
        }
        for nested in self.nested() {
            nested.check(type_name)?;
        }
        Ok(())
    }
}
