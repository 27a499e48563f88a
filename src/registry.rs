//! Registry of managed object types and data sources.
//!
//! Descriptors are registered once at startup and looked up by type name on
//! every RPC. Registration checks each descriptor's consistency; registering
//! a name twice is a startup error.

use crate::error::{BuildError, BuildResult, ProviderError, ProviderResult};
use crate::resource::{DataDescriptor, ObjectDescriptor};
use crate::schema::marshal::encode_attribute;
use crate::schema::{AttributeDescriptor, AttributeKind};
use log::debug;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Type-name keyed descriptor maps.
#[derive(Debug, Default, Clone)]
pub struct ObjectRegistry {
    objects: BTreeMap<String, Arc<ObjectDescriptor>>,
    data_sources: BTreeMap<String, Arc<DataDescriptor>>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in type.
    pub fn standard() -> BuildResult<Self> {
        let mut registry = Self::new();
        crate::resources::register_all(&mut registry)?;
        Ok(registry)
    }

    /// Register a managed object type.
    pub fn register_object(&mut self, descriptor: ObjectDescriptor) -> BuildResult<()> {
        descriptor.check()?;
        if self.objects.contains_key(&descriptor.type_name) {
            return Err(BuildError::DuplicateRegistration {
                type_name: descriptor.type_name,
            });
        }
        debug!("Registered object type {}", descriptor.type_name);
        self.objects
            .insert(descriptor.type_name.clone(), Arc::new(descriptor));
        Ok(())
    }

    /// Register a read-only data source.
    pub fn register_data(&mut self, descriptor: DataDescriptor) -> BuildResult<()> {
        descriptor.check()?;
        if self.data_sources.contains_key(&descriptor.type_name) {
            return Err(BuildError::DuplicateRegistration {
                type_name: descriptor.type_name,
            });
        }
        debug!("Registered data source {}", descriptor.type_name);
        self.data_sources
            .insert(descriptor.type_name.clone(), Arc::new(descriptor));
        Ok(())
    }

    pub fn object(&self, type_name: &str) -> ProviderResult<Arc<ObjectDescriptor>> {
        self.objects
            .get(type_name)
            .cloned()
            .ok_or_else(|| ProviderError::UnsupportedType(type_name.to_string()))
    }

    pub fn data(&self, type_name: &str) -> ProviderResult<Arc<DataDescriptor>> {
        self.data_sources
            .get(type_name)
            .cloned()
            .ok_or_else(|| ProviderError::UnsupportedType(type_name.to_string()))
    }

    pub fn object_types(&self) -> impl Iterator<Item = &str> {
        self.objects.keys().map(String::as_str)
    }

    pub fn data_types(&self) -> impl Iterator<Item = &str> {
        self.data_sources.keys().map(String::as_str)
    }

    /// Type tree served by `GetSchema`.
    pub fn schema(&self) -> Value {
        let resources: Map<String, Value> = self
            .objects
            .values()
            .map(|desc| {
                let mut entry = json!({
                    "description": desc.description,
                    "attributes": attributes_schema(&desc.attributes),
                    "import": desc.import.template(),
                });
                if desc.modern_only {
                    entry["modern_only"] = Value::Bool(true);
                    entry["docs_url"] = Value::String(desc.docs_url.clone());
                }
                if !desc.aliases.is_empty() {
                    entry["aliases"] = desc
                        .aliases
                        .iter()
                        .map(|alias| (alias.legacy.clone(), Value::String(alias.canonical.clone())))
                        .collect::<Map<String, Value>>()
                        .into();
                }
                (desc.type_name.clone(), entry)
            })
            .collect();

        let data_sources: Map<String, Value> = self
            .data_sources
            .values()
            .map(|desc| {
                (
                    desc.type_name.clone(),
                    json!({
                        "description": desc.description,
                        "attributes": attributes_schema(&desc.attributes),
                    }),
                )
            })
            .collect();

        json!({
            "resources": resources,
            "data_sources": data_sources,
        })
    }
}

fn attributes_schema(attributes: &[AttributeDescriptor]) -> Value {
    let mut tree = Map::new();
    tree.insert("id".to_string(), json!({"type": "string", "computed": true}));
    for attribute in attributes {
        tree.insert(attribute.name.clone(), attribute_schema(attribute));
    }
    Value::Object(tree)
}

fn attribute_schema(attribute: &AttributeDescriptor) -> Value {
    let mut entry = Map::new();
    entry.insert("type".into(), attribute.kind.type_name().into());
    let flags = [
        ("required", attribute.required),
        ("optional", attribute.optional),
        ("computed", attribute.computed),
        ("force_new", attribute.force_new),
    ];
    for (name, set) in flags {
        if set {
            entry.insert(name.into(), Value::Bool(true));
        }
    }
    if !attribute.description.is_empty() {
        entry.insert("description".into(), attribute.description.clone().into());
    }
    if let Some(default) = &attribute.default {
        entry.insert("default".into(), encode_attribute(attribute, default));
    }
    if let AttributeKind::Object(nested) = &attribute.kind {
        entry.insert("attributes".into(), attributes_schema(nested));
    }
    Value::Object(entry)
}
