//! Object and data-source descriptors.
//!
//! An [`ObjectDescriptor`] is the declarative definition of one managed type:
//! its attributes, how its writes reach the service, and which cross-cutting
//! behaviours (status lifecycle, mutex, org gate, import shape) apply.

use crate::diagnostics::Diagnostics;
use crate::error::{BuildError, BuildResult, ProviderError, ProviderResult};
use crate::reconciler::import::ImportPattern;
use crate::reconciler::membership::MembershipSpec;
use crate::resource::context::{Operation, RequestContext};
use crate::schema::{AttributeDescriptor, StateValue};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const STATUS_ACTIVE: &str = "ACTIVE";
pub const STATUS_INACTIVE: &str = "INACTIVE";
pub const STATUS_INVALID: &str = "INVALID";

/// CRUD hooks for a managed type.
///
/// `create` returns the new identifier. `read` returns `None` when the service
/// answered 404. Status transitions are driven by the reconciler, not by
/// handlers.
#[async_trait]
pub trait ObjectHandler: Send + Sync + fmt::Debug {
    async fn create(
        &self,
        ctx: &RequestContext,
        desc: &ObjectDescriptor,
        plan: &StateValue,
    ) -> ProviderResult<String>;

    /// Warnings for partially readable objects go to `diags`.
    async fn read(
        &self,
        ctx: &RequestContext,
        desc: &ObjectDescriptor,
        id: &str,
        prior: &StateValue,
        diags: &mut Diagnostics,
    ) -> ProviderResult<Option<StateValue>>;

    async fn update(
        &self,
        ctx: &RequestContext,
        desc: &ObjectDescriptor,
        id: &str,
        plan: &StateValue,
        prior: &StateValue,
    ) -> ProviderResult<()>;

    async fn delete(
        &self,
        ctx: &RequestContext,
        desc: &ObjectDescriptor,
        id: &str,
        prior: &StateValue,
    ) -> ProviderResult<()>;
}

/// Lookup hook for a read-only data source.
#[async_trait]
pub trait DataHandler: Send + Sync + fmt::Debug {
    async fn read(
        &self,
        ctx: &RequestContext,
        desc: &DataDescriptor,
        config: &StateValue,
    ) -> ProviderResult<StateValue>;
}

/// URL path with `{id}` and `{attribute}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate(String);

impl PathTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Names of the placeholders, `id` included.
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.0.as_str();
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            names.push(&rest[start + 1..start + len]);
            rest = &rest[start + len + 1..];
        }
        names
    }

    /// Substitute `id` and attribute values from `state`.
    pub fn render(&self, id: &str, state: &StateValue) -> ProviderResult<String> {
        let mut path = self.0.clone();
        for name in self.placeholders() {
            let value = if name == "id" {
                if id.is_empty() {
                    return Err(ProviderError::internal(format!(
                        "path '{}' needs an identifier",
                        self.0
                    )));
                }
                id.to_string()
            } else {
                state.get(name).to_path_segment().ok_or_else(|| {
                    ProviderError::internal(format!(
                        "path '{}' needs a value for '{}'",
                        self.0, name
                    ))
                })?
            };
            path = path.replace(&format!("{{{name}}}"), &value);
        }
        Ok(path)
    }
}

impl From<&str> for PathTemplate {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}

/// Activate/deactivate behaviour layered on create, update and delete.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusLifecycle {
    /// Attribute holding `ACTIVE` / `INACTIVE`
    pub attribute: String,
    pub activate: PathTemplate,
    pub deactivate: PathTemplate,
    /// Status the service assigns to a freshly created object
    pub created_status: &'static str,
    /// Updates are rejected unless the object is inactive
    pub deactivate_for_update: bool,
    pub deactivate_before_delete: bool,
    /// An observed `INVALID` status forces replacement on the next change
    pub invalid_forces_replace: bool,
}

impl StatusLifecycle {
    /// Lifecycle under `{item}/lifecycle/activate|deactivate`.
    pub fn under(item: &str) -> Self {
        Self {
            attribute: "status".to_string(),
            activate: PathTemplate::new(format!("{item}/lifecycle/activate")),
            deactivate: PathTemplate::new(format!("{item}/lifecycle/deactivate")),
            created_status: STATUS_ACTIVE,
            deactivate_for_update: false,
            deactivate_before_delete: false,
            invalid_forces_replace: false,
        }
    }

    pub fn created_inactive(mut self) -> Self {
        self.created_status = STATUS_INACTIVE;
        self
    }

    pub fn deactivate_for_update(mut self) -> Self {
        self.deactivate_for_update = true;
        self
    }

    pub fn deactivate_before_delete(mut self) -> Self {
        self.deactivate_before_delete = true;
        self
    }

    pub fn invalid_forces_replace(mut self) -> Self {
        self.invalid_forces_replace = true;
        self
    }
}

/// Per-operation deadlines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(60 * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(60 * 60),
            delete: Duration::from_secs(60 * 60),
        }
    }
}

impl Timeouts {
    pub fn for_operation(&self, operation: Operation) -> Duration {
        match operation {
            Operation::Create => self.create,
            Operation::Read | Operation::Import => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }
}

/// A legacy spelling kept for back-compat; `canonical` takes precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeAlias {
    pub canonical: String,
    pub legacy: String,
}

/// How writes for the type reach the service.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// A single upstream object
    Object(Arc<dyn ObjectHandler>),
    /// A set of associations under a parent object
    Membership(MembershipSpec),
}

/// Declarative definition of a managed type.
#[derive(Debug, Clone)]
pub struct ObjectDescriptor {
    pub type_name: String,
    pub description: String,
    pub attributes: Vec<AttributeDescriptor>,
    pub behavior: Behavior,
    pub status: Option<StatusLifecycle>,
    /// Mutex registry key serializing writes of this type
    pub mutex_key: Option<&'static str>,
    /// Refused on classic orgs
    pub modern_only: bool,
    pub docs_url: String,
    pub import: ImportPattern,
    /// Attribute mirroring the identifier (e.g. `group_id`)
    pub id_attribute: Option<String>,
    /// Delete leaves the upstream object in place
    pub retain_on_destroy: bool,
    /// A "cannot delete" refusal is a warning, not an error
    pub soft_delete: bool,
    pub timeouts: Timeouts,
    pub aliases: Vec<AttributeAlias>,
}

impl ObjectDescriptor {
    pub fn new(type_name: impl Into<String>, handler: Arc<dyn ObjectHandler>) -> Self {
        Self::with_behavior(type_name, Behavior::Object(handler))
    }

    pub fn membership(type_name: impl Into<String>, spec: MembershipSpec) -> Self {
        Self::with_behavior(type_name, Behavior::Membership(spec))
    }

    fn with_behavior(type_name: impl Into<String>, behavior: Behavior) -> Self {
        Self {
            type_name: type_name.into(),
            description: String::new(),
            attributes: Vec::new(),
            behavior,
            status: None,
            mutex_key: None,
            modern_only: false,
            docs_url: String::new(),
            import: ImportPattern::single(),
            id_attribute: None,
            retain_on_destroy: false,
            soft_delete: false,
            timeouts: Timeouts::default(),
            aliases: Vec::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn attribute(mut self, attribute: AttributeDescriptor) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn attributes(mut self, attributes: impl IntoIterator<Item = AttributeDescriptor>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn status_lifecycle(mut self, lifecycle: StatusLifecycle) -> Self {
        self.status = Some(lifecycle);
        self
    }

    pub fn mutex(mut self, key: &'static str) -> Self {
        self.mutex_key = Some(key);
        self
    }

    pub fn modern_only(mut self, docs_url: impl Into<String>) -> Self {
        self.modern_only = true;
        self.docs_url = docs_url.into();
        self
    }

    pub fn import_pattern(mut self, pattern: ImportPattern) -> Self {
        self.import = pattern;
        self
    }

    pub fn id_attribute(mut self, name: impl Into<String>) -> Self {
        self.id_attribute = Some(name.into());
        self
    }

    pub fn retain_on_destroy(mut self) -> Self {
        self.retain_on_destroy = true;
        self
    }

    pub fn soft_delete(mut self) -> Self {
        self.soft_delete = true;
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn alias(mut self, canonical: impl Into<String>, legacy: impl Into<String>) -> Self {
        self.aliases.push(AttributeAlias {
            canonical: canonical.into(),
            legacy: legacy.into(),
        });
        self
    }

    /// Declaration of `name`, if any.
    pub fn attribute_named(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Check the descriptor's internal consistency.
    pub fn check(&self) -> BuildResult<()> {
        let mut seen = HashSet::new();
        for attribute in &self.attributes {
            attribute.check(&self.type_name)?;
            if !seen.insert(attribute.name.as_str()) {
                return Err(BuildError::InvalidAttribute {
                    type_name: self.type_name.clone(),
                    attribute: attribute.name.clone(),
                    message: "declared twice".to_string(),
                });
            }
        }

        let mut referenced: Vec<&str> = Vec::new();
        if let Some(lifecycle) = &self.status {
            referenced.push(&lifecycle.attribute);
            referenced.extend(lifecycle.activate.placeholders());
            referenced.extend(lifecycle.deactivate.placeholders());
        }
        for alias in &self.aliases {
            referenced.push(&alias.canonical);
            referenced.push(&alias.legacy);
        }
        referenced.extend(self.import.attributes());
        if let Some(id_attribute) = &self.id_attribute {
            referenced.push(id_attribute);
        }
        if let Behavior::Membership(spec) = &self.behavior {
            referenced.push(&spec.parent_attribute);
            referenced.push(&spec.members_attribute);
            if let Some(mode) = &spec.mode_attribute {
                referenced.push(mode);
            }
        }

        for name in referenced {
            if name != "id" && !seen.contains(name) {
                return Err(BuildError::UndeclaredAttribute {
                    type_name: self.type_name.clone(),
                    attribute: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Declarative definition of a read-only data source.
#[derive(Debug, Clone)]
pub struct DataDescriptor {
    pub type_name: String,
    pub description: String,
    pub attributes: Vec<AttributeDescriptor>,
    pub handler: Arc<dyn DataHandler>,
    pub timeout: Duration,
}

impl DataDescriptor {
    pub fn new(type_name: impl Into<String>, handler: Arc<dyn DataHandler>) -> Self {
        Self {
            type_name: type_name.into(),
            description: String::new(),
            attributes: Vec::new(),
            handler,
            timeout: Timeouts::default().read,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn attributes(mut self, attributes: impl IntoIterator<Item = AttributeDescriptor>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    pub fn check(&self) -> BuildResult<()> {
        let mut seen = HashSet::new();
        for attribute in &self.attributes {
            attribute.check(&self.type_name)?;
            if !seen.insert(attribute.name.as_str()) {
                return Err(BuildError::InvalidAttribute {
                    type_name: self.type_name.clone(),
                    attribute: attribute.name.clone(),
                    message: "declared twice".to_string(),
                });
            }
        }
        Ok(())
    }
}
