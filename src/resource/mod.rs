//! Managed object definitions.
//!
//! # Key Components
//!
//! * [`ObjectDescriptor`] - declarative definition of a managed type
//! * [`DataDescriptor`] - declarative definition of a read-only lookup
//! * [`ObjectHandler`] - CRUD hooks behind a descriptor
//! * [`RestHandler`] - the collection/item REST pattern most types follow
//! * [`RequestContext`] - per-RPC context carrying cancellation and shared state

pub mod context;
pub mod descriptor;
pub mod rest;

pub use context::{Operation, ProviderMeta, RequestContext};
pub use descriptor::{
    AttributeAlias, Behavior, DataDescriptor, DataHandler, ObjectDescriptor, ObjectHandler,
    PathTemplate, STATUS_ACTIVE, STATUS_INACTIVE, STATUS_INVALID, StatusLifecycle, Timeouts,
};
pub use rest::{RestHandler, SupplementalRead};
