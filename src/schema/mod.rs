//! Attribute schema runtime.
//!
//! Declarative attribute graphs for managed objects: value kinds, validation,
//! diff suppression, and the host and wire encodings.
//!
//! # Key Types
//!
//! - [`AttributeDescriptor`] - declaration of one attribute
//! - [`AttrValue`] - tagged value tree with an unknown leaf
//! - [`StateValue`] - identifier plus attribute values
//!
//! # Examples
//!
//! ```rust
//! use okta_provider::schema::{AttributeDescriptor, AttributeKind, StateValue, diff_attributes};
//!
//! let attributes = vec![
//!     AttributeDescriptor::required("name", AttributeKind::String).wire("profile.name"),
//!     AttributeDescriptor::output("type", AttributeKind::String),
//! ];
//! let prior = StateValue::with_id("00g1").with("name", "a").with("type", "OKTA_GROUP");
//! let config = StateValue::new().with("name", "b");
//!
//! let diff = diff_attributes(&attributes, &prior, &config);
//! assert_eq!(diff.changed, vec!["name".to_string()]);
//! ```

pub mod diff;
pub mod marshal;
pub mod types;
pub mod validation;
pub mod value;


pub use diff::{AttributeDiff, diff_attributes, values_equal};
pub use marshal::{decode_host, encode_host, marshal, unmarshal};
pub use types::{AttributeDescriptor, AttributeKind, DiffSuppress, Validator};
pub use validation::validate_config;
pub use value::{AttrValue, StateValue, UNKNOWN_SENTINEL, normalize_json};
