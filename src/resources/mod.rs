//! Okta object types served by the plugin.
//!
//! Each submodule builds the descriptors for one family of objects;
//! [`register_all`] adds them to a registry.

pub mod authenticator;
pub mod group;
pub mod group_memberships;
pub mod group_rule;
pub mod policy_rule;

use crate::error::BuildResult;
use crate::registry::ObjectRegistry;

/// Register every built-in object type and data source.
pub fn register_all(registry: &mut ObjectRegistry) -> BuildResult<()> {
    registry.register_object(group::descriptor())?;
    registry.register_object(group_rule::descriptor())?;
    registry.register_object(group_memberships::descriptor())?;
    registry.register_object(policy_rule::password_descriptor())?;
    registry.register_object(policy_rule::signon_descriptor())?;
    registry.register_object(authenticator::descriptor())?;

    registry.register_data(group::data_descriptor())?;
    Ok(())
}
