//! Reconciler scenarios against a mock org.

pub mod concurrency;
pub mod memberships;
pub mod objects;
pub mod plugin;
pub mod transport;
