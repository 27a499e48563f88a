//! Reconciliation engine.
//!
//! Drives the CRUD state machine for every registered descriptor. Object
//! types go through [`object`], set-membership types through [`membership`];
//! both share the import parser, the status lifecycle helpers and the
//! classic-vs-modern org gate.

pub mod import;
pub mod lifecycle;
pub mod membership;
pub mod object;
pub mod org_gate;

use crate::diagnostics::Diagnostics;
use crate::error::ProviderError;
use crate::schema::StateValue;

pub use import::{ImportPattern, ImportSegment};
pub use membership::{MembershipApi, MembershipMode, MembershipSpec};
pub use object::{PlanAction, PlanResult};
pub use org_gate::{OrgKind, OrgKindGate};

/// Result of one reconciler operation.
///
/// `state` is `None` once the object is gone (after delete); a state with an
/// empty identifier means the object disappeared upstream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub state: Option<StateValue>,
    pub diagnostics: Diagnostics,
}

impl Outcome {
    pub fn new(state: Option<StateValue>, diagnostics: Diagnostics) -> Self {
        Self { state, diagnostics }
    }

    pub fn state(state: StateValue) -> Self {
        Self::new(Some(state), Diagnostics::new())
    }

    pub fn removed() -> Self {
        Self::default()
    }

    /// `state` unchanged plus the diagnostic for `error`.
    pub fn failed(state: Option<StateValue>, error: &ProviderError) -> Self {
        Self::new(state, Diagnostics::from_error(error))
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }
}
