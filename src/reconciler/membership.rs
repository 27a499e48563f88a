//! Set-membership reconciler.
//!
//! A membership resource is a set of member ids held under one parent
//! object. In authoritative mode the declared set is the whole truth; in
//! additive mode only the declared members are tracked and foreign members
//! are left alone.
//!
//! Add and remove calls are issued in concurrent batches. Failures are
//! collected into the diagnostics bag instead of aborting the batch, so one
//! bad member id does not hide problems with the others.

use super::Outcome;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{ProviderError, ProviderResult, ValidationError};
use crate::resource::{ObjectDescriptor, RequestContext};
use crate::schema::{AttrValue, StateValue};
use crate::transport::{Page, PageCursor, sleep_or_cancel};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use futures::future::join_all;
use log::{debug, info, warn};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default upper bound on the post-create consistency wait.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of concurrent add/remove calls.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Service calls behind a membership resource.
#[async_trait]
pub trait MembershipApi: Send + Sync + fmt::Debug {
    /// One page of member ids; `None` when the parent does not exist.
    async fn list_page(
        &self,
        ctx: &RequestContext,
        parent: &str,
        cursor: Option<&PageCursor>,
    ) -> ProviderResult<Option<Page<String>>>;

    async fn add(&self, ctx: &RequestContext, parent: &str, member: &str) -> ProviderResult<()>;

    async fn remove(&self, ctx: &RequestContext, parent: &str, member: &str) -> ProviderResult<()>;
}

/// Reconciliation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipMode {
    /// The declared set is the exact upstream membership
    Authoritative,
    /// Only declared members are tracked
    Additive,
}

/// Membership wiring for a descriptor.
#[derive(Debug, Clone)]
pub struct MembershipSpec {
    pub parent_attribute: String,
    pub members_attribute: String,
    /// Boolean attribute; `true` selects authoritative mode
    pub mode_attribute: Option<String>,
    pub default_mode: MembershipMode,
    pub api: Arc<dyn MembershipApi>,
    pub batch_size: usize,
    pub settle_timeout: Duration,
}

impl MembershipSpec {
    pub fn new(
        parent_attribute: impl Into<String>,
        members_attribute: impl Into<String>,
        api: Arc<dyn MembershipApi>,
    ) -> Self {
        Self {
            parent_attribute: parent_attribute.into(),
            members_attribute: members_attribute.into(),
            mode_attribute: None,
            default_mode: MembershipMode::Additive,
            api,
            batch_size: DEFAULT_BATCH_SIZE,
            settle_timeout: SETTLE_TIMEOUT,
        }
    }

    pub fn mode_attribute(mut self, name: impl Into<String>) -> Self {
        self.mode_attribute = Some(name.into());
        self
    }

    pub fn default_mode(mut self, mode: MembershipMode) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn settle_timeout(mut self, timeout: Duration) -> Self {
        self.settle_timeout = timeout;
        self
    }

    /// Mode selected by `state`.
    pub fn mode(&self, state: &StateValue) -> MembershipMode {
        let flag = self
            .mode_attribute
            .as_deref()
            .and_then(|name| state.bool(name));
        match flag {
            Some(true) => MembershipMode::Authoritative,
            Some(false) => MembershipMode::Additive,
            None => self.default_mode,
        }
    }

    /// Parent id: the identifier, or the parent attribute before create.
    pub fn parent<'a>(&self, state: &'a StateValue) -> ProviderResult<&'a str> {
        if !state.id.is_empty() {
            return Ok(&state.id);
        }
        state
            .str(&self.parent_attribute)
            .filter(|parent| !parent.is_empty())
            .ok_or_else(|| ValidationError::missing_required(self.parent_attribute.clone()).into())
    }

    fn members(&self, state: &StateValue) -> BTreeSet<String> {
        state.strings(&self.members_attribute)
    }

    fn with_members(&self, base: &StateValue, parent: &str, members: BTreeSet<String>) -> StateValue {
        let mut state = base.clone();
        state.id = parent.to_string();
        state.set(self.parent_attribute.clone(), parent);
        state.set(self.members_attribute.clone(), AttrValue::Set(members));
        state
    }
}

/// Page through every member of `parent`.
pub async fn drain(
    ctx: &RequestContext,
    spec: &MembershipSpec,
    parent: &str,
) -> ProviderResult<Option<BTreeSet<String>>> {
    let mut members = BTreeSet::new();
    let mut cursor: Option<PageCursor> = None;
    loop {
        ctx.check_cancelled()?;
        let Some(page) = spec.api.list_page(ctx, parent, cursor.as_ref()).await? else {
            return Ok(None);
        };
        members.extend(page.items);
        match page.next {
            Some(next) => cursor = Some(next),
            None => return Ok(Some(members)),
        }
    }
}

/// Page until every member of `tracked` has been seen, returning the ones
/// that still exist upstream.
pub async fn confirm(
    ctx: &RequestContext,
    spec: &MembershipSpec,
    parent: &str,
    tracked: &BTreeSet<String>,
) -> ProviderResult<Option<BTreeSet<String>>> {
    let mut confirmed = BTreeSet::new();
    let mut cursor: Option<PageCursor> = None;
    let mut pages = 0usize;
    loop {
        ctx.check_cancelled()?;
        let Some(page) = spec.api.list_page(ctx, parent, cursor.as_ref()).await? else {
            return Ok(None);
        };
        pages += 1;
        confirmed.extend(page.items.into_iter().filter(|member| tracked.contains(member)));
        if confirmed.len() == tracked.len() {
            debug!(
                "[{}] all {} tracked members of {} confirmed after {} page(s)",
                ctx.request_id,
                tracked.len(),
                parent,
                pages
            );
            return Ok(Some(confirmed));
        }
        match page.next {
            Some(next) => cursor = Some(next),
            None => return Ok(Some(confirmed)),
        }
    }
}

/// Issue batched adds and removes, collecting failures as diagnostics.
pub async fn apply_changes(
    ctx: &RequestContext,
    spec: &MembershipSpec,
    parent: &str,
    to_add: &BTreeSet<String>,
    to_remove: &BTreeSet<String>,
) -> Diagnostics {
    let mut diags = Diagnostics::new();
    info!(
        "[{}] {}: adding {} and removing {} member(s)",
        ctx.request_id,
        parent,
        to_add.len(),
        to_remove.len()
    );

    let adds: Vec<&String> = to_add.iter().collect();
    for chunk in adds.chunks(spec.batch_size) {
        let results = join_all(chunk.iter().map(|member| spec.api.add(ctx, parent, member))).await;
        for (member, result) in chunk.iter().zip(results) {
            match result {
                Ok(()) => {}
                Err(e) if e.api_error().is_some_and(|api| api.is_already_assigned()) => {
                    debug!("[{}] {} already assigned to {}", ctx.request_id, member, parent);
                }
                Err(e) => diags.push(
                    Diagnostic::from(&e)
                        .with_attribute(spec.members_attribute.clone()),
                ),
            }
        }
    }

    let removes: Vec<&String> = to_remove.iter().collect();
    for chunk in removes.chunks(spec.batch_size) {
        let results =
            join_all(chunk.iter().map(|member| spec.api.remove(ctx, parent, member))).await;
        for (member, result) in chunk.iter().zip(results) {
            match result {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!("[{}] {} no longer under {}", ctx.request_id, member, parent);
                }
                Err(e) => diags.push(
                    Diagnostic::from(&e)
                        .with_attribute(spec.members_attribute.clone()),
                ),
            }
        }
    }

    diags
}

/// Poll until at least one member is observable under `parent`.
async fn wait_for_members(ctx: &RequestContext, spec: &MembershipSpec, parent: &str) -> ProviderResult<()> {
    let mut backoff = ExponentialBackoff {
        initial_interval: Duration::from_millis(250),
        current_interval: Duration::from_millis(250),
        max_interval: Duration::from_secs(2),
        max_elapsed_time: Some(spec.settle_timeout),
        ..ExponentialBackoff::default()
    };
    loop {
        if let Some(page) = spec.api.list_page(ctx, parent, None).await? {
            if !page.items.is_empty() {
                return Ok(());
            }
        }
        match backoff.next_backoff() {
            Some(wait) => sleep_or_cancel(wait, &ctx.cancel).await?,
            None => {
                warn!(
                    "[{}] members of {} not yet visible after {:?}",
                    ctx.request_id, parent, spec.settle_timeout
                );
                return Ok(());
            }
        }
    }
}

/// Add every planned member, wait for them to become visible, then read.
pub async fn create(
    ctx: &RequestContext,
    desc: &ObjectDescriptor,
    spec: &MembershipSpec,
    plan: &StateValue,
) -> ProviderResult<Outcome> {
    let parent = spec.parent(plan)?.to_string();
    let members = spec.members(plan);

    let mut diags = apply_changes(ctx, spec, &parent, &members, &BTreeSet::new()).await;
    let tracked = spec.with_members(plan, &parent, members.clone());
    if diags.has_errors() {
        return Ok(Outcome::new(Some(tracked), diags));
    }

    if !members.is_empty() {
        wait_for_members(ctx, spec, &parent).await?;
    }
    let read = read(ctx, desc, spec, &tracked).await?;
    if read.state.as_ref().is_some_and(|state| !state.exists()) {
        return Err(ProviderError::parent_not_found(desc.type_name.clone(), parent));
    }
    diags.extend(read.diagnostics);
    Ok(Outcome::new(read.state, diags))
}

/// Refresh the tracked set from upstream.
pub async fn read(
    ctx: &RequestContext,
    desc: &ObjectDescriptor,
    spec: &MembershipSpec,
    prior: &StateValue,
) -> ProviderResult<Outcome> {
    let parent = spec.parent(prior)?.to_string();
    let observed = match spec.mode(prior) {
        MembershipMode::Authoritative => drain(ctx, spec, &parent).await?,
        MembershipMode::Additive => confirm(ctx, spec, &parent, &spec.members(prior)).await?,
    };

    match observed {
        Some(members) => Ok(Outcome::state(spec.with_members(prior, &parent, members))),
        None => {
            info!(
                "[{}] {} parent {} is gone, removing from state",
                ctx.request_id, desc.type_name, parent
            );
            let mut tainted = prior.clone();
            tainted.taint();
            Ok(Outcome::state(tainted))
        }
    }
}

/// Move upstream towards the planned set, then read.
pub async fn update(
    ctx: &RequestContext,
    desc: &ObjectDescriptor,
    spec: &MembershipSpec,
    prior: &StateValue,
    plan: &StateValue,
) -> ProviderResult<Outcome> {
    let parent = spec.parent(prior)?.to_string();
    let desired = spec.members(plan);

    let (to_add, to_remove) = match spec.mode(plan) {
        MembershipMode::Authoritative => {
            let Some(upstream) = drain(ctx, spec, &parent).await? else {
                return Err(ProviderError::parent_not_found(desc.type_name.clone(), parent));
            };
            (
                desired.difference(&upstream).cloned().collect(),
                upstream.difference(&desired).cloned().collect(),
            )
        }
        MembershipMode::Additive => {
            let tracked = spec.members(prior);
            (
                desired.difference(&tracked).cloned().collect::<BTreeSet<_>>(),
                tracked.difference(&desired).cloned().collect::<BTreeSet<_>>(),
            )
        }
    };

    let mut diags = Diagnostics::new();
    if !to_add.is_empty() || !to_remove.is_empty() {
        diags = apply_changes(ctx, spec, &parent, &to_add, &to_remove).await;
    }
    let planned = spec.with_members(plan, &parent, desired);
    if diags.has_errors() {
        return Ok(Outcome::new(Some(planned), diags));
    }

    let read = read(ctx, desc, spec, &planned).await?;
    diags.extend(read.diagnostics);
    Ok(Outcome::new(read.state, diags))
}

/// Adopt the parent's current membership.
pub async fn import(
    ctx: &RequestContext,
    desc: &ObjectDescriptor,
    spec: &MembershipSpec,
    seed: &StateValue,
) -> ProviderResult<Outcome> {
    let parent = spec.parent(seed)?.to_string();
    match drain(ctx, spec, &parent).await? {
        Some(members) => Ok(Outcome::state(spec.with_members(seed, &parent, members))),
        None => Err(ProviderError::parent_not_found(desc.type_name.clone(), parent)),
    }
}

/// Remove the tracked members only.
pub async fn delete(
    ctx: &RequestContext,
    _desc: &ObjectDescriptor,
    spec: &MembershipSpec,
    prior: &StateValue,
) -> ProviderResult<Outcome> {
    let parent = spec.parent(prior)?.to_string();
    let tracked = spec.members(prior);
    let diags = apply_changes(ctx, spec, &parent, &BTreeSet::new(), &tracked).await;
    if diags.has_errors() {
        return Ok(Outcome::new(Some(prior.clone()), diags));
    }
    Ok(Outcome::new(None, diags))
}
