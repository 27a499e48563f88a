//! Object reconciler.
//!
//! Planning is pure: [`plan`] validates the configuration, computes planned
//! values and decides between create, update, replace and delete. The
//! async operations ([`create`], [`read`], [`update`], [`delete`],
//! [`import`]) run under the descriptor's timeout, consult the org gate,
//! take the descriptor's mutex for writes, and dispatch to either the
//! object handler or the membership reconciler.
//!
//! Every operation returns an [`Outcome`]; failures become diagnostics
//! attached to the best state known at that point, so a create that fails
//! after the object exists still hands its identifier back to the host.

use super::Outcome;
use super::lifecycle;
use super::membership;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::error::{ProviderError, ProviderResult, ValidationError};
use crate::resource::{
    Behavior, ObjectDescriptor, ObjectHandler, Operation, RequestContext, STATUS_ACTIVE,
    STATUS_INACTIVE,
};
use crate::schema::{AttributeDescriptor, StateValue, diff_attributes, validate_config, values_equal};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// What applying a plan will do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    NoOp,
    Create,
    Update,
    /// Delete then create
    Replace,
    Delete,
}

/// Result of planning one object.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanResult {
    /// `None` when the object is being destroyed or the configuration is invalid
    pub planned: Option<StateValue>,
    pub action: PlanAction,
    /// Attributes that force replacement
    pub requires_replace: Vec<String>,
    pub diagnostics: Diagnostics,
}

/// Resolve legacy aliases and validate `config`.
///
/// Returns the configuration with canonical spellings filled in.
pub fn validate(desc: &ObjectDescriptor, config: &StateValue) -> (StateValue, Diagnostics) {
    let mut resolved = config.clone();
    let mut diags = Diagnostics::new();

    for alias in &desc.aliases {
        let canonical = config.get(&alias.canonical);
        let legacy = config.get(&alias.legacy);
        if legacy.is_null() {
            continue;
        }
        if canonical.is_null() {
            diags.push(
                Diagnostic::warning(
                    format!("'{}' is deprecated", alias.legacy),
                    format!("Use '{}' instead; its value has been copied over.", alias.canonical),
                )
                .with_attribute(alias.legacy.clone()),
            );
            resolved.set(alias.canonical.clone(), legacy.clone());
        } else if canonical.is_fully_known() && legacy.is_fully_known() && canonical != legacy {
            diags.push(Diagnostic::from(&ValidationError::ConflictingAlias {
                canonical: alias.canonical.clone(),
                legacy: alias.legacy.clone(),
            }));
        }
    }

    diags.extend(validate_config(&desc.type_name, &desc.attributes, &resolved.values));
    (resolved, diags)
}

/// Attributes whose planned value differs from `prior`.
///
/// Output-only attributes never count; neither do computed values the plan
/// leaves unknown.
pub fn changed_attributes<'a>(
    desc: &'a ObjectDescriptor,
    prior: &StateValue,
    planned: &StateValue,
) -> Vec<&'a AttributeDescriptor> {
    desc.attributes
        .iter()
        .filter(|attribute| !attribute.output_only)
        .filter(|attribute| {
            let planned_value = planned.get(&attribute.name);
            !(attribute.computed && planned_value.is_unknown())
                && !values_equal(attribute, prior.get(&attribute.name), planned_value)
        })
        .collect()
}

/// Decide the action moving `prior` to `planned`.
pub fn action_for(
    desc: &ObjectDescriptor,
    prior: &StateValue,
    planned: Option<&StateValue>,
) -> (PlanAction, Vec<String>) {
    let Some(planned) = planned else {
        return if prior.exists() {
            (PlanAction::Delete, Vec::new())
        } else {
            (PlanAction::NoOp, Vec::new())
        };
    };
    if !prior.exists() {
        return (PlanAction::Create, Vec::new());
    }

    let changed = changed_attributes(desc, prior, planned);
    if changed.is_empty() {
        return (PlanAction::NoOp, Vec::new());
    }

    let force_new: Vec<String> = changed
        .iter()
        .filter(|attribute| attribute.force_new)
        .map(|attribute| attribute.name.clone())
        .collect();
    if !force_new.is_empty() {
        return (PlanAction::Replace, force_new);
    }
    if let Some(status) = &desc.status {
        if lifecycle::forces_replace(status, prior) {
            return (PlanAction::Replace, vec![status.attribute.clone()]);
        }
    }
    (PlanAction::Update, Vec::new())
}

/// Plan the change from `prior` to `config`; `None` config destroys.
pub fn plan(desc: &ObjectDescriptor, prior: &StateValue, config: Option<&StateValue>) -> PlanResult {
    let Some(config) = config else {
        let (action, _) = action_for(desc, prior, None);
        return PlanResult {
            planned: None,
            action,
            requires_replace: Vec::new(),
            diagnostics: Diagnostics::new(),
        };
    };

    let (config, diagnostics) = validate(desc, config);
    if diagnostics.has_errors() {
        return PlanResult {
            planned: None,
            action: PlanAction::NoOp,
            requires_replace: Vec::new(),
            diagnostics,
        };
    }

    let mut planned = StateValue {
        id: prior.id.clone(),
        values: diff_attributes(&desc.attributes, prior, &config).planned,
    };
    let (action, requires_replace) = action_for(desc, prior, Some(&planned));
    if action == PlanAction::Replace {
        planned = StateValue {
            id: String::new(),
            values: diff_attributes(&desc.attributes, &StateValue::new(), &config).planned,
        };
    }
    debug!("{} planned {:?}", desc.type_name, action);

    PlanResult {
        planned: Some(planned),
        action,
        requires_replace,
        diagnostics,
    }
}

/// Apply a planned change.
pub async fn apply(
    ctx: &RequestContext,
    desc: &ObjectDescriptor,
    prior: &StateValue,
    planned: Option<&StateValue>,
) -> Outcome {
    let (action, _) = action_for(desc, prior, planned);
    match (action, planned) {
        (PlanAction::Create, Some(planned)) => create(ctx, desc, planned).await,
        (PlanAction::Update, Some(planned)) => update(ctx, desc, prior, planned).await,
        (PlanAction::Replace, Some(planned)) => {
            info!("[{}] Replacing {} {}", ctx.request_id, desc.type_name, prior.id);
            let deleted = delete(ctx, desc, prior).await;
            if deleted.has_errors() {
                return deleted;
            }
            let mut fresh = planned.clone();
            fresh.id.clear();
            let mut created = create(ctx, desc, &fresh).await;
            let mut diagnostics = deleted.diagnostics;
            diagnostics.extend(created.diagnostics);
            created.diagnostics = diagnostics;
            created
        }
        (PlanAction::Delete, _) => delete(ctx, desc, prior).await,
        _ => Outcome::state(prior.clone()),
    }
}

/// Create the object and read it back.
pub async fn create(ctx: &RequestContext, desc: &ObjectDescriptor, plan: &StateValue) -> Outcome {
    let (plan, diags) = validate(desc, &configurable(desc, plan));
    if diags.has_errors() {
        return Outcome::new(None, diags);
    }
    let mut outcome = guarded(ctx, desc, Operation::Create, None, |ctx| async move {
        match &desc.behavior {
            Behavior::Object(handler) => create_object(&ctx, desc, handler, &plan).await,
            Behavior::Membership(spec) => {
                let mut outcome = membership::create(&ctx, desc, spec, &plan).await?;
                if let Some(state) = outcome.state.as_mut() {
                    finish_read(desc, &plan, state);
                }
                Ok(outcome)
            }
        }
    })
    .await;
    let mut all = diags;
    all.extend(outcome.diagnostics);
    outcome.diagnostics = all;
    outcome
}

/// Refresh `prior` from upstream; a vanished object comes back tainted.
pub async fn read(ctx: &RequestContext, desc: &ObjectDescriptor, prior: &StateValue) -> Outcome {
    if !prior.exists() {
        return Outcome::state(prior.clone());
    }
    guarded(ctx, desc, Operation::Read, Some(prior.clone()), |ctx| async move {
        read_inner(&ctx, desc, prior).await
    })
    .await
}

/// Push `plan` to the object and read it back.
pub async fn update(
    ctx: &RequestContext,
    desc: &ObjectDescriptor,
    prior: &StateValue,
    plan: &StateValue,
) -> Outcome {
    let (plan, diags) = validate(desc, &configurable(desc, plan));
    if diags.has_errors() {
        return Outcome::new(Some(prior.clone()), diags);
    }
    let mut outcome = guarded(ctx, desc, Operation::Update, Some(prior.clone()), |ctx| async move {
        match &desc.behavior {
            Behavior::Object(handler) => update_object(&ctx, desc, handler, prior, &plan).await,
            Behavior::Membership(spec) => {
                let mut outcome = membership::update(&ctx, desc, spec, prior, &plan).await?;
                if let Some(state) = outcome.state.as_mut() {
                    finish_read(desc, &plan, state);
                }
                Ok(outcome)
            }
        }
    })
    .await;
    let mut all = diags;
    all.extend(outcome.diagnostics);
    outcome.diagnostics = all;
    outcome
}

/// Delete the object; an object that is already gone is not an error.
pub async fn delete(ctx: &RequestContext, desc: &ObjectDescriptor, prior: &StateValue) -> Outcome {
    if desc.retain_on_destroy {
        info!(
            "[{}] {} {} retained upstream, removing from state only",
            ctx.request_id, desc.type_name, prior.id
        );
        return Outcome::removed();
    }
    if !prior.exists() {
        return Outcome::removed();
    }
    guarded(ctx, desc, Operation::Delete, Some(prior.clone()), |ctx| async move {
        match &desc.behavior {
            Behavior::Object(handler) => delete_object(&ctx, desc, handler, prior).await,
            Behavior::Membership(spec) => membership::delete(&ctx, desc, spec, prior).await,
        }
    })
    .await
}

/// Parse an import identifier and read the object it names.
pub async fn import(ctx: &RequestContext, desc: &ObjectDescriptor, raw_id: &str) -> Outcome {
    let seed = match desc.import.parse(raw_id) {
        Ok(seed) => seed,
        Err(e) => return Outcome::failed(None, &ProviderError::from(e)),
    };
    info!("[{}] Importing {} {}", ctx.request_id, desc.type_name, raw_id);

    guarded(ctx, desc, Operation::Import, None, |ctx| async move {
        let mut outcome = match &desc.behavior {
            Behavior::Object(_) => read_inner(&ctx, desc, &seed).await?,
            Behavior::Membership(spec) => {
                let mut outcome = membership::import(&ctx, desc, spec, &seed).await?;
                if let Some(state) = outcome.state.as_mut() {
                    finish_read(desc, &seed, state);
                }
                outcome
            }
        };
        if outcome.state.as_ref().is_some_and(|state| !state.exists()) {
            outcome.state = None;
            outcome.diagnostics.error(
                "Cannot import non-existent remote object",
                format!("{} '{}' was not found", desc.type_name, raw_id),
            );
        }
        Ok(outcome)
    })
    .await
}

/// Run `body` with the operation's deadline, org gate and mutex applied.
async fn guarded<F, Fut>(
    ctx: &RequestContext,
    desc: &ObjectDescriptor,
    operation: Operation,
    fallback: Option<StateValue>,
    body: F,
) -> Outcome
where
    F: FnOnce(RequestContext) -> Fut,
    Fut: Future<Output = ProviderResult<Outcome>>,
{
    let timeout = desc.timeouts.for_operation(operation);
    let ctx = ctx.for_operation(operation, timeout);
    debug!(
        "[{}] {} {} starting (timeout {:?})",
        ctx.request_id, operation, desc.type_name, timeout
    );

    if let Err(e) = ctx.check_cancelled() {
        return Outcome::failed(fallback, &e);
    }
    if let Err(e) = ctx.meta.org_gate.check(&ctx, desc).await {
        return Outcome::failed(fallback, &e);
    }

    let writes = matches!(
        operation,
        Operation::Create | Operation::Update | Operation::Delete
    );
    let _guard = match desc.mutex_key {
        Some(key) if writes => {
            let locked = tokio::select! {
                guard = ctx.meta.mutexes.lock(key) => Some(guard),
                _ = ctx.cancel.cancelled() => None,
            };
            match locked {
                Some(guard) => Some(guard),
                None => {
                    let e = ProviderError::cancelled(format!("waiting for lock '{key}'"));
                    return Outcome::failed(fallback, &e);
                }
            }
        }
        _ => None,
    };

    match tokio::time::timeout(timeout, body(ctx.clone())).await {
        Ok(Ok(outcome)) => {
            debug!(
                "[{}] {} {} finished with {} diagnostic(s)",
                ctx.request_id,
                operation,
                desc.type_name,
                outcome.diagnostics.len()
            );
            outcome
        }
        Ok(Err(e)) => {
            warn!("[{}] {} {} failed: {}", ctx.request_id, operation, desc.type_name, e);
            Outcome::failed(fallback, &e)
        }
        Err(_) => {
            let e = ProviderError::cancelled(format!("{operation} timed out after {timeout:?}"));
            warn!("[{}] {} {}: {}", ctx.request_id, operation, desc.type_name, e);
            Outcome::failed(fallback, &e)
        }
    }
}

/// Copy local attributes, the mirrored identifier and legacy aliases onto a
/// freshly read state.
fn finish_read(desc: &ObjectDescriptor, prior: &StateValue, state: &mut StateValue) {
    for attribute in desc.attributes.iter().filter(|a| a.local) {
        let prior_value = prior.get(&attribute.name);
        if !prior_value.is_null() && !prior_value.is_unknown() {
            state.set(attribute.name.clone(), prior_value.clone());
        } else if state.get(&attribute.name).is_null() {
            if let Some(default) = &attribute.default {
                state.set(attribute.name.clone(), default.clone());
            }
        }
    }

    if let Some(id_attribute) = &desc.id_attribute {
        if state.exists() {
            let id = state.id.clone();
            state.set(id_attribute.clone(), id);
        }
    }

    for alias in &desc.aliases {
        if !prior.get(&alias.legacy).is_null() {
            let value = state.get(&alias.canonical).clone();
            state.set(alias.legacy.clone(), value);
        }
    }
}

/// The configurable part of a planned state: output-only values and
/// computed values still unknown are dropped.
fn configurable(desc: &ObjectDescriptor, planned: &StateValue) -> StateValue {
    let mut config = planned.clone();
    config.values.retain(|name, value| match desc.attribute_named(name) {
        Some(attribute) => {
            !attribute.output_only && !(attribute.computed && value.is_unknown())
        }
        None => true,
    });
    config
}

/// Drop values the host must not persist as unknown.
fn known_only(mut state: StateValue) -> StateValue {
    state.values.retain(|_, value| !value.is_unknown());
    state
}

async fn read_inner(
    ctx: &RequestContext,
    desc: &ObjectDescriptor,
    prior: &StateValue,
) -> ProviderResult<Outcome> {
    let mut outcome = match &desc.behavior {
        Behavior::Object(handler) => {
            let mut diags = Diagnostics::new();
            match handler.read(ctx, desc, &prior.id, prior, &mut diags).await? {
                Some(state) => Outcome::new(Some(state), diags),
                None => {
                    info!(
                        "[{}] {} {} no longer exists, removing from state",
                        ctx.request_id, desc.type_name, prior.id
                    );
                    let mut tainted = prior.clone();
                    tainted.taint();
                    return Ok(Outcome::new(Some(tainted), diags));
                }
            }
        }
        Behavior::Membership(spec) => membership::read(ctx, desc, spec, prior).await?,
    };

    if let Some(state) = outcome.state.as_mut() {
        if state.exists() {
            finish_read(desc, prior, state);
        }
    }
    Ok(outcome)
}

async fn create_object(
    ctx: &RequestContext,
    desc: &ObjectDescriptor,
    handler: &Arc<dyn ObjectHandler>,
    plan: &StateValue,
) -> ProviderResult<Outcome> {
    let id = handler.create(ctx, desc, plan).await?;
    info!("[{}] Created {} {}", ctx.request_id, desc.type_name, id);

    let mut created = plan.clone();
    created.id = id.clone();
    let partial = |error: &ProviderError| {
        Outcome::failed(Some(known_only(created.clone())), error)
    };

    if let Some(status) = &desc.status {
        let target = lifecycle::desired_status(status, plan);
        if let Err(e) =
            lifecycle::reconcile(ctx, status, &id, &created, status.created_status, target).await
        {
            return Ok(partial(&e));
        }
    }

    match read_inner(ctx, desc, &created).await {
        Ok(outcome) if outcome.state.as_ref().is_some_and(StateValue::exists) => Ok(outcome),
        Ok(mut outcome) => {
            warn!(
                "[{}] {} {} not readable right after create",
                ctx.request_id, desc.type_name, id
            );
            outcome.state = Some(known_only(created.clone()));
            outcome.diagnostics.warning(
                format!("{} not yet readable", desc.type_name),
                format!("The service did not return '{id}' right after it was created."),
            );
            Ok(outcome)
        }
        Err(e) => Ok(partial(&e)),
    }
}

async fn update_object(
    ctx: &RequestContext,
    desc: &ObjectDescriptor,
    handler: &Arc<dyn ObjectHandler>,
    prior: &StateValue,
    plan: &StateValue,
) -> ProviderResult<Outcome> {
    let id = prior.id.as_str();
    let mut plan = plan.clone();
    plan.id = id.to_string();
    let plan = &plan;
    let status_attribute = desc.status.as_ref().map(|status| status.attribute.as_str());
    let changed = changed_attributes(desc, prior, plan);
    let needs_write = changed
        .iter()
        .any(|attribute| !attribute.local && Some(attribute.name.as_str()) != status_attribute);

    let observed = desc
        .status
        .as_ref()
        .and_then(|status| prior.str(&status.attribute))
        .unwrap_or(STATUS_ACTIVE)
        .to_string();
    let mut current = observed.clone();

    if needs_write {
        if let Some(status) = &desc.status {
            if status.deactivate_for_update && current == STATUS_ACTIVE {
                lifecycle::transition(ctx, status, id, prior, STATUS_INACTIVE).await?;
                current = STATUS_INACTIVE.to_string();
            }
        }
        handler.update(ctx, desc, id, plan, prior).await?;
        info!("[{}] Updated {} {}", ctx.request_id, desc.type_name, id);
    } else {
        debug!("[{}] {} {}: no attribute writes needed", ctx.request_id, desc.type_name, id);
    }

    if let Some(status) = &desc.status {
        let target = lifecycle::desired_status(status, plan).unwrap_or(observed.as_str());
        lifecycle::reconcile(ctx, status, id, plan, &current, Some(target)).await?;
    }

    read_inner(ctx, desc, plan).await.map(|mut outcome| {
        if let Some(state) = outcome.state.as_mut() {
            if !state.exists() {
                // The object vanished between the write and the read.
                *state = known_only(plan.clone());
                state.id = id.to_string();
            }
        }
        outcome
    })
}

async fn delete_object(
    ctx: &RequestContext,
    desc: &ObjectDescriptor,
    handler: &Arc<dyn ObjectHandler>,
    prior: &StateValue,
) -> ProviderResult<Outcome> {
    let id = prior.id.as_str();
    let mut scratch = Diagnostics::new();
    let current = match handler.read(ctx, desc, id, prior, &mut scratch).await {
        Ok(Some(current)) => current,
        Ok(None) => {
            debug!("[{}] {} {} already gone", ctx.request_id, desc.type_name, id);
            return Ok(Outcome::removed());
        }
        Err(e) => return Err(e),
    };

    if let Some(status) = &desc.status {
        if status.deactivate_before_delete && current.str(&status.attribute) == Some(STATUS_ACTIVE) {
            match lifecycle::transition(ctx, status, id, prior, STATUS_INACTIVE).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => return Ok(Outcome::removed()),
                Err(e) => warn!(
                    "[{}] deactivating {} {} before delete failed: {}",
                    ctx.request_id, desc.type_name, id, e
                ),
            }
        }
    }

    match handler.delete(ctx, desc, id, prior).await {
        Ok(()) => {
            info!("[{}] Deleted {} {}", ctx.request_id, desc.type_name, id);
            Ok(Outcome::removed())
        }
        Err(e) if e.is_not_found() => Ok(Outcome::removed()),
        Err(e)
            if desc.soft_delete
                && e.api_error().is_some_and(|api| api.is_delete_forbidden()) =>
        {
            warn!(
                "[{}] {} {} cannot be deleted, leaving it in place: {}",
                ctx.request_id, desc.type_name, id, e
            );
            let mut diags = Diagnostics::new();
            diags.warning(
                format!("{} left in place", desc.type_name),
                format!("The service refused to delete '{id}': {e}"),
            );
            Ok(Outcome::new(None, diags))
        }
        Err(e) => Err(e),
    }
}
