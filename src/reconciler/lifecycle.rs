//! Activate/deactivate transitions.

use crate::error::ProviderResult;
use crate::resource::{RequestContext, STATUS_ACTIVE, STATUS_INACTIVE, STATUS_INVALID, StatusLifecycle};
use crate::schema::StateValue;
use log::{debug, info};

/// Status the configuration asks for, if it names one.
pub fn desired_status<'a>(lifecycle: &StatusLifecycle, plan: &'a StateValue) -> Option<&'a str> {
    plan.str(&lifecycle.attribute)
}

/// Whether `prior` is in a state that cannot be updated in place.
pub fn forces_replace(lifecycle: &StatusLifecycle, prior: &StateValue) -> bool {
    lifecycle.invalid_forces_replace && prior.str(&lifecycle.attribute) == Some(STATUS_INVALID)
}

/// Move the object to `target` (`ACTIVE` or `INACTIVE`).
pub async fn transition(
    ctx: &RequestContext,
    lifecycle: &StatusLifecycle,
    id: &str,
    state: &StateValue,
    target: &str,
) -> ProviderResult<()> {
    let template = match target {
        STATUS_ACTIVE => &lifecycle.activate,
        STATUS_INACTIVE => &lifecycle.deactivate,
        other => {
            debug!("[{}] no transition towards status {}", ctx.request_id, other);
            return Ok(());
        }
    };
    let path = template.render(id, state)?;
    info!("[{}] Moving {} to {}", ctx.request_id, id, target);
    ctx.post(&path, None).await?;
    Ok(())
}

/// Transition when `current` differs from `target`.
pub async fn reconcile(
    ctx: &RequestContext,
    lifecycle: &StatusLifecycle,
    id: &str,
    state: &StateValue,
    current: &str,
    target: Option<&str>,
) -> ProviderResult<()> {
    match target {
        Some(target) if target != current => transition(ctx, lifecycle, id, state, target).await,
        _ => Ok(()),
    }
}
