//! Classic-vs-modern org gate.
//!
//! Identity Engine ("modern") orgs advertise `"pipeline": "idx"` from
//! `/.well-known/okta-organization`; anything else is a classic org. The
//! probe runs at most once per configured provider and only when a
//! modern-only type is touched.

use crate::error::{ProviderError, ProviderResult};
use crate::resource::{ObjectDescriptor, RequestContext};
use log::{debug, info};
use serde::Deserialize;
use tokio::sync::OnceCell;

pub const ORG_PROBE_PATH: &str = "/.well-known/okta-organization";

/// Feature tier of the org.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgKind {
    Classic,
    Modern,
}

#[derive(Debug, Deserialize)]
struct OrgMetadata {
    #[serde(default)]
    pipeline: Option<String>,
}

/// Cached org-kind probe.
#[derive(Debug, Default)]
pub struct OrgKindGate {
    kind: OnceCell<OrgKind>,
}

impl OrgKindGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate with a known kind, skipping the probe.
    pub fn with_kind(kind: OrgKind) -> Self {
        Self {
            kind: OnceCell::new_with(Some(kind)),
        }
    }

    /// The org kind, probing on first use.
    pub async fn kind(&self, ctx: &RequestContext) -> ProviderResult<OrgKind> {
        self.kind
            .get_or_try_init(|| async {
                let response = ctx.get(ORG_PROBE_PATH).await?;
                let metadata: OrgMetadata = response.json()?;
                let kind = match metadata.pipeline.as_deref() {
                    Some("idx") => OrgKind::Modern,
                    _ => OrgKind::Classic,
                };
                info!("[{}] Org kind probed as {:?}", ctx.request_id, kind);
                Ok::<_, ProviderError>(kind)
            })
            .await
            .copied()
    }

    /// Refuse modern-only types on classic orgs.
    pub async fn check(&self, ctx: &RequestContext, desc: &ObjectDescriptor) -> ProviderResult<()> {
        if !desc.modern_only {
            return Ok(());
        }
        match self.kind(ctx).await? {
            OrgKind::Modern => Ok(()),
            OrgKind::Classic => {
                debug!(
                    "[{}] {} refused on classic org",
                    ctx.request_id, desc.type_name
                );
                Err(ProviderError::feature_unavailable(
                    desc.type_name.clone(),
                    desc.docs_url.clone(),
                ))
            }
        }
    }
}
