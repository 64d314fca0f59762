//! Sharing-token issuance.

use uuid::Uuid;

use crate::auth::Identity;
use crate::db::{TemplateFilter, TemplatePatch, TemplateRepository};
use crate::sharing::SharingError;

/// The kind of access a sharing token grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    /// Parse from string name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "read" => Some(AccessKind::Read),
            "write" => Some(AccessKind::Write),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessKind::Read => "read",
            AccessKind::Write => "write",
        }
    }
}

/// Mint a new sharing token for a template.
///
/// The shortid must resolve under the caller's identity, so ownership checks
/// apply; an unreachable template surfaces as [`SharingError::TemplateNotFound`].
/// The new token overwrites any previous token of the same kind; only that
/// one field of the record is written. Concurrent calls race benignly, last
/// write wins.
pub async fn generate_sharing_token(
    repo: &TemplateRepository,
    shortid: &str,
    kind: AccessKind,
    identity: &Identity,
) -> Result<String, SharingError> {
    let template = repo
        .find_one(&TemplateFilter::by_shortid(shortid), identity)
        .await?
        .ok_or_else(|| SharingError::TemplateNotFound(shortid.to_string()))?;

    let token = Uuid::new_v4().to_string();

    let patch = match kind {
        AccessKind::Read => TemplatePatch::set_read_token(&token),
        AccessKind::Write => TemplatePatch::set_write_token(&token),
    };
    repo.update(
        &TemplateFilter::by_shortid(&template.shortid),
        &patch,
        identity,
    )
    .await?;

    tracing::debug!(shortid = %template.shortid, kind = kind.as_str(), "issued sharing token");

    Ok(token)
}
