//! Template sharing tokens.
//!
//! Lets authenticated users share a template with non-authenticated callers
//! by minting opaque access tokens. A read token grants anonymous rendering
//! of the one template it belongs to; a write token additionally allows
//! elevated render options (custom data). Tokens live on the template record
//! and stay valid until overwritten by re-generation.

mod filter;
mod tokens;

pub use filter::{apply_grants, authorize, resolve_token, template_for_access_token};
pub use tokens::{generate_sharing_token, AccessKind};

use crate::db::StoreError;

/// Errors raised by the sharing layer.
#[derive(Debug)]
pub enum SharingError {
    /// The shortid did not resolve to a template the caller can reach.
    TemplateNotFound(String),
    /// No valid session and no valid token.
    Unauthorized,
    /// Underlying store failure, passed through.
    Store(StoreError),
}

impl std::fmt::Display for SharingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SharingError::TemplateNotFound(shortid) => {
                write!(f, "unable to find template with shortid: {}", shortid)
            }
            SharingError::Unauthorized => write!(f, "not authorized"),
            SharingError::Store(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SharingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SharingError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for SharingError {
    fn from(e: StoreError) -> Self {
        SharingError::Store(e)
    }
}

/// Host subsystems the sharing extension depends on.
#[derive(Debug, Clone, Copy)]
pub struct Capabilities {
    /// A template entity type exists in the store schema.
    pub templates: bool,
    /// An authentication subsystem is configured.
    pub authentication: bool,
    /// An authorization subsystem is configured.
    pub authorization: bool,
}

/// The sharing extension as a composable unit.
///
/// Construction is the capability check: when the host lacks any required
/// subsystem, `register` returns `None` and the extension is simply left out
/// of the composed application. No runtime flag checks anywhere else.
#[derive(Debug, Clone, Copy)]
pub struct SharingExtension;

impl SharingExtension {
    /// Path of the single unauthenticated route this extension exposes.
    pub const PUBLIC_ROUTE: &'static str = "/public-templates";

    pub fn register(caps: &Capabilities) -> Option<Self> {
        if caps.templates && caps.authentication && caps.authorization {
            Some(Self)
        } else {
            tracing::info!("sharing extension disabled: missing host subsystem");
            None
        }
    }

    /// The unauthenticated routes this extension asks the host to mount.
    pub fn public_routes(&self) -> &'static [&'static str] {
        &[Self::PUBLIC_ROUTE]
    }
}
