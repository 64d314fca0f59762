//! Authentication and request identity.
//!
//! API keys are bearer keys loaded from a YAML config file:
//!
//! ```yaml
//! api_keys:
//!   - key: "your-secret-key-here"
//!     user_id: "user1"
//! ```
//!
//! Every repository call carries an [`Identity`] that scopes what the caller
//! can reach: authenticated users see their own templates, sharing-token
//! holders see exactly the template their token resolved to, and internal
//! (system) calls are unrestricted.

use axum::http::{header, HeaderMap};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Authenticated user info, added to request extensions after auth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
}

/// Access level carried by a resolved sharing token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    Read,
    Write,
}

impl AccessLevel {
    /// Write level includes everything read level grants.
    pub fn allows_write(&self) -> bool {
        matches!(self, AccessLevel::Write)
    }
}

/// The identity a request acts under.
#[derive(Debug, Clone)]
pub enum Identity {
    /// Internal call, no restriction.
    System,
    /// Authenticated user, restricted to templates they own.
    User(AuthUser),
    /// Anonymous caller holding a valid sharing token, restricted to the
    /// single template the token belongs to.
    TokenHolder { shortid: String, level: AccessLevel },
}

impl Identity {
    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            Identity::User(u) => Some(u),
            _ => None,
        }
    }

    /// Whether this identity may use elevated (write-level) render options.
    pub fn allows_write(&self) -> bool {
        match self {
            Identity::System | Identity::User(_) => true,
            Identity::TokenHolder { level, .. } => level.allows_write(),
        }
    }
}

/// API key entry in the key file.
#[derive(Debug, Clone, Deserialize)]
struct ApiKeyEntry {
    key: String,
    user_id: String,
}

/// Key file structure.
#[derive(Debug, Clone, Deserialize, Default)]
struct ApiKeyFile {
    #[serde(default)]
    api_keys: Vec<ApiKeyEntry>,
}

/// API key store - maps key -> AuthUser.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyStore {
    keys: HashMap<String, AuthUser>,
}

impl ApiKeyStore {
    /// Load API keys from the key file.
    ///
    /// A missing or unparsable file yields an empty store; authenticated
    /// requests will then all be rejected.
    pub fn load(path: &Path) -> Self {
        let keys = match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str::<ApiKeyFile>(&contents) {
                Ok(file) => {
                    let mut map = HashMap::new();
                    for entry in file.api_keys {
                        map.insert(
                            entry.key,
                            AuthUser {
                                user_id: entry.user_id,
                            },
                        );
                    }
                    tracing::info!("Loaded {} API key(s)", map.len());
                    map
                }
                Err(e) => {
                    tracing::warn!("Failed to parse API key file: {}", e);
                    HashMap::new()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read API key file {}: {}", path.display(), e);
                HashMap::new()
            }
        };

        Self { keys }
    }

    /// Validate an API key and return the associated user.
    pub fn validate(&self, key: &str) -> Option<AuthUser> {
        self.keys.get(key).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[cfg(test)]
    pub fn insert(&mut self, key: &str, user_id: &str) {
        self.keys.insert(
            key.to_string(),
            AuthUser {
                user_id: user_id.to_string(),
            },
        );
    }
}

/// Extract the bearer token from an Authorization header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}
