use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Template engines supported by the render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// No templating; content is emitted verbatim.
    None,
    /// `{{name}}` placeholders expanded from the render data.
    Placeholders,
}

impl Engine {
    /// Parse from string name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(Engine::None),
            "placeholders" => Some(Engine::Placeholders),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::None => "none",
            Engine::Placeholders => "placeholders",
        }
    }
}

/// Output recipes. The recipe decides the content type of rendered output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recipe {
    Html,
    Text,
}

impl Recipe {
    /// Parse from string name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "html" => Some(Recipe::Html),
            "text" => Some(Recipe::Text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Recipe::Html => "html",
            Recipe::Text => "text",
        }
    }

    /// Content type of output produced under this recipe.
    pub fn content_type(&self) -> &'static str {
        match self {
            Recipe::Html => "text/html; charset=utf-8",
            Recipe::Text => "text/plain; charset=utf-8",
        }
    }
}

/// A report template.
///
/// The two sharing-token fields are absent until an owner (or an authorized
/// render with a grant flag) mints a token. Absent and empty are not the
/// same thing: an absent token grants nothing, and so does an empty one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Stable external identifier, unique and immutable after creation.
    pub shortid: String,
    pub name: String,
    pub engine: Engine,
    pub recipe: Recipe,
    pub content: String,
    /// User id of the owner; drives the repository ACL.
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    /// Opaque token granting anonymous read access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_sharing_token: Option<String>,
    /// Opaque token granting anonymous read+write access.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_sharing_token: Option<String>,
}

impl Template {
    /// Create a new template with a fresh shortid and no sharing tokens.
    pub fn new(
        name: impl Into<String>,
        engine: Engine,
        recipe: Recipe,
        content: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            shortid: generate_shortid(),
            name: name.into(),
            engine,
            recipe,
            content: content.into(),
            created_by: created_by.into(),
            created_at: Utc::now(),
            read_sharing_token: None,
            write_sharing_token: None,
        }
    }
}

/// Generates a short random identifier.
///
/// 6 random bytes encoded as base64url (no padding), 8 characters.
pub fn generate_shortid() -> String {
    let mut bytes = [0u8; 6];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
