//! Render pipeline.
//!
//! Executes a template against optional input data and returns output bytes
//! plus a content type chosen by the template's recipe. Supplying custom
//! `data` is an elevated option: the access filter only lets write-level
//! callers use it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{Engine, Template};

/// Errors produced by the render pipeline itself.
///
/// The sharing layer never transforms these; they surface to the caller
/// unchanged.
#[derive(Debug)]
pub enum RenderError {
    /// A `{{` without a matching `}}` in the template content.
    UnclosedPlaceholder,
    /// A placeholder named a field the render data does not contain.
    MissingValue(String),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::UnclosedPlaceholder => {
                write!(f, "template contains an unclosed placeholder")
            }
            RenderError::MissingValue(name) => {
                write!(f, "render data has no value for placeholder '{}'", name)
            }
        }
    }
}

impl std::error::Error for RenderError {}

/// Per-request authorization options.
///
/// Read/write tokens authorize an anonymous request; grant flags ask an
/// already-authorized request to mint new tokens for the rendered template.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_token: Option<String>,
    #[serde(default)]
    pub grant_read: bool,
    #[serde(default)]
    pub grant_write: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderOptions {
    #[serde(default)]
    pub authorization: AuthorizationOptions,
}

/// A render request as accepted by the report endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Shortid of the template to render.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Custom input data; write-level only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default)]
    pub options: RenderOptions,
}

/// Rendered output.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

/// Executes templates.
#[derive(Debug, Clone, Default)]
pub struct Renderer;

impl Renderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render(
        &self,
        template: &Template,
        data: Option<&Value>,
    ) -> Result<RenderOutput, RenderError> {
        let body = match template.engine {
            Engine::None => template.content.clone(),
            Engine::Placeholders => expand_placeholders(&template.content, data)?,
        };

        Ok(RenderOutput {
            content_type: template.recipe.content_type(),
            body: body.into_bytes(),
        })
    }
}

/// Expand `{{name}}` placeholders from a JSON object.
fn expand_placeholders(content: &str, data: Option<&Value>) -> Result<String, RenderError> {
    let mut out = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or(RenderError::UnclosedPlaceholder)?;
        let name = after[..end].trim();

        let value = data
            .and_then(|d| d.get(name))
            .ok_or_else(|| RenderError::MissingValue(name.to_string()))?;
        match value {
            Value::String(s) => out.push_str(s),
            other => out.push_str(&other.to_string()),
        }

        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Recipe;
    use serde_json::json;

    fn template(engine: Engine, content: &str) -> Template {
        Template::new("foo", engine, Recipe::Html, content, "user1")
    }

    #[test]
    fn test_engine_none_renders_content_verbatim() {
        let t = template(Engine::None, "content");
        let out = Renderer::new().render(&t, None).unwrap();
        assert_eq!(out.body, b"content");
        assert!(out.content_type.starts_with("text/html"));
    }

    #[test]
    fn test_engine_none_ignores_data() {
        let t = template(Engine::None, "{{name}}");
        let out = Renderer::new().render(&t, Some(&json!({"name": "x"}))).unwrap();
        assert_eq!(out.body, b"{{name}}");
    }

    #[test]
    fn test_placeholders_expansion() {
        let t = template(Engine::Placeholders, "hello {{who}}, n = {{n}}");
        let out = Renderer::new()
            .render(&t, Some(&json!({"who": "world", "n": 3})))
            .unwrap();
        assert_eq!(out.body, b"hello world, n = 3");
    }

    #[test]
    fn test_placeholders_missing_value() {
        let t = template(Engine::Placeholders, "hello {{who}}");
        let err = Renderer::new().render(&t, None).unwrap_err();
        assert!(matches!(err, RenderError::MissingValue(name) if name == "who"));
    }

    #[test]
    fn test_placeholders_unclosed() {
        let t = template(Engine::Placeholders, "hello {{who");
        let err = Renderer::new().render(&t, Some(&json!({"who": "x"}))).unwrap_err();
        assert!(matches!(err, RenderError::UnclosedPlaceholder));
    }

    #[test]
    fn test_text_recipe_content_type() {
        let t = Template::new("foo", Engine::None, Recipe::Text, "content", "user1");
        let out = Renderer::new().render(&t, None).unwrap();
        assert!(out.content_type.starts_with("text/plain"));
    }

    #[test]
    fn test_authorization_options_wire_names() {
        let opts: AuthorizationOptions = serde_json::from_value(json!({
            "readToken": "r",
            "writeToken": "w",
            "grantRead": true,
            "grantWrite": true
        }))
        .unwrap();

        assert_eq!(opts.read_token.as_deref(), Some("r"));
        assert_eq!(opts.write_token.as_deref(), Some("w"));
        assert!(opts.grant_read);
        assert!(opts.grant_write);
    }
}
