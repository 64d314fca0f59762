//! HTTP surface.
//!
//! Routes:
//! - `GET /health`: health check (no auth)
//! - `GET /api/templates`: list templates (session or access token)
//! - `POST /api/templates`: insert a template (auth required)
//! - `POST /api/templates/sharing/{shortid}/access/{access}`: mint a sharing
//!   token, `{access}` is `read` or `write` (auth required; mounted only when
//!   the sharing extension is registered)
//! - `POST /api/report`: render a template (session or sharing token)
//! - `GET /public-templates?access_token=...`: anonymous rendering via read
//!   token (mounted only when the sharing extension is registered)

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{bearer_token, ApiKeyStore, AuthUser, Identity};
use crate::db::{StoreError, TemplateFilter, TemplateRepository};
use crate::models::{Engine, Recipe, Template};
use crate::render::{RenderError, RenderRequest, Renderer};
use crate::sharing::{
    self, generate_sharing_token, AccessKind, SharingError, SharingExtension,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<TemplateRepository>,
    pub renderer: Renderer,
    pub api_keys: Arc<ApiKeyStore>,
}

/// Error response as sent to clients.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ApiError {
    fn bad_request(error: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error,
            message: message.into(),
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            error: "unauthorized",
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: "internal",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(error = self.error, message = %self.message, "request failed");
        }

        let mut response = (
            self.status,
            Json(ErrorBody {
                error: self.error,
                message: self.message,
            }),
        )
            .into_response();

        // Anonymous callers should be challenged to authenticate
        if self.status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(r#"Bearer realm="replate""#),
            );
        }

        response
    }
}

impl From<SharingError> for ApiError {
    fn from(e: SharingError) -> Self {
        match e {
            SharingError::TemplateNotFound(_) => {
                ApiError::bad_request("template_not_found", e.to_string())
            }
            SharingError::Unauthorized => {
                ApiError::unauthorized("valid session or sharing token required")
            }
            SharingError::Store(e) => ApiError::internal(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::internal(e.to_string())
    }
}

impl From<RenderError> for ApiError {
    fn from(e: RenderError) -> Self {
        // Render failures are not ours to reinterpret
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: "render_failed",
            message: e.to_string(),
        }
    }
}

/// Authentication middleware for routes that require a session.
async fn auth_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let key = match bearer_token(request.headers()) {
        Some(key) => key,
        None => return ApiError::unauthorized("Authorization header required").into_response(),
    };

    match state.api_keys.validate(key) {
        Some(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => ApiError::unauthorized("Invalid API key").into_response(),
    }
}

/// Resolve the bearer header on routes where authentication is optional.
///
/// No header means anonymous; a present but invalid key is rejected.
fn resolve_user(state: &AppState, headers: &HeaderMap) -> Result<Option<AuthUser>, ApiError> {
    match bearer_token(headers) {
        Some(key) => state
            .api_keys
            .validate(key)
            .map(Some)
            .ok_or_else(|| ApiError::unauthorized("Invalid API key")),
        None => Ok(None),
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
struct NewTemplate {
    name: String,
    engine: String,
    recipe: String,
    content: String,
}

async fn create_template(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<NewTemplate>,
) -> Result<(StatusCode, Json<Template>), ApiError> {
    let user = resolve_user(&state, &headers)?
        .ok_or_else(|| ApiError::unauthorized("Authorization header required"))?;

    let engine = Engine::parse(&body.engine).ok_or_else(|| {
        ApiError::bad_request("unknown_engine", format!("unknown engine '{}'", body.engine))
    })?;
    let recipe = Recipe::parse(&body.recipe).ok_or_else(|| {
        ApiError::bad_request("unknown_recipe", format!("unknown recipe '{}'", body.recipe))
    })?;

    let template = Template::new(body.name, engine, recipe, body.content, user.user_id);
    state.repo.insert(&template).await?;

    Ok((StatusCode::CREATED, Json(template)))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    access_token: Option<String>,
}

async fn list_templates(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Template>>, ApiError> {
    if let Some(user) = resolve_user(&state, &headers)? {
        let templates = state
            .repo
            .find(&TemplateFilter::default(), &Identity::User(user))
            .await?;
        return Ok(Json(templates));
    }

    match sharing::template_for_access_token(&state.repo, query.access_token.as_deref()).await? {
        Some(mut template) => {
            // A read token must not disclose the write token
            template.write_sharing_token = None;
            Ok(Json(vec![template]))
        }
        None => Err(ApiError::unauthorized("valid session or access token required")),
    }
}

#[derive(Serialize, Deserialize)]
struct TokenResponse {
    token: String,
}

async fn generate_token(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((shortid, access)): Path<(String, String)>,
) -> Result<Json<TokenResponse>, ApiError> {
    let kind = AccessKind::parse(&access).ok_or_else(|| {
        ApiError::bad_request(
            "unknown_access_kind",
            format!("access must be 'read' or 'write', got '{}'", access),
        )
    })?;

    let token = generate_sharing_token(&state.repo, &shortid, kind, &Identity::User(user)).await?;

    Ok(Json(TokenResponse { token }))
}

async fn render_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut req): Json<RenderRequest>,
) -> Result<Response, ApiError> {
    let user = resolve_user(&state, &headers)?;

    let identity = sharing::authorize(&state.repo, &mut req, user).await?;

    let shortid = req
        .template
        .as_deref()
        .ok_or_else(|| ApiError::bad_request("missing_template", "no template specified"))?;
    let template = state
        .repo
        .find_one(&TemplateFilter::by_shortid(shortid), &identity)
        .await?
        .ok_or_else(|| {
            ApiError::bad_request(
                "template_not_found",
                format!("unable to find template with shortid: {}", shortid),
            )
        })?;

    let output = state.renderer.render(&template, req.data.as_ref())?;

    sharing::apply_grants(
        &state.repo,
        &template.shortid,
        &req.options.authorization,
        &identity,
    )
    .await?;

    Ok(([(header::CONTENT_TYPE, output.content_type)], output.body).into_response())
}

async fn public_templates(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let template = sharing::template_for_access_token(&state.repo, query.access_token.as_deref())
        .await?
        .ok_or_else(|| ApiError::unauthorized("valid access token required"))?;

    let output = state.renderer.render(&template, None)?;

    Ok(([(header::CONTENT_TYPE, output.content_type)], output.body).into_response())
}

// ============================================================================
// Router
// ============================================================================

/// Assemble the application router.
///
/// The sharing extension's routes are only mounted when the extension was
/// registered; a host without it simply has no sharing surface.
pub fn build_router(state: AppState, extension: Option<SharingExtension>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/api/report", post(render_report))
        .route("/api/templates", get(list_templates).post(create_template));

    if let Some(ext) = extension {
        let issuance = Router::new()
            .route(
                "/api/templates/sharing/{shortid}/access/{access}",
                post(generate_token),
            )
            .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
        app = app.merge(issuance);

        for route in ext.public_routes() {
            app = app.route(route, get(public_templates));
        }
    }

    app.with_state(state).layer(TraceLayer::new_for_http())
}
