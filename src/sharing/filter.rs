//! Access-interception filter.
//!
//! Runs before each render or listing request. Unauthenticated requests
//! carrying a candidate token are resolved to the template the token belongs
//! to and authorized for exactly that template; authenticated requests pass
//! through untouched, and their grant flags mint new tokens for the rendered
//! template as a side effect.

use crate::auth::{AccessLevel, AuthUser, Identity};
use crate::db::{StoreError, TemplateFilter, TemplateRepository};
use crate::models::Template;
use crate::render::{AuthorizationOptions, RenderRequest};
use crate::sharing::tokens::{generate_sharing_token, AccessKind};
use crate::sharing::SharingError;

fn nonempty(token: &Option<String>) -> Option<&str> {
    token.as_deref().filter(|t| !t.is_empty())
}

/// Resolve a candidate token to the template owning it.
///
/// A write token is tried first since it grants more. No match leaves the
/// request unauthenticated; the caller decides what that means.
pub async fn resolve_token(
    repo: &TemplateRepository,
    opts: &AuthorizationOptions,
) -> Result<Option<(Template, AccessLevel)>, StoreError> {
    if let Some(token) = nonempty(&opts.write_token) {
        if let Some(template) = repo
            .find_one(&TemplateFilter::by_write_token(token), &Identity::System)
            .await?
        {
            return Ok(Some((template, AccessLevel::Write)));
        }
    }

    if let Some(token) = nonempty(&opts.read_token) {
        if let Some(template) = repo
            .find_one(&TemplateFilter::by_read_token(token), &Identity::System)
            .await?
        {
            return Ok(Some((template, AccessLevel::Read)));
        }
    }

    Ok(None)
}

/// Decide the identity a render request acts under.
///
/// Authenticated requests pass through; the token check is skipped entirely.
/// An anonymous request with a valid token is bound to the token's template:
/// the request's own `template` field is overwritten, so a separately claimed
/// id can never widen access. Anything else is unauthorized, and elevated
/// options (custom data) additionally require write level.
pub async fn authorize(
    repo: &TemplateRepository,
    req: &mut RenderRequest,
    user: Option<AuthUser>,
) -> Result<Identity, SharingError> {
    if let Some(user) = user {
        return Ok(Identity::User(user));
    }

    let (template, level) = resolve_token(repo, &req.options.authorization)
        .await?
        .ok_or(SharingError::Unauthorized)?;

    if req.data.is_some() && !level.allows_write() {
        return Err(SharingError::Unauthorized);
    }

    req.template = Some(template.shortid.clone());

    Ok(Identity::TokenHolder {
        shortid: template.shortid,
        level,
    })
}

/// Grant-on-render: mint tokens requested by an already-authorized render.
///
/// Honored only on the normal authenticated path, under the caller's own
/// identity so ownership checks apply. Fire-effect for the current request's
/// authorization, but issuance failures are still surfaced.
pub async fn apply_grants(
    repo: &TemplateRepository,
    shortid: &str,
    opts: &AuthorizationOptions,
    identity: &Identity,
) -> Result<(), SharingError> {
    if identity.user().is_none() {
        return Ok(());
    }

    if opts.grant_read {
        generate_sharing_token(repo, shortid, AccessKind::Read, identity).await?;
    }
    if opts.grant_write {
        generate_sharing_token(repo, shortid, AccessKind::Write, identity).await?;
    }

    Ok(())
}

/// Simple lookup contract for the public endpoint: fetch the one template a
/// read token belongs to, or nothing. Missing and empty tokens resolve to
/// nothing, never to an error that would leak a near-match.
pub async fn template_for_access_token(
    repo: &TemplateRepository,
    token: Option<&str>,
) -> Result<Option<Template>, StoreError> {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return Ok(None);
    };

    repo.find_one(&TemplateFilter::by_read_token(token), &Identity::System)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_db, TemplatePatch};
    use crate::models::{Engine, Recipe, Template};
    use serde_json::json;
    use tempfile::tempdir;

    async fn test_repo() -> (tempfile::TempDir, TemplateRepository) {
        let temp_dir = tempdir().unwrap();
        let pool = init_db(temp_dir.path().join("test.db")).await.unwrap();
        (temp_dir, TemplateRepository::new(pool))
    }

    async fn insert_with_tokens(
        repo: &TemplateRepository,
        read: Option<&str>,
        write: Option<&str>,
    ) -> Template {
        let mut t = Template::new("foo", Engine::None, Recipe::Html, "content", "alice");
        t.read_sharing_token = read.map(String::from);
        t.write_sharing_token = write.map(String::from);
        repo.insert(&t).await.unwrap();
        t
    }

    fn request(read: Option<&str>, write: Option<&str>) -> RenderRequest {
        let mut req = RenderRequest::default();
        req.options.authorization.read_token = read.map(String::from);
        req.options.authorization.write_token = write.map(String::from);
        req
    }

    #[tokio::test]
    async fn test_valid_read_token_grants_read_access() {
        let (_dir, repo) = test_repo().await;
        let t = insert_with_tokens(&repo, Some("tok1"), None).await;

        let mut req = request(Some("tok1"), None);
        let identity = authorize(&repo, &mut req, None).await.unwrap();

        match identity {
            Identity::TokenHolder { shortid, level } => {
                assert_eq!(shortid, t.shortid);
                assert_eq!(level, AccessLevel::Read);
            }
            other => panic!("expected token holder, got {:?}", other),
        }
        assert_eq!(req.template.as_deref(), Some(t.shortid.as_str()));
    }

    #[tokio::test]
    async fn test_valid_write_token_grants_write_access() {
        let (_dir, repo) = test_repo().await;
        let t = insert_with_tokens(&repo, None, Some("wtok")).await;

        let mut req = request(None, Some("wtok"));
        req.data = Some(json!({"x": 1}));
        let identity = authorize(&repo, &mut req, None).await.unwrap();

        assert!(identity.allows_write());
        assert_eq!(req.template.as_deref(), Some(t.shortid.as_str()));
    }

    #[tokio::test]
    async fn test_wrong_token_is_unauthorized() {
        let (_dir, repo) = test_repo().await;
        insert_with_tokens(&repo, Some("tok1"), None).await;

        let mut req = request(Some("wrong"), None);
        let err = authorize(&repo, &mut req, None).await.unwrap_err();
        assert!(matches!(err, SharingError::Unauthorized));
    }

    #[tokio::test]
    async fn test_no_token_no_user_is_unauthorized() {
        let (_dir, repo) = test_repo().await;
        insert_with_tokens(&repo, None, None).await;

        let mut req = request(None, None);
        let err = authorize(&repo, &mut req, None).await.unwrap_err();
        assert!(matches!(err, SharingError::Unauthorized));
    }

    #[tokio::test]
    async fn test_any_token_fails_when_template_has_none() {
        let (_dir, repo) = test_repo().await;
        insert_with_tokens(&repo, None, None).await;

        let mut req = request(Some("anything"), None);
        assert!(authorize(&repo, &mut req, None).await.is_err());

        let mut req = request(None, Some("anything"));
        assert!(authorize(&repo, &mut req, None).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_token_is_unauthorized() {
        let (_dir, repo) = test_repo().await;
        insert_with_tokens(&repo, Some("tok1"), None).await;

        let mut req = request(Some(""), None);
        let err = authorize(&repo, &mut req, None).await.unwrap_err();
        assert!(matches!(err, SharingError::Unauthorized));
    }

    #[tokio::test]
    async fn test_token_binds_request_to_its_own_template() {
        let (_dir, repo) = test_repo().await;
        let owned = insert_with_tokens(&repo, Some("tok1"), None).await;
        let other = insert_with_tokens(&repo, None, None).await;

        // The request claims a different template; the token's template wins.
        let mut req = request(Some("tok1"), None);
        req.template = Some(other.shortid.clone());

        let identity = authorize(&repo, &mut req, None).await.unwrap();
        assert_eq!(req.template.as_deref(), Some(owned.shortid.as_str()));
        match identity {
            Identity::TokenHolder { shortid, .. } => assert_eq!(shortid, owned.shortid),
            other => panic!("expected token holder, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_token_cannot_use_elevated_options() {
        let (_dir, repo) = test_repo().await;
        insert_with_tokens(&repo, Some("tok1"), None).await;

        let mut req = request(Some("tok1"), None);
        req.data = Some(json!({"x": 1}));

        let err = authorize(&repo, &mut req, None).await.unwrap_err();
        assert!(matches!(err, SharingError::Unauthorized));
    }

    #[tokio::test]
    async fn test_authenticated_request_skips_token_check() {
        let (_dir, repo) = test_repo().await;
        insert_with_tokens(&repo, Some("tok1"), None).await;

        // Invalid token present, but the user is authenticated
        let mut req = request(Some("garbage"), None);
        let identity = authorize(
            &repo,
            &mut req,
            Some(AuthUser {
                user_id: "alice".to_string(),
            }),
        )
        .await
        .unwrap();

        assert!(matches!(identity, Identity::User(_)));
    }

    #[tokio::test]
    async fn test_apply_grants_mints_both_tokens() {
        let (_dir, repo) = test_repo().await;
        let t = insert_with_tokens(&repo, None, None).await;

        let identity = Identity::User(AuthUser {
            user_id: "alice".to_string(),
        });
        let opts = AuthorizationOptions {
            grant_read: true,
            grant_write: true,
            ..Default::default()
        };

        apply_grants(&repo, &t.shortid, &opts, &identity).await.unwrap();

        let reloaded = repo
            .find_one(&TemplateFilter::by_shortid(&t.shortid), &Identity::System)
            .await
            .unwrap()
            .unwrap();
        assert!(reloaded.read_sharing_token.is_some());
        assert!(reloaded.write_sharing_token.is_some());
    }

    #[tokio::test]
    async fn test_apply_grants_ignored_for_token_holders() {
        let (_dir, repo) = test_repo().await;
        let t = insert_with_tokens(&repo, Some("tok1"), None).await;

        let identity = Identity::TokenHolder {
            shortid: t.shortid.clone(),
            level: AccessLevel::Write,
        };
        let opts = AuthorizationOptions {
            grant_write: true,
            ..Default::default()
        };

        apply_grants(&repo, &t.shortid, &opts, &identity).await.unwrap();

        let reloaded = repo
            .find_one(&TemplateFilter::by_shortid(&t.shortid), &Identity::System)
            .await
            .unwrap()
            .unwrap();
        assert!(reloaded.write_sharing_token.is_none());
    }

    #[tokio::test]
    async fn test_stale_token_no_longer_authorizes_after_overwrite() {
        let (_dir, repo) = test_repo().await;
        let t = insert_with_tokens(&repo, Some("old"), None).await;

        repo.update(
            &TemplateFilter::by_shortid(&t.shortid),
            &TemplatePatch::set_read_token("new"),
            &Identity::System,
        )
        .await
        .unwrap();

        let mut req = request(Some("old"), None);
        assert!(authorize(&repo, &mut req, None).await.is_err());

        let mut req = request(Some("new"), None);
        assert!(authorize(&repo, &mut req, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_template_for_access_token() {
        let (_dir, repo) = test_repo().await;
        let t = insert_with_tokens(&repo, Some("tok1"), None).await;

        let found = template_for_access_token(&repo, Some("tok1")).await.unwrap();
        assert_eq!(found.unwrap().shortid, t.shortid);

        assert!(template_for_access_token(&repo, Some("wrong"))
            .await
            .unwrap()
            .is_none());
        assert!(template_for_access_token(&repo, Some(""))
            .await
            .unwrap()
            .is_none());
        assert!(template_for_access_token(&repo, None).await.unwrap().is_none());
    }
}
