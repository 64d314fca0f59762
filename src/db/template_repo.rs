//! Template repository.
//!
//! Filtered find/update over template records. Every read and write carries
//! an [`Identity`] that the repository turns into an ACL condition:
//! authenticated users only reach templates they own, a token holder only
//! reaches the template its token resolved to, and the system identity is
//! unrestricted.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::auth::Identity;
use crate::models::{Engine, Recipe, Template};

/// Errors that can occur during template store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying database error.
    Database(sqlx::Error),
    /// A stored row could not be mapped back to a template.
    CorruptRow(String, String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "database error: {}", e),
            StoreError::CorruptRow(shortid, reason) => {
                write!(f, "corrupt template row '{}': {}", shortid, reason)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(e) => Some(e),
            StoreError::CorruptRow(_, _) => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

/// Exact-match filter over template fields.
#[derive(Debug, Clone, Default)]
pub struct TemplateFilter {
    pub shortid: Option<String>,
    pub read_sharing_token: Option<String>,
    pub write_sharing_token: Option<String>,
}

impl TemplateFilter {
    pub fn by_shortid(shortid: impl Into<String>) -> Self {
        Self {
            shortid: Some(shortid.into()),
            ..Default::default()
        }
    }

    pub fn by_read_token(token: impl Into<String>) -> Self {
        Self {
            read_sharing_token: Some(token.into()),
            ..Default::default()
        }
    }

    pub fn by_write_token(token: impl Into<String>) -> Self {
        Self {
            write_sharing_token: Some(token.into()),
            ..Default::default()
        }
    }

    /// An empty candidate token can never match anything. A stored NULL
    /// is "no token", and an empty string must not be conflated with it.
    fn matches_nothing(&self) -> bool {
        self.read_sharing_token.as_deref() == Some("")
            || self.write_sharing_token.as_deref() == Some("")
    }
}

/// Partial update of a template record.
///
/// Only the fields present in the patch are written; everything else on the
/// row is untouched. Sharing tokens are the only fields this system mutates.
#[derive(Debug, Clone, Default)]
pub struct TemplatePatch {
    pub read_sharing_token: Option<String>,
    pub write_sharing_token: Option<String>,
}

impl TemplatePatch {
    pub fn set_read_token(token: impl Into<String>) -> Self {
        Self {
            read_sharing_token: Some(token.into()),
            ..Default::default()
        }
    }

    pub fn set_write_token(token: impl Into<String>) -> Self {
        Self {
            write_sharing_token: Some(token.into()),
            ..Default::default()
        }
    }

    fn is_empty(&self) -> bool {
        self.read_sharing_token.is_none() && self.write_sharing_token.is_none()
    }
}

// Row type for database queries
#[derive(sqlx::FromRow)]
struct TemplateRow {
    shortid: String,
    name: String,
    engine: String,
    recipe: String,
    content: String,
    created_by: String,
    created_at: String,
    read_sharing_token: Option<String>,
    write_sharing_token: Option<String>,
}

impl TemplateRow {
    fn into_template(self) -> Result<Template, StoreError> {
        let engine = Engine::parse(&self.engine).ok_or_else(|| {
            StoreError::CorruptRow(self.shortid.clone(), format!("unknown engine '{}'", self.engine))
        })?;
        let recipe = Recipe::parse(&self.recipe).ok_or_else(|| {
            StoreError::CorruptRow(self.shortid.clone(), format!("unknown recipe '{}'", self.recipe))
        })?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| StoreError::CorruptRow(self.shortid.clone(), e.to_string()))?
            .with_timezone(&Utc);

        Ok(Template {
            shortid: self.shortid,
            name: self.name,
            engine,
            recipe,
            content: self.content,
            created_by: self.created_by,
            created_at,
            read_sharing_token: self.read_sharing_token,
            write_sharing_token: self.write_sharing_token,
        })
    }
}

pub struct TemplateRepository {
    pool: SqlitePool,
}

impl TemplateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, template: &Template) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO templates (shortid, name, engine, recipe, content, created_by, created_at, read_sharing_token, write_sharing_token)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&template.shortid)
        .bind(&template.name)
        .bind(template.engine.as_str())
        .bind(template.recipe.as_str())
        .bind(&template.content)
        .bind(&template.created_by)
        .bind(template.created_at.to_rfc3339())
        .bind(&template.read_sharing_token)
        .bind(&template.write_sharing_token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn find(
        &self,
        filter: &TemplateFilter,
        identity: &Identity,
    ) -> Result<Vec<Template>, StoreError> {
        if filter.matches_nothing() {
            return Ok(Vec::new());
        }

        let (where_clause, binds) = build_where(filter, identity);
        let sql = format!("SELECT * FROM templates{} ORDER BY name", where_clause);

        let mut query = sqlx::query_as::<_, TemplateRow>(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(TemplateRow::into_template).collect()
    }

    pub async fn find_one(
        &self,
        filter: &TemplateFilter,
        identity: &Identity,
    ) -> Result<Option<Template>, StoreError> {
        if filter.matches_nothing() {
            return Ok(None);
        }

        let (where_clause, binds) = build_where(filter, identity);
        let sql = format!("SELECT * FROM templates{} LIMIT 1", where_clause);

        let mut query = sqlx::query_as::<_, TemplateRow>(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }

        match query.fetch_optional(&self.pool).await? {
            Some(row) => row.into_template().map(Some),
            None => Ok(None),
        }
    }

    /// Apply a partial update to every template matching the filter under
    /// the given identity. Returns the number of rows changed.
    pub async fn update(
        &self,
        filter: &TemplateFilter,
        patch: &TemplatePatch,
        identity: &Identity,
    ) -> Result<u64, StoreError> {
        if patch.is_empty() || filter.matches_nothing() {
            return Ok(0);
        }

        let mut sets = Vec::new();
        let mut set_binds = Vec::new();
        if let Some(token) = &patch.read_sharing_token {
            sets.push("read_sharing_token = ?");
            set_binds.push(token.clone());
        }
        if let Some(token) = &patch.write_sharing_token {
            sets.push("write_sharing_token = ?");
            set_binds.push(token.clone());
        }

        let (where_clause, where_binds) = build_where(filter, identity);
        let sql = format!(
            "UPDATE templates SET {}{}",
            sets.join(", "),
            where_clause
        );

        let mut query = sqlx::query(&sql);
        for bind in set_binds.iter().chain(where_binds.iter()) {
            query = query.bind(bind);
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

/// Build the WHERE clause for a filter under an identity.
fn build_where(filter: &TemplateFilter, identity: &Identity) -> (String, Vec<String>) {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();

    if let Some(shortid) = &filter.shortid {
        conditions.push("shortid = ?");
        binds.push(shortid.clone());
    }
    if let Some(token) = &filter.read_sharing_token {
        conditions.push("read_sharing_token = ?");
        binds.push(token.clone());
    }
    if let Some(token) = &filter.write_sharing_token {
        conditions.push("write_sharing_token = ?");
        binds.push(token.clone());
    }

    match identity {
        Identity::System => {}
        Identity::User(user) => {
            conditions.push("created_by = ?");
            binds.push(user.user_id.clone());
        }
        Identity::TokenHolder { shortid, .. } => {
            conditions.push("shortid = ?");
            binds.push(shortid.clone());
        }
    }

    if conditions.is_empty() {
        (String::new(), binds)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), binds)
    }
}
