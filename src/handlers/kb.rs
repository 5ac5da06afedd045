//! Knowledge base HTTP handlers for agents.
//!
//! This module implements:
//! - GET/POST /api/v1/kb/articles - List/search and create articles
//! - GET/PATCH/DELETE /api/v1/kb/articles/{id}
//! - POST /api/v1/kb/articles/{id}/publish, POST /api/v1/kb/articles/{id}/unpublish
//!
//! The read-only portal and help-center views reuse the helpers at the
//! bottom of this module.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        non_blank, required,
        kb::{
            ArticleListQuery, ArticleStatus, ArticleSummary, CreateArticleRequest, KbArticle,
            UpdateArticleRequest,
        },
    },
    services::kb,
};

/// Maximum number of results of a keyword search.
const SEARCH_LIMIT: usize = 20;

/// List or search articles.
///
/// # Endpoint
///
/// `GET /api/v1/kb/articles?status=published&q=reset+password`
///
/// Without `q` articles are ordered by title. With `q` only matching
/// articles are returned, best match first, each with its `score`.
pub async fn list_articles(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ArticleListQuery>,
) -> Result<Json<Vec<ArticleSummary>>, AppError> {
    let articles = sqlx::query_as::<_, KbArticle>(
        r#"
        SELECT * FROM kb_articles
        WHERE workspace_id = $1 AND ($2::text IS NULL OR status = $2)
        ORDER BY title
        "#,
    )
    .bind(auth.workspace_id)
    .bind(query.status)
    .fetch_all(&pool)
    .await?;

    Ok(Json(summaries(&articles, query.q)))
}

/// Create an article.
///
/// # Endpoint
///
/// `POST /api/v1/kb/articles`
///
/// ```json
/// { "title": "How to reset your password", "body": "...", "publish": true }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**
///
/// When `slug` is absent it is derived from the title. A derived slug that
/// is already taken gets a numeric suffix (`reset-password-2`); an explicit
/// slug that is taken is a 409.
pub async fn create_article(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateArticleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let title = required("title", &request.title)?;
    let body = required("body", &request.body)?;

    let slug = match non_blank(request.slug) {
        Some(explicit) => kb::slugify(&explicit),
        None => {
            let base = kb::slugify(&title);
            let taken: Vec<String> = sqlx::query_scalar(
                "SELECT slug FROM kb_articles WHERE workspace_id = $1 AND slug LIKE $2 || '%'",
            )
            .bind(auth.workspace_id)
            .bind(&base)
            .fetch_all(&pool)
            .await?;
            kb::next_free_slug(&base, &taken)
        }
    };

    let status = if request.publish {
        ArticleStatus::Published
    } else {
        ArticleStatus::Draft
    };

    let article = sqlx::query_as::<_, KbArticle>(
        r#"
        INSERT INTO kb_articles (workspace_id, title, slug, body, status, published_at)
        VALUES ($1, $2, $3, $4, $5, CASE WHEN $6 THEN NOW() END)
        RETURNING *
        "#,
    )
    .bind(auth.workspace_id)
    .bind(&title)
    .bind(&slug)
    .bind(&body)
    .bind(status)
    .bind(request.publish)
    .fetch_one(&pool)
    .await?;

    tracing::info!(article_id = %article.id, slug = %article.slug, "KB article created");

    Ok((StatusCode::CREATED, Json(article)))
}

/// `GET /api/v1/kb/articles/{id}`
pub async fn get_article(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(article_id): Path<Uuid>,
) -> Result<Json<KbArticle>, AppError> {
    let article = sqlx::query_as::<_, KbArticle>(
        "SELECT * FROM kb_articles WHERE id = $1 AND workspace_id = $2",
    )
    .bind(article_id)
    .bind(auth.workspace_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Article"))?;

    Ok(Json(article))
}

/// Edit title, slug or body. Publication state is changed with the
/// publish/unpublish endpoints.
///
/// `PATCH /api/v1/kb/articles/{id}`
pub async fn update_article(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(article_id): Path<Uuid>,
    Json(request): Json<UpdateArticleRequest>,
) -> Result<Json<KbArticle>, AppError> {
    let title = request.title.as_deref().map(|t| required("title", t)).transpose()?;
    let body = request.body.as_deref().map(|b| required("body", b)).transpose()?;
    let slug = non_blank(request.slug).map(|s| kb::slugify(&s));

    let article = sqlx::query_as::<_, KbArticle>(
        r#"
        UPDATE kb_articles
        SET title = COALESCE($3, title),
            slug = COALESCE($4, slug),
            body = COALESCE($5, body),
            updated_at = NOW()
        WHERE id = $1 AND workspace_id = $2
        RETURNING *
        "#,
    )
    .bind(article_id)
    .bind(auth.workspace_id)
    .bind(title)
    .bind(slug)
    .bind(body)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Article"))?;

    Ok(Json(article))
}

/// `DELETE /api/v1/kb/articles/{id}`
pub async fn delete_article(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(article_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let result = sqlx::query("DELETE FROM kb_articles WHERE id = $1 AND workspace_id = $2")
        .bind(article_id)
        .bind(auth.workspace_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Article"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn set_status(
    pool: &DbPool,
    workspace_id: Uuid,
    article_id: Uuid,
    status: ArticleStatus,
) -> Result<KbArticle, AppError> {
    // Publishing an already published article keeps its publication time.
    let article = sqlx::query_as::<_, KbArticle>(
        r#"
        UPDATE kb_articles
        SET status = $3,
            published_at = CASE
                WHEN $3 = 'published' THEN COALESCE(published_at, NOW())
                ELSE NULL
            END,
            updated_at = NOW()
        WHERE id = $1 AND workspace_id = $2
        RETURNING *
        "#,
    )
    .bind(article_id)
    .bind(workspace_id)
    .bind(status)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Article"))?;

    tracing::info!(article_id = %article.id, status = %article.status, "KB article status changed");
    Ok(article)
}

/// Make an article visible in the portal and help center.
///
/// `POST /api/v1/kb/articles/{id}/publish`
pub async fn publish_article(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(article_id): Path<Uuid>,
) -> Result<Json<KbArticle>, AppError> {
    let article = set_status(&pool, auth.workspace_id, article_id, ArticleStatus::Published).await?;
    Ok(Json(article))
}

/// Return an article to draft.
///
/// `POST /api/v1/kb/articles/{id}/unpublish`
pub async fn unpublish_article(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(article_id): Path<Uuid>,
) -> Result<Json<KbArticle>, AppError> {
    let article = set_status(&pool, auth.workspace_id, article_id, ArticleStatus::Draft).await?;
    Ok(Json(article))
}

/// Published articles of a workspace, ordered by title.
pub(crate) async fn published(pool: &DbPool, workspace_id: Uuid) -> Result<Vec<KbArticle>, AppError> {
    let articles = sqlx::query_as::<_, KbArticle>(
        "SELECT * FROM kb_articles WHERE workspace_id = $1 AND status = 'published' ORDER BY title",
    )
    .bind(workspace_id)
    .fetch_all(pool)
    .await?;

    Ok(articles)
}

/// A published article by slug; drafts are reported as not found.
pub(crate) async fn published_by_slug(
    pool: &DbPool,
    workspace_id: Uuid,
    slug: &str,
) -> Result<KbArticle, AppError> {
    sqlx::query_as::<_, KbArticle>(
        r#"
        SELECT * FROM kb_articles
        WHERE workspace_id = $1 AND slug = $2 AND status = 'published'
        "#,
    )
    .bind(workspace_id)
    .bind(slug)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Article"))
}

/// Summaries of `articles`: all of them, or the ranked matches of `query`.
pub(crate) fn summaries(articles: &[KbArticle], query: Option<String>) -> Vec<ArticleSummary> {
    match non_blank(query) {
        None => articles.iter().map(ArticleSummary::from).collect(),
        Some(q) => kb::rank(articles, &q, SEARCH_LIMIT)
            .into_iter()
            .map(|(article, score)| ArticleSummary {
                score: Some(score),
                ..ArticleSummary::from(article)
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article(title: &str, body: &str) -> KbArticle {
        KbArticle {
            id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            title: title.to_string(),
            slug: kb::slugify(title),
            body: body.to_string(),
            status: ArticleStatus::Published,
            published_at: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn summaries_without_query_keep_every_article_unscored() {
        let articles = vec![article("Billing", "Invoices"), article("Login", "Passwords")];
        let listed = summaries(&articles, Some("   ".to_string()));
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|s| s.score.is_none()));
    }

    #[test]
    fn summaries_with_query_are_ranked_and_scored() {
        let articles = vec![
            article("Billing basics", "How invoices work"),
            article("Reset your password", "Use the password reset link"),
        ];
        let found = summaries(&articles, Some("password".to_string()));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].slug, "reset-your-password");
        assert_eq!(found[0].score, Some(4));
    }
}
