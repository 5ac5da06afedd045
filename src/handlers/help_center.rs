//! Public help center: unauthenticated, read-only, published content only.
//!
//! - GET /public/v1/{workspace_slug}/articles?q=...
//! - GET /public/v1/{workspace_slug}/articles/{slug}
//! - GET /public/v1/{workspace_slug}/banners

use axum::{
    Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    handlers::{kb as kb_handlers, settings},
    models::{
        kb::{ArticleListQuery, ArticleSummary, KbArticle},
        settings::Banner,
    },
};

async fn workspace_id(pool: &DbPool, slug: &str) -> Result<Uuid, AppError> {
    sqlx::query_scalar("SELECT id FROM workspaces WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Help center"))
}

pub async fn list_articles(
    State(pool): State<DbPool>,
    Path(workspace_slug): Path<String>,
    Query(query): Query<ArticleListQuery>,
) -> Result<Json<Vec<ArticleSummary>>, AppError> {
    let workspace_id = workspace_id(&pool, &workspace_slug).await?;
    let articles = kb_handlers::published(&pool, workspace_id).await?;
    Ok(Json(kb_handlers::summaries(&articles, query.q)))
}

/// Drafts and unknown slugs are both 404.
pub async fn get_article(
    State(pool): State<DbPool>,
    Path((workspace_slug, slug)): Path<(String, String)>,
) -> Result<Json<KbArticle>, AppError> {
    let workspace_id = workspace_id(&pool, &workspace_slug).await?;
    Ok(Json(
        kb_handlers::published_by_slug(&pool, workspace_id, &slug).await?,
    ))
}

pub async fn list_banners(
    State(pool): State<DbPool>,
    Path(workspace_slug): Path<String>,
) -> Result<Json<Vec<Banner>>, AppError> {
    let workspace_id = workspace_id(&pool, &workspace_slug).await?;
    Ok(Json(settings::visible_banners(&pool, workspace_id).await?))
}
