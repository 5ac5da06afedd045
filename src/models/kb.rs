//! Knowledge base article models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    pub enum ArticleStatus {
        Draft => "draft",
        Published => "published",
    }
}

/// A help-center document. Only `published` articles are visible in the
/// portal and the public help center.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct KbArticle {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub workspace_id: Uuid,
    pub title: String,
    pub slug: String,
    pub body: String,
    pub status: ArticleStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateArticleRequest {
    pub title: String,

    /// Derived from the title when absent
    pub slug: Option<String>,

    pub body: String,

    #[serde(default)]
    pub publish: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateArticleRequest {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArticleListQuery {
    pub status: Option<ArticleStatus>,

    /// Keyword search; results are ordered by relevance when present
    pub q: Option<String>,
}

/// Article summary returned by list/search endpoints.
#[derive(Debug, Serialize)]
pub struct ArticleSummary {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub status: ArticleStatus,
    pub published_at: Option<DateTime<Utc>>,

    /// Relevance score, present for keyword searches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,
}

impl From<&KbArticle> for ArticleSummary {
    fn from(article: &KbArticle) -> Self {
        Self {
            id: article.id,
            title: article.title.clone(),
            slug: article.slug.clone(),
            status: article.status,
            published_at: article.published_at,
            score: None,
        }
    }
}
