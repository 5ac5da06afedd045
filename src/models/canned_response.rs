//! Canned response models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A reusable reply template.
///
/// The body may contain placeholders such as `{{contact.name}}`; see
/// `services::canned` for the supported set.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CannedResponse {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub workspace_id: Uuid,
    pub title: String,

    /// Optional short trigger used by agents, e.g. `/refund`
    pub shortcut: Option<String>,

    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCannedResponseRequest {
    pub title: String,
    pub shortcut: Option<String>,
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCannedResponseRequest {
    pub title: Option<String>,
    pub shortcut: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenderCannedResponseRequest {
    pub ticket_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct RenderedCannedResponse {
    pub canned_response_id: Uuid,
    pub ticket_id: Uuid,
    pub body: String,
}
