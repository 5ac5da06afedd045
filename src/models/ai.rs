//! AI-agent assist models.
//!
//! An AI agent proposes `Action`s on tickets. Each proposal is stored as
//! an `AiAction` and either executed immediately (auto-approved by the
//! workspace's `AiSettings`) or left `pending` for an agent to approve or
//! reject.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use super::automation::Action;

text_enum! {
    pub enum AiActionStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Executed => "executed",
    }
}

/// Per-workspace AI configuration from the `ai_settings` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AiSettings {
    pub workspace_id: Uuid,

    /// When false, proposals are refused outright
    pub enabled: bool,

    /// Minimum confidence for auto-approval, in `[0, 1]`
    pub auto_approve_threshold: f64,

    /// Action kinds eligible for auto-approval (see `Action::KINDS`)
    pub auto_approve_kinds: Vec<String>,

    pub updated_at: DateTime<Utc>,
}

impl AiSettings {
    pub const DEFAULT_THRESHOLD: f64 = 0.9;

    /// Settings used for a workspace that has never saved any.
    pub fn defaults(workspace_id: Uuid) -> Self {
        Self {
            workspace_id,
            enabled: true,
            auto_approve_threshold: Self::DEFAULT_THRESHOLD,
            auto_approve_kinds: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateAiSettingsRequest {
    pub enabled: Option<bool>,
    pub auto_approve_threshold: Option<f64>,
    pub auto_approve_kinds: Option<Vec<String>>,
}

/// A proposed action from the `ai_actions` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AiAction {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub workspace_id: Uuid,
    pub ticket_id: Uuid,

    /// Mirrors `action.kind()` for filtering
    pub kind: String,

    pub action: Json<Action>,
    pub confidence: Option<f64>,
    pub rationale: Option<String>,
    pub status: AiActionStatus,
    pub decided_by: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /api/v1/tickets/{id}/ai/actions`.
///
/// ```json
/// {
///   "action": { "type": "add_tag", "tag": "billing" },
///   "confidence": 0.97,
///   "rationale": "Customer mentions an invoice number"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct ProposeActionRequest {
    pub action: Action,
    pub confidence: Option<f64>,
    pub rationale: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AiActionListQuery {
    pub status: Option<AiActionStatus>,
}
