//! Ticket data models and API request/response types.
//!
//! This module defines:
//! - `Ticket`: the `tickets` row
//! - `TicketMessage`: replies and internal notes on a ticket
//! - `Tag`: workspace-scoped labels attached through `ticket_tags`
//! - request bodies for the ticket endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::double_option;
use crate::services::sla::SlaState;

text_enum! {
    /// Ticket lifecycle status.
    pub enum TicketStatus {
        Open => "open",
        /// Waiting on the customer
        Pending => "pending",
        Resolved => "resolved",
        /// Terminal; customers cannot reply to a closed ticket
        Closed => "closed",
    }
}

text_enum! {
    pub enum Priority {
        Low => "low",
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
}

text_enum! {
    /// Channel a ticket arrived through.
    pub enum ChannelKind {
        Email => "email",
        Web => "web",
        Chat => "chat",
        Api => "api",
        Phone => "phone",
    }
}

text_enum! {
    /// Who wrote a ticket message.
    pub enum AuthorKind {
        Agent => "agent",
        Contact => "contact",
        Automation => "automation",
        Ai => "ai",
    }
}

impl TicketStatus {
    /// Resolved and closed tickets no longer count against SLAs or queues.
    pub fn is_done(&self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }
}

/// Represents a ticket record from the database.
///
/// `number` is allocated per workspace from `workspaces.ticket_counter`,
/// so numbers are dense and never reused within a workspace.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Ticket {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub workspace_id: Uuid,
    pub number: i64,
    pub subject: String,
    pub description: Option<String>,
    pub status: TicketStatus,
    pub priority: Priority,
    pub channel: ChannelKind,
    pub contact_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub first_response_due_at: Option<DateTime<Utc>>,
    pub resolution_due_at: Option<DateTime<Utc>>,
    pub first_response_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A reply or internal note on a ticket.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct TicketMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub author_kind: AuthorKind,
    pub author_id: Option<Uuid>,
    pub body: String,

    /// Internal notes are visible to agents only, never in the portal
    pub is_internal: bool,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Tag {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub workspace_id: Uuid,
    pub name: String,
    pub color: Option<String>,
}

/// Format a display number like `TKT-000042`.
pub fn display_number(prefix: &str, number: i64) -> String {
    format!("{prefix}-{number:06}")
}

/// Normalize a tag name: trimmed and lowercased.
pub fn normalize_tag(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Request body for `POST /api/v1/tickets`.
///
/// ```json
/// {
///   "subject": "Cannot log in",
///   "description": "Password reset mail never arrives",
///   "priority": "high",
///   "contact_id": "550e8400-e29b-41d4-a716-446655440000",
///   "tags": ["login"]
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub subject: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub channel: Option<ChannelKind>,
    pub contact_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Partial update for `PATCH /api/v1/tickets/{id}`.
///
/// `assignee_id: null` unassigns; an absent field leaves it unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTicketRequest {
    pub subject: Option<String>,
    pub description: Option<String>,
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub channel: Option<ChannelKind>,
    #[serde(default, deserialize_with = "double_option")]
    pub assignee_id: Option<Option<Uuid>>,
}

/// Request body for `POST /api/v1/tickets/{id}/messages`.
#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub body: String,

    #[serde(default)]
    pub is_internal: bool,

    /// Optional status change applied with the reply ("reply and set pending")
    pub status: Option<TicketStatus>,
}

/// Query parameters for `GET /api/v1/tickets`.
#[derive(Debug, Default, Deserialize)]
pub struct TicketListQuery {
    pub status: Option<TicketStatus>,
    pub priority: Option<Priority>,
    pub assignee_id: Option<Uuid>,
    pub contact_id: Option<Uuid>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Request body for `POST /portal/v1/tickets`.
#[derive(Debug, Deserialize)]
pub struct PortalTicketRequest {
    pub subject: String,
    pub body: String,
}

/// Customer reply from the portal.
#[derive(Debug, Deserialize)]
pub struct PortalReplyRequest {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct TagRequest {
    pub name: String,
    pub color: Option<String>,
}

/// Ticket with its tags, as returned by list and single-ticket endpoints.
#[derive(Debug, Serialize)]
pub struct TicketResponse {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub display_number: String,
    pub tags: Vec<String>,
    pub sla: SlaState,
}

/// Ticket together with its conversation.
#[derive(Debug, Serialize)]
pub struct TicketDetail {
    #[serde(flatten)]
    pub ticket: TicketResponse,
    pub messages: Vec<TicketMessage>,
}

/// Counts returned by `GET /api/v1/tickets/stats`.
#[derive(Debug, Default, Serialize, sqlx::FromRow)]
pub struct TicketStats {
    pub total: i64,
    pub open: i64,
    pub pending: i64,
    pub resolved: i64,
    pub closed: i64,
    pub unassigned: i64,
    pub overdue: i64,
}
