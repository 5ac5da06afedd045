//! Webhook models for endpoint registration and event delivery.
//!
//! # Webhook Flow
//!
//! 1. An admin registers an endpoint via `POST /api/v1/webhooks`
//! 2. The system generates a secret for HMAC signature verification
//! 3. Ticket events are POSTed to every active endpoint of the workspace
//! 4. Receivers verify the `X-Webhook-Signature` header with the secret

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::ticket::{Ticket, TicketMessage};

text_enum! {
    pub enum EventType {
        TicketCreated => "ticket.created",
        TicketUpdated => "ticket.updated",
        MessageCreated => "message.created",
    }
}

/// Webhook endpoint registered by a workspace admin.
///
/// The `secret` is stored in plaintext (required for HMAC generation)
/// but never returned in list operations.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub url: String,
    pub secret: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Request to register a new webhook endpoint.
///
/// - URL must be HTTPS (HTTP allowed for localhost in development)
/// - URL must not exceed 2048 characters
#[derive(Debug, Deserialize)]
pub struct WebhookEndpointRequest {
    pub url: String,
}

/// Response when registering or listing webhook endpoints.
///
/// The `secret` field is ONLY included when creating a new endpoint.
#[derive(Debug, Serialize)]
pub struct WebhookEndpointResponse {
    pub id: Uuid,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<WebhookEndpoint> for WebhookEndpointResponse {
    fn from(endpoint: WebhookEndpoint) -> Self {
        Self {
            id: endpoint.id,
            url: endpoint.url,
            secret: None,
            is_active: endpoint.is_active,
            created_at: endpoint.created_at,
        }
    }
}

impl WebhookEndpointResponse {
    /// Create response with secret included (only for registration).
    pub fn with_secret(mut self, secret: String) -> Self {
        self.secret = Some(secret);
        self
    }
}

/// One delivery attempt from the `webhook_events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub webhook_endpoint_id: Uuid,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub sent_at: DateTime<Utc>,

    /// `None` when the request never got a response (timeout, DNS, ...)
    pub response_status: Option<i32>,
    pub response_body: Option<String>,
}

/// Webhook payload sent to the registered endpoint.
///
/// # Example
///
/// ```json
/// {
///   "event_type": "ticket.created",
///   "event_id": "550e8400-e29b-41d4-a716-446655440000",
///   "created_at": "2025-01-15T10:30:00Z",
///   "data": {
///     "ticket": { "id": "...", "number": 42, "status": "open", ... }
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct WebhookPayload {
    pub event_type: EventType,
    pub event_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub data: WebhookData,
}

/// Data portion of the webhook payload.
#[derive(Debug, Serialize)]
pub struct WebhookData {
    pub ticket: Ticket,

    /// Present for `message.created`; internal notes are never delivered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<TicketMessage>,
}

impl WebhookPayload {
    pub fn new(event_type: EventType, ticket: Ticket, message: Option<TicketMessage>) -> Self {
        Self {
            event_type,
            event_id: Uuid::new_v4(),
            created_at: Utc::now(),
            data: WebhookData { ticket, message },
        }
    }
}
