//! HTTP handlers for webhook endpoint management.
//!
//! Workspace admins register endpoints that receive ticket events
//! (`ticket.created`, `ticket.updated`, `message.created`).

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::db::DbPool;
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::webhook::{WebhookEndpointRequest, WebhookEndpointResponse, WebhookEvent};
use crate::services::webhook_service;

/// Register a new webhook endpoint (admin only).
///
/// # Request Body
///
/// ```json
/// {
///   "url": "https://example.com/helpdesk-hook"
/// }
/// ```
///
/// # Response
///
/// Returns 201 Created with the endpoint. The `secret` is only returned
/// here; receivers use it to verify `X-Webhook-Signature: sha256=<hex>`.
///
/// ```json
/// {
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "url": "https://example.com/helpdesk-hook",
///   "secret": "a1b2c3d4e5f6...",
///   "is_active": true,
///   "created_at": "2025-01-15T10:30:00Z"
/// }
/// ```
///
/// # Security
///
/// - HTTPS URLs required (HTTP localhost allowed for development)
/// - Secret is a 64-character hex string for HMAC-SHA256
pub async fn create_webhook(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<WebhookEndpointRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_admin()?;

    let endpoint =
        webhook_service::create_webhook_endpoint(&pool, auth.workspace_id, request).await?;

    Ok((StatusCode::CREATED, Json(endpoint)))
}

/// List the workspace's active webhook endpoints (secrets NOT included).
///
/// `GET /api/v1/webhooks`
pub async fn list_webhooks(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<WebhookEndpointResponse>>, AppError> {
    auth.require_admin()?;

    let endpoints = webhook_service::list_webhook_endpoints(&pool, auth.workspace_id).await?;

    Ok(Json(endpoints))
}

/// Deactivate a webhook endpoint. Delivery history is kept.
///
/// `DELETE /api/v1/webhooks/{id}` → 204 No Content
pub async fn delete_webhook(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(endpoint_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require_admin()?;

    webhook_service::delete_webhook_endpoint(&pool, auth.workspace_id, endpoint_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// The 50 most recent delivery attempts of an endpoint.
///
/// `GET /api/v1/webhooks/{id}/events`
pub async fn list_webhook_events(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(endpoint_id): Path<Uuid>,
) -> Result<Json<Vec<WebhookEvent>>, AppError> {
    auth.require_admin()?;

    let owned: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM webhook_endpoints WHERE id = $1 AND workspace_id = $2)",
    )
    .bind(endpoint_id)
    .bind(auth.workspace_id)
    .fetch_one(&pool)
    .await?;
    if !owned {
        return Err(AppError::NotFound("Webhook endpoint"));
    }

    let events = sqlx::query_as::<_, WebhookEvent>(
        r#"
        SELECT * FROM webhook_events
        WHERE webhook_endpoint_id = $1
        ORDER BY sent_at DESC
        LIMIT 50
        "#,
    )
    .bind(endpoint_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(events))
}
