//! Ticket HTTP handlers for agents.
//!
//! This module implements:
//! - POST /api/v1/tickets - Create ticket
//! - GET /api/v1/tickets - List tickets with filters
//! - GET /api/v1/tickets/stats - Dashboard counts
//! - GET /api/v1/sla/breaches - Unresolved tickets past an SLA target
//! - GET/PATCH/DELETE /api/v1/tickets/{id}
//! - POST /api/v1/tickets/{id}/messages - Reply or internal note
//! - POST /api/v1/tickets/{id}/tags, DELETE /api/v1/tickets/{id}/tags/{name}
//! - GET/POST /api/v1/tags, PATCH/DELETE /api/v1/tags/{id}

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
        ticket::{
            ChannelKind, CreateMessageRequest, CreateTicketRequest, Priority, Tag, TagRequest,
            TicketDetail, TicketListQuery, TicketResponse, TicketStats, UpdateTicketRequest,
            normalize_tag,
        },
        webhook::EventType,
    },
    services::{
        ticket_service::{self, NewTicket},
        webhook_service,
    },
    state::AppState,
};

/// Create a ticket.
///
/// # Endpoint
///
/// `POST /api/v1/tickets`
///
/// # Request Body
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
///
/// # Response
///
/// - **Success (201 Created)**: the ticket after `ticket_created` automations
/// - **Error (400)**: blank subject or assignee not an active user
/// - **Error (404)**: contact not in this workspace
pub async fn create_ticket(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateTicketRequest>,
) -> Result<impl IntoResponse, AppError> {
    let ticket = ticket_service::create(
        &state,
        auth.workspace_id,
        NewTicket {
            subject: request.subject,
            description: request.description,
            priority: request.priority.unwrap_or(Priority::Normal),
            channel: request.channel.unwrap_or(ChannelKind::Api),
            contact_id: request.contact_id,
            assignee_id: request.assignee_id,
            tags: request.tags,
            first_message: None,
        },
    )
    .await?;

    let response = ticket_service::to_response(&state.pool, ticket).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// List tickets.
///
/// # Endpoint
///
/// `GET /api/v1/tickets?status=open&priority=high&tag=billing&search=refund&limit=50&offset=0`
///
/// Every filter is optional. `search` matches subject and description
/// case-insensitively. `limit` defaults to 50 and is capped at 200.
/// Results are newest first.
pub async fn list_tickets(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<TicketListQuery>,
) -> Result<Json<Vec<TicketResponse>>, AppError> {
    let tickets = ticket_service::list(&pool, auth.workspace_id, &query).await?;
    let responses = ticket_service::to_responses(&pool, auth.workspace_id, tickets).await?;
    Ok(Json(responses))
}

/// Get a ticket with tags, SLA state and the full conversation including
/// internal notes.
///
/// `GET /api/v1/tickets/{id}`
///
/// Returns 404 if the ticket doesn't exist OR belongs to another workspace.
pub async fn get_ticket(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<TicketDetail>, AppError> {
    let ticket = ticket_service::load(&pool, auth.workspace_id, ticket_id).await?;
    let detail = ticket_service::detail(&pool, ticket, true).await?;
    Ok(Json(detail))
}

/// Partially update a ticket.
///
/// # Endpoint
///
/// `PATCH /api/v1/tickets/{id}`
///
/// ```json
/// { "status": "resolved", "assignee_id": null }
/// ```
///
/// `assignee_id: null` unassigns; absent fields are left unchanged.
pub async fn update_ticket(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(ticket_id): Path<Uuid>,
    Json(request): Json<UpdateTicketRequest>,
) -> Result<Json<TicketResponse>, AppError> {
    let ticket = ticket_service::update(&state, auth.workspace_id, ticket_id, request).await?;
    Ok(Json(ticket_service::to_response(&state.pool, ticket).await?))
}

/// Delete a ticket (admin only).
///
/// `DELETE /api/v1/tickets/{id}` → 204 No Content
pub async fn delete_ticket(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(ticket_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require_admin()?;
    ticket_service::delete(&pool, auth.workspace_id, ticket_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Reply to the customer or add an internal note.
///
/// # Endpoint
///
/// `POST /api/v1/tickets/{id}/messages`
///
/// ```json
/// { "body": "We've issued the refund.", "is_internal": false, "status": "resolved" }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: the stored message
pub async fn create_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(ticket_id): Path<Uuid>,
    Json(request): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let message = ticket_service::add_agent_message(&state, &auth, ticket_id, request).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Notify webhooks that a ticket's tags changed.
async fn notify_updated(state: &AppState, workspace_id: Uuid, ticket_id: Uuid) -> Result<(), AppError> {
    let ticket = ticket_service::load(&state.pool, workspace_id, ticket_id).await?;
    webhook_service::notify(state, EventType::TicketUpdated, &ticket, None);
    Ok(())
}

/// Attach a tag by name, creating the tag if needed. Returns the ticket's tags.
///
/// `POST /api/v1/tickets/{id}/tags` with `{ "name": "billing" }`
pub async fn add_ticket_tag(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(ticket_id): Path<Uuid>,
    Json(request): Json<TagRequest>,
) -> Result<Json<Vec<String>>, AppError> {
    let tags =
        ticket_service::add_tag(&state.pool, auth.workspace_id, ticket_id, &request.name).await?;
    notify_updated(&state, auth.workspace_id, ticket_id).await?;
    Ok(Json(tags))
}

/// `DELETE /api/v1/tickets/{id}/tags/{name}`
pub async fn remove_ticket_tag(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path((ticket_id, name)): Path<(Uuid, String)>,
) -> Result<Json<Vec<String>>, AppError> {
    let tags = ticket_service::remove_tag(&state.pool, auth.workspace_id, ticket_id, &name).await?;
    notify_updated(&state, auth.workspace_id, ticket_id).await?;
    Ok(Json(tags))
}

/// Ticket counts per status plus unassigned and overdue counts.
///
/// `GET /api/v1/tickets/stats`
///
/// ```json
/// { "total": 120, "open": 30, "pending": 12, "resolved": 60, "closed": 18, "unassigned": 9, "overdue": 4 }
/// ```
pub async fn ticket_stats(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<TicketStats>, AppError> {
    Ok(Json(ticket_service::stats(&pool, auth.workspace_id).await?))
}

/// Open and pending tickets whose SLA is breached.
///
/// `GET /api/v1/sla/breaches`
pub async fn sla_breaches(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<TicketResponse>>, AppError> {
    let tickets = ticket_service::breaches(&pool, auth.workspace_id).await?;
    Ok(Json(
        ticket_service::to_responses(&pool, auth.workspace_id, tickets).await?,
    ))
}

/// List the workspace's tags.
///
/// `GET /api/v1/tags`
pub async fn list_tags(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<Tag>>, AppError> {
    let tags = sqlx::query_as::<_, Tag>("SELECT * FROM tags WHERE workspace_id = $1 ORDER BY name")
        .bind(auth.workspace_id)
        .fetch_all(&pool)
        .await?;
    Ok(Json(tags))
}

/// Create a tag (admin only). Names are stored trimmed and lowercased.
///
/// `POST /api/v1/tags` with `{ "name": "VIP", "color": "#d97706" }`
pub async fn create_tag(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<TagRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_admin()?;

    let name = normalize_tag(&request.name);
    if name.is_empty() {
        return Err(AppError::InvalidRequest("name must not be empty".to_string()));
    }

    let tag = sqlx::query_as::<_, Tag>(
        "INSERT INTO tags (workspace_id, name, color) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(auth.workspace_id)
    .bind(&name)
    .bind(request.color)
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(tag)))
}

/// Rename or recolor a tag (admin only).
///
/// `PATCH /api/v1/tags/{id}`
pub async fn update_tag(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(tag_id): Path<Uuid>,
    Json(request): Json<TagRequest>,
) -> Result<Json<Tag>, AppError> {
    auth.require_admin()?;

    let name = normalize_tag(&request.name);
    if name.is_empty() {
        return Err(AppError::InvalidRequest("name must not be empty".to_string()));
    }

    let tag = sqlx::query_as::<_, Tag>(
        r#"
        UPDATE tags SET name = $3, color = $4
        WHERE id = $1 AND workspace_id = $2
        RETURNING *
        "#,
    )
    .bind(tag_id)
    .bind(auth.workspace_id)
    .bind(&name)
    .bind(request.color)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Tag"))?;

    Ok(Json(tag))
}

/// Delete a tag and detach it from every ticket (admin only).
///
/// `DELETE /api/v1/tags/{id}`
pub async fn delete_tag(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(tag_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require_admin()?;

    let result = sqlx::query("DELETE FROM tags WHERE id = $1 AND workspace_id = $2")
        .bind(tag_id)
        .bind(auth.workspace_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Tag"));
    }
    Ok(StatusCode::NO_CONTENT)
}
