//! AI-agent assist handlers.
//!
//! This module implements:
//! - GET/PATCH /api/v1/ai/settings
//! - POST /api/v1/tickets/{id}/ai/actions - Propose an action
//! - GET /api/v1/tickets/{id}/ai/actions - Proposals for a ticket
//! - POST /api/v1/tickets/{id}/ai/draft - Draft a reply (always pending)
//! - GET /api/v1/ai/actions - Proposals across the workspace
//! - POST /api/v1/ai/actions/{id}/approve, POST /api/v1/ai/actions/{id}/reject

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
    models::ai::{AiAction, AiActionListQuery, AiSettings, ProposeActionRequest, UpdateAiSettingsRequest},
    services::{ai_service, ticket_service},
    state::AppState,
};

/// `GET /api/v1/ai/settings`
pub async fn get_settings(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<AiSettings>, AppError> {
    Ok(Json(ai_service::load_settings(&pool, auth.workspace_id).await?))
}

/// Update AI settings (admin only).
///
/// # Endpoint
///
/// `PATCH /api/v1/ai/settings`
///
/// ```json
/// { "enabled": true, "auto_approve_threshold": 0.95, "auto_approve_kinds": ["add_tag", "set_priority"] }
/// ```
///
/// The threshold must be within `[0, 1]` and every kind must be an action
/// kind; otherwise 400.
pub async fn update_settings(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<UpdateAiSettingsRequest>,
) -> Result<Json<AiSettings>, AppError> {
    auth.require_admin()?;
    Ok(Json(
        ai_service::save_settings(&pool, auth.workspace_id, request).await?,
    ))
}

/// Propose an action on a ticket.
///
/// # Endpoint
///
/// `POST /api/v1/tickets/{id}/ai/actions`
///
/// ```json
/// {
///   "action": { "type": "set_priority", "priority": "urgent" },
///   "confidence": 0.97,
///   "rationale": "Customer reports a production outage"
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**: `status` is `executed` when auto-approved,
///   `pending` otherwise
/// - **Error (409)**: AI assist is disabled for the workspace
/// - **Error (400)**: invalid action or confidence outside `[0, 1]`
pub async fn propose_action(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(ticket_id): Path<Uuid>,
    Json(request): Json<ProposeActionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let action = ai_service::propose(&state, &auth, ticket_id, request).await?;
    Ok((StatusCode::CREATED, Json(action)))
}

/// Proposals for one ticket, newest first.
///
/// `GET /api/v1/tickets/{id}/ai/actions?status=pending`
pub async fn list_ticket_actions(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(ticket_id): Path<Uuid>,
    Query(query): Query<AiActionListQuery>,
) -> Result<Json<Vec<AiAction>>, AppError> {
    let ticket = ticket_service::load(&pool, auth.workspace_id, ticket_id).await?;
    let actions = ai_service::list(&pool, auth.workspace_id, Some(ticket.id), &query).await?;
    Ok(Json(actions))
}

/// Proposals across the workspace, newest first.
///
/// `GET /api/v1/ai/actions?status=pending`
pub async fn list_actions(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<AiActionListQuery>,
) -> Result<Json<Vec<AiAction>>, AppError> {
    Ok(Json(
        ai_service::list(&pool, auth.workspace_id, None, &query).await?,
    ))
}

/// Draft a reply for a ticket.
///
/// # Endpoint
///
/// `POST /api/v1/tickets/{id}/ai/draft`
///
/// # Response
///
/// - **Success (201 Created)**: a pending `send_reply` proposal
/// - **Error (422)**: no AI provider configured and no article matches
/// - **Error (502)**: the AI provider failed
pub async fn draft_reply(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(ticket_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let action = ai_service::draft(&state, &auth, ticket_id).await?;
    Ok((StatusCode::CREATED, Json(action)))
}

/// Execute a pending proposal.
///
/// `POST /api/v1/ai/actions/{id}/approve`
///
/// Returns 409 when the proposal was already decided.
pub async fn approve_action(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(action_id): Path<Uuid>,
) -> Result<Json<AiAction>, AppError> {
    Ok(Json(ai_service::approve(&state, &auth, action_id).await?))
}

/// `POST /api/v1/ai/actions/{id}/reject`
pub async fn reject_action(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(action_id): Path<Uuid>,
) -> Result<Json<AiAction>, AppError> {
    Ok(Json(ai_service::reject(&pool, &auth, action_id).await?))
}
