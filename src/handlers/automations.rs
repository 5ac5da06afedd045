//! Automation rule HTTP handlers.
//!
//! This module implements:
//! - GET/POST /api/v1/automations
//! - GET/PATCH/DELETE /api/v1/automations/{id}
//! - POST /api/v1/automations/{id}/test - Dry run against a ticket
//! - GET /api/v1/automations/{id}/runs - Audit of fired runs
//!
//! Rules are managed by admins; agents may read them and dry-run them.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use sqlx::types::Json as SqlJson;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        automation::{
            Action, Automation, AutomationRun, CreateAutomationRequest, TestAutomationRequest,
            UpdateAutomationRequest, validate_rule,
        },
        required,
    },
    services::{
        automation_engine::{self, Effects, TicketSnapshot},
        ticket_service,
    },
};

/// Result of `POST /api/v1/automations/{id}/test`.
#[derive(Debug, Serialize)]
pub struct AutomationTestResponse {
    pub automation_id: Uuid,
    pub ticket_id: Uuid,
    pub matched: bool,

    /// Actions that would be applied, empty when the rule does not match
    pub actions: Vec<Action>,

    pub before: TicketSnapshot,
    pub after: TicketSnapshot,
    pub effects: Effects,
}

async fn find(pool: &DbPool, workspace_id: Uuid, id: Uuid) -> Result<Automation, AppError> {
    sqlx::query_as::<_, Automation>("SELECT * FROM automations WHERE id = $1 AND workspace_id = $2")
        .bind(id)
        .bind(workspace_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Automation"))
}

/// List automations in evaluation order.
///
/// `GET /api/v1/automations`
pub async fn list_automations(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<Automation>>, AppError> {
    let automations = sqlx::query_as::<_, Automation>(
        r#"
        SELECT * FROM automations
        WHERE workspace_id = $1
        ORDER BY trigger, priority, created_at
        "#,
    )
    .bind(auth.workspace_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(automations))
}

/// Create an automation (admin only).
///
/// # Endpoint
///
/// `POST /api/v1/automations`
///
/// ```json
/// {
///   "name": "Tag refund requests",
///   "trigger": "ticket_created",
///   "conditions": [{ "field": "subject", "operator": "contains", "value": "refund" }],
///   "actions": [{ "type": "add_tag", "tag": "billing" }]
/// }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**
/// - **Error (400)**: no actions, or a condition/action that cannot be evaluated
/// - **Error (422)**: malformed JSON (unknown field, operator or action type)
pub async fn create_automation(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateAutomationRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_admin()?;

    let name = required("name", &request.name)?;
    validate_rule(&request.conditions, &request.actions)?;

    let automation = sqlx::query_as::<_, Automation>(
        r#"
        INSERT INTO automations
            (workspace_id, name, trigger, match_mode, conditions, actions, priority, stop_processing, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(auth.workspace_id)
    .bind(&name)
    .bind(request.trigger)
    .bind(request.match_mode)
    .bind(SqlJson(&request.conditions))
    .bind(SqlJson(&request.actions))
    .bind(request.priority)
    .bind(request.stop_processing)
    .bind(request.is_active)
    .fetch_one(&pool)
    .await?;

    tracing::info!(automation_id = %automation.id, trigger = %automation.trigger, "Automation created");

    Ok((StatusCode::CREATED, Json(automation)))
}

/// `GET /api/v1/automations/{id}`
pub async fn get_automation(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(automation_id): Path<Uuid>,
) -> Result<Json<Automation>, AppError> {
    Ok(Json(find(&pool, auth.workspace_id, automation_id).await?))
}

/// Partially update an automation (admin only).
///
/// `PATCH /api/v1/automations/{id}`
///
/// The merged rule is validated as a whole before saving.
pub async fn update_automation(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(automation_id): Path<Uuid>,
    Json(request): Json<UpdateAutomationRequest>,
) -> Result<Json<Automation>, AppError> {
    auth.require_admin()?;

    let current = find(&pool, auth.workspace_id, automation_id).await?;

    let name = match request.name.as_deref() {
        Some(name) => required("name", name)?,
        None => current.name,
    };
    let conditions = request.conditions.unwrap_or(current.conditions.0);
    let actions = request.actions.unwrap_or(current.actions.0);
    validate_rule(&conditions, &actions)?;

    let automation = sqlx::query_as::<_, Automation>(
        r#"
        UPDATE automations
        SET name = $3,
            trigger = $4,
            match_mode = $5,
            conditions = $6,
            actions = $7,
            priority = $8,
            stop_processing = $9,
            is_active = $10,
            updated_at = NOW()
        WHERE id = $1 AND workspace_id = $2
        RETURNING *
        "#,
    )
    .bind(automation_id)
    .bind(auth.workspace_id)
    .bind(&name)
    .bind(request.trigger.unwrap_or(current.trigger))
    .bind(request.match_mode.unwrap_or(current.match_mode))
    .bind(SqlJson(&conditions))
    .bind(SqlJson(&actions))
    .bind(request.priority.unwrap_or(current.priority))
    .bind(request.stop_processing.unwrap_or(current.stop_processing))
    .bind(request.is_active.unwrap_or(current.is_active))
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Automation"))?;

    Ok(Json(automation))
}

/// `DELETE /api/v1/automations/{id}` (admin only)
pub async fn delete_automation(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(automation_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require_admin()?;

    let result = sqlx::query("DELETE FROM automations WHERE id = $1 AND workspace_id = $2")
        .bind(automation_id)
        .bind(auth.workspace_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Automation"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Dry-run one rule against a ticket.
///
/// # Endpoint
///
/// `POST /api/v1/automations/{id}/test` with `{ "ticket_id": "..." }`
///
/// Evaluates the rule as if its trigger fired for the ticket, ignoring
/// `is_active`, and returns the ticket state before and after. Nothing is
/// persisted and no run is recorded.
pub async fn test_automation(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(automation_id): Path<Uuid>,
    Json(request): Json<TestAutomationRequest>,
) -> Result<Json<AutomationTestResponse>, AppError> {
    let mut automation = find(&pool, auth.workspace_id, automation_id).await?;
    automation.is_active = true;
    let ticket = ticket_service::load(&pool, auth.workspace_id, request.ticket_id).await?;

    let mut conn = pool.acquire().await?;
    let before = ticket_service::snapshot(&mut conn, &ticket).await?;

    let outcome = automation_engine::run(
        automation.trigger,
        before.clone(),
        std::slice::from_ref(&automation),
    );
    let actions = outcome
        .fired
        .into_iter()
        .next()
        .map(|fired| fired.actions)
        .unwrap_or_default();

    Ok(Json(AutomationTestResponse {
        automation_id: automation.id,
        ticket_id: ticket.id,
        matched: !actions.is_empty(),
        actions,
        before,
        after: outcome.snapshot,
        effects: outcome.effects,
    }))
}

/// Runs recorded for an automation, newest first (at most 100).
///
/// `GET /api/v1/automations/{id}/runs`
pub async fn list_automation_runs(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(automation_id): Path<Uuid>,
) -> Result<Json<Vec<AutomationRun>>, AppError> {
    let automation = find(&pool, auth.workspace_id, automation_id).await?;

    let runs = sqlx::query_as::<_, AutomationRun>(
        r#"
        SELECT * FROM automation_runs
        WHERE automation_id = $1
        ORDER BY created_at DESC
        LIMIT 100
        "#,
    )
    .bind(automation.id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(runs))
}
