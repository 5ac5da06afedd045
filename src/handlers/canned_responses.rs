//! Canned response HTTP handlers.
//!
//! This module implements:
//! - GET/POST /api/v1/canned-responses
//! - GET/PATCH/DELETE /api/v1/canned-responses/{id}
//! - POST /api/v1/canned-responses/{id}/render - Fill placeholders for a ticket

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        canned_response::{
            CannedResponse, CreateCannedResponseRequest, RenderCannedResponseRequest,
            RenderedCannedResponse, UpdateCannedResponseRequest,
        },
        contact::Contact,
        non_blank, required,
        ticket::display_number,
    },
    services::{
        canned::{self, RenderContext},
        ticket_service,
    },
};

async fn find(pool: &DbPool, workspace_id: Uuid, id: Uuid) -> Result<CannedResponse, AppError> {
    sqlx::query_as::<_, CannedResponse>(
        "SELECT * FROM canned_responses WHERE id = $1 AND workspace_id = $2",
    )
    .bind(id)
    .bind(workspace_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Canned response"))
}

/// `GET /api/v1/canned-responses`, ordered by title.
pub async fn list_canned_responses(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<CannedResponse>>, AppError> {
    let responses = sqlx::query_as::<_, CannedResponse>(
        "SELECT * FROM canned_responses WHERE workspace_id = $1 ORDER BY title",
    )
    .bind(auth.workspace_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(responses))
}

/// Create a canned response.
///
/// # Endpoint
///
/// `POST /api/v1/canned-responses`
///
/// ```json
/// {
///   "title": "Refund issued",
///   "shortcut": "/refund",
///   "body": "Hi {{contact.name}}, your refund for {{ticket.number}} is on its way. {{agent.name}}"
/// }
/// ```
pub async fn create_canned_response(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateCannedResponseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let title = required("title", &request.title)?;
    let body = required("body", &request.body)?;

    let response = sqlx::query_as::<_, CannedResponse>(
        r#"
        INSERT INTO canned_responses (workspace_id, title, shortcut, body)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(auth.workspace_id)
    .bind(&title)
    .bind(non_blank(request.shortcut))
    .bind(&body)
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// `GET /api/v1/canned-responses/{id}`
pub async fn get_canned_response(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<CannedResponse>, AppError> {
    Ok(Json(find(&pool, auth.workspace_id, id).await?))
}

/// `PATCH /api/v1/canned-responses/{id}`
pub async fn update_canned_response(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCannedResponseRequest>,
) -> Result<Json<CannedResponse>, AppError> {
    let title = request.title.as_deref().map(|t| required("title", t)).transpose()?;
    let body = request.body.as_deref().map(|b| required("body", b)).transpose()?;

    let response = sqlx::query_as::<_, CannedResponse>(
        r#"
        UPDATE canned_responses
        SET title = COALESCE($3, title),
            shortcut = CASE WHEN $4 THEN $5 ELSE shortcut END,
            body = COALESCE($6, body),
            updated_at = NOW()
        WHERE id = $1 AND workspace_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(auth.workspace_id)
    .bind(title)
    .bind(request.shortcut.is_some())
    .bind(non_blank(request.shortcut))
    .bind(body)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Canned response"))?;

    Ok(Json(response))
}

/// `DELETE /api/v1/canned-responses/{id}`
pub async fn delete_canned_response(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let result = sqlx::query("DELETE FROM canned_responses WHERE id = $1 AND workspace_id = $2")
        .bind(id)
        .bind(auth.workspace_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Canned response"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Render a canned response against a ticket.
///
/// # Endpoint
///
/// `POST /api/v1/canned-responses/{id}/render` with `{ "ticket_id": "..." }`
///
/// # Response
///
/// ```json
/// { "canned_response_id": "...", "ticket_id": "...", "body": "Hi Jane, your refund for TKT-000042 ..." }
/// ```
///
/// Nothing is sent; the agent posts the rendered body as a message.
pub async fn render_canned_response(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<RenderCannedResponseRequest>,
) -> Result<Json<RenderedCannedResponse>, AppError> {
    let template = find(&pool, auth.workspace_id, id).await?;
    let ticket = ticket_service::load(&pool, auth.workspace_id, request.ticket_id).await?;
    let prefix = ticket_service::ticket_prefix(&pool, auth.workspace_id).await?;

    let contact = match ticket.contact_id {
        Some(contact_id) => {
            sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = $1")
                .bind(contact_id)
                .fetch_optional(&pool)
                .await?
        }
        None => None,
    };

    let context = RenderContext {
        ticket_number: display_number(&prefix, ticket.number),
        ticket_subject: ticket.subject.clone(),
        contact_name: contact.as_ref().map(|c| c.name.clone()),
        contact_email: contact.map(|c| c.email),
        agent_name: auth.user_name.clone(),
    };

    Ok(Json(RenderedCannedResponse {
        canned_response_id: template.id,
        ticket_id: ticket.id,
        body: canned::render(&template.body, &context),
    }))
}
