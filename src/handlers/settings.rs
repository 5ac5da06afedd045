//! Admin configuration handlers: channels, SLA policies and banners.
//!
//! This module implements:
//! - GET/POST /api/v1/channels, PATCH/DELETE /api/v1/channels/{id}
//! - GET/POST /api/v1/sla-policies, PATCH/DELETE /api/v1/sla-policies/{id}
//! - GET/POST /api/v1/banners, PATCH/DELETE /api/v1/banners/{id}
//!
//! Any agent may read; changes require the admin role.

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
        non_blank, required,
        settings::{
            Banner, Channel, CreateBannerRequest, CreateChannelRequest, CreateSlaPolicyRequest,
            SlaPolicy, UpdateBannerRequest, UpdateChannelRequest, UpdateSlaPolicyRequest,
        },
    },
};

fn validate_minutes(field: &str, minutes: i32) -> Result<(), AppError> {
    if minutes <= 0 {
        return Err(AppError::InvalidRequest(format!(
            "{field} must be a positive number of minutes"
        )));
    }
    Ok(())
}

fn validate_window(
    starts_at: Option<chrono::DateTime<chrono::Utc>>,
    ends_at: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<(), AppError> {
    if let (Some(start), Some(end)) = (starts_at, ends_at) {
        if end <= start {
            return Err(AppError::InvalidRequest(
                "ends_at must be after starts_at".to_string(),
            ));
        }
    }
    Ok(())
}

/// `GET /api/v1/channels`
pub async fn list_channels(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<Channel>>, AppError> {
    let channels = sqlx::query_as::<_, Channel>(
        "SELECT * FROM channels WHERE workspace_id = $1 ORDER BY kind, name",
    )
    .bind(auth.workspace_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(channels))
}

/// Register a channel (admin only).
///
/// `POST /api/v1/channels` with `{ "kind": "email", "name": "Support inbox", "address": "help@acme.test" }`
pub async fn create_channel(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateChannelRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_admin()?;
    let name = required("name", &request.name)?;

    let channel = sqlx::query_as::<_, Channel>(
        r#"
        INSERT INTO channels (workspace_id, kind, name, address)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(auth.workspace_id)
    .bind(request.kind)
    .bind(&name)
    .bind(non_blank(request.address))
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(channel)))
}

/// `PATCH /api/v1/channels/{id}` (admin only)
pub async fn update_channel(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(channel_id): Path<Uuid>,
    Json(request): Json<UpdateChannelRequest>,
) -> Result<Json<Channel>, AppError> {
    auth.require_admin()?;
    let name = request.name.as_deref().map(|n| required("name", n)).transpose()?;

    let channel = sqlx::query_as::<_, Channel>(
        r#"
        UPDATE channels
        SET name = COALESCE($3, name),
            address = CASE WHEN $4 THEN $5 ELSE address END,
            is_active = COALESCE($6, is_active)
        WHERE id = $1 AND workspace_id = $2
        RETURNING *
        "#,
    )
    .bind(channel_id)
    .bind(auth.workspace_id)
    .bind(name)
    .bind(request.address.is_some())
    .bind(non_blank(request.address))
    .bind(request.is_active)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Channel"))?;

    Ok(Json(channel))
}

/// `DELETE /api/v1/channels/{id}` (admin only)
pub async fn delete_channel(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(channel_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require_admin()?;

    let result = sqlx::query("DELETE FROM channels WHERE id = $1 AND workspace_id = $2")
        .bind(channel_id)
        .bind(auth.workspace_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Channel"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/v1/sla-policies`
pub async fn list_sla_policies(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<SlaPolicy>>, AppError> {
    let policies = sqlx::query_as::<_, SlaPolicy>(
        "SELECT * FROM sla_policies WHERE workspace_id = $1 ORDER BY priority, updated_at DESC",
    )
    .bind(auth.workspace_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(policies))
}

/// Create an SLA policy (admin only).
///
/// # Endpoint
///
/// `POST /api/v1/sla-policies`
///
/// ```json
/// { "name": "Urgent", "priority": "urgent", "first_response_minutes": 30, "resolution_minutes": 240 }
/// ```
///
/// Targets apply to tickets created (or re-prioritized) after the change;
/// existing due times are not recomputed.
pub async fn create_sla_policy(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateSlaPolicyRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_admin()?;
    let name = required("name", &request.name)?;
    validate_minutes("first_response_minutes", request.first_response_minutes)?;
    validate_minutes("resolution_minutes", request.resolution_minutes)?;

    let policy = sqlx::query_as::<_, SlaPolicy>(
        r#"
        INSERT INTO sla_policies (workspace_id, name, priority, first_response_minutes, resolution_minutes)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(auth.workspace_id)
    .bind(&name)
    .bind(request.priority)
    .bind(request.first_response_minutes)
    .bind(request.resolution_minutes)
    .fetch_one(&pool)
    .await?;

    tracing::info!(sla_policy_id = %policy.id, priority = %policy.priority, "SLA policy created");

    Ok((StatusCode::CREATED, Json(policy)))
}

/// `PATCH /api/v1/sla-policies/{id}` (admin only)
pub async fn update_sla_policy(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(policy_id): Path<Uuid>,
    Json(request): Json<UpdateSlaPolicyRequest>,
) -> Result<Json<SlaPolicy>, AppError> {
    auth.require_admin()?;
    let name = request.name.as_deref().map(|n| required("name", n)).transpose()?;
    if let Some(minutes) = request.first_response_minutes {
        validate_minutes("first_response_minutes", minutes)?;
    }
    if let Some(minutes) = request.resolution_minutes {
        validate_minutes("resolution_minutes", minutes)?;
    }

    let policy = sqlx::query_as::<_, SlaPolicy>(
        r#"
        UPDATE sla_policies
        SET name = COALESCE($3, name),
            first_response_minutes = COALESCE($4, first_response_minutes),
            resolution_minutes = COALESCE($5, resolution_minutes),
            is_active = COALESCE($6, is_active),
            updated_at = NOW()
        WHERE id = $1 AND workspace_id = $2
        RETURNING *
        "#,
    )
    .bind(policy_id)
    .bind(auth.workspace_id)
    .bind(name)
    .bind(request.first_response_minutes)
    .bind(request.resolution_minutes)
    .bind(request.is_active)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("SLA policy"))?;

    Ok(Json(policy))
}

/// `DELETE /api/v1/sla-policies/{id}` (admin only)
pub async fn delete_sla_policy(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(policy_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require_admin()?;

    let result = sqlx::query("DELETE FROM sla_policies WHERE id = $1 AND workspace_id = $2")
        .bind(policy_id)
        .bind(auth.workspace_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("SLA policy"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// All banners, including inactive and scheduled ones.
///
/// `GET /api/v1/banners`
pub async fn list_banners(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<Banner>>, AppError> {
    let banners = sqlx::query_as::<_, Banner>(
        "SELECT * FROM banners WHERE workspace_id = $1 ORDER BY created_at DESC",
    )
    .bind(auth.workspace_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(banners))
}

/// Create a banner (admin only).
///
/// # Endpoint
///
/// `POST /api/v1/banners`
///
/// ```json
/// {
///   "message": "Scheduled maintenance on Sunday 02:00 UTC",
///   "level": "warning",
///   "starts_at": "2025-03-01T00:00:00Z",
///   "ends_at": "2025-03-02T06:00:00Z"
/// }
/// ```
///
/// The banner is shown while active and `starts_at <= now < ends_at`;
/// either bound may be omitted.
pub async fn create_banner(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateBannerRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_admin()?;
    let message = required("message", &request.message)?;
    validate_window(request.starts_at, request.ends_at)?;

    let banner = sqlx::query_as::<_, Banner>(
        r#"
        INSERT INTO banners (workspace_id, message, level, starts_at, ends_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(auth.workspace_id)
    .bind(&message)
    .bind(request.level)
    .bind(request.starts_at)
    .bind(request.ends_at)
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(banner)))
}

/// `PATCH /api/v1/banners/{id}` (admin only)
pub async fn update_banner(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(banner_id): Path<Uuid>,
    Json(request): Json<UpdateBannerRequest>,
) -> Result<Json<Banner>, AppError> {
    auth.require_admin()?;
    let message = request
        .message
        .as_deref()
        .map(|m| required("message", m))
        .transpose()?;

    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, Banner>(
        "SELECT * FROM banners WHERE id = $1 AND workspace_id = $2 FOR UPDATE",
    )
    .bind(banner_id)
    .bind(auth.workspace_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Banner"))?;

    let starts_at = request.starts_at.or(current.starts_at);
    let ends_at = request.ends_at.or(current.ends_at);
    validate_window(starts_at, ends_at)?;

    let banner = sqlx::query_as::<_, Banner>(
        r#"
        UPDATE banners
        SET message = COALESCE($2, message),
            level = COALESCE($3, level),
            starts_at = $4,
            ends_at = $5,
            is_active = COALESCE($6, is_active)
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(current.id)
    .bind(message)
    .bind(request.level)
    .bind(starts_at)
    .bind(ends_at)
    .bind(request.is_active)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Json(banner))
}

/// `DELETE /api/v1/banners/{id}` (admin only)
pub async fn delete_banner(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(banner_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require_admin()?;

    let result = sqlx::query("DELETE FROM banners WHERE id = $1 AND workspace_id = $2")
        .bind(banner_id)
        .bind(auth.workspace_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Banner"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Banners visible right now, most recent first.
pub(crate) async fn visible_banners(pool: &DbPool, workspace_id: Uuid) -> Result<Vec<Banner>, AppError> {
    let banners = sqlx::query_as::<_, Banner>(
        "SELECT * FROM banners WHERE workspace_id = $1 AND is_active = true ORDER BY created_at DESC",
    )
    .bind(workspace_id)
    .fetch_all(pool)
    .await?;

    let now = chrono::Utc::now();
    Ok(banners.into_iter().filter(|b| b.is_visible_at(now)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn minutes_must_be_positive() {
        assert!(validate_minutes("resolution_minutes", 60).is_ok());
        assert!(matches!(
            validate_minutes("resolution_minutes", 0),
            Err(AppError::InvalidRequest(_))
        ));
    }

    #[test]
    fn banner_window_must_not_be_inverted() {
        let now = Utc::now();
        assert!(validate_window(Some(now), Some(now + Duration::hours(2))).is_ok());
        assert!(validate_window(None, Some(now)).is_ok());
        assert!(validate_window(Some(now), Some(now)).is_err());
    }
}
