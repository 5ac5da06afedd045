//! App registry and installation handlers.
//!
//! This module implements:
//! - GET /api/v1/apps - Built-in registry
//! - GET/POST /api/v1/apps/installed, PATCH/DELETE /api/v1/apps/installed/{id}
//! - GET /api/v1/apps/slots/{slot} - Enabled apps rendering in a UI slot

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
    models::settings::{InstallAppRequest, InstalledApp, UpdateInstalledAppRequest},
    services::app_registry::{self, AppDefinition, Slot, SlotApp},
};

/// Every app that can be installed.
///
/// `GET /api/v1/apps`
pub async fn list_registry() -> Json<&'static [AppDefinition]> {
    Json(app_registry::APPS)
}

/// Apps installed in the workspace (admin only; configs may hold credentials).
///
/// `GET /api/v1/apps/installed`
pub async fn list_installed(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<InstalledApp>>, AppError> {
    auth.require_admin()?;

    let apps = sqlx::query_as::<_, InstalledApp>(
        "SELECT * FROM installed_apps WHERE workspace_id = $1 ORDER BY installed_at",
    )
    .bind(auth.workspace_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(apps))
}

/// Install an app (admin only).
///
/// # Endpoint
///
/// `POST /api/v1/apps/installed`
///
/// ```json
/// { "app_id": "jira-link", "config": { "base_url": "https://acme.atlassian.net", "project_key": "SUP" } }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**
/// - **Error (400)**: unknown app or missing required config keys
/// - **Error (409)**: app already installed in this workspace
pub async fn install_app(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<InstallAppRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_admin()?;

    let app = app_registry::require(request.app_id.trim())?;
    app_registry::validate_install_config(app, &request.config)?;

    let already_installed: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM installed_apps WHERE workspace_id = $1 AND app_id = $2)",
    )
    .bind(auth.workspace_id)
    .bind(app.id)
    .fetch_one(&pool)
    .await?;
    if already_installed {
        return Err(AppError::Conflict(format!("{} is already installed", app.name)));
    }

    let installed = sqlx::query_as::<_, InstalledApp>(
        r#"
        INSERT INTO installed_apps (workspace_id, app_id, config)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(auth.workspace_id)
    .bind(app.id)
    .bind(&request.config)
    .fetch_one(&pool)
    .await?;

    tracing::info!(app_id = %installed.app_id, installed_app_id = %installed.id, "App installed");

    Ok((StatusCode::CREATED, Json(installed)))
}

/// Change an installation's config or enable/disable it (admin only).
///
/// `PATCH /api/v1/apps/installed/{id}`
pub async fn update_installed(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(installed_id): Path<Uuid>,
    Json(request): Json<UpdateInstalledAppRequest>,
) -> Result<Json<InstalledApp>, AppError> {
    auth.require_admin()?;

    let current = sqlx::query_as::<_, InstalledApp>(
        "SELECT * FROM installed_apps WHERE id = $1 AND workspace_id = $2",
    )
    .bind(installed_id)
    .bind(auth.workspace_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Installed app"))?;

    if let Some(config) = &request.config {
        let app = app_registry::require(&current.app_id)?;
        app_registry::validate_install_config(app, config)?;
    }

    let installed = sqlx::query_as::<_, InstalledApp>(
        r#"
        UPDATE installed_apps
        SET config = COALESCE($2, config),
            is_enabled = COALESCE($3, is_enabled)
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(current.id)
    .bind(request.config)
    .bind(request.is_enabled)
    .fetch_one(&pool)
    .await?;

    Ok(Json(installed))
}

/// `DELETE /api/v1/apps/installed/{id}` (admin only)
pub async fn uninstall_app(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(installed_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require_admin()?;

    let result = sqlx::query("DELETE FROM installed_apps WHERE id = $1 AND workspace_id = $2")
        .bind(installed_id)
        .bind(auth.workspace_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Installed app"));
    }
    tracing::info!(installed_app_id = %installed_id, "App uninstalled");
    Ok(StatusCode::NO_CONTENT)
}

/// Enabled apps declaring a slot, in registry order.
///
/// # Endpoint
///
/// `GET /api/v1/apps/slots/ticket_sidebar`
///
/// # Response
///
/// ```json
/// [{ "installed_app_id": "...", "app_id": "shopify-orders", "name": "Shopify Orders", "description": "..." }]
/// ```
///
/// An unknown slot name is a 400.
pub async fn slot_apps(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(slot): Path<String>,
) -> Result<Json<Vec<SlotApp>>, AppError> {
    let slot: Slot = slot.parse()?;

    let installed = sqlx::query_as::<_, InstalledApp>(
        "SELECT * FROM installed_apps WHERE workspace_id = $1 AND is_enabled = true",
    )
    .bind(auth.workspace_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(app_registry::apps_for_slot(slot, &installed)))
}
