//! Workspace, user and API key HTTP handlers.
//!
//! This module implements:
//! - POST /api/v1/workspaces - Sign up a new workspace (signup token, no API key)
//! - GET/PATCH /api/v1/workspace - Current workspace settings
//! - GET/POST /api/v1/users, PATCH /api/v1/users/{id} - Agent management
//! - GET/POST /api/v1/api-keys, DELETE /api/v1/api-keys/{id} - Key management

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    db::{DbPool, generate_token, hash_token},
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        api_key::{ApiKey, ApiKeyResponse, CreateApiKeyRequest},
        required,
        workspace::{
            CreateUserRequest, Role, SignupRequest, SignupResponse, UpdateUserRequest,
            UpdateWorkspaceRequest, User, Workspace, validate_email, validate_slug,
            validate_ticket_prefix,
        },
    },
    state::AppState,
};

/// Header carrying the operator-issued sign-up token.
pub const SIGNUP_TOKEN_HEADER: &str = "x-signup-token";

/// Prefix of generated agent API keys.
const API_KEY_PREFIX: &str = "hd_key";

/// Sign up a new workspace.
///
/// # Endpoint
///
/// `POST /api/v1/workspaces`
///
/// # Authentication
///
/// Requires `X-Signup-Token` equal to the `SIGNUP_TOKEN` environment
/// variable. When `SIGNUP_TOKEN` is unset, sign-up is disabled (403).
///
/// # Response
///
/// - **Success (201 Created)**: workspace, admin user and the first API key
/// - **Error (409)**: slug already taken
///
/// The returned `api_key` is shown only once.
///
/// # Database Operation
///
/// One transaction inserts the workspace, its admin user, default AI
/// settings and the admin's API key.
pub async fn signup(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let Some(expected) = state.config.signup_token.as_deref().filter(|t| !t.is_empty()) else {
        return Err(AppError::Forbidden("Workspace sign-up is disabled".to_string()));
    };
    let provided = headers
        .get(SIGNUP_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if provided != expected {
        return Err(AppError::Unauthorized);
    }

    let name = required("name", &request.name)?;
    let admin_name = required("admin_name", &request.admin_name)?;
    let slug = request.slug.trim().to_string();
    validate_slug(&slug)?;
    let admin_email = request.admin_email.trim().to_lowercase();
    validate_email(&admin_email)?;

    let mut tx = state.pool.begin().await?;

    let workspace = sqlx::query_as::<_, Workspace>(
        "INSERT INTO workspaces (name, slug) VALUES ($1, $2) RETURNING *",
    )
    .bind(&name)
    .bind(&slug)
    .fetch_one(&mut *tx)
    .await?;

    let admin = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (workspace_id, email, name, role)
        VALUES ($1, $2, $3, 'admin')
        RETURNING *
        "#,
    )
    .bind(workspace.id)
    .bind(&admin_email)
    .bind(&admin_name)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO ai_settings (workspace_id) VALUES ($1)")
        .bind(workspace.id)
        .execute(&mut *tx)
        .await?;

    let api_key = generate_token(API_KEY_PREFIX);
    sqlx::query(
        "INSERT INTO api_keys (workspace_id, user_id, key_hash, label) VALUES ($1, $2, $3, 'Initial admin key')",
    )
    .bind(workspace.id)
    .bind(admin.id)
    .bind(hash_token(&api_key))
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(workspace_id = %workspace.id, slug = %workspace.slug, "Workspace created");

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            workspace,
            admin,
            api_key,
        }),
    ))
}

/// Get the authenticated workspace.
///
/// `GET /api/v1/workspace`
pub async fn get_workspace(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Workspace>, AppError> {
    let workspace = sqlx::query_as::<_, Workspace>("SELECT * FROM workspaces WHERE id = $1")
        .bind(auth.workspace_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Workspace"))?;

    Ok(Json(workspace))
}

/// Update workspace name and ticket prefix (admin only).
///
/// `PATCH /api/v1/workspace`
///
/// Changing the prefix changes display numbers of existing tickets too;
/// the numeric part is never reassigned.
pub async fn update_workspace(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<UpdateWorkspaceRequest>,
) -> Result<Json<Workspace>, AppError> {
    auth.require_admin()?;

    let name = request.name.as_deref().map(|n| required("name", n)).transpose()?;
    let prefix = request.ticket_prefix.map(|p| p.trim().to_string());
    if let Some(prefix) = &prefix {
        validate_ticket_prefix(prefix)?;
    }

    let workspace = sqlx::query_as::<_, Workspace>(
        r#"
        UPDATE workspaces
        SET name = COALESCE($2, name),
            ticket_prefix = COALESCE($3, ticket_prefix)
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(auth.workspace_id)
    .bind(name)
    .bind(prefix)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Workspace"))?;

    Ok(Json(workspace))
}

/// List the workspace's users, active first then by name.
///
/// `GET /api/v1/users`
///
/// Available to every agent so tickets can be assigned.
pub async fn list_users(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<User>>, AppError> {
    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users WHERE workspace_id = $1 ORDER BY is_active DESC, name",
    )
    .bind(auth.workspace_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(users))
}

/// Add an agent or admin (admin only).
///
/// `POST /api/v1/users`
///
/// ```json
/// { "email": "sam@acme.test", "name": "Sam", "role": "agent" }
/// ```
///
/// Returns 409 when the email is already used in this workspace.
pub async fn create_user(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_admin()?;

    let email = request.email.trim().to_lowercase();
    validate_email(&email)?;
    let name = required("name", &request.name)?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (workspace_id, email, name, role) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(auth.workspace_id)
    .bind(&email)
    .bind(&name)
    .bind(request.role)
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// Change a user's name, role or active flag (admin only).
///
/// `PATCH /api/v1/users/{id}`
///
/// Admins cannot demote or deactivate themselves, so a workspace always
/// keeps the admin performing the change.
pub async fn update_user(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    auth.require_admin()?;

    let demotes_self = user_id == auth.user_id
        && (request.role == Some(Role::Agent) || request.is_active == Some(false));
    if demotes_self {
        return Err(AppError::Conflict(
            "You cannot demote or deactivate yourself".to_string(),
        ));
    }

    let name = request.name.as_deref().map(|n| required("name", n)).transpose()?;

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET name = COALESCE($3, name),
            role = COALESCE($4, role),
            is_active = COALESCE($5, is_active)
        WHERE id = $1 AND workspace_id = $2
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(auth.workspace_id)
    .bind(name)
    .bind(request.role)
    .bind(request.is_active)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("User"))?;

    Ok(Json(user))
}

/// List API keys of the workspace (admin only). Hashes are never returned.
///
/// `GET /api/v1/api-keys`
pub async fn list_api_keys(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ApiKeyResponse>>, AppError> {
    auth.require_admin()?;

    let keys = sqlx::query_as::<_, ApiKey>(
        "SELECT * FROM api_keys WHERE workspace_id = $1 ORDER BY created_at DESC",
    )
    .bind(auth.workspace_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(keys.into_iter().map(Into::into).collect()))
}

/// Issue an API key (admin only).
///
/// `POST /api/v1/api-keys`
///
/// ```json
/// { "label": "CI bot", "user_id": "550e8400-e29b-41d4-a716-446655440000" }
/// ```
///
/// The plaintext `key` is included in this response only; the database
/// stores its SHA-256 hash.
pub async fn create_api_key(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    auth.require_admin()?;

    let label = required("label", &request.label)?;
    let user_id = request.user_id.unwrap_or(auth.user_id);

    let user_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM users WHERE id = $1 AND workspace_id = $2)",
    )
    .bind(user_id)
    .bind(auth.workspace_id)
    .fetch_one(&pool)
    .await?;
    if !user_exists {
        return Err(AppError::NotFound("User"));
    }

    let plaintext = generate_token(API_KEY_PREFIX);
    let key = sqlx::query_as::<_, ApiKey>(
        r#"
        INSERT INTO api_keys (workspace_id, user_id, key_hash, label)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(auth.workspace_id)
    .bind(user_id)
    .bind(hash_token(&plaintext))
    .bind(&label)
    .fetch_one(&pool)
    .await?;

    tracing::info!(api_key_id = %key.id, user_id = %user_id, "API key issued");

    Ok((
        StatusCode::CREATED,
        Json(ApiKeyResponse::from(key).with_key(plaintext)),
    ))
}

/// Revoke an API key (admin only). The key stops authenticating at once.
///
/// `DELETE /api/v1/api-keys/{id}`
pub async fn revoke_api_key(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(key_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require_admin()?;

    let result = sqlx::query(
        "UPDATE api_keys SET is_active = false WHERE id = $1 AND workspace_id = $2 AND is_active = true",
    )
    .bind(key_id)
    .bind(auth.workspace_id)
    .execute(&pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("API key"));
    }

    tracing::info!(api_key_id = %key_id, "API key revoked");
    Ok(StatusCode::NO_CONTENT)
}
