//! Bearer-token authentication middleware.
//!
//! Two principals exist:
//! - **agents** authenticate with an API key (`/api/v1`), producing `AuthContext`
//! - **contacts** authenticate with a portal token (`/portal/v1`), producing
//!   `PortalContext`
//!
//! Both tokens are looked up by their SHA-256 hash and rejected with HTTP
//! 401 when missing, unknown or inactive.

use crate::{
    db::{DbPool, hash_token},
    error::AppError,
    models::{api_key::ApiKeyPrincipal, workspace::Role},
};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Authentication context attached to agent requests.
///
/// Handlers extract it with `Extension<AuthContext>` and scope every query
/// by `workspace_id`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub role: Role,
}

impl AuthContext {
    /// Admin configuration screens are restricted to the admin role.
    pub fn require_admin(&self) -> Result<(), AppError> {
        match self.role {
            Role::Admin => Ok(()),
            Role::Agent => Err(AppError::Forbidden(
                "This operation requires the admin role".to_string(),
            )),
        }
    }
}

/// Authentication context attached to portal (customer) requests.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PortalContext {
    pub workspace_id: Uuid,
    pub contact_id: Uuid,
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// API key authentication middleware for agent routes.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <key>`
/// 2. Hash the key using SHA-256
/// 3. Look up an active key whose user is also active, stamping `last_used_at`
/// 4. Inject `AuthContext` into the request and call the next handler
pub async fn auth_middleware(
    State(pool): State<DbPool>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;
    let key_hash = hash_token(api_key);

    let principal = sqlx::query_as::<_, ApiKeyPrincipal>(
        r#"
        UPDATE api_keys k
        SET last_used_at = NOW()
        FROM users u
        WHERE k.key_hash = $1
          AND k.is_active = true
          AND u.id = k.user_id
          AND u.is_active = true
        RETURNING k.id AS api_key_id, k.workspace_id, k.user_id, u.name AS user_name, u.role
        "#,
    )
    .bind(&key_hash)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::Unauthorized)?;

    tracing::debug!(
        api_key_id = %principal.api_key_id,
        user_id = %principal.user_id,
        "Agent authenticated"
    );

    request.extensions_mut().insert(AuthContext {
        workspace_id: principal.workspace_id,
        user_id: principal.user_id,
        user_name: principal.user_name,
        role: principal.role,
    });

    Ok(next.run(request).await)
}

/// Portal token authentication middleware for customer routes.
pub async fn portal_auth_middleware(
    State(pool): State<DbPool>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;
    let token_hash = hash_token(token);

    let context = sqlx::query_as::<_, PortalContext>(
        r#"
        SELECT workspace_id, id AS contact_id
        FROM contacts
        WHERE portal_token_hash = $1
        "#,
    )
    .bind(&token_hash)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::Unauthorized)?;

    request.extensions_mut().insert(context);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_is_extracted() {
        assert_eq!(bearer_token(&headers("Bearer hd_key_abc")), Some("hd_key_abc"));
    }

    #[test]
    fn non_bearer_schemes_are_ignored() {
        assert_eq!(bearer_token(&headers("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(&headers("Bearer    ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn only_admins_pass_the_admin_check() {
        let mut context = AuthContext {
            workspace_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_name: "Jane".to_string(),
            role: Role::Agent,
        };
        assert!(matches!(context.require_admin(), Err(AppError::Forbidden(_))));
        context.role = Role::Admin;
        assert!(context.require_admin().is_ok());
    }
}
