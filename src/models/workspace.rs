//! Workspace (tenant) and agent user models.
//!
//! A workspace owns every other record. Agents are `User` rows that belong
//! to exactly one workspace and authenticate with API keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    /// Agent role within a workspace.
    pub enum Role {
        /// Full access, including admin configuration screens
        Admin => "admin",
        /// Ticket work only
        Agent => "agent",
    }
}

/// Represents a workspace record from the `workspaces` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Workspace {
    pub id: Uuid,

    pub name: String,

    /// URL-safe identifier used by the public help center
    pub slug: String,

    /// Prefix for display numbers, e.g. `TKT` → `TKT-000042`
    pub ticket_prefix: String,

    /// Last allocated ticket number
    ///
    /// Incremented under a row lock when a ticket is created.
    pub ticket_counter: i64,

    pub created_at: DateTime<Utc>,
}

/// Agent user record from the `users` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub workspace_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /api/v1/workspaces` (sign-up).
///
/// ```json
/// {
///   "name": "Acme Support",
///   "slug": "acme",
///   "admin_email": "ops@acme.test",
///   "admin_name": "Ops Team"
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub slug: String,
    pub admin_email: String,
    pub admin_name: String,
}

/// Response for a successful sign-up.
///
/// `api_key` is the only time the plaintext key is shown.
#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub workspace: Workspace,
    pub admin: User,
    pub api_key: String,
}

/// Request body for `PATCH /api/v1/workspace`.
#[derive(Debug, Deserialize)]
pub struct UpdateWorkspaceRequest {
    pub name: Option<String>,
    pub ticket_prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Agent
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

/// Validate a workspace slug: lowercase ASCII letters, digits and `-`,
/// 2 to 48 characters, not starting or ending with `-`.
pub fn validate_slug(slug: &str) -> Result<(), crate::error::AppError> {
    let valid_chars = slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    let valid_len = (2..=48).contains(&slug.len());
    if !valid_chars || !valid_len || slug.starts_with('-') || slug.ends_with('-') {
        return Err(crate::error::AppError::InvalidRequest(
            "slug must be 2-48 lowercase letters, digits or dashes".to_string(),
        ));
    }
    Ok(())
}

/// Minimal email shape check: one `@` with text on both sides and a dot in the domain.
pub fn validate_email(email: &str) -> Result<(), crate::error::AppError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid {
        return Err(crate::error::AppError::InvalidRequest(format!(
            "'{email}' is not a valid email address"
        )));
    }
    Ok(())
}

/// Ticket prefixes are 1 to 10 uppercase ASCII letters or digits.
pub fn validate_ticket_prefix(prefix: &str) -> Result<(), crate::error::AppError> {
    let valid = (1..=10).contains(&prefix.len())
        && prefix
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if !valid {
        return Err(crate::error::AppError::InvalidRequest(
            "ticket_prefix must be 1-10 uppercase letters or digits".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_rules() {
        assert!(validate_slug("acme").is_ok());
        assert!(validate_slug("acme-support-2").is_ok());
        assert!(validate_slug("Acme").is_err());
        assert!(validate_slug("-acme").is_err());
        assert!(validate_slug("a").is_err());
        assert!(validate_slug("acme_support").is_err());
    }

    #[test]
    fn email_rules() {
        assert!(validate_email("jane@acme.test").is_ok());
        assert!(validate_email("jane.acme.test").is_err());
        assert!(validate_email("@acme.test").is_err());
        assert!(validate_email("jane@localhost").is_err());
        assert!(validate_email("jane@a@b.test").is_err());
    }

    #[test]
    fn ticket_prefix_rules() {
        assert!(validate_ticket_prefix("SUP").is_ok());
        assert!(validate_ticket_prefix("HD2").is_ok());
        assert!(validate_ticket_prefix("sup").is_err());
        assert!(validate_ticket_prefix("").is_err());
        assert!(validate_ticket_prefix("TOO-LONG-PREFIX").is_err());
    }

    #[test]
    fn role_round_trips_through_text() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(Role::Agent.to_string(), "agent");
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn create_user_defaults_to_agent_role() {
        let request: CreateUserRequest =
            serde_json::from_str(r#"{"email": "a@b.test", "name": "A"}"#).unwrap();
        assert_eq!(request.role, Role::Agent);
    }
}
