//! API Key model for agent authentication.
//!
//! API keys are stored as SHA-256 hashes. Each key belongs to one agent
//! user, and through that user to one workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::workspace::Role;

/// Represents an API key record from the `api_keys` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKey {
    pub id: Uuid,

    pub workspace_id: Uuid,

    /// Agent the key acts as
    pub user_id: Uuid,

    /// SHA-256 hash of the actual API key (64 hex characters)
    pub key_hash: String,

    /// Human-readable label ("CI bot", "Jane's laptop")
    pub label: String,

    /// Inactive keys are rejected during authentication.
    pub is_active: bool,

    pub created_at: DateTime<Utc>,

    pub last_used_at: Option<DateTime<Utc>>,
}

/// Row produced by the authentication lookup: the key joined with its user.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiKeyPrincipal {
    pub api_key_id: Uuid,
    pub workspace_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub label: String,

    /// Agent the key is issued for; defaults to the caller
    pub user_id: Option<Uuid>,
}

/// API key as returned to clients. The hash is never exposed.
#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub label: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,

    /// Plaintext key, present only in the creation response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl From<ApiKey> for ApiKeyResponse {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            user_id: key.user_id,
            label: key.label,
            is_active: key.is_active,
            created_at: key.created_at,
            last_used_at: key.last_used_at,
            key: None,
        }
    }
}

impl ApiKeyResponse {
    pub fn with_key(mut self, key: String) -> Self {
        self.key = Some(key);
        self
    }
}
