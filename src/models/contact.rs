//! Company and contact models (CRM-lite).
//!
//! Contacts are customer identities, distinct from agent users. A contact
//! may belong to a company and may hold a portal token for self-service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::double_option;

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Company {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub workspace_id: Uuid,
    pub name: String,
    pub domain: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Represents a contact record from the `contacts` table.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Contact {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub workspace_id: Uuid,
    pub company_id: Option<Uuid>,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,

    /// SHA-256 of the contact's portal token, if one was issued
    #[serde(skip_serializing)]
    pub portal_token_hash: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCompanyRequest {
    pub name: String,
    pub domain: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCompanyRequest {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateContactRequest {
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub company_id: Option<Uuid>,
}

/// Partial update; `company_id: null` detaches the contact from its company.
#[derive(Debug, Deserialize)]
pub struct UpdateContactRequest {
    pub email: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub company_id: Option<Option<Uuid>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ContactListQuery {
    pub search: Option<String>,
    pub company_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Company with its contacts.
#[derive(Debug, Serialize)]
pub struct CompanyDetail {
    #[serde(flatten)]
    pub company: Company,
    pub contacts: Vec<Contact>,
}

/// Response for `POST /api/v1/contacts/{id}/portal-token`.
///
/// The token is shown once; only its hash is stored.
#[derive(Debug, Serialize)]
pub struct PortalTokenResponse {
    pub contact_id: Uuid,
    pub portal_token: String,
}
