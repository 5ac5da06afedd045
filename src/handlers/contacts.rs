//! Contact and company HTTP handlers (CRM-lite).
//!
//! This module implements:
//! - GET/POST /api/v1/contacts, GET/PATCH/DELETE /api/v1/contacts/{id}
//! - GET /api/v1/contacts/{id}/tickets - Tickets opened by a contact
//! - POST /api/v1/contacts/{id}/portal-token - Issue or rotate portal access
//! - GET/POST /api/v1/companies, GET/PATCH/DELETE /api/v1/companies/{id}

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    db::{DbPool, generate_token, hash_token, like_pattern},
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        Page,
        contact::{
            Company, CompanyDetail, Contact, ContactListQuery, CreateCompanyRequest,
            CreateContactRequest, PortalTokenResponse, UpdateCompanyRequest, UpdateContactRequest,
        },
        non_blank, required,
        ticket::{TicketListQuery, TicketResponse},
        workspace::validate_email,
    },
    services::ticket_service,
};

/// Prefix of generated portal tokens.
const PORTAL_TOKEN_PREFIX: &str = "hd_portal";

async fn ensure_company(pool: &DbPool, workspace_id: Uuid, company_id: Uuid) -> Result<(), AppError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM companies WHERE id = $1 AND workspace_id = $2)",
    )
    .bind(company_id)
    .bind(workspace_id)
    .fetch_one(pool)
    .await?;

    if !exists {
        return Err(AppError::NotFound("Company"));
    }
    Ok(())
}

/// List contacts.
///
/// # Endpoint
///
/// `GET /api/v1/contacts?search=jane&company_id=...&limit=50&offset=0`
///
/// `search` matches name and email case-insensitively. Ordered by name.
pub async fn list_contacts(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ContactListQuery>,
) -> Result<Json<Vec<Contact>>, AppError> {
    let (limit, offset) = Page {
        limit: query.limit,
        offset: query.offset,
    }
    .bounds();
    let search = non_blank(query.search).map(|s| like_pattern(&s));

    let contacts = sqlx::query_as::<_, Contact>(
        r#"
        SELECT * FROM contacts
        WHERE workspace_id = $1
          AND ($2::uuid IS NULL OR company_id = $2)
          AND ($3::text IS NULL OR name ILIKE $3 OR email ILIKE $3)
        ORDER BY name, email
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(auth.workspace_id)
    .bind(query.company_id)
    .bind(search)
    .bind(limit)
    .bind(offset)
    .fetch_all(&pool)
    .await?;

    Ok(Json(contacts))
}

/// Create a contact.
///
/// # Endpoint
///
/// `POST /api/v1/contacts`
///
/// ```json
/// { "email": "jane@example.com", "name": "Jane Doe", "company_id": null }
/// ```
///
/// # Response
///
/// - **Success (201 Created)**
/// - **Error (409)**: email already used by another contact of the workspace
pub async fn create_contact(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateContactRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = request.email.trim().to_lowercase();
    validate_email(&email)?;
    let name = required("name", &request.name)?;
    if let Some(company_id) = request.company_id {
        ensure_company(&pool, auth.workspace_id, company_id).await?;
    }

    let contact = sqlx::query_as::<_, Contact>(
        r#"
        INSERT INTO contacts (workspace_id, company_id, email, name, phone)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(auth.workspace_id)
    .bind(request.company_id)
    .bind(&email)
    .bind(&name)
    .bind(non_blank(request.phone))
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(contact)))
}

/// `GET /api/v1/contacts/{id}`
pub async fn get_contact(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(contact_id): Path<Uuid>,
) -> Result<Json<Contact>, AppError> {
    let contact =
        sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = $1 AND workspace_id = $2")
            .bind(contact_id)
            .bind(auth.workspace_id)
            .fetch_optional(&pool)
            .await?
            .ok_or(AppError::NotFound("Contact"))?;

    Ok(Json(contact))
}

/// Partially update a contact. `company_id: null` detaches it from its company.
///
/// `PATCH /api/v1/contacts/{id}`
pub async fn update_contact(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(contact_id): Path<Uuid>,
    Json(request): Json<UpdateContactRequest>,
) -> Result<Json<Contact>, AppError> {
    let email = request.email.map(|e| e.trim().to_lowercase());
    if let Some(email) = &email {
        validate_email(email)?;
    }
    let name = request.name.as_deref().map(|n| required("name", n)).transpose()?;
    if let Some(Some(company_id)) = request.company_id {
        ensure_company(&pool, auth.workspace_id, company_id).await?;
    }

    let contact = sqlx::query_as::<_, Contact>(
        r#"
        UPDATE contacts
        SET email = COALESCE($3, email),
            name = COALESCE($4, name),
            phone = CASE WHEN $5 THEN $6 ELSE phone END,
            company_id = CASE WHEN $7 THEN $8 ELSE company_id END,
            updated_at = NOW()
        WHERE id = $1 AND workspace_id = $2
        RETURNING *
        "#,
    )
    .bind(contact_id)
    .bind(auth.workspace_id)
    .bind(email)
    .bind(name)
    .bind(request.phone.is_some())
    .bind(non_blank(request.phone))
    .bind(request.company_id.is_some())
    .bind(request.company_id.flatten())
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Contact"))?;

    Ok(Json(contact))
}

/// Delete a contact (admin only). Their tickets are kept without a contact.
///
/// `DELETE /api/v1/contacts/{id}`
pub async fn delete_contact(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(contact_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require_admin()?;

    let result = sqlx::query("DELETE FROM contacts WHERE id = $1 AND workspace_id = $2")
        .bind(contact_id)
        .bind(auth.workspace_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Contact"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Tickets opened by a contact, newest first.
///
/// `GET /api/v1/contacts/{id}/tickets`
pub async fn contact_tickets(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(contact_id): Path<Uuid>,
    Query(mut query): Query<TicketListQuery>,
) -> Result<Json<Vec<TicketResponse>>, AppError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM contacts WHERE id = $1 AND workspace_id = $2)",
    )
    .bind(contact_id)
    .bind(auth.workspace_id)
    .fetch_one(&pool)
    .await?;
    if !exists {
        return Err(AppError::NotFound("Contact"));
    }

    query.contact_id = Some(contact_id);
    let tickets = ticket_service::list(&pool, auth.workspace_id, &query).await?;
    Ok(Json(
        ticket_service::to_responses(&pool, auth.workspace_id, tickets).await?,
    ))
}

/// Issue a portal token for a contact.
///
/// # Endpoint
///
/// `POST /api/v1/contacts/{id}/portal-token`
///
/// # Response (201 Created)
///
/// ```json
/// { "contact_id": "...", "portal_token": "hd_portal_3f9a..." }
/// ```
///
/// The token is returned once and stored as a SHA-256 hash. Issuing a new
/// token invalidates the previous one.
pub async fn issue_portal_token(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(contact_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let token = generate_token(PORTAL_TOKEN_PREFIX);

    let result = sqlx::query(
        r#"
        UPDATE contacts
        SET portal_token_hash = $3, updated_at = NOW()
        WHERE id = $1 AND workspace_id = $2
        "#,
    )
    .bind(contact_id)
    .bind(auth.workspace_id)
    .bind(hash_token(&token))
    .execute(&pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Contact"));
    }

    tracing::info!(contact_id = %contact_id, "Portal token issued");

    Ok((
        StatusCode::CREATED,
        Json(PortalTokenResponse {
            contact_id,
            portal_token: token,
        }),
    ))
}

/// `GET /api/v1/companies`
pub async fn list_companies(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<Company>>, AppError> {
    let companies =
        sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE workspace_id = $1 ORDER BY name")
            .bind(auth.workspace_id)
            .fetch_all(&pool)
            .await?;

    Ok(Json(companies))
}

/// `POST /api/v1/companies` with `{ "name": "Acme", "domain": "acme.test" }`
pub async fn create_company(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Json(request): Json<CreateCompanyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = required("name", &request.name)?;

    let company = sqlx::query_as::<_, Company>(
        r#"
        INSERT INTO companies (workspace_id, name, domain, notes)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(auth.workspace_id)
    .bind(&name)
    .bind(non_blank(request.domain).map(|d| d.to_lowercase()))
    .bind(non_blank(request.notes))
    .fetch_one(&pool)
    .await?;

    Ok((StatusCode::CREATED, Json(company)))
}

/// Company with its contacts.
///
/// `GET /api/v1/companies/{id}`
pub async fn get_company(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(company_id): Path<Uuid>,
) -> Result<Json<CompanyDetail>, AppError> {
    let company =
        sqlx::query_as::<_, Company>("SELECT * FROM companies WHERE id = $1 AND workspace_id = $2")
            .bind(company_id)
            .bind(auth.workspace_id)
            .fetch_optional(&pool)
            .await?
            .ok_or(AppError::NotFound("Company"))?;

    let contacts = sqlx::query_as::<_, Contact>(
        "SELECT * FROM contacts WHERE company_id = $1 AND workspace_id = $2 ORDER BY name",
    )
    .bind(company.id)
    .bind(auth.workspace_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(CompanyDetail { company, contacts }))
}

/// `PATCH /api/v1/companies/{id}`
pub async fn update_company(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(company_id): Path<Uuid>,
    Json(request): Json<UpdateCompanyRequest>,
) -> Result<Json<Company>, AppError> {
    let name = request.name.as_deref().map(|n| required("name", n)).transpose()?;

    let company = sqlx::query_as::<_, Company>(
        r#"
        UPDATE companies
        SET name = COALESCE($3, name),
            domain = CASE WHEN $4 THEN $5 ELSE domain END,
            notes = CASE WHEN $6 THEN $7 ELSE notes END,
            updated_at = NOW()
        WHERE id = $1 AND workspace_id = $2
        RETURNING *
        "#,
    )
    .bind(company_id)
    .bind(auth.workspace_id)
    .bind(name)
    .bind(request.domain.is_some())
    .bind(non_blank(request.domain).map(|d| d.to_lowercase()))
    .bind(request.notes.is_some())
    .bind(non_blank(request.notes))
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Company"))?;

    Ok(Json(company))
}

/// Delete a company (admin only). Its contacts are kept, detached.
///
/// `DELETE /api/v1/companies/{id}`
pub async fn delete_company(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    Path(company_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    auth.require_admin()?;

    let result = sqlx::query("DELETE FROM companies WHERE id = $1 AND workspace_id = $2")
        .bind(company_id)
        .bind(auth.workspace_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Company"));
    }
    Ok(StatusCode::NO_CONTENT)
}
