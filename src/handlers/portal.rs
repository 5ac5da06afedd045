//! Customer self-service portal handlers.
//!
//! Every route authenticates a contact by portal token and only ever sees
//! that contact's own tickets. Internal notes are never returned.
//!
//! This module implements:
//! - GET /portal/v1/me
//! - GET/POST /portal/v1/tickets, GET /portal/v1/tickets/{id}
//! - POST /portal/v1/tickets/{id}/replies
//! - GET /portal/v1/kb/articles, GET /portal/v1/kb/articles/{slug}
//! - GET /portal/v1/banners

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    handlers::{kb as kb_handlers, settings},
    middleware::auth::PortalContext,
    models::{
        contact::Contact,
        kb::{ArticleListQuery, ArticleSummary, KbArticle},
        settings::Banner,
        ticket::{
            AuthorKind, ChannelKind, PortalReplyRequest, PortalTicketRequest, Priority,
            TicketDetail, TicketListQuery, TicketResponse,
        },
    },
    services::ticket_service::{self, NewMessage, NewTicket},
    state::AppState,
};

/// The authenticated contact.
///
/// `GET /portal/v1/me`
pub async fn me(
    State(pool): State<DbPool>,
    Extension(portal): Extension<PortalContext>,
) -> Result<Json<Contact>, AppError> {
    let contact =
        sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = $1 AND workspace_id = $2")
            .bind(portal.contact_id)
            .bind(portal.workspace_id)
            .fetch_optional(&pool)
            .await?
            .ok_or(AppError::NotFound("Contact"))?;

    Ok(Json(contact))
}

/// The contact's tickets, newest first.
///
/// `GET /portal/v1/tickets?status=open`
pub async fn list_my_tickets(
    State(pool): State<DbPool>,
    Extension(portal): Extension<PortalContext>,
    Query(mut query): Query<TicketListQuery>,
) -> Result<Json<Vec<TicketResponse>>, AppError> {
    query.contact_id = Some(portal.contact_id);
    query.assignee_id = None;

    let tickets = ticket_service::list(&pool, portal.workspace_id, &query).await?;
    Ok(Json(
        ticket_service::to_responses(&pool, portal.workspace_id, tickets).await?,
    ))
}

/// Open a ticket as the authenticated contact.
///
/// # Endpoint
///
/// `POST /portal/v1/tickets`
///
/// ```json
/// { "subject": "Invoice is wrong", "body": "I was charged twice for March." }
/// ```
///
/// The ticket arrives through the `web` channel with normal priority; the
/// body becomes both the description and the first message.
pub async fn create_my_ticket(
    State(state): State<AppState>,
    Extension(portal): Extension<PortalContext>,
    Json(request): Json<PortalTicketRequest>,
) -> Result<impl IntoResponse, AppError> {
    let body = request.body.trim().to_string();
    if body.is_empty() {
        return Err(AppError::InvalidRequest("body must not be empty".to_string()));
    }

    let ticket = ticket_service::create(
        &state,
        portal.workspace_id,
        NewTicket {
            subject: request.subject,
            description: Some(body.clone()),
            priority: Priority::Normal,
            channel: ChannelKind::Web,
            contact_id: Some(portal.contact_id),
            assignee_id: None,
            tags: Vec::new(),
            first_message: Some(NewMessage {
                author_kind: AuthorKind::Contact,
                author_id: Some(portal.contact_id),
                body,
                is_internal: false,
            }),
        },
    )
    .await?;

    let detail = ticket_service::detail(&state.pool, ticket, false).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// One of the contact's tickets with its public conversation.
///
/// `GET /portal/v1/tickets/{id}`
///
/// Tickets of other contacts are reported as 404.
pub async fn get_my_ticket(
    State(pool): State<DbPool>,
    Extension(portal): Extension<PortalContext>,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<TicketDetail>, AppError> {
    let ticket = ticket_service::load_for_contact(&pool, &portal, ticket_id).await?;
    Ok(Json(ticket_service::detail(&pool, ticket, false).await?))
}

/// Reply to one of the contact's tickets.
///
/// # Endpoint
///
/// `POST /portal/v1/tickets/{id}/replies` with `{ "body": "Still broken." }`
///
/// # Response
///
/// - **Success (201 Created)**: the message; a resolved or pending ticket reopens
/// - **Error (409)**: the ticket is closed
pub async fn reply_to_my_ticket(
    State(state): State<AppState>,
    Extension(portal): Extension<PortalContext>,
    Path(ticket_id): Path<Uuid>,
    Json(request): Json<PortalReplyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let message =
        ticket_service::add_contact_reply(&state, &portal, ticket_id, &request.body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Published articles, optionally searched with `q`.
///
/// `GET /portal/v1/kb/articles?q=invoice`
pub async fn list_articles(
    State(pool): State<DbPool>,
    Extension(portal): Extension<PortalContext>,
    Query(query): Query<ArticleListQuery>,
) -> Result<Json<Vec<ArticleSummary>>, AppError> {
    let articles = kb_handlers::published(&pool, portal.workspace_id).await?;
    Ok(Json(kb_handlers::summaries(&articles, query.q)))
}

/// `GET /portal/v1/kb/articles/{slug}`
pub async fn get_article(
    State(pool): State<DbPool>,
    Extension(portal): Extension<PortalContext>,
    Path(slug): Path<String>,
) -> Result<Json<KbArticle>, AppError> {
    Ok(Json(
        kb_handlers::published_by_slug(&pool, portal.workspace_id, &slug).await?,
    ))
}

/// Banners visible right now.
///
/// `GET /portal/v1/banners`
pub async fn list_banners(
    State(pool): State<DbPool>,
    Extension(portal): Extension<PortalContext>,
) -> Result<Json<Vec<Banner>>, AppError> {
    Ok(Json(
        settings::visible_banners(&pool, portal.workspace_id).await?,
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::{
        db::DbPool,
        models::ticket::{CreateMessageRequest, TicketStatus, UpdateTicketRequest},
        services::ticket_service,
        test_support::{app, new_ticket, seed_tenant, send, state},
    };

    #[sqlx::test(migrations = "./migrations")]
    async fn me_returns_the_token_holder(pool: DbPool) {
        let acme = seed_tenant(&pool, "acme").await;

        let (status, body) =
            send(&app(pool), Method::GET, "/portal/v1/me", &acme.portal_token, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], json!(acme.contact_id));
        assert_eq!(body["email"], "jane@acme.test");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn replies_to_closed_tickets_conflict(pool: DbPool) {
        let acme = seed_tenant(&pool, "acme").await;
        let state = state(pool.clone());
        let ticket = ticket_service::create(
            &state,
            acme.workspace_id,
            new_ticket("Refund", Some(acme.contact_id)),
        )
        .await
        .unwrap();
        ticket_service::update(
            &state,
            acme.workspace_id,
            ticket.id,
            UpdateTicketRequest {
                status: Some(TicketStatus::Closed),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let (status, body) = send(
            &app(pool),
            Method::POST,
            &format!("/portal/v1/tickets/{}/replies", ticket.id),
            &acme.portal_token,
            Some(json!({ "body": "Any news?" })),
        )
        .await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "conflict");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn replies_reopen_resolved_tickets(pool: DbPool) {
        let acme = seed_tenant(&pool, "acme").await;
        let state = state(pool.clone());
        let ticket = ticket_service::create(
            &state,
            acme.workspace_id,
            new_ticket("Refund", Some(acme.contact_id)),
        )
        .await
        .unwrap();
        ticket_service::update(
            &state,
            acme.workspace_id,
            ticket.id,
            UpdateTicketRequest {
                status: Some(TicketStatus::Resolved),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let (status, _) = send(
            &app(pool.clone()),
            Method::POST,
            &format!("/portal/v1/tickets/{}/replies", ticket.id),
            &acme.portal_token,
            Some(json!({ "body": "Still broken" })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        let reopened = ticket_service::load(&pool, acme.workspace_id, ticket.id)
            .await
            .unwrap();
        assert_eq!(reopened.status, TicketStatus::Open);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn internal_notes_are_hidden(pool: DbPool) {
        let acme = seed_tenant(&pool, "acme").await;
        let state = state(pool.clone());
        let ticket = ticket_service::create(
            &state,
            acme.workspace_id,
            new_ticket("Login loop", Some(acme.contact_id)),
        )
        .await
        .unwrap();
        let messages = [
            ("Customer is on the legacy plan", true),
            ("Try clearing cookies", false),
        ];
        for (body, is_internal) in messages {
            ticket_service::add_agent_message(
                &state,
                &acme.auth(),
                ticket.id,
                CreateMessageRequest {
                    body: body.to_string(),
                    is_internal,
                    status: None,
                },
            )
            .await
            .unwrap();
        }

        let (status, body) = send(
            &app(pool),
            Method::GET,
            &format!("/portal/v1/tickets/{}", ticket.id),
            &acme.portal_token,
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["body"], "Try clearing cookies");
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn other_contacts_tickets_are_not_found(pool: DbPool) {
        let acme = seed_tenant(&pool, "acme").await;
        let state = state(pool.clone());
        let someone_else: uuid::Uuid = sqlx::query_scalar(
            "INSERT INTO contacts (workspace_id, email, name) VALUES ($1, 'bob@acme.test', 'Bob') RETURNING id",
        )
        .bind(acme.workspace_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        let ticket = ticket_service::create(
            &state,
            acme.workspace_id,
            new_ticket("Bob's invoice", Some(someone_else)),
        )
        .await
        .unwrap();

        let app = app(pool);
        let (status, _) = send(
            &app,
            Method::GET,
            &format!("/portal/v1/tickets/{}", ticket.id),
            &acme.portal_token,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) =
            send(&app, Method::GET, "/portal/v1/tickets", &acme.portal_token, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }
}
