//! Ticket service - lifecycle, numbering, SLA stamping and automation dispatch.
//!
//! This service handles:
//! - Gap-free per-workspace ticket numbers
//! - Status transitions and the timestamps they stamp
//! - SLA due times from the active policy of the ticket's priority
//! - Running automations after ticket events and persisting their outcome
//!
//! # Atomicity Guarantees
//!
//! Every multi-row write (ticket + tags + first message, reply + status,
//! automation outcome + run log) happens inside one PostgreSQL transaction.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use sqlx::types::Json;
use uuid::Uuid;

use crate::{
    db::{DbPool, like_pattern},
    error::AppError,
    middleware::auth::{AuthContext, PortalContext},
    models::{
        Page,
        automation::{Automation, Trigger},
        non_blank, required,
        settings::SlaPolicy,
        ticket::{
            AuthorKind, ChannelKind, CreateMessageRequest, Priority, Ticket, TicketDetail,
            TicketListQuery, TicketMessage, TicketResponse, TicketStats, TicketStatus,
            UpdateTicketRequest, display_number, normalize_tag,
        },
        webhook::EventType,
    },
    services::{
        automation_engine::{self, TicketChanges, TicketSnapshot},
        lifecycle::{self, StatusStamps},
        sla::{self, SlaState, SlaTargets},
        webhook_service,
    },
    state::AppState,
};

/// Everything needed to open a ticket, whoever opens it.
#[derive(Debug)]
pub struct NewTicket {
    pub subject: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub channel: ChannelKind,
    pub contact_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub first_message: Option<NewMessage>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub author_kind: AuthorKind,
    pub author_id: Option<Uuid>,
    pub body: String,
    pub is_internal: bool,
}

fn stamps_of(ticket: &Ticket) -> StatusStamps {
    StatusStamps {
        resolved_at: ticket.resolved_at,
        closed_at: ticket.closed_at,
    }
}

fn targets_of(ticket: &Ticket) -> SlaTargets {
    SlaTargets {
        first_response_due_at: ticket.first_response_due_at,
        resolution_due_at: ticket.resolution_due_at,
    }
}

/// Create a ticket.
///
/// # Process
///
/// 1. Validate subject, contact and assignee
/// 2. Start database transaction
/// 3. Allocate the next number (the workspace row lock serializes allocators)
/// 4. Stamp SLA due times, insert the ticket, its tags and first message
/// 5. Commit, then run `ticket_created` automations and notify webhooks
pub async fn create(
    state: &AppState,
    workspace_id: Uuid,
    new: NewTicket,
) -> Result<Ticket, AppError> {
    let subject = required("subject", &new.subject)?;

    let mut tx = state.pool.begin().await?;

    if let Some(contact_id) = new.contact_id {
        ensure_contact(&mut tx, workspace_id, contact_id).await?;
    }
    if let Some(assignee_id) = new.assignee_id {
        ensure_assignable(&mut tx, workspace_id, assignee_id).await?;
    }

    let number: i64 = sqlx::query_scalar(
        r#"
        UPDATE workspaces
        SET ticket_counter = ticket_counter + 1
        WHERE id = $1
        RETURNING ticket_counter
        "#,
    )
    .bind(workspace_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Workspace"))?;

    let now = Utc::now();
    let policy = active_policy(&mut tx, workspace_id, new.priority).await?;
    let targets = sla::targets(now, policy.as_ref());

    let ticket = sqlx::query_as::<_, Ticket>(
        r#"
        INSERT INTO tickets (
            workspace_id,
            number,
            subject,
            description,
            priority,
            channel,
            contact_id,
            assignee_id,
            first_response_due_at,
            resolution_due_at,
            created_at,
            updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
        RETURNING *
        "#,
    )
    .bind(workspace_id)
    .bind(number)
    .bind(&subject)
    .bind(non_blank(new.description))
    .bind(new.priority)
    .bind(new.channel)
    .bind(new.contact_id)
    .bind(new.assignee_id)
    .bind(targets.first_response_due_at)
    .bind(targets.resolution_due_at)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    for tag in &new.tags {
        attach_tag(&mut tx, workspace_id, ticket.id, tag).await?;
    }
    if let Some(message) = &new.first_message {
        insert_message(&mut tx, ticket.id, message).await?;
    }

    tx.commit().await?;

    tracing::info!(
        workspace_id = %workspace_id,
        ticket_id = %ticket.id,
        number = ticket.number,
        "Ticket created"
    );

    let ticket = run_automations(state, ticket, Trigger::TicketCreated).await;
    webhook_service::notify(state, EventType::TicketCreated, &ticket, None);

    Ok(ticket)
}

/// Fetch a ticket of the workspace.
pub async fn load(pool: &DbPool, workspace_id: Uuid, ticket_id: Uuid) -> Result<Ticket, AppError> {
    sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1 AND workspace_id = $2")
        .bind(ticket_id)
        .bind(workspace_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Ticket"))
}

/// Fetch a ticket only if it belongs to the portal contact.
pub async fn load_for_contact(
    pool: &DbPool,
    portal: &PortalContext,
    ticket_id: Uuid,
) -> Result<Ticket, AppError> {
    sqlx::query_as::<_, Ticket>(
        "SELECT * FROM tickets WHERE id = $1 AND workspace_id = $2 AND contact_id = $3",
    )
    .bind(ticket_id)
    .bind(portal.workspace_id)
    .bind(portal.contact_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Ticket"))
}

async fn lock(conn: &mut PgConnection, workspace_id: Uuid, ticket_id: Uuid) -> Result<Ticket, AppError> {
    sqlx::query_as::<_, Ticket>(
        "SELECT * FROM tickets WHERE id = $1 AND workspace_id = $2 FOR UPDATE",
    )
    .bind(ticket_id)
    .bind(workspace_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Ticket"))
}

/// List tickets, newest first.
pub async fn list(
    pool: &DbPool,
    workspace_id: Uuid,
    query: &TicketListQuery,
) -> Result<Vec<Ticket>, AppError> {
    let (limit, offset) = Page {
        limit: query.limit,
        offset: query.offset,
    }
    .bounds();
    let tag = query.tag.as_deref().map(normalize_tag).filter(|t| !t.is_empty());
    let search = non_blank(query.search.clone()).map(|s| like_pattern(&s));

    let tickets = sqlx::query_as::<_, Ticket>(
        r#"
        SELECT t.*
        FROM tickets t
        WHERE t.workspace_id = $1
          AND ($2::text IS NULL OR t.status = $2)
          AND ($3::text IS NULL OR t.priority = $3)
          AND ($4::uuid IS NULL OR t.assignee_id = $4)
          AND ($5::uuid IS NULL OR t.contact_id = $5)
          AND ($6::text IS NULL OR EXISTS (
                SELECT 1 FROM ticket_tags tt
                JOIN tags g ON g.id = tt.tag_id
                WHERE tt.ticket_id = t.id AND g.name = $6))
          AND ($7::text IS NULL OR t.subject ILIKE $7 OR t.description ILIKE $7)
        ORDER BY t.created_at DESC, t.number DESC
        LIMIT $8 OFFSET $9
        "#,
    )
    .bind(workspace_id)
    .bind(query.status)
    .bind(query.priority)
    .bind(query.assignee_id)
    .bind(query.contact_id)
    .bind(tag)
    .bind(search)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(tickets)
}

pub(crate) async fn ticket_prefix(pool: &DbPool, workspace_id: Uuid) -> Result<String, AppError> {
    sqlx::query_scalar("SELECT ticket_prefix FROM workspaces WHERE id = $1")
        .bind(workspace_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("Workspace"))
}

/// Attach display numbers, tags and SLA state to tickets of one workspace.
pub async fn to_responses(
    pool: &DbPool,
    workspace_id: Uuid,
    tickets: Vec<Ticket>,
) -> Result<Vec<TicketResponse>, AppError> {
    if tickets.is_empty() {
        return Ok(Vec::new());
    }

    let prefix = ticket_prefix(pool, workspace_id).await?;
    let ids: Vec<Uuid> = tickets.iter().map(|t| t.id).collect();

    let rows = sqlx::query_as::<_, (Uuid, String)>(
        r#"
        SELECT tt.ticket_id, g.name
        FROM ticket_tags tt
        JOIN tags g ON g.id = tt.tag_id
        WHERE tt.ticket_id = ANY($1)
        ORDER BY g.name
        "#,
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut tags: HashMap<Uuid, Vec<String>> = HashMap::new();
    for (ticket_id, name) in rows {
        tags.entry(ticket_id).or_default().push(name);
    }

    let now = Utc::now();
    Ok(tickets
        .into_iter()
        .map(|ticket| TicketResponse {
            display_number: display_number(&prefix, ticket.number),
            tags: tags.remove(&ticket.id).unwrap_or_default(),
            sla: sla::evaluate(&ticket, now),
            ticket,
        })
        .collect())
}

pub async fn to_response(pool: &DbPool, ticket: Ticket) -> Result<TicketResponse, AppError> {
    let workspace_id = ticket.workspace_id;
    to_responses(pool, workspace_id, vec![ticket])
        .await?
        .into_iter()
        .next()
        .ok_or(AppError::NotFound("Ticket"))
}

/// Ticket with its conversation in chronological order.
///
/// Internal notes are left out when `include_internal` is false (portal).
pub async fn detail(
    pool: &DbPool,
    ticket: Ticket,
    include_internal: bool,
) -> Result<TicketDetail, AppError> {
    let messages = sqlx::query_as::<_, TicketMessage>(
        r#"
        SELECT * FROM ticket_messages
        WHERE ticket_id = $1 AND ($2 OR is_internal = false)
        ORDER BY created_at, id
        "#,
    )
    .bind(ticket.id)
    .bind(include_internal)
    .fetch_all(pool)
    .await?;

    Ok(TicketDetail {
        ticket: to_response(pool, ticket).await?,
        messages,
    })
}

fn differs(before: &Ticket, after: &Ticket) -> bool {
    before.subject != after.subject
        || before.description != after.description
        || before.status != after.status
        || before.priority != after.priority
        || before.channel != after.channel
        || before.assignee_id != after.assignee_id
}

/// Apply a partial update from an agent.
///
/// Status changes stamp `resolved_at` / `closed_at`; a priority change
/// recomputes SLA due times from `created_at`. When anything changed,
/// `ticket_updated` automations run and webhooks are notified.
pub async fn update(
    state: &AppState,
    workspace_id: Uuid,
    ticket_id: Uuid,
    request: UpdateTicketRequest,
) -> Result<Ticket, AppError> {
    let mut tx = state.pool.begin().await?;
    let current = lock(&mut tx, workspace_id, ticket_id).await?;
    let now = Utc::now();

    let subject = match &request.subject {
        Some(subject) => required("subject", subject)?,
        None => current.subject.clone(),
    };
    let description = match request.description {
        Some(description) => non_blank(Some(description)),
        None => current.description.clone(),
    };

    let status = request.status.unwrap_or(current.status);
    let stamps = if status != current.status {
        lifecycle::stamps_for(status, stamps_of(&current), now)
    } else {
        stamps_of(&current)
    };

    let priority = request.priority.unwrap_or(current.priority);
    let targets = if priority != current.priority {
        let policy = active_policy(&mut tx, workspace_id, priority).await?;
        sla::targets(current.created_at, policy.as_ref())
    } else {
        targets_of(&current)
    };

    let assignee_id = match request.assignee_id {
        Some(Some(user_id)) => {
            ensure_assignable(&mut tx, workspace_id, user_id).await?;
            Some(user_id)
        }
        Some(None) => None,
        None => current.assignee_id,
    };

    let updated = sqlx::query_as::<_, Ticket>(
        r#"
        UPDATE tickets
        SET subject = $2,
            description = $3,
            status = $4,
            priority = $5,
            channel = $6,
            assignee_id = $7,
            resolved_at = $8,
            closed_at = $9,
            first_response_due_at = $10,
            resolution_due_at = $11,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(current.id)
    .bind(&subject)
    .bind(description)
    .bind(status)
    .bind(priority)
    .bind(request.channel.unwrap_or(current.channel))
    .bind(assignee_id)
    .bind(stamps.resolved_at)
    .bind(stamps.closed_at)
    .bind(targets.first_response_due_at)
    .bind(targets.resolution_due_at)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    if !differs(&current, &updated) {
        return Ok(updated);
    }

    let updated = run_automations(state, updated, Trigger::TicketUpdated).await;
    webhook_service::notify(state, EventType::TicketUpdated, &updated, None);
    Ok(updated)
}

/// Delete a ticket with its messages and tag links.
pub async fn delete(pool: &DbPool, workspace_id: Uuid, ticket_id: Uuid) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM tickets WHERE id = $1 AND workspace_id = $2")
        .bind(ticket_id)
        .bind(workspace_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Ticket"));
    }
    tracing::info!(workspace_id = %workspace_id, ticket_id = %ticket_id, "Ticket deleted");
    Ok(())
}

async fn set_progress(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    status: TicketStatus,
    stamps: StatusStamps,
    first_response_at: Option<DateTime<Utc>>,
) -> Result<Ticket, AppError> {
    let ticket = sqlx::query_as::<_, Ticket>(
        r#"
        UPDATE tickets
        SET status = $2,
            resolved_at = $3,
            closed_at = $4,
            first_response_at = $5,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(ticket_id)
    .bind(status)
    .bind(stamps.resolved_at)
    .bind(stamps.closed_at)
    .bind(first_response_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(ticket)
}

/// Post an agent reply or internal note, optionally changing status.
///
/// The first public agent reply stamps `first_response_at`. Public replies
/// fire `agent_replied`; an internal note that changes status fires
/// `ticket_updated` instead.
pub async fn add_agent_message(
    state: &AppState,
    auth: &AuthContext,
    ticket_id: Uuid,
    request: CreateMessageRequest,
) -> Result<TicketMessage, AppError> {
    let body = required("body", &request.body)?;

    let mut tx = state.pool.begin().await?;
    let current = lock(&mut tx, auth.workspace_id, ticket_id).await?;
    let now = Utc::now();

    let message = insert_message(
        &mut tx,
        current.id,
        &NewMessage {
            author_kind: AuthorKind::Agent,
            author_id: Some(auth.user_id),
            body,
            is_internal: request.is_internal,
        },
    )
    .await?;

    let status = request.status.unwrap_or(current.status);
    let stamps = if status != current.status {
        lifecycle::stamps_for(status, stamps_of(&current), now)
    } else {
        stamps_of(&current)
    };
    let first_response_at = if request.is_internal {
        current.first_response_at
    } else {
        current.first_response_at.or(Some(now))
    };

    let ticket = set_progress(&mut tx, current.id, status, stamps, first_response_at).await?;
    tx.commit().await?;

    if !message.is_internal {
        webhook_service::notify(state, EventType::MessageCreated, &ticket, Some(&message));
        run_automations(state, ticket, Trigger::AgentReplied).await;
    } else if status != current.status {
        let ticket = run_automations(state, ticket, Trigger::TicketUpdated).await;
        webhook_service::notify(state, EventType::TicketUpdated, &ticket, None);
    }

    Ok(message)
}

/// Post a customer reply from the portal.
///
/// Resolved and pending tickets reopen; closed tickets reject the reply
/// with 409. Fires `customer_replied`.
pub async fn add_contact_reply(
    state: &AppState,
    portal: &PortalContext,
    ticket_id: Uuid,
    body: &str,
) -> Result<TicketMessage, AppError> {
    let body = required("body", body)?;

    let mut tx = state.pool.begin().await?;
    let current = sqlx::query_as::<_, Ticket>(
        r#"
        SELECT * FROM tickets
        WHERE id = $1 AND workspace_id = $2 AND contact_id = $3
        FOR UPDATE
        "#,
    )
    .bind(ticket_id)
    .bind(portal.workspace_id)
    .bind(portal.contact_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Ticket"))?;

    let status = lifecycle::status_after_customer_reply(current.status)?;
    let stamps = lifecycle::stamps_for(status, stamps_of(&current), Utc::now());

    let message = insert_message(
        &mut tx,
        current.id,
        &NewMessage {
            author_kind: AuthorKind::Contact,
            author_id: Some(portal.contact_id),
            body,
            is_internal: false,
        },
    )
    .await?;

    let ticket = set_progress(&mut tx, current.id, status, stamps, current.first_response_at).await?;
    tx.commit().await?;

    webhook_service::notify(state, EventType::MessageCreated, &ticket, Some(&message));
    run_automations(state, ticket, Trigger::CustomerReplied).await;

    Ok(message)
}

pub(crate) async fn insert_message(
    conn: &mut PgConnection,
    ticket_id: Uuid,
    message: &NewMessage,
) -> Result<TicketMessage, AppError> {
    let message = sqlx::query_as::<_, TicketMessage>(
        r#"
        INSERT INTO ticket_messages (ticket_id, author_kind, author_id, body, is_internal)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(ticket_id)
    .bind(message.author_kind)
    .bind(message.author_id)
    .bind(&message.body)
    .bind(message.is_internal)
    .fetch_one(&mut *conn)
    .await?;

    Ok(message)
}

/// Attach a tag by name, creating it in the workspace when new.
pub(crate) async fn attach_tag(
    conn: &mut PgConnection,
    workspace_id: Uuid,
    ticket_id: Uuid,
    name: &str,
) -> Result<(), AppError> {
    let name = normalize_tag(name);
    if name.is_empty() {
        return Err(AppError::InvalidRequest("tag must not be empty".to_string()));
    }

    let tag_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO tags (workspace_id, name)
        VALUES ($1, $2)
        ON CONFLICT (workspace_id, name) DO UPDATE SET name = EXCLUDED.name
        RETURNING id
        "#,
    )
    .bind(workspace_id)
    .bind(&name)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query("INSERT INTO ticket_tags (ticket_id, tag_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
        .bind(ticket_id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

pub(crate) async fn detach_tag(
    conn: &mut PgConnection,
    workspace_id: Uuid,
    ticket_id: Uuid,
    name: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        DELETE FROM ticket_tags tt
        USING tags g
        WHERE tt.tag_id = g.id
          AND tt.ticket_id = $1
          AND g.workspace_id = $2
          AND g.name = $3
        "#,
    )
    .bind(ticket_id)
    .bind(workspace_id)
    .bind(normalize_tag(name))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn tag_names(conn: &mut PgConnection, ticket_id: Uuid) -> Result<Vec<String>, AppError> {
    let names = sqlx::query_scalar(
        r#"
        SELECT g.name
        FROM ticket_tags tt
        JOIN tags g ON g.id = tt.tag_id
        WHERE tt.ticket_id = $1
        ORDER BY g.name
        "#,
    )
    .bind(ticket_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(names)
}

/// Add a tag to a ticket from the tag endpoints. Returns the ticket's tags.
pub async fn add_tag(
    pool: &DbPool,
    workspace_id: Uuid,
    ticket_id: Uuid,
    name: &str,
) -> Result<Vec<String>, AppError> {
    let mut tx = pool.begin().await?;
    let ticket = lock(&mut tx, workspace_id, ticket_id).await?;
    attach_tag(&mut tx, workspace_id, ticket.id, name).await?;
    let names = tag_names(&mut tx, ticket.id).await?;
    tx.commit().await?;
    Ok(names)
}

/// Remove a tag from a ticket. Removing an absent tag is a no-op.
pub async fn remove_tag(
    pool: &DbPool,
    workspace_id: Uuid,
    ticket_id: Uuid,
    name: &str,
) -> Result<Vec<String>, AppError> {
    let mut tx = pool.begin().await?;
    let ticket = lock(&mut tx, workspace_id, ticket_id).await?;
    detach_tag(&mut tx, workspace_id, ticket.id, name).await?;
    let names = tag_names(&mut tx, ticket.id).await?;
    tx.commit().await?;
    Ok(names)
}

async fn ensure_contact(
    conn: &mut PgConnection,
    workspace_id: Uuid,
    contact_id: Uuid,
) -> Result<(), AppError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM contacts WHERE id = $1 AND workspace_id = $2)",
    )
    .bind(contact_id)
    .bind(workspace_id)
    .fetch_one(&mut *conn)
    .await?;

    if !exists {
        return Err(AppError::NotFound("Contact"));
    }
    Ok(())
}

pub(crate) async fn is_assignable(
    conn: &mut PgConnection,
    workspace_id: Uuid,
    user_id: Uuid,
) -> Result<bool, AppError> {
    let assignable = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM users WHERE id = $1 AND workspace_id = $2 AND is_active = true)",
    )
    .bind(user_id)
    .bind(workspace_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(assignable)
}

/// Tickets can only be assigned to active users of their workspace.
pub(crate) async fn ensure_assignable(
    conn: &mut PgConnection,
    workspace_id: Uuid,
    user_id: Uuid,
) -> Result<(), AppError> {
    if !is_assignable(conn, workspace_id, user_id).await? {
        return Err(AppError::InvalidRequest(
            "assignee must be an active user of this workspace".to_string(),
        ));
    }
    Ok(())
}

/// The SLA policy applied to new tickets of `priority`: the most recently
/// updated active one.
pub(crate) async fn active_policy(
    conn: &mut PgConnection,
    workspace_id: Uuid,
    priority: Priority,
) -> Result<Option<SlaPolicy>, AppError> {
    let policy = sqlx::query_as::<_, SlaPolicy>(
        r#"
        SELECT * FROM sla_policies
        WHERE workspace_id = $1 AND priority = $2 AND is_active = true
        ORDER BY updated_at DESC
        LIMIT 1
        "#,
    )
    .bind(workspace_id)
    .bind(priority)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(policy)
}

/// The attributes automation rules see for `ticket`.
pub async fn snapshot(conn: &mut PgConnection, ticket: &Ticket) -> Result<TicketSnapshot, AppError> {
    let contact_email: Option<String> = match ticket.contact_id {
        Some(contact_id) => {
            sqlx::query_scalar("SELECT email FROM contacts WHERE id = $1")
                .bind(contact_id)
                .fetch_optional(&mut *conn)
                .await?
        }
        None => None,
    };
    let tags = tag_names(conn, ticket.id).await?;

    Ok(TicketSnapshot::new(ticket, contact_email, tags))
}

/// Persist a set of changes produced by automations or an approved AI
/// action, inside the caller's transaction.
///
/// - status changes stamp `resolved_at` / `closed_at`
/// - priority changes recompute SLA due times
/// - assignments to users that are no longer assignable are skipped
/// - notes and replies are written with `author` as their author kind;
///   an AI reply counts as the first response, an automation reply does not
pub async fn apply_changes(
    conn: &mut PgConnection,
    ticket: &Ticket,
    changes: &TicketChanges,
    author: AuthorKind,
    author_id: Option<Uuid>,
) -> Result<Ticket, AppError> {
    let now = Utc::now();

    let status = changes.status.unwrap_or(ticket.status);
    let stamps = match changes.status {
        Some(status) => lifecycle::stamps_for(status, stamps_of(ticket), now),
        None => stamps_of(ticket),
    };

    let priority = changes.priority.unwrap_or(ticket.priority);
    let targets = match changes.priority {
        Some(priority) => {
            let policy = active_policy(conn, ticket.workspace_id, priority).await?;
            sla::targets(ticket.created_at, policy.as_ref())
        }
        None => targets_of(ticket),
    };

    let mut assignee_id = ticket.assignee_id;
    match changes.assignee_id {
        Some(Some(user_id)) => {
            if is_assignable(conn, ticket.workspace_id, user_id).await? {
                assignee_id = Some(user_id);
            } else {
                tracing::warn!(
                    ticket_id = %ticket.id,
                    user_id = %user_id,
                    "Skipping assignment to a user that is not an active workspace member"
                );
            }
        }
        Some(None) => assignee_id = None,
        None => {}
    }

    let answers_customer = author == AuthorKind::Ai && !changes.effects.replies.is_empty();
    let first_response_at = match ticket.first_response_at {
        Some(at) => Some(at),
        None if answers_customer => Some(now),
        None => None,
    };

    let updated = sqlx::query_as::<_, Ticket>(
        r#"
        UPDATE tickets
        SET status = $2,
            priority = $3,
            assignee_id = $4,
            resolved_at = $5,
            closed_at = $6,
            first_response_due_at = $7,
            resolution_due_at = $8,
            first_response_at = $9,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(ticket.id)
    .bind(status)
    .bind(priority)
    .bind(assignee_id)
    .bind(stamps.resolved_at)
    .bind(stamps.closed_at)
    .bind(targets.first_response_due_at)
    .bind(targets.resolution_due_at)
    .bind(first_response_at)
    .fetch_one(&mut *conn)
    .await?;

    for tag in &changes.add_tags {
        attach_tag(conn, ticket.workspace_id, ticket.id, tag).await?;
    }
    for tag in &changes.remove_tags {
        detach_tag(conn, ticket.workspace_id, ticket.id, tag).await?;
    }

    let notes = changes.effects.notes.iter().map(|body| (body, true));
    let replies = changes.effects.replies.iter().map(|body| (body, false));
    for (body, is_internal) in notes.chain(replies) {
        insert_message(
            conn,
            ticket.id,
            &NewMessage {
                author_kind: author,
                author_id,
                body: body.clone(),
                is_internal,
            },
        )
        .await?;
    }

    Ok(updated)
}

/// Run the workspace's automations for `trigger` and persist the outcome.
///
/// Returns the ticket as it stands afterwards. A failure here is logged
/// and leaves the ticket as it was; it never fails the request that
/// triggered it.
pub async fn run_automations(state: &AppState, ticket: Ticket, trigger: Trigger) -> Ticket {
    match try_run_automations(&state.pool, &ticket, trigger).await {
        Ok(Some(updated)) => updated,
        Ok(None) => ticket,
        Err(e) => {
            tracing::error!(
                ticket_id = %ticket.id,
                trigger = %trigger,
                "Automation run failed: {:?}",
                e
            );
            ticket
        }
    }
}

async fn try_run_automations(
    pool: &DbPool,
    ticket: &Ticket,
    trigger: Trigger,
) -> Result<Option<Ticket>, AppError> {
    let automations = sqlx::query_as::<_, Automation>(
        r#"
        SELECT * FROM automations
        WHERE workspace_id = $1 AND trigger = $2 AND is_active = true
        ORDER BY priority, created_at
        "#,
    )
    .bind(ticket.workspace_id)
    .bind(trigger)
    .fetch_all(pool)
    .await?;

    if automations.is_empty() {
        return Ok(None);
    }

    let mut tx = pool.begin().await?;
    let current = lock(&mut tx, ticket.workspace_id, ticket.id).await?;
    let before = snapshot(&mut tx, &current).await?;
    let outcome = automation_engine::run(trigger, before.clone(), &automations);

    if outcome.fired.is_empty() {
        return Ok(None);
    }

    let changes = TicketChanges::between(&before, &outcome.snapshot, outcome.effects);
    let updated = apply_changes(&mut tx, &current, &changes, AuthorKind::Automation, None).await?;

    for fired in &outcome.fired {
        sqlx::query(
            r#"
            INSERT INTO automation_runs (automation_id, ticket_id, trigger, actions)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(fired.automation_id)
        .bind(current.id)
        .bind(trigger)
        .bind(Json(&fired.actions))
        .execute(&mut *tx)
        .await?;

        tracing::info!(
            ticket_id = %current.id,
            automation_id = %fired.automation_id,
            automation = %fired.name,
            trigger = %trigger,
            "Automation fired"
        );
    }

    tx.commit().await?;
    Ok(Some(updated))
}

/// Ticket counts for the dashboard.
///
/// `overdue` counts active tickets whose SLA is breached, the same set
/// [`breaches`] returns.
pub async fn stats(pool: &DbPool, workspace_id: Uuid) -> Result<TicketStats, AppError> {
    let stats = sqlx::query_as::<_, TicketStats>(
        r#"
        SELECT
            COUNT(*) AS total,
            COUNT(*) FILTER (WHERE status = 'open') AS open,
            COUNT(*) FILTER (WHERE status = 'pending') AS pending,
            COUNT(*) FILTER (WHERE status = 'resolved') AS resolved,
            COUNT(*) FILTER (WHERE status = 'closed') AS closed,
            COUNT(*) FILTER (
                WHERE assignee_id IS NULL AND status IN ('open', 'pending')
            ) AS unassigned,
            COUNT(*) FILTER (
                WHERE status IN ('open', 'pending')
                  AND (COALESCE(first_response_at > first_response_due_at,
                                NOW() > first_response_due_at)
                       OR COALESCE(COALESCE(resolved_at, closed_at) > resolution_due_at,
                                   NOW() > resolution_due_at))
            ) AS overdue
        FROM tickets
        WHERE workspace_id = $1
        "#,
    )
    .bind(workspace_id)
    .fetch_one(pool)
    .await?;

    Ok(stats)
}

/// Unresolved tickets whose SLA is breached, most overdue first.
pub async fn breaches(pool: &DbPool, workspace_id: Uuid) -> Result<Vec<Ticket>, AppError> {
    let candidates = sqlx::query_as::<_, Ticket>(
        r#"
        SELECT * FROM tickets
        WHERE workspace_id = $1
          AND status IN ('open', 'pending')
          AND (first_response_due_at IS NOT NULL OR resolution_due_at IS NOT NULL)
        ORDER BY LEAST(first_response_due_at, resolution_due_at) ASC
        "#,
    )
    .bind(workspace_id)
    .fetch_all(pool)
    .await?;

    let now = Utc::now();
    Ok(candidates
        .into_iter()
        .filter(|ticket| sla::evaluate(ticket, now) == SlaState::Breached)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{new_ticket, seed_tenant, state};
    use chrono::Duration;
    use serde_json::json;

    fn ticket() -> Ticket {
        let now = Utc::now();
        Ticket {
            id: Uuid::new_v4(),
            workspace_id: Uuid::new_v4(),
            number: 7,
            subject: "Invoice missing".to_string(),
            description: None,
            status: TicketStatus::Open,
            priority: Priority::Normal,
            channel: ChannelKind::Web,
            contact_id: None,
            assignee_id: None,
            first_response_due_at: Some(now + Duration::hours(1)),
            resolution_due_at: Some(now + Duration::hours(8)),
            first_response_at: None,
            resolved_at: None,
            closed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn differs_ignores_timestamps() {
        let before = ticket();
        let mut after = before.clone();
        after.updated_at = after.updated_at + Duration::seconds(5);
        assert!(!differs(&before, &after));

        after.assignee_id = Some(Uuid::new_v4());
        assert!(differs(&before, &after));
    }

    #[test]
    fn stamps_and_targets_mirror_the_row() {
        let mut t = ticket();
        t.resolved_at = Some(t.created_at);
        assert_eq!(stamps_of(&t).resolved_at, Some(t.created_at));
        assert_eq!(stamps_of(&t).closed_at, None);
        assert_eq!(targets_of(&t).resolution_due_at, t.resolution_due_at);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn numbers_are_gap_free_per_workspace(pool: DbPool) {
        let acme = seed_tenant(&pool, "acme").await;
        let globex = seed_tenant(&pool, "globex").await;
        let state = state(pool);

        let mut handles = Vec::new();
        for i in 0..8 {
            let state = state.clone();
            let workspace_id = acme.workspace_id;
            handles.push(tokio::spawn(async move {
                create(&state, workspace_id, new_ticket(&format!("Ticket {i}"), None))
                    .await
                    .unwrap()
                    .number
            }));
        }
        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap());
        }
        numbers.sort();
        assert_eq!(numbers, (1..=8).collect::<Vec<i64>>());

        let other = create(&state, globex.workspace_id, new_ticket("First", None))
            .await
            .unwrap();
        assert_eq!(other.number, 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn automation_changes_and_run_log_are_stored_together(pool: DbPool) {
        let acme = seed_tenant(&pool, "acme").await;
        sqlx::query(
            r#"
            INSERT INTO automations (workspace_id, name, trigger, conditions, actions)
            VALUES ($1, 'Escalate outages', 'ticket_created', $2, $3)
            "#,
        )
        .bind(acme.workspace_id)
        .bind(json!([{ "field": "subject", "operator": "contains", "value": "outage" }]))
        .bind(json!([
            { "type": "set_priority", "priority": "urgent" },
            { "type": "add_tag", "tag": "escalated" }
        ]))
        .execute(&pool)
        .await
        .unwrap();
        let state = state(pool.clone());

        let escalated = create(&state, acme.workspace_id, new_ticket("Checkout outage", None))
            .await
            .unwrap();
        let quiet = create(&state, acme.workspace_id, new_ticket("Invoice copy", None))
            .await
            .unwrap();

        assert_eq!(escalated.priority, Priority::Urgent);
        let stored = load(&pool, acme.workspace_id, escalated.id).await.unwrap();
        assert_eq!(stored.priority, Priority::Urgent);
        let response = to_response(&pool, stored).await.unwrap();
        assert_eq!(response.tags, vec!["escalated".to_string()]);

        let runs: Vec<(Uuid, i64)> = sqlx::query_as(
            "SELECT ticket_id, COUNT(*) FROM automation_runs GROUP BY ticket_id",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(runs, vec![(escalated.id, 1)]);
        assert_eq!(quiet.priority, Priority::Normal);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn failed_automation_leaves_no_partial_outcome(pool: DbPool) {
        let acme = seed_tenant(&pool, "acme").await;
        // A blank tag passes the engine but is refused when written.
        sqlx::query(
            r#"
            INSERT INTO automations (workspace_id, name, trigger, actions)
            VALUES ($1, 'Broken rule', 'ticket_created', $2)
            "#,
        )
        .bind(acme.workspace_id)
        .bind(json!([
            { "type": "set_priority", "priority": "urgent" },
            { "type": "add_tag", "tag": "   " }
        ]))
        .execute(&pool)
        .await
        .unwrap();
        let state = state(pool.clone());

        let ticket = create(&state, acme.workspace_id, new_ticket("Anything", None))
            .await
            .unwrap();

        assert_eq!(ticket.priority, Priority::Normal);
        let stored = load(&pool, acme.workspace_id, ticket.id).await.unwrap();
        assert_eq!(stored.priority, Priority::Normal);
        let runs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM automation_runs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(runs, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn tickets_of_another_workspace_are_not_found(pool: DbPool) {
        let acme = seed_tenant(&pool, "acme").await;
        let globex = seed_tenant(&pool, "globex").await;
        let state = state(pool.clone());

        let ticket = create(&state, acme.workspace_id, new_ticket("Private", None))
            .await
            .unwrap();

        assert!(matches!(
            load(&pool, globex.workspace_id, ticket.id).await,
            Err(AppError::NotFound("Ticket"))
        ));
        assert!(matches!(
            update(
                &state,
                globex.workspace_id,
                ticket.id,
                UpdateTicketRequest {
                    status: Some(TicketStatus::Closed),
                    ..Default::default()
                },
            )
            .await,
            Err(AppError::NotFound("Ticket"))
        ));
        assert!(matches!(
            delete(&pool, globex.workspace_id, ticket.id).await,
            Err(AppError::NotFound("Ticket"))
        ));
        assert_eq!(
            load(&pool, acme.workspace_id, ticket.id).await.unwrap().status,
            TicketStatus::Open
        );
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn overdue_count_matches_breach_list(pool: DbPool) {
        let acme = seed_tenant(&pool, "acme").await;
        let state = state(pool.clone());

        let late_reply = create(&state, acme.workspace_id, new_ticket("Answered late", None))
            .await
            .unwrap();
        let on_time = create(&state, acme.workspace_id, new_ticket("Answered on time", None))
            .await
            .unwrap();
        let no_reply = create(&state, acme.workspace_id, new_ticket("Never answered", None))
            .await
            .unwrap();

        let now = Utc::now();
        let due = now - Duration::hours(2);
        for (ticket, replied_at) in [
            (&late_reply, Some(now - Duration::hours(1))),
            (&on_time, Some(now - Duration::hours(3))),
            (&no_reply, None),
        ] {
            sqlx::query(
                r#"
                UPDATE tickets
                SET first_response_due_at = $2, first_response_at = $3, resolution_due_at = $4
                WHERE id = $1
                "#,
            )
            .bind(ticket.id)
            .bind(due)
            .bind(replied_at)
            .bind(now + Duration::days(1))
            .execute(&pool)
            .await
            .unwrap();
        }

        let breached = breaches(&pool, acme.workspace_id).await.unwrap();
        let stats = stats(&pool, acme.workspace_id).await.unwrap();

        assert_eq!(breached.len(), 2);
        assert!(breached.iter().all(|t| t.id != on_time.id));
        assert_eq!(stats.overdue, 2);
        assert_eq!(stats.open, 3);
    }
}
