//! AI-agent assist: proposal intake, reply drafting and human approval.
//!
//! # Flow
//!
//! 1. An AI agent proposes an action on a ticket (or asks for a draft reply)
//! 2. `ai_gate` decides whether the proposal runs now or waits for a human
//! 3. Pending proposals are approved (executed) or rejected by an agent
//!
//! Executing an action goes through the same snapshot/diff/persist path as
//! automations, with messages authored as `ai`.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::types::Json;
use uuid::Uuid;

use crate::{
    config::Config,
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        ai::{
            AiAction, AiActionListQuery, AiActionStatus, AiSettings, ProposeActionRequest,
            UpdateAiSettingsRequest,
        },
        automation::Action,
        kb::KbArticle,
        ticket::{AuthorKind, Ticket, TicketMessage},
        webhook::EventType,
    },
    services::{
        ai_gate::{self, GateDecision},
        automation_engine::{self, Effects, TicketChanges},
        kb, ticket_service, webhook_service,
    },
    state::AppState,
};

/// How many knowledge base articles a draft draws on.
const DRAFT_ARTICLES: usize = 3;

/// Settings of a workspace, or the defaults when none were saved.
pub async fn load_settings(pool: &DbPool, workspace_id: Uuid) -> Result<AiSettings, AppError> {
    let settings =
        sqlx::query_as::<_, AiSettings>("SELECT * FROM ai_settings WHERE workspace_id = $1")
            .bind(workspace_id)
            .fetch_optional(pool)
            .await?;

    Ok(settings.unwrap_or_else(|| AiSettings::defaults(workspace_id)))
}

/// Merge a partial update into the current settings and save them.
pub async fn save_settings(
    pool: &DbPool,
    workspace_id: Uuid,
    request: UpdateAiSettingsRequest,
) -> Result<AiSettings, AppError> {
    let current = load_settings(pool, workspace_id).await?;

    let enabled = request.enabled.unwrap_or(current.enabled);
    let threshold = request
        .auto_approve_threshold
        .unwrap_or(current.auto_approve_threshold);
    let mut kinds = request
        .auto_approve_kinds
        .unwrap_or(current.auto_approve_kinds);
    kinds.sort();
    kinds.dedup();

    ai_gate::validate_settings(threshold, &kinds)?;

    let settings = sqlx::query_as::<_, AiSettings>(
        r#"
        INSERT INTO ai_settings (workspace_id, enabled, auto_approve_threshold, auto_approve_kinds, updated_at)
        VALUES ($1, $2, $3, $4, NOW())
        ON CONFLICT (workspace_id) DO UPDATE
        SET enabled = EXCLUDED.enabled,
            auto_approve_threshold = EXCLUDED.auto_approve_threshold,
            auto_approve_kinds = EXCLUDED.auto_approve_kinds,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(workspace_id)
    .bind(enabled)
    .bind(threshold)
    .bind(&kinds)
    .fetch_one(pool)
    .await?;

    tracing::info!(workspace_id = %workspace_id, enabled, threshold, "AI settings updated");
    Ok(settings)
}

/// List proposals of the workspace, newest first, optionally for one ticket.
pub async fn list(
    pool: &DbPool,
    workspace_id: Uuid,
    ticket_id: Option<Uuid>,
    query: &AiActionListQuery,
) -> Result<Vec<AiAction>, AppError> {
    let actions = sqlx::query_as::<_, AiAction>(
        r#"
        SELECT * FROM ai_actions
        WHERE workspace_id = $1
          AND ($2::uuid IS NULL OR ticket_id = $2)
          AND ($3::text IS NULL OR status = $3)
        ORDER BY created_at DESC
        "#,
    )
    .bind(workspace_id)
    .bind(ticket_id)
    .bind(query.status)
    .fetch_all(pool)
    .await?;

    Ok(actions)
}

/// Apply one action to a ticket inside the caller's transaction.
async fn execute(
    conn: &mut PgConnection,
    ticket: &Ticket,
    action: &Action,
) -> Result<Ticket, AppError> {
    let before = ticket_service::snapshot(conn, ticket).await?;
    let mut after = before.clone();
    let mut effects = Effects::default();
    automation_engine::apply(&mut after, action, &mut effects);

    let changes = TicketChanges::between(&before, &after, effects);
    ticket_service::apply_changes(conn, ticket, &changes, AuthorKind::Ai, None).await
}

async fn lock_ticket(
    conn: &mut PgConnection,
    workspace_id: Uuid,
    ticket_id: Uuid,
) -> Result<Ticket, AppError> {
    sqlx::query_as::<_, Ticket>(
        "SELECT * FROM tickets WHERE id = $1 AND workspace_id = $2 FOR UPDATE",
    )
    .bind(ticket_id)
    .bind(workspace_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("Ticket"))
}

/// Take in a proposed action for a ticket.
///
/// # Process
///
/// 1. Gate the proposal against the workspace's AI settings
/// 2. Validate an assignee up front so a pending proposal is executable
/// 3. Store it; when auto-approved, execute it in the same transaction
pub async fn propose(
    state: &AppState,
    auth: &AuthContext,
    ticket_id: Uuid,
    request: ProposeActionRequest,
) -> Result<AiAction, AppError> {
    let settings = load_settings(&state.pool, auth.workspace_id).await?;
    let decision = ai_gate::decide(&settings, &request.action, request.confidence)?;

    let mut tx = state.pool.begin().await?;
    let ticket = lock_ticket(&mut tx, auth.workspace_id, ticket_id).await?;

    ensure_executable(&mut tx, auth.workspace_id, &request.action).await?;

    let (status, executed) = match decision {
        GateDecision::AutoApprove => {
            let updated = execute(&mut tx, &ticket, &request.action).await?;
            (AiActionStatus::Executed, Some(updated))
        }
        GateDecision::RequireApproval => (AiActionStatus::Pending, None),
    };

    let action = sqlx::query_as::<_, AiAction>(
        r#"
        INSERT INTO ai_actions (workspace_id, ticket_id, kind, action, confidence, rationale, status, decided_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(auth.workspace_id)
    .bind(ticket.id)
    .bind(request.action.kind())
    .bind(Json(&request.action))
    .bind(request.confidence)
    .bind(request.rationale.filter(|r| !r.trim().is_empty()))
    .bind(status)
    .bind(executed.as_ref().map(|_| Utc::now()))
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        ai_action_id = %action.id,
        ticket_id = %ticket.id,
        kind = %action.kind,
        status = %action.status,
        confidence = ?action.confidence,
        "AI action gated"
    );

    if let Some(updated) = executed {
        webhook_service::notify(state, EventType::TicketUpdated, &updated, None);
    }

    Ok(action)
}

/// An assignment must name an active user, both when proposed and when
/// approved later.
async fn ensure_executable(
    conn: &mut PgConnection,
    workspace_id: Uuid,
    action: &Action,
) -> Result<(), AppError> {
    if let Action::Assign { user_id: Some(user_id) } = action {
        ticket_service::ensure_assignable(conn, workspace_id, *user_id).await?;
    }
    Ok(())
}

async fn lock_pending(
    conn: &mut PgConnection,
    workspace_id: Uuid,
    action_id: Uuid,
) -> Result<AiAction, AppError> {
    let action = sqlx::query_as::<_, AiAction>(
        "SELECT * FROM ai_actions WHERE id = $1 AND workspace_id = $2 FOR UPDATE",
    )
    .bind(action_id)
    .bind(workspace_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(AppError::NotFound("AI action"))?;

    if action.status != AiActionStatus::Pending {
        return Err(AppError::Conflict(format!(
            "AI action is already {}",
            action.status
        )));
    }
    Ok(action)
}

async fn record_decision(
    conn: &mut PgConnection,
    action_id: Uuid,
    status: AiActionStatus,
    decided_by: Uuid,
) -> Result<AiAction, AppError> {
    let action = sqlx::query_as::<_, AiAction>(
        r#"
        UPDATE ai_actions
        SET status = $2, decided_by = $3, decided_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(action_id)
    .bind(status)
    .bind(decided_by)
    .fetch_one(&mut *conn)
    .await?;

    Ok(action)
}

/// Execute a pending proposal on behalf of the approving agent.
pub async fn approve(
    state: &AppState,
    auth: &AuthContext,
    action_id: Uuid,
) -> Result<AiAction, AppError> {
    let mut tx = state.pool.begin().await?;
    let pending = lock_pending(&mut tx, auth.workspace_id, action_id).await?;
    let ticket = lock_ticket(&mut tx, auth.workspace_id, pending.ticket_id).await?;
    ensure_executable(&mut tx, auth.workspace_id, &pending.action.0).await?;

    let updated = execute(&mut tx, &ticket, &pending.action.0).await?;
    let action = record_decision(&mut tx, pending.id, AiActionStatus::Executed, auth.user_id).await?;

    tx.commit().await?;

    tracing::info!(ai_action_id = %action.id, user_id = %auth.user_id, "AI action approved");
    webhook_service::notify(state, EventType::TicketUpdated, &updated, None);

    Ok(action)
}

pub async fn reject(pool: &DbPool, auth: &AuthContext, action_id: Uuid) -> Result<AiAction, AppError> {
    let mut tx = pool.begin().await?;
    let pending = lock_pending(&mut tx, auth.workspace_id, action_id).await?;
    let action = record_decision(&mut tx, pending.id, AiActionStatus::Rejected, auth.user_id).await?;
    tx.commit().await?;

    tracing::info!(ai_action_id = %action.id, user_id = %auth.user_id, "AI action rejected");
    Ok(action)
}

/// Draft a reply for a ticket and store it as a pending `send_reply`.
///
/// With an AI provider configured the draft is generated from the public
/// thread and the best matching articles; otherwise it is assembled from
/// those articles directly, and a ticket no article matches yields 422.
pub async fn draft(
    state: &AppState,
    auth: &AuthContext,
    ticket_id: Uuid,
) -> Result<AiAction, AppError> {
    let pool = &state.pool;
    let settings = load_settings(pool, auth.workspace_id).await?;
    if !settings.enabled {
        return Err(AppError::Conflict(
            "AI assist is disabled for this workspace".to_string(),
        ));
    }

    let ticket = ticket_service::load(pool, auth.workspace_id, ticket_id).await?;
    let messages = sqlx::query_as::<_, TicketMessage>(
        "SELECT * FROM ticket_messages WHERE ticket_id = $1 AND is_internal = false ORDER BY created_at, id",
    )
    .bind(ticket.id)
    .fetch_all(pool)
    .await?;

    let articles = sqlx::query_as::<_, KbArticle>(
        "SELECT * FROM kb_articles WHERE workspace_id = $1 AND status = 'published'",
    )
    .bind(auth.workspace_id)
    .fetch_all(pool)
    .await?;
    let matches = kb::rank(&articles, &draft_query(&ticket, &messages), DRAFT_ARTICLES);

    let contact_name: Option<String> = match ticket.contact_id {
        Some(contact_id) => {
            sqlx::query_scalar("SELECT name FROM contacts WHERE id = $1")
                .bind(contact_id)
                .fetch_optional(pool)
                .await?
        }
        None => None,
    };

    let (body, rationale) = match state.config.ai_endpoint() {
        Some(endpoint) => {
            let prompt = build_prompt(&ticket, &messages, &matches, &auth.user_name);
            let body = complete(&state.http, &state.config, endpoint, prompt).await?;
            (body, format!("Generated by {}", state.config.ai_model))
        }
        None => {
            let body = kb_draft(contact_name.as_deref(), &matches).ok_or_else(|| {
                AppError::Unprocessable(
                    "No knowledge base article matches this ticket".to_string(),
                )
            })?;
            let titles: Vec<&str> = matches.iter().map(|(a, _)| a.title.as_str()).collect();
            (body, format!("Drafted from articles: {}", titles.join(", ")))
        }
    };

    let action = Action::SendReply { body };
    let stored = sqlx::query_as::<_, AiAction>(
        r#"
        INSERT INTO ai_actions (workspace_id, ticket_id, kind, action, rationale, status)
        VALUES ($1, $2, $3, $4, $5, 'pending')
        RETURNING *
        "#,
    )
    .bind(auth.workspace_id)
    .bind(ticket.id)
    .bind(action.kind())
    .bind(Json(&action))
    .bind(rationale)
    .fetch_one(pool)
    .await?;

    tracing::info!(ai_action_id = %stored.id, ticket_id = %ticket.id, "AI draft created");
    Ok(stored)
}

/// Text used to find articles relevant to a ticket: subject, description
/// and the latest customer message.
fn draft_query(ticket: &Ticket, messages: &[TicketMessage]) -> String {
    let latest_customer = messages
        .iter()
        .rev()
        .find(|m| m.author_kind == AuthorKind::Contact)
        .map(|m| m.body.as_str())
        .unwrap_or_default();

    format!(
        "{} {} {}",
        ticket.subject,
        ticket.description.as_deref().unwrap_or_default(),
        latest_customer
    )
}

/// Template reply pointing the customer at matching articles.
fn kb_draft(contact_name: Option<&str>, matches: &[(&KbArticle, u32)]) -> Option<String> {
    if matches.is_empty() {
        return None;
    }

    let greeting = contact_name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or("there");
    let mut body = format!(
        "Hi {greeting},\n\nThanks for reaching out. These articles should help:\n"
    );
    for (article, _) in matches {
        body.push_str(&format!("\n- {}: {}", article.title, kb::excerpt(&article.body, 160)));
    }
    body.push_str("\n\nLet us know if anything is still unclear.");
    Some(body)
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

fn build_prompt(
    ticket: &Ticket,
    messages: &[TicketMessage],
    matches: &[(&KbArticle, u32)],
    agent_name: &str,
) -> Vec<ChatMessage> {
    let mut system = format!(
        "You are a customer support agent named {agent_name}. Write a concise, friendly reply \
         to the customer. Only state facts found in the conversation or the reference articles."
    );
    if !matches.is_empty() {
        system.push_str("\n\nReference articles:");
        for (article, _) in matches {
            system.push_str(&format!("\n\n## {}\n{}", article.title, article.body));
        }
    }

    let mut thread = format!("Ticket #{}: {}\n", ticket.number, ticket.subject);
    if let Some(description) = &ticket.description {
        thread.push_str(&format!("{description}\n"));
    }
    for message in messages {
        let who = match message.author_kind {
            AuthorKind::Contact => "Customer",
            _ => "Support",
        };
        thread.push_str(&format!("\n{who}: {}", message.body));
    }

    vec![
        ChatMessage {
            role: "system".to_string(),
            content: system,
        },
        ChatMessage {
            role: "user".to_string(),
            content: thread,
        },
    ]
}

/// Call an OpenAI-compatible chat completions endpoint.
async fn complete(
    http: &reqwest::Client,
    config: &Config,
    endpoint: &str,
    messages: Vec<ChatMessage>,
) -> Result<String, AppError> {
    let mut request = http
        .post(endpoint)
        .timeout(Duration::from_secs(config.ai_timeout_secs.max(1)))
        .json(&ChatRequest {
            model: &config.ai_model,
            messages,
            temperature: 0.3,
        });
    if let Some(key) = config.ai_api_key.as_deref() {
        request = request.bearer_auth(key);
    }

    let response = request
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Upstream(format!("provider returned {status}")));
    }

    let completion: ChatResponse = response
        .json()
        .await
        .map_err(|e| AppError::Upstream(format!("unexpected response: {e}")))?;

    completion
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| AppError::Upstream("provider returned an empty completion".to_string()))
}
