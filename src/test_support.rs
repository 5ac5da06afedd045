//! Fixtures shared by database-backed tests.

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    config::test_config,
    db::{DbPool, generate_token, hash_token},
    middleware::auth::AuthContext,
    models::{
        ticket::{ChannelKind, Priority},
        workspace::Role,
    },
    routes::build_router,
    services::ticket_service::NewTicket,
    state::AppState,
};

/// A workspace with one admin (holding an API key) and one contact
/// (holding a portal token).
pub struct Tenant {
    pub workspace_id: Uuid,
    pub admin_id: Uuid,
    pub api_key: String,
    pub contact_id: Uuid,
    pub portal_token: String,
}

impl Tenant {
    pub fn auth(&self) -> AuthContext {
        AuthContext {
            workspace_id: self.workspace_id,
            user_id: self.admin_id,
            user_name: "Ada Admin".to_string(),
            role: Role::Admin,
        }
    }
}

pub fn state(pool: DbPool) -> AppState {
    AppState::new(pool, test_config()).unwrap()
}

pub fn app(pool: DbPool) -> Router {
    build_router(state(pool))
}

pub async fn seed_tenant(pool: &DbPool, slug: &str) -> Tenant {
    let workspace_id: Uuid =
        sqlx::query_scalar("INSERT INTO workspaces (name, slug) VALUES ($1, $1) RETURNING id")
            .bind(slug)
            .fetch_one(pool)
            .await
            .unwrap();

    let admin_id = seed_user(pool, workspace_id, &format!("ada@{slug}.test"), Role::Admin).await;

    let api_key = generate_token("hd_key");
    sqlx::query(
        "INSERT INTO api_keys (workspace_id, user_id, key_hash, label) VALUES ($1, $2, $3, 'tests')",
    )
    .bind(workspace_id)
    .bind(admin_id)
    .bind(hash_token(&api_key))
    .execute(pool)
    .await
    .unwrap();

    let portal_token = generate_token("hd_portal");
    let contact_id: Uuid = sqlx::query_scalar(
        r#"
        INSERT INTO contacts (workspace_id, email, name, portal_token_hash)
        VALUES ($1, $2, 'Jane Customer', $3)
        RETURNING id
        "#,
    )
    .bind(workspace_id)
    .bind(format!("jane@{slug}.test"))
    .bind(hash_token(&portal_token))
    .fetch_one(pool)
    .await
    .unwrap();

    Tenant {
        workspace_id,
        admin_id,
        api_key,
        contact_id,
        portal_token,
    }
}

pub async fn seed_user(pool: &DbPool, workspace_id: Uuid, email: &str, role: Role) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO users (workspace_id, email, name, role) VALUES ($1, $2, $2, $3) RETURNING id",
    )
    .bind(workspace_id)
    .bind(email)
    .bind(role)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub fn new_ticket(subject: &str, contact_id: Option<Uuid>) -> NewTicket {
    NewTicket {
        subject: subject.to_string(),
        description: None,
        priority: Priority::Normal,
        channel: ChannelKind::Api,
        contact_id,
        assignee_id: None,
        tags: Vec::new(),
        first_message: None,
    }
}

/// Send one request through the router and decode the reply: JSON when it
/// parses, a string otherwise, `Value::Null` for an empty body.
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"));

    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, json)
}
