//! Webhook service for managing endpoints and sending ticket events.
//!
//! This module handles webhook endpoint registration, event delivery,
//! and HMAC signature generation for secure webhook verification.

use crate::db::DbPool;
use crate::error::AppError;
use crate::models::ticket::{Ticket, TicketMessage};
use crate::models::webhook::{
    EventType, WebhookEndpoint, WebhookEndpointRequest, WebhookEndpointResponse, WebhookPayload,
};
use crate::state::AppState;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Create a new webhook endpoint.
///
/// # Process
///
/// 1. Validate URL format
/// 2. Generate cryptographically secure secret (32 bytes)
/// 3. Store endpoint in database
/// 4. Return endpoint with secret (only shown once)
pub async fn create_webhook_endpoint(
    pool: &DbPool,
    workspace_id: Uuid,
    request: WebhookEndpointRequest,
) -> Result<WebhookEndpointResponse, AppError> {
    let url = request.url.trim();
    validate_webhook_url(url)?;

    let secret = generate_secret();

    let endpoint = sqlx::query_as::<_, WebhookEndpoint>(
        r#"
        INSERT INTO webhook_endpoints (workspace_id, url, secret)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(workspace_id)
    .bind(url)
    .bind(&secret)
    .fetch_one(pool)
    .await?;

    tracing::info!(workspace_id = %workspace_id, endpoint_id = %endpoint.id, "Webhook endpoint registered");

    Ok(WebhookEndpointResponse::from(endpoint).with_secret(secret))
}

/// List the active webhook endpoints of a workspace. Secrets are not returned.
pub async fn list_webhook_endpoints(
    pool: &DbPool,
    workspace_id: Uuid,
) -> Result<Vec<WebhookEndpointResponse>, AppError> {
    let endpoints = sqlx::query_as::<_, WebhookEndpoint>(
        "SELECT * FROM webhook_endpoints WHERE workspace_id = $1 AND is_active = true ORDER BY created_at DESC",
    )
    .bind(workspace_id)
    .fetch_all(pool)
    .await?;

    Ok(endpoints.into_iter().map(Into::into).collect())
}

/// Delete a webhook endpoint (soft delete, event history is kept).
pub async fn delete_webhook_endpoint(
    pool: &DbPool,
    workspace_id: Uuid,
    endpoint_id: Uuid,
) -> Result<(), AppError> {
    let result = sqlx::query(
        "UPDATE webhook_endpoints SET is_active = false WHERE id = $1 AND workspace_id = $2 AND is_active = true",
    )
    .bind(endpoint_id)
    .bind(workspace_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Webhook endpoint"));
    }

    Ok(())
}

/// Queue delivery of a ticket event to every active endpoint of the
/// ticket's workspace.
///
/// Delivery runs on a spawned task; failures are logged and recorded in
/// `webhook_events` but never reach the caller. Internal notes are not
/// delivered.
pub fn notify(state: &AppState, event_type: EventType, ticket: &Ticket, message: Option<&TicketMessage>) {
    if message.is_some_and(|m| m.is_internal) {
        return;
    }

    let pool = state.pool.clone();
    let http = state.http.clone();
    let timeout = Duration::from_secs(state.config.webhook_timeout_secs.max(1));
    let payload = WebhookPayload::new(event_type, ticket.clone(), message.cloned());
    let workspace_id = ticket.workspace_id;

    tokio::spawn(async move {
        if let Err(e) = deliver(&pool, &http, timeout, workspace_id, &payload).await {
            tracing::error!(event_id = %payload.event_id, "Webhook dispatch failed: {:?}", e);
        }
    });
}

async fn deliver(
    pool: &DbPool,
    http: &reqwest::Client,
    timeout: Duration,
    workspace_id: Uuid,
    payload: &WebhookPayload,
) -> Result<(), AppError> {
    let endpoints = sqlx::query_as::<_, WebhookEndpoint>(
        "SELECT * FROM webhook_endpoints WHERE workspace_id = $1 AND is_active = true",
    )
    .bind(workspace_id)
    .fetch_all(pool)
    .await?;

    if endpoints.is_empty() {
        return Ok(());
    }

    let payload_json = serde_json::to_value(payload)
        .map_err(|e| AppError::InvalidRequest(format!("Failed to serialize payload: {}", e)))?;

    for endpoint in endpoints {
        if let Err(e) = send_webhook(pool, http, timeout, &endpoint, payload, &payload_json).await {
            tracing::error!("Failed to send webhook to {}: {:?}", endpoint.url, e);
        }
    }

    Ok(())
}

/// Send a single webhook with HMAC signature and record the attempt.
///
/// # Headers Sent
///
/// - `Content-Type: application/json`
/// - `X-Webhook-Signature: sha256=<hex>`
/// - `X-Webhook-Event-Id: <uuid>`
/// - `X-Webhook-Event: <event type>`
async fn send_webhook(
    pool: &DbPool,
    http: &reqwest::Client,
    timeout: Duration,
    endpoint: &WebhookEndpoint,
    payload: &WebhookPayload,
    payload_json: &serde_json::Value,
) -> Result<(), AppError> {
    let body = payload_json.to_string();
    let signature = generate_signature(&endpoint.secret, &body)
        .map_err(|_| AppError::InvalidRequest("Invalid webhook secret".to_string()))?;

    let response = http
        .post(&endpoint.url)
        .timeout(timeout)
        .header("Content-Type", "application/json")
        .header("X-Webhook-Signature", &signature)
        .header("X-Webhook-Event-Id", payload.event_id.to_string())
        .header("X-Webhook-Event", payload.event_type.as_str())
        .body(body)
        .send()
        .await;

    let (status, response_body) = match response {
        Ok(resp) => {
            let status = i32::from(resp.status().as_u16());
            if resp.status().is_success() {
                tracing::info!(endpoint_id = %endpoint.id, status, "Webhook delivered");
            } else {
                tracing::warn!(endpoint_id = %endpoint.id, status, "Webhook rejected by receiver");
            }
            (Some(status), resp.text().await.ok())
        }
        Err(e) => {
            let error_msg = format!("Request failed: {}", e);
            tracing::error!(endpoint_id = %endpoint.id, "{}", error_msg);
            (None, Some(error_msg))
        }
    };

    // One event row per endpoint attempt; the payload's event id is shared
    // across endpoints and sent in the header.
    sqlx::query(
        r#"
        INSERT INTO webhook_events (
            id,
            webhook_endpoint_id,
            event_type,
            payload,
            response_status,
            response_body
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(endpoint.id)
    .bind(payload.event_type)
    .bind(payload_json)
    .bind(status)
    .bind(response_body)
    .execute(pool)
    .await?;

    Ok(())
}

/// Generate HMAC-SHA256 signature for webhook payload.
///
/// # Format
///
/// `sha256=<hex_encoded_hmac>`
///
/// # Verification
///
/// Receivers should:
/// 1. Extract signature from `X-Webhook-Signature` header
/// 2. Compute HMAC-SHA256(secret, request_body)
/// 3. Compare using constant-time comparison
pub fn generate_signature(secret: &str, payload: &str) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(payload.as_bytes());
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// 64 hex characters (32 random bytes).
fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// Validate webhook URL format.
///
/// # Rules
///
/// - Must be valid URL
/// - Must be HTTPS (HTTP localhost allowed for development)
/// - Maximum 2048 characters
pub fn validate_webhook_url(url: &str) -> Result<(), AppError> {
    if url.len() > 2048 {
        return Err(AppError::InvalidRequest(
            "URL exceeds 2048 characters".to_string(),
        ));
    }

    let parsed = url::Url::parse(url)
        .map_err(|_| AppError::InvalidRequest("Invalid URL format".to_string()))?;

    match parsed.scheme() {
        "https" => Ok(()),
        "http" => {
            if matches!(parsed.host_str(), Some("localhost" | "127.0.0.1" | "0.0.0.0")) {
                Ok(())
            } else {
                Err(AppError::InvalidRequest(
                    "HTTP is only allowed for localhost. Use HTTPS for production.".to_string(),
                ))
            }
        }
        _ => Err(AppError::InvalidRequest(
            "URL must use HTTP or HTTPS".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_reference_hmac() {
        assert_eq!(
            generate_signature("key", "The quick brown fox jumps over the lazy dog").unwrap(),
            "sha256=f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn secrets_are_64_hex_chars() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn https_is_required_outside_localhost() {
        assert!(validate_webhook_url("https://hooks.acme.test/helpdesk").is_ok());
        assert!(validate_webhook_url("http://localhost:8080/hook").is_ok());
        assert!(validate_webhook_url("http://hooks.acme.test/helpdesk").is_err());
        assert!(validate_webhook_url("ftp://hooks.acme.test").is_err());
        assert!(validate_webhook_url("not a url").is_err());
    }

    #[test]
    fn overlong_urls_are_rejected() {
        let url = format!("https://acme.test/{}", "a".repeat(2048));
        assert!(validate_webhook_url(&url).is_err());
    }
}
