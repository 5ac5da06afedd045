//! Route table.
//!
//! - `/api/v1/*`: agents, API key auth (except workspace sign-up)
//! - `/portal/v1/*`: customers, portal token auth, CORS enabled
//! - `/public/v1/{workspace_slug}/*`: help center, no auth, CORS enabled
//! - `/health`

use axum::{
    Router,
    http::HeaderValue,
    middleware as axum_middleware,
    routing::{delete, get, patch, post},
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    config::Config,
    handlers::{
        ai, apps, automations, canned_responses, contacts, health, help_center, kb, portal,
        settings, tickets, webhooks, workspaces,
    },
    middleware::auth::{auth_middleware, portal_auth_middleware},
    state::AppState,
};

/// CORS for browser-facing routes: permissive unless origins are configured.
fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins()
        .into_iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

fn agent_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // Workspace, users and API keys
        .route(
            "/api/v1/workspace",
            get(workspaces::get_workspace).patch(workspaces::update_workspace),
        )
        .route(
            "/api/v1/users",
            get(workspaces::list_users).post(workspaces::create_user),
        )
        .route("/api/v1/users/{id}", patch(workspaces::update_user))
        .route(
            "/api/v1/api-keys",
            get(workspaces::list_api_keys).post(workspaces::create_api_key),
        )
        .route(
            "/api/v1/api-keys/{id}",
            delete(workspaces::revoke_api_key),
        )
        // Tickets
        .route(
            "/api/v1/tickets",
            get(tickets::list_tickets).post(tickets::create_ticket),
        )
        .route("/api/v1/tickets/stats", get(tickets::ticket_stats))
        .route(
            "/api/v1/tickets/{id}",
            get(tickets::get_ticket)
                .patch(tickets::update_ticket)
                .delete(tickets::delete_ticket),
        )
        .route("/api/v1/tickets/{id}/messages", post(tickets::create_message))
        .route("/api/v1/tickets/{id}/tags", post(tickets::add_ticket_tag))
        .route(
            "/api/v1/tickets/{id}/tags/{name}",
            delete(tickets::remove_ticket_tag),
        )
        .route(
            "/api/v1/tickets/{id}/ai/actions",
            get(ai::list_ticket_actions).post(ai::propose_action),
        )
        .route("/api/v1/tickets/{id}/ai/draft", post(ai::draft_reply))
        .route("/api/v1/sla/breaches", get(tickets::sla_breaches))
        // Tags
        .route("/api/v1/tags", get(tickets::list_tags).post(tickets::create_tag))
        .route(
            "/api/v1/tags/{id}",
            patch(tickets::update_tag).delete(tickets::delete_tag),
        )
        // Contacts and companies
        .route(
            "/api/v1/contacts",
            get(contacts::list_contacts).post(contacts::create_contact),
        )
        .route(
            "/api/v1/contacts/{id}",
            get(contacts::get_contact)
                .patch(contacts::update_contact)
                .delete(contacts::delete_contact),
        )
        .route("/api/v1/contacts/{id}/tickets", get(contacts::contact_tickets))
        .route(
            "/api/v1/contacts/{id}/portal-token",
            post(contacts::issue_portal_token),
        )
        .route(
            "/api/v1/companies",
            get(contacts::list_companies).post(contacts::create_company),
        )
        .route(
            "/api/v1/companies/{id}",
            get(contacts::get_company)
                .patch(contacts::update_company)
                .delete(contacts::delete_company),
        )
        // Canned responses
        .route(
            "/api/v1/canned-responses",
            get(canned_responses::list_canned_responses)
                .post(canned_responses::create_canned_response),
        )
        .route(
            "/api/v1/canned-responses/{id}",
            get(canned_responses::get_canned_response)
                .patch(canned_responses::update_canned_response)
                .delete(canned_responses::delete_canned_response),
        )
        .route(
            "/api/v1/canned-responses/{id}/render",
            post(canned_responses::render_canned_response),
        )
        // Knowledge base
        .route(
            "/api/v1/kb/articles",
            get(kb::list_articles).post(kb::create_article),
        )
        .route(
            "/api/v1/kb/articles/{id}",
            get(kb::get_article)
                .patch(kb::update_article)
                .delete(kb::delete_article),
        )
        .route("/api/v1/kb/articles/{id}/publish", post(kb::publish_article))
        .route(
            "/api/v1/kb/articles/{id}/unpublish",
            post(kb::unpublish_article),
        )
        // Automations
        .route(
            "/api/v1/automations",
            get(automations::list_automations).post(automations::create_automation),
        )
        .route(
            "/api/v1/automations/{id}",
            get(automations::get_automation)
                .patch(automations::update_automation)
                .delete(automations::delete_automation),
        )
        .route(
            "/api/v1/automations/{id}/test",
            post(automations::test_automation),
        )
        .route(
            "/api/v1/automations/{id}/runs",
            get(automations::list_automation_runs),
        )
        // Channels, SLA policies, banners
        .route(
            "/api/v1/channels",
            get(settings::list_channels).post(settings::create_channel),
        )
        .route(
            "/api/v1/channels/{id}",
            patch(settings::update_channel).delete(settings::delete_channel),
        )
        .route(
            "/api/v1/sla-policies",
            get(settings::list_sla_policies).post(settings::create_sla_policy),
        )
        .route(
            "/api/v1/sla-policies/{id}",
            patch(settings::update_sla_policy).delete(settings::delete_sla_policy),
        )
        .route(
            "/api/v1/banners",
            get(settings::list_banners).post(settings::create_banner),
        )
        .route(
            "/api/v1/banners/{id}",
            patch(settings::update_banner).delete(settings::delete_banner),
        )
        // Apps
        .route("/api/v1/apps", get(apps::list_registry))
        .route(
            "/api/v1/apps/installed",
            get(apps::list_installed).post(apps::install_app),
        )
        .route(
            "/api/v1/apps/installed/{id}",
            patch(apps::update_installed).delete(apps::uninstall_app),
        )
        .route("/api/v1/apps/slots/{slot}", get(apps::slot_apps))
        // AI assist
        .route(
            "/api/v1/ai/settings",
            get(ai::get_settings).patch(ai::update_settings),
        )
        .route("/api/v1/ai/actions", get(ai::list_actions))
        .route("/api/v1/ai/actions/{id}/approve", post(ai::approve_action))
        .route("/api/v1/ai/actions/{id}/reject", post(ai::reject_action))
        // Webhooks
        .route(
            "/api/v1/webhooks",
            get(webhooks::list_webhooks).post(webhooks::create_webhook),
        )
        .route(
            "/api/v1/webhooks/{id}",
            delete(webhooks::delete_webhook),
        )
        .route(
            "/api/v1/webhooks/{id}/events",
            get(webhooks::list_webhook_events),
        )
        // Apply authentication middleware to all routes in this group
        .route_layer(axum_middleware::from_fn_with_state(
            state.pool.clone(),
            auth_middleware,
        ))
}

fn portal_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/portal/v1/me", get(portal::me))
        .route(
            "/portal/v1/tickets",
            get(portal::list_my_tickets).post(portal::create_my_ticket),
        )
        .route("/portal/v1/tickets/{id}", get(portal::get_my_ticket))
        .route(
            "/portal/v1/tickets/{id}/replies",
            post(portal::reply_to_my_ticket),
        )
        .route("/portal/v1/kb/articles", get(portal::list_articles))
        .route("/portal/v1/kb/articles/{slug}", get(portal::get_article))
        .route("/portal/v1/banners", get(portal::list_banners))
        .route_layer(axum_middleware::from_fn_with_state(
            state.pool.clone(),
            portal_auth_middleware,
        ))
}

fn public_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/public/v1/{workspace_slug}/articles",
            get(help_center::list_articles),
        )
        .route(
            "/public/v1/{workspace_slug}/articles/{slug}",
            get(help_center::get_article),
        )
        .route(
            "/public/v1/{workspace_slug}/banners",
            get(help_center::list_banners),
        )
}

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/health", get(health::health_check))
        // Sign-up is guarded by the signup token, not an API key
        .route("/api/v1/workspaces", post(workspaces::signup))
        .merge(agent_routes(&state))
        .merge(portal_routes(&state).layer(cors.clone()))
        .merge(public_routes().layer(cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::test_config,
        db::DbPool,
        test_support::{seed_tenant, send},
    };
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode, header},
    };
    use serde_json::json;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    fn app(config: Config) -> Router {
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .expect("lazy pool");
        build_router(AppState::new(pool, config).expect("state"))
    }

    #[tokio::test]
    async fn agent_routes_require_an_api_key() {
        let response = app(test_config())
            .oneshot(
                Request::builder()
                    .uri("/api/v1/tickets")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn portal_routes_require_a_portal_token() {
        let response = app(test_config())
            .oneshot(
                Request::builder()
                    .uri("/portal/v1/me")
                    .header(header::AUTHORIZATION, "Basic abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn signup_is_disabled_without_a_token() {
        let body = r#"{"name":"Acme","slug":"acme","admin_email":"jane@acme.test","admin_name":"Jane"}"#;
        let response = app(test_config())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/workspaces")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn signup_rejects_a_wrong_token() {
        let mut config = test_config();
        config.signup_token = Some("let-me-in".to_string());
        let body = r#"{"name":"Acme","slug":"acme","admin_email":"jane@acme.test","admin_name":"Jane"}"#;

        let response = app(config)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/workspaces")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header("x-signup-token", "guess")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let response = app(test_config())
            .oneshot(
                Request::builder()
                    .uri("/api/v2/tickets")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn tickets_are_invisible_to_other_workspaces(pool: DbPool) {
        let acme = seed_tenant(&pool, "acme").await;
        let globex = seed_tenant(&pool, "globex").await;
        let app = crate::test_support::app(pool);

        let (status, created) = send(
            &app,
            Method::POST,
            "/api/v1/tickets",
            &acme.api_key,
            Some(json!({ "subject": "Printer on fire", "priority": "high" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["number"], 1);
        let uri = format!("/api/v1/tickets/{}", created["id"].as_str().unwrap());

        let (status, body) = send(&app, Method::GET, &uri, &globex.api_key, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");

        let (status, _) = send(&app, Method::DELETE, &uri, &globex.api_key, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, listed) =
            send(&app, Method::GET, "/api/v1/tickets", &globex.api_key, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed, json!([]));

        let (status, _) = send(&app, Method::GET, &uri, &acme.api_key, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn reissued_portal_token_replaces_the_old_one(pool: DbPool) {
        let acme = seed_tenant(&pool, "acme").await;
        let app = crate::test_support::app(pool);

        let (status, issued) = send(
            &app,
            Method::POST,
            &format!("/api/v1/contacts/{}/portal-token", acme.contact_id),
            &acme.api_key,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let fresh = issued["portal_token"].as_str().unwrap().to_string();
        assert_ne!(fresh, acme.portal_token);

        let (status, _) = send(&app, Method::GET, "/portal/v1/me", &acme.portal_token, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, me) = send(&app, Method::GET, "/portal/v1/me", &fresh, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["id"], json!(acme.contact_id));
    }
}
