//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Extracts request data (JSON body, path and query params, auth context)
//! 2. Runs simple queries itself or delegates to `services`
//! 3. Returns a JSON response or an `AppError`
//!
//! Agent routes live under `/api/v1`, customer routes under `/portal/v1`
//! and the unauthenticated help center under `/public/v1`.

/// AI-agent assist: settings, proposals, drafts, approvals
pub mod ai;
/// App registry, installations and UI slots
pub mod apps;
/// Automation rules, dry runs and run history
pub mod automations;
/// Canned responses and rendering
pub mod canned_responses;
/// Contacts and companies
pub mod contacts;
/// Liveness and database connectivity
pub mod health;
/// Public help center
pub mod help_center;
/// Knowledge base articles
pub mod kb;
/// Customer self-service portal
pub mod portal;
/// Channels, SLA policies and banners
pub mod settings;
/// Tickets, messages, tags and reporting
pub mod tickets;
/// Webhook endpoint management
pub mod webhooks;
/// Workspace sign-up, users and API keys
pub mod workspaces;
