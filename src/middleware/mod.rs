//! HTTP middleware components.
//!
//! Middleware run before route handlers and can short-circuit requests
//! (reject unauthenticated callers) or attach context for handlers.

/// API key and portal token authentication middleware
pub mod auth;
