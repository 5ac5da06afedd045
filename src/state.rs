//! Shared application state handed to every handler.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{config::Config, db::DbPool};

const CONNECT_TIMEOUT_SECS: u64 = 5;

/// State shared by all routes.
///
/// Handlers that only touch the database extract `State<DbPool>` directly
/// through the `FromRef` impl below.
#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,

    /// Shared HTTP client for webhook delivery and the AI provider
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(pool: DbPool, config: Config) -> Result<Self, reqwest::Error> {
        // Request timeouts are set per call.
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            pool,
            config: Arc::new(config),
            http,
        })
    }
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}
