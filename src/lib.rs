pub mod account;
pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod models;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod worker;

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::auth::recovery::RecoveryLayer;
use crate::config::Config;
use crate::db::UserStore;
use crate::email::{Mailer, SystemMailer};
use crate::state::{AppState, SharedState};

/// SMTP mailer from config, if configured and reachable.
pub fn system_mailer(config: &Config) -> Option<Arc<dyn Mailer>> {
    let smtp = config.smtp.as_ref()?;
    match SystemMailer::new(smtp) {
        Ok(mailer) => {
            tracing::info!("System SMTP configured");
            Some(Arc::new(mailer))
        }
        Err(e) => {
            tracing::warn!("System SMTP not available: {e}");
            None
        }
    }
}

pub fn build_app(
    store: Arc<dyn UserStore>,
    mailer: Option<Arc<dyn Mailer>>,
    config: Config,
) -> (Router, SharedState) {
    if mailer.is_none() {
        tracing::warn!("No mailer configured, verification codes and reset links will not be sent");
    }

    let state: SharedState = Arc::new(AppState::new(store, mailer, config));

    let app = Router::new()
        .merge(routes::api_routes(&state))
        .layer(RecoveryLayer::new(state.clone()))
        .route("/health", axum::routing::get(health))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    (app, state)
}

async fn health() -> &'static str {
    "ok"
}
