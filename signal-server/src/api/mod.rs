//! REST API module
//!
//! Provides the HTTP surface for auth, configuration, signals,
//! executions, settings, and system control, plus the WebSocket
//! endpoint for real-time updates. Includes CORS configuration and
//! request tracing.

mod account;
mod auth;
mod broker_accounts;
mod channels;
mod credentials;
mod error;
mod executions;
mod settings;
mod signals;
mod subscribers;
mod system;
mod websocket;

pub use auth::AuthUser;
pub use error::{ApiError, ApiResult};

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;

use crate::{
    broker::BrokerGateway, config::Config, db::Database, engine::ExecutionEngine,
    hub::NotificationHub, pipeline::Pipeline, vault::CredentialVault,
};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub hub: Arc<NotificationHub>,
    pub vault: Arc<CredentialVault>,
    pub engine: Arc<ExecutionEngine>,
    pub gateway: Arc<BrokerGateway>,
    pub pipeline: Arc<Pipeline>,
    pub config: Arc<Config>,
    pub jwt_secret: Arc<String>,
}

pub fn create_router(state: AppState) -> Router {
    let cors = if state.config.cors.disable {
        tracing::warn!(
            "CORS is DISABLED - allowing all origins. This should only be used in development!"
        );
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(
                state
                    .config
                    .cors
                    .allowed_origins
                    .iter()
                    .filter_map(|origin| origin.parse().ok())
                    .collect::<Vec<_>>(),
            )
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::header::AUTHORIZATION,
            ])
            .allow_credentials(true)
    };

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(tracing::Level::DEBUG))
        .on_response(
            DefaultOnResponse::new()
                .level(tracing::Level::DEBUG)
                .latency_unit(LatencyUnit::Millis),
        );

    Router::new()
        .route("/health", get(system::health))
        // Auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        // Broker accounts
        .route(
            "/broker-configs",
            get(broker_accounts::list).post(broker_accounts::create),
        )
        .route(
            "/broker-configs/:id",
            axum::routing::delete(broker_accounts::delete),
        )
        // Credentials
        .route("/credentials", post(credentials::store))
        .route(
            "/credentials/:id",
            axum::routing::delete(credentials::delete),
        )
        // Channel subscriptions
        .route(
            "/telegram-channels",
            get(channels::list).post(channels::create),
        )
        .route(
            "/telegram-channels/:id",
            axum::routing::delete(channels::delete),
        )
        // Subscribers
        .route(
            "/subscribers",
            get(subscribers::list).post(subscribers::create),
        )
        .route(
            "/subscribers/:id",
            axum::routing::delete(subscribers::delete),
        )
        // Signals
        .route("/signals", get(signals::list))
        .route("/signals/:id", get(signals::get_one))
        // Executions
        .route(
            "/executions",
            get(executions::list).post(executions::create),
        )
        .route("/executions/:id", get(executions::get_one))
        .route("/executions/:id/confirm", post(executions::confirm))
        .route("/executions/:id/cancel", post(executions::cancel))
        .route("/executions/:id/close", post(executions::close))
        .route("/executions/:id/modify", post(executions::modify))
        // Settings
        .route("/settings", get(settings::get_settings).put(settings::put_settings))
        // Account info
        .route("/account/info", get(account::info))
        // Audit trail
        .route("/audit", get(system::audit))
        // System control
        .route("/system/start", post(system::start))
        .route("/system/stop", post(system::stop))
        .route("/system/status", get(system::status))
        // WebSocket
        .route("/ws", get(websocket::websocket_handler))
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}
