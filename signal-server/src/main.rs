use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use signal_server::api::{create_router, AppState};
use signal_server::broker::{BrokerGateway, PaperConnector};
use signal_server::classifier::{Classifier, LlmExtractor};
use signal_server::config::{Config, Env};
use signal_server::db::Database;
use signal_server::engine::ExecutionEngine;
use signal_server::hub::{HubLogLayer, NotificationHub, SignalForwarder};
use signal_server::pipeline::Pipeline;
use signal_server::recorder::SignalRecorder;
use signal_server::source::BridgeSource;
use signal_server::sync::PositionSynchronizer;
use signal_server::vault::CredentialVault;

#[tokio::main]
async fn main() -> Result<()> {
    // Determine config directory from CONFIG_DIR environment variable,
    // falling back to the executable's directory, then the working
    // directory
    let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_string_lossy().into_owned()))
            .unwrap_or_else(|| ".".to_string())
    });
    let config_base = format!("{}/config", config_dir);

    // Load configuration first (needed for file logging setup)
    let config = match Config::from_file(&config_base) {
        Ok(cfg) => {
            eprintln!("Configuration loaded from {}", config_base);
            cfg
        }
        Err(e) => {
            eprintln!("Failed to load configuration: {}, using defaults", e);
            Config::default()
        }
    };

    // Required environment: missing DATABASE_URL or
    // MASTER_ENCRYPTION_KEY aborts startup
    let env = match Env::load() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    // The hub exists before logging so WARN/ERROR records reach
    // connected UIs as `log` events
    let hub = Arc::new(NotificationHub::new());

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(HubLogLayer::new(hub.clone()));

    if config.logging.enabled {
        use tracing_appender::rolling;

        if let Err(e) = std::fs::create_dir_all(&config.logging.directory) {
            eprintln!(
                "Failed to create log directory {}: {}",
                config.logging.directory, e
            );
        }

        let file_appender = match config.logging.rotation.as_str() {
            "hourly" => rolling::hourly(&config.logging.directory, &config.logging.file_prefix),
            "never" => rolling::never(&config.logging.directory, &config.logging.file_prefix),
            _ => rolling::daily(&config.logging.directory, &config.logging.file_prefix),
        };

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        subscriber
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false),
            )
            .init();

        // Keep the appender guard alive for the process lifetime
        std::mem::forget(guard);
    } else {
        subscriber.init();
    }

    tracing::info!("Starting Signal Server...");

    // Initialize database
    let db = Arc::new(Database::new(&env.database_url).await?);
    tracing::info!("Database initialized: {}", env.database_url);

    // Credential vault, read-only after initialization
    let vault = Arc::new(CredentialVault::new(&env.master_encryption_key)?);
    tracing::info!("Credential vault initialized");

    // Broker gateway over the paper backend; a terminal bridge replaces
    // the connector in live deployments
    if let Some(path) = &env.mt5_path {
        tracing::warn!(
            "MT5_PATH is set ({}) but no terminal bridge is linked; using the paper backend",
            path
        );
    }
    let gateway = Arc::new(BrokerGateway::new(Arc::new(PaperConnector)));

    // Message source: the session must be authorized out of process
    let chat_authorized = env.telegram_api_id.is_some()
        && env.telegram_api_hash.is_some()
        && env.telegram_phone.is_some();
    if !chat_authorized {
        tracing::warn!(
            "Telegram credentials not configured; the pipeline will refuse to start"
        );
    }
    let bridge = Arc::new(BridgeSource::new(chat_authorized));

    // Classifier, optionally backed by an LLM extraction endpoint
    let llm_model = env
        .llm_model
        .clone()
        .unwrap_or_else(|| config.llm.model.clone());
    let classifier = match (&env.llm_api_key, llm_model.is_empty()) {
        (Some(api_key), false) => {
            tracing::info!("LLM extraction enabled: {}", llm_model);
            let mut llm_config = config.llm.clone();
            llm_config.model = llm_model;
            Classifier::new(Some(LlmExtractor::new(&llm_config, api_key.clone())))
        }
        _ => Classifier::heuristic_only(),
    };

    // Execution engine and signal recorder
    let engine = Arc::new(ExecutionEngine::new(
        db.clone(),
        gateway.clone(),
        vault.clone(),
        hub.clone(),
    ));
    let forwarder = SignalForwarder::new(db.clone(), bridge.clone());
    let recorder = Arc::new(SignalRecorder::new(
        db.clone(),
        classifier,
        hub.clone(),
        forwarder,
        engine.clone(),
    ));

    // Position synchronizer
    let synchronizer = Arc::new(PositionSynchronizer::new(
        db.clone(),
        gateway.clone(),
        vault.clone(),
        hub.clone(),
        config.pipeline.sync_interval_secs,
    ));

    let pipeline = Arc::new(Pipeline::new(
        db.clone(),
        bridge,
        recorder,
        synchronizer,
        gateway.clone(),
        hub.clone(),
        config.pipeline.ping_interval_secs,
    ));

    // API state and router
    let state = AppState {
        db,
        hub,
        vault,
        engine,
        gateway,
        pipeline,
        config: Arc::new(config.clone()),
        jwt_secret: Arc::new(env.jwt_secret_key.clone()),
    };
    let app = create_router(state);

    let bind_address = config.server_address();
    tracing::info!("HTTP server listening on http://{}", bind_address);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
