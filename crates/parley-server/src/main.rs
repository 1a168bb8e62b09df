//! # parley-server
//!
//! Realtime chat backend.
//!
//! This binary provides:
//! - **REST API** (axum) for broadcast chat, private conversations, and the
//!   friend graph
//! - **WebSocket endpoint** for topic subscriptions and live message fan-out
//! - **Durable ingestion queue** so broadcast messages survive a crash
//!   between acceptance and persistence
//! - **Friend-request notifications** pushed to both participants on every
//!   lifecycle transition

mod api;
mod config;
mod conversations;
mod error;
mod friends;
mod identity;
mod notify;
mod relay;
mod state;
mod ws;

use std::sync::Arc;
use std::time::Duration;

use parley_broker::Broker;
use parley_store::Database;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::conversations::ConversationService;
use crate::friends::FriendService;
use crate::identity::IdentityGateway;
use crate::notify::Notifier;
use crate::relay::MessageRelay;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_server=debug")),
        )
        .init();

    info!("Starting Parley chat server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Single SQLite connection, shared behind an async mutex.
    let database = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    match database.path() {
        Some(path) => info!(path = %path.display(), "Database ready"),
        None => info!("Database ready (in-memory)"),
    }
    let db: state::Db = Arc::new(Mutex::new(database));

    // In-process pub/sub broker for topic fan-out.
    let broker = Broker::new();

    let notifier = Notifier::new(
        db.clone(),
        broker.clone(),
        Duration::from_millis(config.snapshot_delay_ms),
    );

    // Identity service client; user-existence checks fail closed.
    let directory = IdentityGateway::new(&config.auth_service_url)?;

    let friends = Arc::new(FriendService::new(
        db.clone(),
        directory,
        notifier.clone(),
    ));
    let conversations = Arc::new(ConversationService::new(db.clone()));
    let message_relay = Arc::new(MessageRelay::new(db.clone(), broker.clone()));

    let app_state = AppState {
        db: db.clone(),
        broker,
        friends,
        conversations,
        relay: message_relay,
        notifier,
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Ingestion-queue consumer: drains queued broadcast messages into the
    // store on a fixed poll interval.
    relay::spawn_queue_consumer(
        db,
        Duration::from_millis(config.queue_poll_interval_ms),
    );

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
