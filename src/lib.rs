//! ChatHub - a real-time messaging and social-graph server
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - REST endpoints (auth, chat, friends, notifications)      │
//! │  - SSE streaming endpoints                                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Service Layer                            │
//! │  - Conversation directory (canonical direct pairs, groups)  │
//! │  - Friendship graph (request lifecycle)                     │
//! │  - Messaging fanout (persist, then deliver)                 │
//! │  - Notification dispatcher                                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌──────────────────────────────┬──────────────────────────────┐
//! │       Data Layer             │        Message Bus           │
//! │  - SQLite (sqlx)             │  - in-process broadcast      │
//! └──────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP handlers and SSE streaming
//! - `auth`: registration, login, token validation
//! - `bus`: pub/sub channel abstraction
//! - `service`: business logic layer
//! - `data`: database layer
//! - `config`: configuration management
//! - `error`: error types

pub mod api;
pub mod auth;
pub mod bus;
pub mod config;
pub mod data;
pub mod error;
pub mod service;

use std::sync::Arc;

/// Application state shared across all handlers
///
/// Cloned per request; all members are cheap Arc clones.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Database connection pool
    pub db: Arc<data::Database>,

    /// Outbound event bus
    pub bus: Arc<dyn bus::MessageBus>,

    /// Conversation directory service
    pub conversations: Arc<service::ConversationDirectory>,

    /// Friendship graph service
    pub friendships: Arc<service::FriendshipGraph>,

    /// Messaging fanout service
    pub messaging: Arc<service::MessagingFanout>,

    /// Notification dispatcher service
    pub notifications: Arc<service::NotificationDispatcher>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Connect to SQLite database and run migrations
    /// 2. Create the in-process message bus
    /// 3. Wire the service layer
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or migrated
    pub async fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        // 1. Connect to SQLite database
        let db = Arc::new(data::Database::connect(&config.database.path).await?);
        tracing::info!("Database connected");

        // 2. Create the message bus
        let bus: Arc<dyn bus::MessageBus> = Arc::new(bus::InMemoryBus::new());

        // 3. Wire services
        let notifications = Arc::new(service::NotificationDispatcher::new(
            db.clone(),
            bus.clone(),
        ));
        let conversations = Arc::new(service::ConversationDirectory::new(db.clone()));
        let friendships = Arc::new(service::FriendshipGraph::new(
            db.clone(),
            notifications.clone(),
        ));
        let messaging = Arc::new(service::MessagingFanout::new(
            db.clone(),
            conversations.clone(),
            bus.clone(),
        ));

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config: Arc::new(config),
            db,
            bus,
            conversations,
            friendships,
            messaging,
            notifications,
        })
    }
}

/// Build the Axum router with all routes.
///
/// Shared by the binary and integration tests to keep route composition
/// consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    use axum::Router;
    use axum::extract::DefaultBodyLimit;
    use tower::ServiceBuilder;
    use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

    // 1 MiB is generous for chat payloads
    const MAX_BODY_BYTES: usize = 1024 * 1024;

    Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(auth::auth_router())
        .nest("/api", api::api_router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new()),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
