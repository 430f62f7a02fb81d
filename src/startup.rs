//! Application Startup
//!
//! Application building and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;

use crate::application::services::{ActionDispatcher, HeartbeatMonitor, RoomRouter, SessionRegistry};
use crate::config::Settings;
use crate::domain::services::{
    EnvironmentalImpactHandler, GameStateHandler, IdentityVerifier, TeamActionHandler,
};
use crate::infrastructure::auth::JwtIdentityVerifier;
use crate::infrastructure::handlers::{InMemoryGameState, InMemoryImpactLedger, InMemoryTeams};
use crate::presentation::http::{handlers::health, routes};
use crate::presentation::middleware::{cors, logging};

/// External collaborators wired into the dispatcher
#[derive(Clone)]
pub struct Handlers {
    pub identity: Arc<dyn IdentityVerifier>,
    pub game: Arc<dyn GameStateHandler>,
    pub environment: Arc<dyn EnvironmentalImpactHandler>,
    pub teams: Arc<dyn TeamActionHandler>,
}

impl Handlers {
    /// JWT identity plus the in-memory reference handlers.
    pub fn in_memory(settings: &Settings) -> Self {
        Self {
            identity: Arc::new(JwtIdentityVerifier::new(&settings.jwt.secret)),
            game: Arc::new(InMemoryGameState::new()),
            environment: Arc::new(InMemoryImpactLedger::new()),
            teams: Arc::new(InMemoryTeams::new()),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub rooms: Arc<RoomRouter>,
    pub dispatcher: Arc<ActionDispatcher>,
    pub heartbeat: Arc<HeartbeatMonitor>,
    pub settings: Arc<Settings>,
}

impl AppState {
    /// Wire the registry, router, dispatcher and heartbeat sweep.
    ///
    /// Must be called inside a Tokio runtime; the sweep task starts immediately.
    pub fn new(settings: Settings, handlers: Handlers) -> Self {
        let rooms = Arc::new(RoomRouter::new());
        let sessions = Arc::new(SessionRegistry::new(
            rooms.clone(),
            handlers.identity,
            &settings.heartbeat,
        ));
        let dispatcher = Arc::new(ActionDispatcher::new(
            sessions.clone(),
            handlers.game,
            handlers.environment,
            handlers.teams,
        ));
        let heartbeat = Arc::new(HeartbeatMonitor::spawn(
            sessions.clone(),
            Duration::from_millis(settings.heartbeat.interval_ms),
            Duration::from_millis(settings.heartbeat.timeout_ms),
        ));

        Self {
            sessions,
            rooms,
            dispatcher,
            heartbeat,
            settings: Arc::new(settings),
        }
    }
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    state: AppState,
}

impl Application {
    /// Build the application from settings with the reference handlers
    pub async fn build(settings: Settings) -> Result<Self> {
        let handlers = Handlers::in_memory(&settings);
        Self::build_with(settings, handlers).await
    }

    /// Build the application with caller-supplied collaborators
    pub async fn build_with(settings: Settings, handlers: Handlers) -> Result<Self> {
        health::init_server_start();

        let addr = settings.server_addr();
        let cors_layer = cors::create_cors_layer(&settings.cors);
        let state = AppState::new(settings, handlers);
        tracing::info!(
            interval_ms = state.settings.heartbeat.interval_ms,
            timeout_ms = state.settings.heartbeat.timeout_ms,
            "Session registry ready"
        );

        // Build router with middleware
        let router = routes::create_router(state.clone())
            .layer(logging::create_trace_layer())
            .layer(cors_layer);

        // Bind to address
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            router,
            state,
        })
    }

    /// Run the server until stopped
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared state, for inspection
    pub fn state(&self) -> &AppState {
        &self.state
    }
}
