//! `TextcastServer`: the axum HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use textcast_core::{BroadcastBus, Framing, SessionConfig};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::handlers;
use crate::health::{self, HealthResponse};
use crate::shutdown::{DEFAULT_DRAIN_TIMEOUT, ShutdownCoordinator};

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The process-wide bus.
    pub bus: BroadcastBus,
    /// Settings applied to every new stream.
    pub session: SessionConfig,
    /// Text payload encoding.
    pub framing: Framing,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Stream responses whose bodies are still alive.
    pub open_streams: Arc<AtomicUsize>,
}

/// The textcast HTTP server.
pub struct TextcastServer {
    config: ServerConfig,
    bus: BroadcastBus,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    open_streams: Arc<AtomicUsize>,
}

impl TextcastServer {
    /// Create a server around an existing bus.
    pub fn new(config: ServerConfig, bus: BroadcastBus) -> Self {
        Self {
            config,
            bus,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            open_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            bus: self.bus.clone(),
            session: self.config.session.clone(),
            framing: self.config.framing,
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            open_streams: Arc::clone(&self.open_streams),
        };

        Router::new()
            .route("/api", get(handlers::api_get).post(handlers::api_post))
            .route(
                "/api/refresh",
                get(handlers::refresh_stream).post(handlers::refresh_post),
            )
            .route("/api/history", get(handlers::history_get))
            .route("/health", get(health_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Get the bus.
    pub fn bus(&self) -> &BroadcastBus {
        &self.bus
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Number of stream responses currently open.
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    /// Bind the listener and serve in a background task.
    pub async fn start(self) -> Result<ServerHandle, std::io::Error> {
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        info!(
            addr = %local_addr,
            history_limit = self.bus.history_limit(),
            framing = self.config.framing.as_str(),
            "textcast server started"
        );

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "server error");
            }
        });

        Ok(ServerHandle {
            local_addr,
            shutdown: self.shutdown,
            task,
        })
    }
}

/// Handle returned by [`TextcastServer::start`].
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Arc<ShutdownCoordinator>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Bound port.
    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// End all streams, stop accepting connections, and wait for the server.
    pub async fn shutdown(self) {
        if self.shutdown.drain(self.task, DEFAULT_DRAIN_TIMEOUT).await {
            info!("textcast server stopped");
        }
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let resp = health::health_check(
        state.start_time,
        state.open_streams.load(Ordering::SeqCst),
        state.bus.history().len(),
    );
    Json(resp)
}
