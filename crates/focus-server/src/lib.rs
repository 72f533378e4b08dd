//! Focus Guard Server - localhost HTTP API for the browser extension.
//!
//! ## Endpoints
//!
//! - `POST /api/session/start` - Start a focus session
//! - `POST /api/session/end` - End the active session
//! - `GET /api/session` - Current session and remaining minutes
//! - `POST /api/navigation` - Check a navigation commit
//! - `POST /api/analyze` - Classify a loaded page and dispatch the result
//! - `DELETE /api/tabs/{tab_id}` - Forget a closed tab
//! - `GET /api/rules` - Installed network block rules
//! - `GET /api/settings` / `PUT /api/settings` - Read or replace settings
//! - `GET /api/stats` - Focus statistics
//! - `GET /api/events` - Tab messages as server-sent events
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use focus_core::{HttpClassifier, SilentNotifier};
//! use focus_server::{AppState, Server, ServerConfig};
//! use focus_storage::Database;
//!
//! #[tokio::main]
//! async fn main() {
//!     let state = AppState::new(
//!         Database::in_memory().unwrap(),
//!         Arc::new(HttpClassifier::new().unwrap()),
//!         Arc::new(SilentNotifier),
//!     );
//!     let server = Server::with_state(ServerConfig::default(), state).unwrap();
//!     server.run().await.unwrap();
//! }
//! ```

pub mod error;
mod handlers;
pub mod models;
pub mod state;

use std::net::SocketAddr;

use axum::routing::{delete, get, post};
use axum::Router;
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use error::{ApiError, Result};
pub use state::AppState;

/// Default server port.
pub const DEFAULT_PORT: u16 = 48766;

/// Default server host (localhost only).
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1).
    pub host: String,
    /// Port to bind to (default: 48766).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    /// Sets the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }
}

/// Server error types.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {0}: {1}")]
    BindError(SocketAddr, std::io::Error),

    /// Server runtime error.
    #[error("server error: {0}")]
    Runtime(String),
}

/// Builds the API router over `state`.
pub fn router(state: AppState) -> Router {
    // The extension calls from its own origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/session", get(handlers::get_session))
        .route("/api/session/start", post(handlers::start_session))
        .route("/api/session/end", post(handlers::end_session))
        .route("/api/navigation", post(handlers::check_navigation))
        .route("/api/analyze", post(handlers::analyze_page))
        .route("/api/tabs/{tab_id}", delete(handlers::close_tab))
        .route("/api/rules", get(handlers::get_rules))
        .route(
            "/api/settings",
            get(handlers::get_settings).put(handlers::update_settings),
        )
        .route("/api/stats", get(handlers::get_stats))
        .route("/api/events", get(handlers::events))
        .layer(cors)
        .with_state(state)
}

/// The HTTP API server.
pub struct Server {
    router: Router,
    addr: SocketAddr,
}

impl Server {
    /// Creates a server over prepared application state.
    pub fn with_state(config: ServerConfig, state: AppState) -> std::result::Result<Self, ServerError> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| ServerError::Runtime(format!("invalid address: {}", e)))?;

        Ok(Self {
            router: router(state),
            addr,
        })
    }

    /// Returns the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Runs the server until shutdown.
    pub async fn run(self) -> std::result::Result<(), ServerError> {
        info!(addr = %self.addr, "Starting Focus Guard API server");

        let domain = if self.addr.is_ipv6() {
            Domain::IPV6
        } else {
            Domain::IPV4
        };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        // Rebind quickly after a restart while old sockets sit in TIME_WAIT
        socket
            .set_reuse_address(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .bind(&self.addr.into())
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .listen(128)
            .map_err(|e| ServerError::BindError(self.addr, e))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        let std_listener: std::net::TcpListener = socket.into();
        let listener = tokio::net::TcpListener::from_std(std_listener)
            .map_err(|e| ServerError::BindError(self.addr, e))?;

        axum::serve(listener, self.router)
            .await
            .map_err(|e| ServerError::Runtime(e.to_string()))?;

        Ok(())
    }

    /// Returns the router for testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}
