//! HTTP and websocket server for vitrine.
//!
//! The server:
//! - Scans the object catalog once at startup
//! - Serves the JSON endpoints, static files and the `/ws` screen channel
//! - Spawns a `ConnectionHandler` for every upgraded websocket
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  VitrineServer  │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ axum::serve
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │   HTTP routes   │────▶│  DisplayStore   │
//! │ /update_display │     │                 │
//! └─────────────────┘     └───────┬─────────┘
//!         │ /ws                   │ broadcast
//!         ▼                       ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│ ChannelRegistry │
//! │  (per screen)   │     │                 │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Listener errors are returned as `ServerError`, transport errors stay
//!   inside the affected connection

mod connection;
mod routes;

pub use connection::{ConnectionHandler, DisconnectReason, LifecycleSettings};
pub use routes::{router, AppState, HealthResponse};

use std::path::PathBuf;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vitrine_catalog::ObjectCatalog;
use vitrine_core::{DisplayState, ObjectName, Probability};

use crate::config::Config;
use crate::display::DisplayStore;
use crate::registry::ChannelRegistry;

/// The vitrine server.
pub struct VitrineServer {
    config: Config,
    state: AppState,
}

impl VitrineServer {
    /// Creates a server from `config`, scanning the object catalog.
    pub fn new(config: Config, cancel_token: CancellationToken) -> Self {
        let catalog = ObjectCatalog::scan(&config.static_objects_directory);
        info!(
            directory = %config.static_objects_directory.display(),
            objects = catalog.len(),
            "Object catalog loaded"
        );
        Self::with_catalog(config, catalog, cancel_token)
    }

    /// Creates a server over an already scanned catalog.
    pub fn with_catalog(
        config: Config,
        catalog: ObjectCatalog,
        cancel_token: CancellationToken,
    ) -> Self {
        let registry = Arc::new(ChannelRegistry::with_send_timeout(config.send_timeout()));
        let initial = initial_state(&config.initial_object);
        let state = AppState {
            display: Arc::new(DisplayStore::new(initial, registry)),
            catalog: Arc::new(catalog),
            lifecycle: LifecycleSettings::from(&config),
            cancel_token,
            connection_counter: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        };
        Self { config, state }
    }

    /// Builds the axum router.
    pub fn router(&self) -> Router {
        router(self.state.clone(), &self.config.static_directory)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn display(&self) -> &Arc<DisplayStore> {
        &self.state.display
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        self.state.display.registry()
    }

    pub fn catalog(&self) -> &Arc<ObjectCatalog> {
        &self.state.catalog
    }

    /// Binds the configured address and serves until cancelled.
    pub async fn run(&self) -> Result<(), ServerError> {
        let address = self.config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| ServerError::Bind {
                address: address.clone(),
                error: e.to_string(),
            })?;
        self.serve(listener).await
    }

    /// Serves on an already bound listener until cancelled.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        match listener.local_addr() {
            Ok(addr) => info!(address = %addr, "vitrine server listening"),
            Err(e) => warn!(error = %e, "Listening on unknown address"),
        }

        let cancel_token = self.state.cancel_token.clone();
        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("Server shutdown requested");
            })
            .await
            .map_err(|e| ServerError::Serve(e.to_string()));

        self.cleanup().await;
        served
    }

    async fn cleanup(&self) {
        let closed = self.registry().close_all().await;
        info!(closed, "Server cleanup complete");
    }
}

/// Parses the configured initial object, falling back to nothing.
fn initial_state(raw: &str) -> DisplayState {
    match ObjectName::parse(raw) {
        Ok(name) => DisplayState::new(name, Probability::ZERO),
        Err(e) => {
            warn!(initial_object = %raw, error = %e, "Ignoring invalid initial object");
            DisplayState::nothing()
        }
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {address}: {error}")]
    Bind { address: String, error: String },

    #[error("Server error: {0}")]
    Serve(String),
}

/// Default location of the config file, relative to the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("config.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_server() -> VitrineServer {
        let dir = tempfile::tempdir().unwrap();
        VitrineServer::with_catalog(
            Config::default(),
            ObjectCatalog::scan(dir.path()),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_initial_state_defaults_to_nothing() {
        assert!(initial_state("nothing").object_name.is_nothing());
        assert!(initial_state("   ").object_name.is_nothing());
        assert_eq!(initial_state("apple").object_name.as_str(), "apple");
    }

    #[tokio::test]
    async fn test_server_starts_empty() {
        let server = make_server();
        assert!(server.registry().is_empty().await);
        assert!(server.catalog().is_empty());
        assert!(server.display().current().await.object_name.is_nothing());
    }

    #[tokio::test]
    async fn test_bind_error() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = occupied.local_addr().unwrap().port();

        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            host: "127.0.0.1".into(),
            port,
            ..Config::default()
        };
        let server = VitrineServer::with_catalog(
            config,
            ObjectCatalog::scan(dir.path()),
            CancellationToken::new(),
        );

        let err = server.run().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let token = CancellationToken::new();
        let dir = tempfile::tempdir().unwrap();
        let server = VitrineServer::with_catalog(
            Config::default(),
            ObjectCatalog::scan(dir.path()),
            token.clone(),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        token.cancel();
        server.serve(listener).await.unwrap();
    }
}
