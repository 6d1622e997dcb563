//! HTTP routes.
//!
//! JSON endpoints wrap their payload in the `Reply` envelope, except
//! `/object_names` (a bare array) and `/health`. Catalog reads that touch
//! the filesystem run on the blocking pool.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::error;

use vitrine_catalog::{KnowledgeView, ObjectCatalog};
use vitrine_protocol::{DisplayUpdate, ObjectQuery, Reply, UpdateDisplayQuery};

use crate::channel::{split_websocket, ChannelId};
use crate::display::DisplayStore;
use crate::server::connection::{ConnectionHandler, LifecycleSettings};

/// Shared state accessible from the handlers.
#[derive(Clone)]
pub struct AppState {
    /// Display state and the registry it broadcasts to
    pub display: Arc<DisplayStore>,
    /// Object media on disk
    pub catalog: Arc<ObjectCatalog>,
    /// Settings for every websocket lifecycle
    pub lifecycle: LifecycleSettings,
    /// Ends every websocket lifecycle on shutdown
    pub cancel_token: CancellationToken,
    /// Source of channel ids
    pub connection_counter: Arc<AtomicU64>,
    /// When the server started
    pub started_at: Instant,
}

impl AppState {
    fn next_channel_id(&self) -> ChannelId {
        ChannelId::new(self.connection_counter.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// `/health` response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server runs
    pub status: String,
    pub uptime_secs: u64,
    /// Registered screens
    pub connections: usize,
    pub current_object: String,
    pub updated_at: DateTime<Utc>,
}

/// Builds the full router over `state`, serving web files from `static_directory`.
pub fn router(state: AppState, static_directory: &Path) -> Router {
    Router::new()
        .route("/object_names", get(object_names))
        .route("/update_display", get(update_display))
        .route("/current_object_name", get(current_object_name))
        .route("/current_display", get(current_display))
        .route("/vectors", get(vectors))
        .route("/pictures", get(pictures))
        .route("/knowledge_graph", get(knowledge_graph))
        .route("/health", get(health))
        .route("/ws", get(ws_upgrade))
        .route_service("/index", ServeFile::new(static_directory.join("index.html")))
        .nest_service("/assets", ServeDir::new(static_directory.join("assets")))
        .nest_service("/static", ServeDir::new(static_directory))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Display
// ============================================================================

/// GET /update_display?object_name=&prob=
async fn update_display(
    State(state): State<AppState>,
    Query(query): Query<UpdateDisplayQuery>,
) -> Json<Reply> {
    let display = Arc::clone(&state.display);
    let catalog = Arc::clone(&state.catalog);
    let probability = query.probability();

    // Detached so a caller hanging up cannot cut a broadcast short
    let applied = tokio::spawn(async move {
        display
            .update(&query.object_name, probability, &catalog)
            .await
    })
    .await;

    match applied {
        Ok(Ok(_)) => Json(Reply::success()),
        Ok(Err(e)) => Json(Reply::message(e.to_string())),
        Err(e) => {
            error!(error = %e, "Display update task failed");
            Json(Reply::message("internal error"))
        }
    }
}

/// GET /current_object_name
async fn current_object_name(State(state): State<AppState>) -> Json<Reply> {
    let current = state.display.current().await;
    Json(Reply::message(current.object_name.as_str()))
}

/// GET /current_display
async fn current_display(State(state): State<AppState>) -> Json<Reply> {
    let current = state.display.current().await;
    Json(Reply::message(DisplayUpdate::from(&current)))
}

// ============================================================================
// Catalog
// ============================================================================

/// GET /object_names
async fn object_names(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.catalog.object_names().into_iter().collect())
}

/// GET /vectors?object_name=
async fn vectors(
    State(state): State<AppState>,
    Query(query): Query<ObjectQuery>,
) -> Json<Reply> {
    let catalog = Arc::clone(&state.catalog);
    let content = on_blocking_pool(move || catalog.vectors(&query.object_name))
        .await
        .flatten();
    Json(Reply::message(content))
}

/// GET /pictures?object_name=
async fn pictures(
    State(state): State<AppState>,
    Query(query): Query<ObjectQuery>,
) -> Json<Reply> {
    let catalog = Arc::clone(&state.catalog);
    let segments = on_blocking_pool(move || catalog.segments(&query.object_name))
        .await
        .unwrap_or_default();
    Json(Reply::message(segments))
}

/// GET /knowledge_graph?object_name=
async fn knowledge_graph(
    State(state): State<AppState>,
    Query(query): Query<ObjectQuery>,
) -> Json<Reply> {
    let catalog = Arc::clone(&state.catalog);
    let name = query.object_name.clone();
    let view = on_blocking_pool(move || catalog.knowledge_view(&query.object_name))
        .await
        .unwrap_or(KnowledgeView {
            name,
            data: None,
            images: Vec::new(),
        });
    Json(Reply::message(view))
}

async fn on_blocking_pool<T, F>(read: F) -> Option<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(read).await {
        Ok(value) => Some(value),
        Err(e) => {
            error!(error = %e, "Catalog read failed");
            None
        }
    }
}

// ============================================================================
// Health & Websocket
// ============================================================================

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.display.registry().len().await;
    let current = state.display.current().await;
    Json(HealthResponse {
        status: "ok".into(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        connections,
        current_object: current.object_name.as_str().to_string(),
        updated_at: current.updated_at,
    })
}

/// GET /ws
async fn ws_upgrade(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade
        .on_upgrade(move |socket| serve_screen(socket, state))
        .into_response()
}

async fn serve_screen(socket: WebSocket, state: AppState) {
    let id = state.next_channel_id();
    let (channel, receiver) = split_websocket(socket, id);
    let handler = ConnectionHandler::new(
        Arc::new(channel),
        receiver,
        state.display,
        state.lifecycle,
        state.cancel_token,
    );
    handler.run().await;
}
