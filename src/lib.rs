//! Real-time relay for shared drawing rooms.
//!
//! Clients join named rooms over a WebSocket. The first member of a room
//! loads its project from the store, every drawing event is applied to the
//! in-memory project and relayed to the other members, and a room left
//! empty is written back to the store and released after a grace period.

pub mod config;
pub mod db;
pub mod docs;
pub mod drawing;
pub mod handlers;
pub mod models;
pub mod rooms;
pub mod routes;
pub mod services;
pub mod utils;
pub mod websocket;
pub mod ws;

use axum::{http::{header, HeaderValue, Method}, routing::get, Router};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use docs::ApiDoc;
use routes::create_api_routes;
use services::RoomService;
use websocket::handler::websocket_handler;

/// Shared state handed to every HTTP and WebSocket handler.
pub struct AppState {
    pub rooms: RoomService,
    pub config: Config,
}

impl AppState {
    pub fn new(rooms: RoomService, config: Config) -> Self {
        Self { rooms, config }
    }
}

/// Build the full router: API under `/api`, the relay socket at `/ws` and
/// Swagger UI.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .nest("/api", create_api_routes())
        .route("/ws", get(websocket_handler))
        .with_state(state)
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let origins: Vec<HeaderValue> = config
        .cors_origin_list()
        .into_iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        if !config.is_development() {
            warn!("No CORS origins configured, allowing any origin");
        }
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(AllowOrigin::list(origins))
    }
}
