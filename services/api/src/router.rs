//! Axum Router Configuration
//!
//! Two routers are built here: the REST surface (metrics proxy, chat, operator
//! endpoints, OpenAPI docs) and the realtime router that upgrades WebSockets.

use crate::{
    handlers,
    models::{ChatErrorResponse, ChatPayload, ChatResponse, ErrorResponse},
    registry::ConnectionInfo,
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::get_agent_by_twitter,
        handlers::get_agent_by_contract,
        handlers::get_agents_paged,
        handlers::search_tweets,
        handlers::chat,
        handlers::chat_about_agent,
        handlers::list_connections,
    ),
    components(
        schemas(ChatPayload, ChatResponse, ChatErrorResponse, ErrorResponse, ConnectionInfo)
    ),
    tags(
        (name = "Pluto API", description = "Cookie agent metrics proxy and agent chat")
    )
)]
pub struct ApiDoc;

fn rest_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/agent/twitter/{username}",
            get(handlers::get_agent_by_twitter),
        )
        .route(
            "/agent/contract/{address}",
            get(handlers::get_agent_by_contract),
        )
        .route("/agents/paged", get(handlers::get_agents_paged))
        .route("/tweets/search", get(handlers::search_tweets))
        .route("/chat", post(handlers::chat))
        .route("/chat/agent/{username}", post(handlers::chat_about_agent))
        .route("/connections", get(handlers::list_connections))
}

/// Creates the REST router. Every route answers both at the root and under `/api`.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .merge(rest_routes())
        .nest("/api", rest_routes())
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}

/// Creates the realtime router; clients may upgrade on `/` or `/ws`.
pub fn create_realtime_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .with_state(app_state)
}
