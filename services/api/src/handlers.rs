//! Axum Handlers for the REST API
//!
//! The metrics proxy forwards Cookie API responses untouched; the chat endpoints
//! talk to the conversational model. All handlers carry `utoipa` annotations for
//! the generated OpenAPI document.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use pluto_core::{
    cards::AgentDetails,
    metrics::{self, GatewayError},
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    models::{
        ChatErrorResponse, ChatPayload, ChatResponse, ErrorResponse, IntervalQuery, PagedQuery,
        SearchQuery,
    },
    registry::ConnectionInfo,
    state::AppState,
};

pub const MISSING_SEARCH_PARAMS: &str = "Missing required parameters: query, from, to";
const FETCH_AGENT_FAILED: &str = "Failed to fetch agent";
const FETCH_AGENTS_FAILED: &str = "Failed to fetch agents";
const SEARCH_TWEETS_FAILED: &str = "Failed to search tweets";
const FETCH_AGENT_DATA_FAILED: &str = "Failed to fetch agent data";

pub enum ApiError {
    /// Invalid client input on a proxy route.
    BadRequest(String),
    /// A proxy route's upstream call failed; the client only sees the fixed message.
    Upstream(&'static str, GatewayError),
    /// Any failure on a chat route; the client sees the error text.
    Chat(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(error) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response()
            }
            ApiError::Upstream(message, err) => {
                error!(error = %err, "{}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: message.to_string(),
                    }),
                )
                    .into_response()
            }
            ApiError::Chat(err) => {
                error!("Chat request failed: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ChatErrorResponse {
                        success: false,
                        error: err.to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Chat(err.into())
    }
}

/// Get an agent by its Twitter username.
#[utoipa::path(
    get,
    path = "/agent/twitter/{username}",
    params(
        ("username" = String, Path, description = "Twitter handle without the leading @"),
        IntervalQuery
    ),
    responses(
        (status = 200, description = "Cookie API response, forwarded as-is", body = Object),
        (status = 500, description = "Upstream failure", body = ErrorResponse)
    )
)]
pub async fn get_agent_by_twitter(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Query(query): Query<IntervalQuery>,
) -> Result<Json<Value>, ApiError> {
    let data = state
        .gateway
        .agent_by_twitter(&username, &query.interval)
        .await
        .map_err(|e| ApiError::Upstream(FETCH_AGENT_FAILED, e))?;
    Ok(Json(data))
}

/// Get an agent by one of its token contract addresses.
#[utoipa::path(
    get,
    path = "/agent/contract/{address}",
    params(
        ("address" = String, Path, description = "Token contract address"),
        IntervalQuery
    ),
    responses(
        (status = 200, description = "Cookie API response, forwarded as-is", body = Object),
        (status = 500, description = "Upstream failure", body = ErrorResponse)
    )
)]
pub async fn get_agent_by_contract(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(query): Query<IntervalQuery>,
) -> Result<Json<Value>, ApiError> {
    let data = state
        .gateway
        .agent_by_contract(&address, &query.interval)
        .await
        .map_err(|e| ApiError::Upstream(FETCH_AGENT_FAILED, e))?;
    Ok(Json(data))
}

/// List agents ordered by mindshare, one page at a time.
#[utoipa::path(
    get,
    path = "/agents/paged",
    params(PagedQuery),
    responses(
        (status = 200, description = "Cookie API response, forwarded as-is", body = Object),
        (status = 500, description = "Upstream failure", body = ErrorResponse)
    )
)]
pub async fn get_agents_paged(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PagedQuery>,
) -> Result<Json<Value>, ApiError> {
    let data = state
        .gateway
        .agents_paged(&query.interval, query.page, query.page_size)
        .await
        .map_err(|e| ApiError::Upstream(FETCH_AGENTS_FAILED, e))?;
    Ok(Json(data))
}

/// Search tweets between two dates.
#[utoipa::path(
    get,
    path = "/tweets/search",
    params(SearchQuery),
    responses(
        (status = 200, description = "Cookie API response, forwarded as-is", body = Object),
        (status = 400, description = "A required parameter is missing", body = ErrorResponse),
        (status = 500, description = "Upstream failure", body = ErrorResponse)
    )
)]
pub async fn search_tweets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Value>, ApiError> {
    let (search, from, to) = query
        .required()
        .ok_or_else(|| ApiError::BadRequest(MISSING_SEARCH_PARAMS.to_string()))?;

    let data = state
        .gateway
        .search_tweets(search, from, to)
        .await
        .map_err(|e| ApiError::Upstream(SEARCH_TWEETS_FAILED, e))?;
    Ok(Json(data))
}

/// Continue a free-form conversation with the assistant.
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatPayload,
    responses(
        (status = 200, description = "Assistant reply", body = ChatResponse),
        (status = 500, description = "Model failure", body = ChatErrorResponse)
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatPayload>,
) -> Result<Json<ChatResponse>, ApiError> {
    let response = state
        .conversations
        .invoke(&payload.session_id, &payload.message)
        .await?;
    Ok(Json(ChatResponse::new(response, None)))
}

/// Ask about one agent. Its current metrics are fetched and handed to the assistant
/// along with the message, and returned as card data.
#[utoipa::path(
    post,
    path = "/chat/agent/{username}",
    request_body = ChatPayload,
    params(
        ("username" = String, Path, description = "Twitter handle of the agent")
    ),
    responses(
        (status = 200, description = "Assistant reply with agent card data", body = ChatResponse),
        (status = 500, description = "Upstream or model failure", body = ChatErrorResponse)
    )
)]
pub async fn chat_about_agent(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Json(payload): Json<ChatPayload>,
) -> Result<Json<ChatResponse>, ApiError> {
    let body = state
        .gateway
        .agent_by_twitter(&username, metrics::DEFAULT_INTERVAL)
        .await
        .map_err(|e| {
            warn!(%username, error = %e, "Error fetching agent data");
            ApiError::Chat(anyhow::anyhow!(FETCH_AGENT_DATA_FAILED))
        })?;

    // The agent card needs the object under `ok`; anything else is unusable data.
    let Some(agent) = body.get("ok").filter(|ok| ok.is_object()) else {
        warn!(%username, "Agent data has no `ok` object");
        return Err(ApiError::Chat(anyhow::anyhow!(FETCH_AGENT_DATA_FAILED)));
    };
    let card = AgentDetails::from_payload(agent);
    info!(%username, agent = %card.agent_name, "Answering agent question");

    let input = format!("{}\nAgent Data: {}", payload.message, card.summary());
    let response = state
        .conversations
        .invoke(&payload.session_id, &input)
        .await?;

    Ok(Json(ChatResponse::new(response, Some(card))))
}

/// List open realtime connections and the mode each one selected.
#[utoipa::path(
    get,
    path = "/connections",
    responses(
        (status = 200, description = "Open realtime connections, oldest first", body = [ConnectionInfo])
    )
)]
pub async fn list_connections(State(state): State<Arc<AppState>>) -> Json<Vec<ConnectionInfo>> {
    Json(state.registry.snapshot().await)
}
