//! API Models
//!
//! Request and response shapes of the REST surface, annotated for OpenAPI
//! generation with `utoipa`.

use pluto_core::{cards::AgentDetails, metrics};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    #[schema(example = "Which agent gained the most mindshare this week?")]
    pub message: String,
    /// Client-chosen conversation key; the same id continues the same conversation.
    #[schema(example = "3f2c7a1e-demo")]
    pub session_id: String,
}

#[derive(Serialize, ToSchema, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    pub response: String,
    /// Agent details for `/chat/agent/{username}`; always `null` for plain chat.
    #[schema(value_type = Option<Object>)]
    pub card_data: Option<AgentDetails>,
}

impl ChatResponse {
    pub fn new(response: String, card_data: Option<AgentDetails>) -> Self {
        Self {
            success: true,
            response,
            card_data,
        }
    }
}

/// Error body of the chat endpoints.
#[derive(Serialize, ToSchema, Debug)]
pub struct ChatErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Error body of the metrics proxy endpoints.
#[derive(Serialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

fn default_interval() -> String {
    metrics::DEFAULT_INTERVAL.to_string()
}

fn default_page() -> u32 {
    metrics::DEFAULT_PAGE
}

fn default_page_size() -> u32 {
    metrics::DEFAULT_PAGE_SIZE
}

#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct IntervalQuery {
    /// Aggregation window, e.g. `_3Days` or `_7Days`.
    #[serde(default = "default_interval")]
    #[param(default = "_7Days")]
    pub interval: String,
}

#[derive(Deserialize, IntoParams, Debug)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PagedQuery {
    #[serde(default = "default_interval")]
    #[param(default = "_7Days")]
    pub interval: String,
    #[serde(default = "default_page")]
    #[param(default = 1, minimum = 1)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    #[param(default = 10, minimum = 1)]
    pub page_size: u32,
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Free-text search; escaped into the upstream path.
    pub query: Option<String>,
    /// Start date, `YYYY-MM-DD`.
    pub from: Option<String>,
    /// End date, `YYYY-MM-DD`.
    pub to: Option<String>,
}

impl SearchQuery {
    /// Returns `(query, from, to)` when all three are present and non-empty.
    pub fn required(&self) -> Option<(&str, &str, &str)> {
        fn present(value: &Option<String>) -> Option<&str> {
            value.as_deref().filter(|v| !v.is_empty())
        }
        Some((
            present(&self.query)?,
            present(&self.from)?,
            present(&self.to)?,
        ))
    }
}
