//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the service clients
//! and registries shared by every handler and realtime session.

use crate::{config::Config, conversation::ConversationStore, registry::SessionRegistry};
use pluto_core::{agent::AgentEngine, metrics::MetricsGateway};
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Arc<MetricsGateway>,
    /// Tool-using agent behind realtime sessions.
    pub engine: Arc<dyn AgentEngine>,
    /// Plain conversational model behind the REST chat endpoints.
    pub conversations: Arc<ConversationStore>,
    pub registry: SessionRegistry,
}
