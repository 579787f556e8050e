//! Session Registry
//!
//! Tracks every open realtime connection and the mode it selected.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::ws::protocol::Mode;

/// Opaque handle identifying one realtime connection.
pub type ConnectionId = Uuid;

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    #[schema(value_type = String, format = Uuid)]
    pub id: ConnectionId,
    /// `null` until the client picks a mode.
    #[schema(value_type = Option<String>, example = "chat")]
    pub mode: Option<Mode>,
    pub connected_at: DateTime<Utc>,
}

#[derive(Clone, Default, Debug)]
pub struct SessionRegistry {
    connections: Arc<RwLock<HashMap<ConnectionId, ConnectionInfo>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection with no mode selected and returns its handle.
    pub async fn register(&self) -> ConnectionId {
        let id = Uuid::new_v4();
        self.connections.write().await.insert(
            id,
            ConnectionInfo {
                id,
                mode: None,
                connected_at: Utc::now(),
            },
        );
        id
    }

    /// Records the connection's mode. Returns `false` if it was already set or the
    /// connection is unknown; a mode never changes once chosen.
    pub async fn set_mode(&self, id: ConnectionId, mode: Mode) -> bool {
        match self.connections.write().await.get_mut(&id) {
            Some(info) if info.mode.is_none() => {
                info.mode = Some(mode);
                true
            }
            _ => false,
        }
    }

    pub async fn remove(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.connections.write().await.remove(&id)
    }

    pub async fn get(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.connections.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// All open connections, oldest first.
    pub async fn snapshot(&self) -> Vec<ConnectionInfo> {
        let mut all: Vec<ConnectionInfo> =
            self.connections.read().await.values().cloned().collect();
        all.sort_by_key(|info| info.connected_at);
        all
    }
}
