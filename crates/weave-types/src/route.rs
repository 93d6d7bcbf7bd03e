//! Route entries and connection records.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How to reach a remote process: through the connection `gateway_id`,
/// owned by the local service `gateway`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    pub remote_id: String,
    pub gateway_id: String,
    pub gateway: String,
}

impl RouteEntry {
    pub fn new(
        remote_id: impl Into<String>,
        gateway_id: impl Into<String>,
        gateway: impl Into<String>,
    ) -> Self {
        Self {
            remote_id: remote_id.into(),
            gateway_id: gateway_id.into(),
            gateway: gateway.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The peer connected to us.
    Inbound,
    /// We connected to the peer.
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Serializable description of a live (or pending) connection.  The
/// transport handle itself is kept elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub gateway_id: String,
    pub gateway: String,
    pub url: String,
    pub direction: Direction,
    pub state: ConnectionState,
    pub uuid: Uuid,
    /// Creation time, milliseconds since the Unix epoch.
    pub ts: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub encoding: String,
}

impl Connection {
    /// A freshly connected JSON-over-WebSocket connection.
    pub fn new(
        gateway_id: impl Into<String>,
        gateway: impl Into<String>,
        url: impl Into<String>,
        direction: Direction,
    ) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            gateway: gateway.into(),
            url: url.into(),
            direction,
            state: ConnectionState::Connected,
            uuid: Uuid::new_v4(),
            ts: chrono::Utc::now().timestamp_millis(),
            kind: "websocket".to_string(),
            encoding: "json".to_string(),
        }
    }
}
