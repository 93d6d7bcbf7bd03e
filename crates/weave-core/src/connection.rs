//! Connection records and their transport handles.
//!
//! Records are serializable and returned by `getConnections`.  Handles are
//! kept in a side table keyed by the same gateway id; a handle of `None`
//! marks a connection that is registered but waiting for its peer (a local
//! placeholder expecting an out-of-process client).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use weave_types::{Connection, ConnectionState, WeaveError};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Write side of one transport.  Frames are queued on an unbounded channel
/// and written by the transport's own task.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

impl TransportHandle {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            tx,
        }
    }

    /// Process-unique id; clones share it.  Lets a transport task tell
    /// whether the table still holds its handle after a reconnect.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// A handle and the receiver its writer task drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Queue one text frame.  Fire-and-forget: success means queued, not
    /// delivered.
    pub fn send(&self, frame: String) -> Result<(), WeaveError> {
        self.tx
            .send(frame)
            .map_err(|_| WeaveError::Transport("transport writer closed".to_string()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug, Default)]
pub struct ConnectionTable {
    records: BTreeMap<String, Connection>,
    handles: BTreeMap<String, Option<TransportHandle>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record and handle for `connection.gateway_id`.
    pub fn register(&mut self, connection: Connection, handle: Option<TransportHandle>) {
        let key = connection.gateway_id.clone();
        self.handles.insert(key.clone(), handle);
        self.records.insert(key, connection);
    }

    /// Returns `false` when no such connection exists.
    pub fn update_state(&mut self, gateway_id: &str, state: ConnectionState) -> bool {
        match self.records.get_mut(gateway_id) {
            Some(conn) => {
                conn.state = state;
                true
            }
            None => false,
        }
    }

    /// Drop the transport handle but keep the record.
    pub fn detach(&mut self, gateway_id: &str) {
        if let Some(handle) = self.handles.get_mut(gateway_id) {
            *handle = None;
        }
    }

    /// Remove record and handle.  `None` when the gateway id was never
    /// registered.
    pub fn remove(&mut self, gateway_id: &str) -> Option<Connection> {
        self.handles.remove(gateway_id)?;
        self.records.remove(gateway_id)
    }

    pub fn contains(&self, gateway_id: &str) -> bool {
        self.handles.contains_key(gateway_id)
    }

    pub fn handle(&self, gateway_id: &str) -> Option<TransportHandle> {
        self.handles.get(gateway_id).cloned().flatten()
    }

    pub fn get(&self, gateway_id: &str) -> Option<&Connection> {
        self.records.get(gateway_id)
    }

    pub fn records(&self) -> &BTreeMap<String, Connection> {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
