//! [`WsConnector`] – outbound connections to other processes.
//!
//! Connecting to `ws://host:port`:
//!
//! 1. `GET http://host:port/api/v1/services/runtime/getId` yields the remote
//!    process id, which becomes the gateway id of the connection.
//! 2. The WebSocket is opened with `?id=<local id>` so the peer files the
//!    connection under this process.
//! 3. The handshake (`addListener`, `getRegistry`, `registerProcess`,
//!    `register` per service, `registerHost`) is queued, then the bridge
//!    task takes over the socket.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_tungstenite::connect_async;
use tracing::info;

use weave_core::{Connector, Runtime};
use weave_types::{Direction, WeaveError};

use crate::bridge;
use crate::http::API_PREFIX;

#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    http: reqwest::Client,
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the process at `url` for its id.
    pub async fn remote_id(&self, url: &str) -> Result<String, WeaveError> {
        let endpoint = format!("{}{API_PREFIX}/runtime/getId", http_base(url)?);
        let id: String = self
            .http
            .get(&endpoint)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| WeaveError::Transport(format!("{endpoint}: {e}")))?
            .json()
            .await
            .map_err(|e| WeaveError::Transport(format!("{endpoint}: {e}")))?;
        if id.is_empty() {
            return Err(WeaveError::Transport(format!("{endpoint}: empty process id")));
        }
        Ok(id)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, runtime: Arc<Runtime>, url: String) -> Result<String, WeaveError> {
        let remote_id = self.remote_id(&url).await?;
        if remote_id == runtime.id() {
            return Err(WeaveError::Transport(format!(
                "{url} is this process ({remote_id})"
            )));
        }

        let ws_url = format!("{}/?id={}", url.trim_end_matches('/'), runtime.id());
        let (ws, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|e| WeaveError::Transport(format!("{ws_url}: {e}")))?;
        info!(%url, %remote_id, "websocket open");

        let (handle, outbound) = bridge::attach(&runtime, &remote_id, &url, Direction::Outbound);
        for msg in runtime.handshake_messages(&remote_id) {
            handle.send(msg.to_json()?)?;
        }

        let handle_id = handle.id();
        drop(handle);
        tokio::spawn(bridge::run(ws, runtime, remote_id.clone(), handle_id, outbound));
        Ok(remote_id)
    }
}

/// `ws://h:p/x` → `http://h:p`, `wss://` → `https://`.
pub fn http_base(url: &str) -> Result<String, WeaveError> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| WeaveError::Address(format!("{url}: missing scheme")))?;
    let scheme = match scheme {
        "ws" | "http" => "http",
        "wss" | "https" => "https",
        other => {
            return Err(WeaveError::Address(format!("{url}: unsupported scheme {other}")));
        }
    };
    let authority = rest.split(['/', '?']).next().unwrap_or_default();
    if authority.is_empty() {
        return Err(WeaveError::Address(format!("{url}: missing host")));
    }
    Ok(format!("{scheme}://{authority}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::net::TcpListener;
    use weave_types::Message;

    use crate::server::GatewayServer;

    #[test]
    fn http_base_from_ws_url() {
        assert_eq!(http_base("ws://robot:3001").unwrap(), "http://robot:3001");
        assert_eq!(http_base("wss://robot/ws?x=1").unwrap(), "https://robot");
        assert!(http_base("robot:3001").is_err());
        assert!(http_base("ftp://robot").is_err());
        assert!(http_base("ws://").is_err());
    }

    async fn wait_for(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn two_processes_over_websocket() -> Result<(), Box<dyn std::error::Error>> {
        let a = Runtime::builder("P1").build();
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(GatewayServer::new(Arc::clone(&a)).serve(listener));

        let b = Runtime::builder("P2").build();
        b.start_service_type("c1", "clock").ok_or("no clock")?;
        let url = format!("ws://{addr}");
        let remote_id = WsConnector::new().connect(Arc::clone(&b), url.clone()).await?;
        assert_eq!(remote_id, "P1");
        assert!(b.is_connected_to(&url));

        assert!(wait_for(|| a.get_service("c1@P2").is_some()).await);
        assert!(wait_for(|| b.get_service("runtime@P1").is_some()).await);
        assert_eq!(a.connections()["P2"].direction, Direction::Inbound);

        // P1 stops the clock on P2 through the route learned on connect.
        a.dispatch(Message::new("c1@P2", "applyConfigValue", vec!["note".into(), "hi".into()]));
        let clock = b.get_service("c1").ok_or("c1 missing")?;
        assert!(wait_for(|| clock.config().get("note").is_some()).await);

        // Closing P2's side tears down P1's mirrors.
        assert!(b.remove_connection("P1"));
        assert!(wait_for(|| a.get_service("c1@P2").is_none()).await);
        Ok(())
    }
}
