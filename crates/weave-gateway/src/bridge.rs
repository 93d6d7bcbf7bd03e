//! The per-connection task shared by inbound and outbound transports.
//!
//! Drains the connection's [`TransportHandle`] channel onto the socket and
//! feeds every received text frame to `Runtime::handle_inbound`.  When the
//! socket closes, the runtime is told through `connection_closed`, unless
//! the connection was taken over by a newer transport in the meantime.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message as Frame;
use tracing::{debug, info, warn};

use weave_core::{Runtime, TransportHandle};
use weave_types::Direction;

/// Record the connection in `runtime` and return the receiver its bridge
/// drains.  A placeholder already waiting on `gateway_id` keeps acting as
/// the gateway for it.
pub fn attach(
    runtime: &Runtime,
    gateway_id: &str,
    url: &str,
    direction: Direction,
) -> (TransportHandle, UnboundedReceiver<String>) {
    let (handle, outbound) = TransportHandle::channel();
    let gateway = runtime
        .connections()
        .get(gateway_id)
        .map(|c| c.gateway.clone())
        .unwrap_or_else(|| runtime.fullname().to_string());
    runtime.register_connection(&gateway, gateway_id, url, direction, Some(handle.clone()));
    (handle, outbound)
}

/// Run until either side closes.
pub async fn run<S>(
    ws: WebSocketStream<S>,
    runtime: Arc<Runtime>,
    gateway_id: String,
    handle_id: u64,
    mut outbound: UnboundedReceiver<String>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            // ── runtime → peer ───────────────────────────────────────────
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    debug!(%gateway_id, "transport handle dropped, closing socket");
                    let _ = ws_tx.send(Frame::Close(None)).await;
                    break;
                };
                if let Err(e) = ws_tx.send(Frame::Text(frame.into())).await {
                    warn!(%gateway_id, error = %e, "socket write failed");
                    break;
                }
            }
            // ── peer → runtime ───────────────────────────────────────────
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Frame::Text(text))) => {
                        runtime.handle_inbound(&gateway_id, text.as_str());
                    }
                    Some(Ok(Frame::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => {
                            runtime.handle_inbound(&gateway_id, text);
                        }
                        Err(_) => warn!(%gateway_id, "dropping non-utf8 binary frame"),
                    },
                    Some(Ok(Frame::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(%gateway_id, error = %e, "socket read failed");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    let still_ours = runtime
        .transport(&gateway_id)
        .is_some_and(|h| h.id() == handle_id);
    if still_ours {
        info!(%gateway_id, "connection closed");
        runtime.connection_closed(&gateway_id);
    } else {
        debug!(%gateway_id, "connection already replaced or removed");
    }
}
