//! [`GatewayServer`] – one port for peer WebSockets and the HTTP method API.
//!
//! The request head of each accepted TCP stream is read in full: a WebSocket
//! upgrade becomes a bridged inbound connection, anything else is answered
//! as an HTTP request.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use weave_core::Runtime;
use weave_types::{Direction, Message, WeaveError};

use crate::bridge;
use crate::http::{self, ApiRequest};

/// Default TCP port of the gateway.
pub const DEFAULT_PORT: u16 = 3001;

/// Upper bound on an HTTP request head.
const MAX_HEAD: usize = 16 * 1024;

pub struct GatewayServer {
    runtime: Arc<Runtime>,
    port: u16,
}

impl GatewayServer {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            port: DEFAULT_PORT,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bind `0.0.0.0:<port>` and serve until the task is dropped.
    ///
    /// # Errors
    ///
    /// [`WeaveError::Transport`] when the listener cannot bind.
    pub async fn run(self) -> Result<(), WeaveError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WeaveError::Transport(format!("bind error on {addr}: {e}")))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), WeaveError> {
        let local = listener
            .local_addr()
            .map_err(|e| WeaveError::Transport(e.to_string()))?;
        info!(runtime = %self.runtime.fullname(), addr = %local, "gateway listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let runtime = Arc::clone(&self.runtime);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, runtime).await {
                            warn!(%peer, error = %e, "client error");
                        }
                    });
                }
                Err(e) => error!(error = %e, "accept error"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    runtime: Arc<Runtime>,
) -> Result<(), WeaveError> {
    // The whole head is read before classifying; a WebSocket handshake gets
    // it replayed in front of the socket.
    let raw = read_head(&mut stream).await?;
    let head = String::from_utf8_lossy(&raw).into_owned();

    if http::is_websocket_upgrade(&head) {
        let target = http::request_line(&head)
            .map(|(_, target)| target.to_string())
            .unwrap_or_else(|| "/".to_string());
        handle_ws(Replay::new(raw, stream), peer, runtime, &target).await
    } else {
        handle_http(stream, runtime, &head).await
    }
}

/// A stream whose first bytes were already read off the socket.
struct Replay<S> {
    head: Vec<u8>,
    pos: usize,
    inner: S,
}

impl<S> Replay<S> {
    fn new(head: Vec<u8>, inner: S) -> Self {
        Self { head, pos: 0, inner }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Replay<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.pos < this.head.len() {
            let n = buf.remaining().min(this.head.len() - this.pos);
            buf.put_slice(&this.head[this.pos..this.pos + n]);
            this.pos += n;
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Replay<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

// ---------------------------------------------------------------------------
// WebSocket: inbound peer connection
// ---------------------------------------------------------------------------

async fn handle_ws<S>(
    stream: S,
    peer: SocketAddr,
    runtime: Arc<Runtime>,
    target: &str,
) -> Result<(), WeaveError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let ws = accept_async(stream)
        .await
        .map_err(|e| WeaveError::Transport(format!("ws handshake from {peer}: {e}")))?;

    let gateway_id = inbound_id(&runtime, target);
    info!(%peer, %gateway_id, "inbound connection");

    let url = format!("ws://{peer}{target}");
    let (handle, outbound) = bridge::attach(&runtime, &gateway_id, &url, Direction::Inbound);
    bridge::run(ws, runtime, gateway_id, handle.id(), outbound).await;
    Ok(())
}

/// The `?id=` of an inbound peer, or a fresh UUID.  A peer claiming the
/// local id gets a UUID too.
fn inbound_id(runtime: &Runtime, target: &str) -> String {
    match http::query_param(target, "id") {
        Some(id) if id == runtime.id() => {
            warn!(%id, "inbound peer claims the local id, assigning a fresh one");
            Uuid::new_v4().to_string()
        }
        Some(id) => id,
        None => Uuid::new_v4().to_string(),
    }
}

// ---------------------------------------------------------------------------
// HTTP: method API
// ---------------------------------------------------------------------------

async fn handle_http(
    mut stream: TcpStream,
    runtime: Arc<Runtime>,
    head: &str,
) -> Result<(), WeaveError> {
    let (status, body) = answer(&runtime, head);
    stream
        .write_all(http::response(status, &body).as_bytes())
        .await
        .map_err(|e| WeaveError::Transport(format!("HTTP write error: {e}")))?;
    let _ = stream.shutdown().await;
    Ok(())
}

async fn read_head(stream: &mut TcpStream) -> Result<Vec<u8>, WeaveError> {
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") && head.len() < MAX_HEAD {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| WeaveError::Transport(format!("read error: {e}")))?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..n]);
    }
    Ok(head)
}

/// Status and JSON body for one request head.
pub(crate) fn answer(runtime: &Runtime, head: &str) -> (u16, Value) {
    let Some((method, target)) = http::request_line(head) else {
        return (400, json!({"error": "malformed request"}));
    };
    if method != "GET" {
        return (405, json!({"error": format!("{method} not supported")}));
    }
    let Some(request) = http::parse_api(target) else {
        return (404, json!({"error": format!("no route for {target}")}));
    };
    debug!(?request, "api request");

    let value = match request {
        ApiRequest::Registry => match serde_json::to_value(runtime.registry_snapshot()) {
            Ok(value) => value,
            Err(e) => return (500, json!({"error": e.to_string()})),
        },
        ApiRequest::State { name } => {
            if runtime.get_service(&name).is_none() {
                return (404, json!({"error": format!("service {name} not found")}));
            }
            runtime.dispatch(Message::new(name, "broadcastState", Vec::new()))
        }
        ApiRequest::Invoke { name, method, args } => {
            runtime.dispatch(Message::new(name, method, args))
        }
    };
    (200, value)
}
