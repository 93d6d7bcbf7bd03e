//! `weave-gateway` – WebSocket transport and HTTP method API for a
//! [`Runtime`](weave_core::Runtime).
//!
//! One listening port serves both:
//!
//! 1. **WebSocket** upgrades on any path.  `?id=<gateway id>` names the
//!    connecting process; without it a fresh UUID is used.  Every text
//!    frame is an envelope handed to `Runtime::handle_inbound`.
//!
//! 2. **HTTP** `GET /api/v1/services/...` requests, dispatched as messages
//!    and answered with the JSON result.  `GET
//!    /api/v1/services/runtime/getId` is the first step of the connect
//!    handshake.
//!
//! [`WsConnector`] is the outbound side: install it with
//! `Runtime::set_connector` and `Runtime::connect(url)` opens connections
//! to other processes.

pub mod bridge;
pub mod client;
pub mod http;
pub mod server;

pub use client::WsConnector;
pub use server::{DEFAULT_PORT, GatewayServer};
