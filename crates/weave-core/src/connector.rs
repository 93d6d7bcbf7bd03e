//! Outbound connection collaborator.
//!
//! The core does not open sockets.  A transport crate installs a
//! [`Connector`] with [`Runtime::set_connector`](crate::Runtime::set_connector);
//! the runtime's `connect` method and its `connect` config list use it.

use std::sync::Arc;

use async_trait::async_trait;

use weave_types::WeaveError;

use crate::runtime::Runtime;

#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect `runtime` to the process listening at `url`, perform the
    /// bootstrap handshake and return the remote process id.
    async fn connect(&self, runtime: Arc<Runtime>, url: String) -> Result<String, WeaveError>;
}
