//! `Proxy` – local placeholder for a service hosted out of process.
//!
//! A package that runs on another platform (a Python node, a container) is
//! launched as a proxy named after its own process id, e.g. `pyvosk@pyvosk`.
//! At start the proxy registers a pending inbound connection for that id
//! with itself as gateway, so traffic for the id reaches
//! [`ServiceBehavior::send_remote`] here before the real process attaches.
//!
//! Subscription bookkeeping and state requests are answered locally; every
//! other method is forwarded over the connection once a client is attached.

use std::any::Any;
use std::sync::LazyLock;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use weave_types::{Direction, Message, WeaveError};

use crate::methods::MethodTable;
use crate::runtime::Runtime;
use crate::service::{Invocation, Service, ServiceBehavior};

pub const TYPE_KEY: &str = "Proxy";

/// Url recorded for a connection no client has attached to yet.
pub const PENDING_URL: &str = "waiting for client";

/// Methods a proxy answers itself instead of forwarding.
const INTERCEPTED: &[&str] = &[
    "addListener",
    "removeListener",
    "broadcastState",
    "onConnectionClosed",
];

#[derive(Debug, Default)]
pub struct Proxy;

impl Proxy {
    pub fn new() -> Self {
        Self
    }

    pub fn intercepts(method: &str) -> bool {
        INTERCEPTED.contains(&method)
    }
}

/// Register the pending inbound connection a placeholder waits on.
pub(crate) fn await_client(runtime: &Runtime, service: &Service) {
    if runtime.connections().contains_key(service.id()) {
        debug!(service = %service.fullname(), "connection already registered");
        return;
    }
    runtime.register_connection(
        service.fullname(),
        service.id(),
        PENDING_URL,
        Direction::Inbound,
        None,
    );
}

static METHODS: LazyLock<MethodTable<Proxy>> = LazyLock::new(|| {
    MethodTable::<Proxy>::new().with("onConnectionClosed", |_, inv| {
        warn!(service = %inv.service.fullname(), "client detached, waiting for reconnect");
        Ok(json!(inv.service.fullname()))
    })
});

impl ServiceBehavior for Proxy {
    fn call(&self, method: &str, inv: &Invocation<'_>) -> Option<Result<Value, WeaveError>> {
        METHODS.call(self, method, inv)
    }

    fn method_names(&self) -> Vec<&'static str> {
        METHODS.names()
    }

    fn on_start(&self, runtime: &Runtime, service: &Service) {
        info!(service = %service.fullname(), "proxy waiting for client");
        await_client(runtime, service);
    }

    fn send_remote(&self, runtime: &Runtime, service: &Service, msg: Message) -> Value {
        if msg.name == service.fullname() && Self::intercepts(&msg.method) {
            debug!(service = %service.fullname(), method = %msg.method, "answered by proxy");
            return runtime.invoke_local(service, msg);
        }
        runtime.send_remote(msg)
    }

    fn is_placeholder(&self) -> bool {
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_types::{ConnectionState, LaunchAction, LaunchDescription, Package, Platform};

    use crate::catalog::BuiltinCatalog;
    use crate::connection::TransportHandle;
    use std::sync::Arc;

    fn runtime_with_proxy() -> Arc<Runtime> {
        let mut catalog = BuiltinCatalog::new();
        catalog.insert(Package::native("pyvosk", "PyVosk").hosted_on(Platform::Python, TYPE_KEY));
        let runtime = Runtime::builder("P1").with_catalog(Arc::new(catalog)).build();
        let mut ld = LaunchDescription::new("proxy");
        ld.add_action(LaunchAction::new("pyvosk", "pyvosk"));
        runtime.launch(&ld);
        runtime
    }

    #[test]
    fn start_registers_pending_connection() {
        let runtime = runtime_with_proxy();
        let proxy = runtime.get_service("pyvosk@pyvosk").unwrap();
        assert!(proxy.behavior_as::<Proxy>().is_some());

        let conn = &runtime.connections()["pyvosk"];
        assert_eq!(conn.url, PENDING_URL);
        assert_eq!(conn.gateway, "pyvosk@pyvosk");
        assert!(runtime.transport("pyvosk").is_none());
        assert_eq!(runtime.get_gateway("pyvosk").unwrap().fullname(), "pyvosk@pyvosk");
    }

    #[test]
    fn intercepted_methods_run_locally() {
        let runtime = runtime_with_proxy();
        let snapshot = runtime.dispatch(Message::new("pyvosk@pyvosk", "broadcastState", vec![]));
        assert_eq!(snapshot["name"], "pyvosk");

        runtime.dispatch(Message::new(
            "pyvosk@pyvosk",
            "addListener",
            vec![json!("publishText"), json!("runtime")],
        ));
        let proxy = runtime.get_service("pyvosk@pyvosk").unwrap();
        assert_eq!(proxy.listeners("publishText")[0].callback_name, "runtime@P1");
    }

    #[test]
    fn other_methods_are_forwarded_once_attached() {
        let runtime = runtime_with_proxy();
        // Nothing attached: forwarded into the void.
        assert_eq!(
            runtime.dispatch(Message::new("pyvosk@pyvosk", "listen", vec![])),
            Value::Null
        );

        let (handle, mut rx) = TransportHandle::channel();
        runtime.register_connection("pyvosk@pyvosk", "pyvosk", "ws://py", Direction::Inbound, Some(handle));
        runtime.dispatch(Message::new("pyvosk@pyvosk", "listen", vec![json!("en")]));
        let msg = Message::from_json(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(msg.method, "listen");
        assert_eq!(msg.data, vec![json!("en")]);
    }

    #[test]
    fn closed_client_keeps_proxy() {
        let runtime = runtime_with_proxy();
        let (handle, _rx) = TransportHandle::channel();
        runtime.register_connection("pyvosk@pyvosk", "pyvosk", "ws://py", Direction::Inbound, Some(handle));

        runtime.connection_closed("pyvosk");

        assert!(runtime.get_service("pyvosk@pyvosk").is_some());
        assert_eq!(runtime.connections()["pyvosk"].state, ConnectionState::Disconnected);
        assert!(runtime.transport("pyvosk").is_none());
    }
}
