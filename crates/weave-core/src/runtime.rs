//! [`Runtime`] – one process context.
//!
//! The runtime owns the registry, routing table and connection table of a
//! process, and is itself registered as the service `runtime@<id>`.  It is
//! built explicitly with [`Runtime::builder`] and shared as `Arc<Runtime>`;
//! several runtimes can live in one binary.
//!
//! # Dispatch gate
//!
//! Every operation that reads or mutates the shared tables runs under a
//! process-wide *reentrant* gate.  A whole recursive dispatch (forwarding,
//! fan-out, self-invocation) completes on one thread before another thread
//! may start one, while recursion on the holding thread is allowed.  The
//! inner table locks are only held for single operations and never across a
//! dispatch.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use weave_types::address::{self, id_of, promote};
use weave_types::{
    Connection, ConnectionState, Direction, HostData, Message, ProcessData, RouteEntry,
    ServiceIdentity, ServiceSnapshot, WeaveError,
};

use crate::catalog::{BuiltinCatalog, PackageCatalog};
use crate::connection::{ConnectionTable, TransportHandle};
use crate::connector::Connector;
use crate::factory::ServiceFactories;
use crate::methods::has_method;
use crate::registry::Registry;
use crate::routing::RoutingTable;
use crate::service::{Service, ServiceBehavior};
use crate::services::remote::Remote;
use crate::services::runtime::{self as runtime_service, RuntimeService};

/// Short name of the runtime service in every process.
pub const RUNTIME_NAME: &str = "runtime";

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

pub struct RuntimeBuilder {
    id: String,
    hostname: Option<String>,
    catalog: Option<Arc<dyn PackageCatalog>>,
    factories: ServiceFactories,
}

impl RuntimeBuilder {
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<dyn PackageCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Register an additional service type.
    pub fn with_factory<F>(mut self, type_key: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ServiceIdentity) -> Box<dyn ServiceBehavior> + Send + Sync + 'static,
    {
        self.factories.register(type_key, factory);
        self
    }

    /// Build the runtime and register its own `runtime@<id>` service.
    pub fn build(self) -> Arc<Runtime> {
        let hostname = self
            .hostname
            .or_else(|| std::env::var("HOSTNAME").ok())
            .unwrap_or_else(|| "localhost".to_string());
        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(BuiltinCatalog::new()));
        let id = self.id;

        let runtime = Arc::new_cyclic(|me| Runtime {
            me: me.clone(),
            fullname: format!("{RUNTIME_NAME}{}{id}", address::SEPARATOR),
            id,
            hostname,
            gate: ReentrantMutex::new(()),
            registry: Mutex::new(Registry::new()),
            routes: Mutex::new(RoutingTable::new()),
            connections: Mutex::new(ConnectionTable::new()),
            factories: self.factories,
            catalog,
            connector: OnceLock::new(),
            processes: Mutex::new(BTreeMap::new()),
            hosts: Mutex::new(BTreeMap::new()),
            retained: Mutex::new(BTreeMap::new()),
        });
        runtime.bootstrap();
        runtime
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Runtime
// ────────────────────────────────────────────────────────────────────────────

pub struct Runtime {
    me: Weak<Runtime>,
    id: String,
    fullname: String,
    hostname: String,
    gate: ReentrantMutex<()>,
    registry: Mutex<Registry>,
    routes: Mutex<RoutingTable>,
    connections: Mutex<ConnectionTable>,
    factories: ServiceFactories,
    catalog: Arc<dyn PackageCatalog>,
    connector: OnceLock<Arc<dyn Connector>>,
    processes: Mutex<BTreeMap<String, ProcessData>>,
    hosts: Mutex<BTreeMap<String, HostData>>,
    retained: Mutex<BTreeMap<String, Message>>,
}

impl Runtime {
    /// Start building the runtime of process `id`.
    pub fn builder(id: impl Into<String>) -> RuntimeBuilder {
        RuntimeBuilder {
            id: id.into(),
            hostname: None,
            catalog: None,
            factories: ServiceFactories::builtin(),
        }
    }

    fn bootstrap(&self) {
        let identity = ServiceIdentity {
            name: RUNTIME_NAME.to_string(),
            id: self.id.clone(),
            type_key: runtime_service::TYPE_KEY.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            hostname: Some(self.hostname.clone()),
        };
        let service = Arc::new(Service::new(identity, Box::new(RuntimeService::new())));
        service.set_config_value("id", Value::String(self.id.clone()));
        self.registry
            .lock()
            .register(self.fullname.clone(), Arc::clone(&service));
        service.start(self);
        self.register_process(ProcessData::local(&self.id, &self.hostname));
        self.register_host(HostData::local(&self.hostname));
        info!(id = %self.id, hostname = %self.hostname, "runtime ready");
    }

    // -- identity -----------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.id
    }

    /// `runtime@<id>`.
    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Non-owning handle for background tasks.
    pub fn weak(&self) -> Weak<Runtime> {
        self.me.clone()
    }

    pub fn catalog(&self) -> &dyn PackageCatalog {
        self.catalog.as_ref()
    }

    pub fn factories(&self) -> &ServiceFactories {
        &self.factories
    }

    /// Enter the dispatch gate.  Reentrant on the holding thread.
    pub(crate) fn enter(&self) -> ReentrantMutexGuard<'_, ()> {
        self.gate.lock()
    }

    // -- registry -----------------------------------------------------------

    pub fn runtime_service(&self) -> Option<Arc<Service>> {
        self.registry.lock().get(&self.fullname)
    }

    /// Look up a service; short names are promoted to local fullnames.
    pub fn get_service(&self, name: &str) -> Option<Arc<Service>> {
        let fullname = promote(name, &self.id).ok()?;
        self.registry.lock().get(&fullname)
    }

    pub fn service_names(&self) -> Vec<String> {
        self.registry.lock().names()
    }

    pub fn local_service_names(&self) -> Vec<String> {
        self.registry
            .lock()
            .with_id(&self.id)
            .iter()
            .map(|s| s.fullname().to_string())
            .collect()
    }

    pub fn services(&self) -> Vec<Arc<Service>> {
        self.registry.lock().list()
    }

    /// Public snapshot of the whole registry.
    pub fn registry_snapshot(&self) -> BTreeMap<String, ServiceSnapshot> {
        self.registry.lock().snapshot()
    }

    /// Register `service` under its fullname.
    ///
    /// A local service that is already registered is kept and returned
    /// instead; a peer re-announcing our own services must not replace
    /// them.  Registry-changed notifications (`registered`, `getRegistry`)
    /// are published only when the key is new, so that two processes
    /// mirroring each other's registries settle instead of echoing.
    pub fn register(&self, service: Arc<Service>) -> Arc<Service> {
        let _gate = self.enter();
        let key = service.fullname().to_string();
        let is_new = {
            let mut registry = self.registry.lock();
            if service.id() == self.id {
                if let Some(existing) = registry.get(&key) {
                    debug!(service = %key, "already registered");
                    return existing;
                }
            }
            registry.register(key.clone(), Arc::clone(&service)).is_none()
        };
        if is_new {
            info!(service = %key, type_key = %service.type_key(), "registered");
            let snapshot = service.snapshot();
            match serde_json::to_value(&snapshot) {
                Ok(value) => {
                    self.invoke("registered", vec![value]);
                }
                Err(e) => error!(service = %key, error = %e, "snapshot serialization failed"),
            }
            self.invoke("getRegistry", Vec::new());
        } else {
            debug!(service = %key, "mirror updated");
        }
        service
    }

    /// Register a service announced by a peer.  Snapshots claiming the
    /// local process id are never mirrored.
    pub fn register_snapshot(&self, snapshot: ServiceSnapshot) -> Option<Arc<Service>> {
        let key = snapshot.key();
        if snapshot.id == self.id {
            let existing = self.get_service(&key);
            if existing.is_none() {
                warn!(service = %key, "ignoring peer snapshot claiming the local id");
            }
            return existing;
        }
        let behavior = Remote::new(snapshot.extra.clone());
        let service = Arc::new(Service::from_snapshot(&snapshot, Box::new(behavior)));
        Some(self.register(service))
    }

    /// Stop and unregister a service.
    ///
    /// Refuses the runtime itself, and services of other processes unless
    /// they are local placeholders.
    pub fn release(&self, name: &str) -> bool {
        let _gate = self.enter();
        let Some(service) = self.get_service(name) else {
            error!(service = %name, "release: service not found");
            return false;
        };
        if service.fullname() == self.fullname {
            error!("cannot release the runtime");
            return false;
        }
        if service.id() != self.id && !service.behavior().is_placeholder() {
            error!(service = %service.fullname(), "will not release a remote service");
            return false;
        }
        service.stop(self);
        self.registry.lock().remove(service.fullname());
        self.forget_retained(|sender| sender == service.fullname());
        info!(service = %service.fullname(), "released");
        self.invoke("released", vec![Value::String(service.fullname().to_string())]);
        self.invoke("getRegistry", Vec::new());
        true
    }

    /// Stop every local service, last registered first.  The registry is
    /// left intact.
    pub fn shutdown(&self) {
        let _gate = self.enter();
        let services = self.services();
        for service in services.iter().rev() {
            if service.fullname() != self.fullname && service.is_ready() {
                service.stop(self);
            }
        }
        info!(id = %self.id, "runtime stopped services");
    }

    // -- processes and hosts ------------------------------------------------

    pub fn local_process(&self) -> ProcessData {
        ProcessData::local(&self.id, &self.hostname)
    }

    pub fn local_host(&self) -> HostData {
        HostData::local(&self.hostname)
    }

    pub fn register_process(&self, process: ProcessData) {
        let key = format!(
            "{}{}{}",
            process.id,
            address::SEPARATOR,
            process.hostname.as_deref().unwrap_or_default()
        );
        info!(process = %key, "registering process");
        self.processes.lock().insert(key, process);
    }

    pub fn register_host(&self, host: HostData) {
        info!(host = %host.hostname, "registering host");
        self.hosts.lock().insert(host.hostname.clone(), host);
    }

    pub fn processes(&self) -> BTreeMap<String, ProcessData> {
        self.processes.lock().clone()
    }

    pub fn hosts(&self) -> BTreeMap<String, HostData> {
        self.hosts.lock().clone()
    }

    // -- routes -------------------------------------------------------------

    pub fn add_route(&self, remote_id: &str, gateway_id: &str, gateway: &str) -> bool {
        let _gate = self.enter();
        self.routes.lock().add_route(remote_id, gateway_id, gateway)
    }

    pub fn remove_route(&self, remote_id: &str) -> Option<RouteEntry> {
        let _gate = self.enter();
        self.routes.lock().remove_route(remote_id)
    }

    pub fn route_table(&self) -> RoutingTable {
        self.routes.lock().clone()
    }

    /// Connection id used to reach `remote_id`.
    pub fn route_id(&self, remote_id: &str) -> Option<String> {
        self.routes.lock().route_id(remote_id)
    }

    /// The local service acting as gateway for `remote_id`.
    pub fn get_gateway(&self, remote_id: &str) -> Option<Arc<Service>> {
        let gateway = self.routes.lock().gateway(remote_id)?;
        self.get_service(&gateway)
    }

    // -- connections --------------------------------------------------------

    /// Record a connection, store its transport handle and make the peer
    /// reachable through `gateway`.  A `None` handle registers a pending
    /// connection.
    pub fn register_connection(
        &self,
        gateway: &str,
        gateway_id: &str,
        url: &str,
        direction: Direction,
        handle: Option<TransportHandle>,
    ) {
        let _gate = self.enter();
        info!(gateway_id, url, ?direction, pending = handle.is_none(), "registering connection");
        self.routes.lock().add_route(gateway_id, gateway_id, gateway);
        self.connections
            .lock()
            .register(Connection::new(gateway_id, gateway, url, direction), handle);
    }

    pub fn update_connection(&self, gateway_id: &str, state: ConnectionState) -> bool {
        let _gate = self.enter();
        let updated = self.connections.lock().update_state(gateway_id, state);
        if !updated {
            warn!(gateway_id, "update_connection: unknown connection");
        }
        updated
    }

    /// Tear down a connection: handle, record and route, then release every
    /// service owned by the vanished process id.
    ///
    /// The local id is refused: its services are not owned by any peer.
    pub fn remove_connection(&self, gateway_id: &str) -> bool {
        let _gate = self.enter();
        if gateway_id == self.id {
            error!(gateway_id, "remove_connection: refusing to remove the local process");
            return false;
        }
        if self.connections.lock().remove(gateway_id).is_none() {
            error!(gateway_id, "remove_connection: connection not found");
            return false;
        }
        self.routes.lock().remove_route(gateway_id);

        let orphans = self.registry.lock().with_id(gateway_id);
        for service in orphans {
            if service.fullname() == self.fullname {
                continue;
            }
            service.stop(self);
            self.registry.lock().remove(service.fullname());
            info!(service = %service.fullname(), gateway_id, "released with its connection");
        }
        self.forget_retained(|sender| id_of(sender) == Some(gateway_id));

        self.invoke("getRegistry", Vec::new());
        self.invoke("broadcastState", Vec::new());
        true
    }

    /// The transport of `gateway_id` closed.
    ///
    /// A connection backing a local placeholder goes back to waiting for
    /// its client: it is marked disconnected, its handle dropped and the
    /// placeholder told through `onConnectionClosed`.  Any other connection
    /// is removed.
    pub fn connection_closed(&self, gateway_id: &str) {
        let _gate = self.enter();
        let placeholders: Vec<Arc<Service>> = self
            .registry
            .lock()
            .with_id(gateway_id)
            .into_iter()
            .filter(|s| s.behavior().is_placeholder())
            .collect();

        if placeholders.is_empty() {
            self.remove_connection(gateway_id);
            return;
        }

        warn!(gateway_id, "connection closed, waiting for client");
        {
            let mut connections = self.connections.lock();
            connections.update_state(gateway_id, ConnectionState::Disconnected);
            connections.detach(gateway_id);
        }
        for service in placeholders {
            if has_method(&service, "onConnectionClosed") {
                self.invoke_on(&service, "onConnectionClosed", Vec::new());
            }
        }
        self.invoke("broadcastState", Vec::new());
    }

    pub fn connections(&self) -> BTreeMap<String, Connection> {
        self.connections.lock().records().clone()
    }

    pub fn transport(&self, gateway_id: &str) -> Option<TransportHandle> {
        self.connections.lock().handle(gateway_id)
    }

    // -- outbound connections -----------------------------------------------

    /// Install the transport used by [`Runtime::connect`].  Only the first
    /// call has an effect.
    pub fn set_connector(&self, connector: Arc<dyn Connector>) -> bool {
        self.connector.set(connector).is_ok()
    }

    /// Connect to the process at `url` in the background.
    ///
    /// Requires an installed connector and a running tokio runtime.  The
    /// outcome is logged; routed traffic starts once the handshake is done.
    pub fn connect(&self, url: &str) -> Result<(), WeaveError> {
        let connector = self
            .connector
            .get()
            .cloned()
            .ok_or_else(|| WeaveError::Transport("no connector installed".to_string()))?;
        let runtime = self
            .me
            .upgrade()
            .ok_or_else(|| WeaveError::Transport("runtime is shutting down".to_string()))?;
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| WeaveError::Transport(e.to_string()))?;
        let url = url.to_string();
        info!(%url, "connecting");
        handle.spawn(async move {
            match connector.connect(runtime, url.clone()).await {
                Ok(remote_id) => info!(%url, %remote_id, "connected"),
                Err(e) => error!(%url, error = %e, "connect failed"),
            }
        });
        Ok(())
    }

    /// `true` when some connection was opened to `url`.
    pub fn is_connected_to(&self, url: &str) -> bool {
        self.connections
            .lock()
            .records()
            .values()
            .any(|c| c.url == url && c.state == ConnectionState::Connected)
    }

    /// Messages the initiator of a connection sends once the remote id is
    /// known: subscribe to the remote registry, request it, then announce
    /// this process, every registered service and this host.
    pub fn handshake_messages(&self, remote_id: &str) -> Vec<Message> {
        let remote_runtime = format!("{RUNTIME_NAME}{}{remote_id}", address::SEPARATOR);
        let msg = |method: &str, data: Vec<Value>| {
            Message::new(remote_runtime.as_str(), method, data).with_sender(self.fullname.as_str())
        };

        let mut messages = vec![
            msg("addListener", vec![json!("getRegistry"), json!(self.fullname)]),
            msg("getRegistry", Vec::new()),
            msg("registerProcess", vec![json!(self.local_process())]),
        ];
        for snapshot in self.registry_snapshot().into_values() {
            messages.push(msg("register", vec![json!(snapshot)]));
        }
        messages.push(msg("registerHost", vec![json!(self.local_host())]));
        messages
    }

    // -- retained messages --------------------------------------------------

    pub(crate) fn retain(&self, msg: &Message) {
        if let Some(sender) = &msg.sender {
            let key = format!("{sender}.{}", msg.method);
            self.retained.lock().insert(key, msg.clone());
        }
    }

    fn forget_retained(&self, from: impl Fn(&str) -> bool) {
        self.retained
            .lock()
            .retain(|_, msg| !msg.sender.as_deref().is_some_and(&from));
    }

    /// Last message received from `sender` carrying `method`.
    pub fn retained(&self, sender: &str, method: &str) -> Option<Message> {
        self.retained.lock().get(&format!("{sender}.{method}")).cloned()
    }

    /// Latest known state of a service: the first argument of its last
    /// `onBroadcastState`, else its registry snapshot, else `null`.
    pub fn latest_service_data(&self, name: &str) -> Value {
        let Ok(fullname) = promote(name, &self.id) else {
            return Value::Null;
        };
        if let Some(msg) = self.retained(&fullname, "onBroadcastState") {
            if let Some(first) = msg.data.into_iter().next() {
                return first;
            }
        }
        self.get_service(&fullname)
            .and_then(|s| serde_json::to_value(s.snapshot()).ok())
            .unwrap_or(Value::Null)
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("id", &self.id)
            .field("hostname", &self.hostname)
            .finish()
    }
}
