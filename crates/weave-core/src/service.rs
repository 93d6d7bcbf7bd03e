//! [`Service`] – the unit of addressing, configuration and lifecycle.
//!
//! One concrete record carries what every service has in common (identity,
//! config, notify list, lifecycle flags).  What a particular type *does* is
//! supplied by a boxed [`ServiceBehavior`].
//!
//! Behaviors take `&self` and keep mutable state behind their own locks.  A
//! handler may re-enter the router (self-invoke, publish, forward) on the
//! same thread, so no lock may be held across a dispatch.

use std::any::Any;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::info;

use weave_types::{
    ListenerMap, Message, ServiceIdentity, ServiceSnapshot, SubscriptionListener, WeaveError,
};

use crate::runtime::Runtime;
use crate::subscription::NotifyList;

// ────────────────────────────────────────────────────────────────────────────
// Behavior contract
// ────────────────────────────────────────────────────────────────────────────

/// Type-specific part of a service.
///
/// Only [`ServiceBehavior::as_any`] is required.  A type exposes its methods
/// through [`ServiceBehavior::call`], usually by delegating to a static
/// [`MethodTable`](crate::methods::MethodTable).
pub trait ServiceBehavior: Send + Sync + 'static {
    /// Invoke `method`.  `None` means this type has no such method and the
    /// base methods are consulted next.
    fn call(&self, _method: &str, _inv: &Invocation<'_>) -> Option<Result<Value, WeaveError>> {
        None
    }

    /// Names answered by [`ServiceBehavior::call`].
    fn method_names(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Initial config of a freshly constructed instance.
    fn default_config(&self) -> Map<String, Value> {
        Map::new()
    }

    /// JSON schema of the typed config, if the type has one.
    fn config_schema(&self) -> Option<Value> {
        None
    }

    /// Validate a config about to replace the current one.
    fn validate_config(&self, _config: &Map<String, Value>) -> Result<(), WeaveError> {
        Ok(())
    }

    /// Called after a new config has been stored.
    fn on_config(&self, _runtime: &Runtime, _service: &Service) {}

    /// Called when the service transitions to ready.
    fn on_start(&self, _runtime: &Runtime, _service: &Service) {}

    /// Called when the service transitions out of ready.
    fn on_stop(&self, _runtime: &Runtime, _service: &Service) {}

    /// Public type-specific fields merged into the snapshot.
    fn snapshot_extra(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Outbound hook used when this service is the gateway for a remote
    /// target.
    fn send_remote(&self, runtime: &Runtime, _service: &Service, msg: Message) -> Value {
        runtime.send_remote(msg)
    }

    /// `true` for local placeholders of services living elsewhere.  Such
    /// services may be released even though their id is not the local one.
    fn is_placeholder(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
}

// ────────────────────────────────────────────────────────────────────────────
// Invocation context
// ────────────────────────────────────────────────────────────────────────────

/// Everything a method handler can see: the process, the target service and
/// the message being delivered.
pub struct Invocation<'a> {
    pub runtime: &'a Runtime,
    pub service: &'a Service,
    pub message: &'a Message,
}

impl<'a> Invocation<'a> {
    pub fn new(runtime: &'a Runtime, service: &'a Service, message: &'a Message) -> Self {
        Self {
            runtime,
            service,
            message,
        }
    }

    /// Deserialize positional argument `index`.  A missing argument is read
    /// as `null`, so `Option<T>` parameters are optional.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, WeaveError> {
        let value = self.message.data.get(index).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| WeaveError::InvalidArgument {
            method: self.message.method.clone(),
            index,
            reason: e.to_string(),
        })
    }

    pub fn sender(&self) -> Option<&str> {
        self.message.sender.as_deref()
    }

    /// Invoke `method` on the current service through the router, so its
    /// listeners are notified.
    pub fn invoke(&self, method: &str, data: Vec<Value>) -> Value {
        self.runtime.invoke_on(self.service, method, data)
    }

    /// Send `method` to `name` from the current service.
    pub fn send(&self, name: &str, method: &str, data: Vec<Value>) -> Value {
        let msg = Message::new(name, method, data).with_sender(self.service.fullname());
        self.runtime.route(self.service, msg)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Service record
// ────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct ServiceState {
    config: Map<String, Value>,
    notify: NotifyList,
    ready: bool,
    installed: bool,
    start_time: Option<DateTime<Utc>>,
}

pub struct Service {
    identity: ServiceIdentity,
    fullname: String,
    state: Mutex<ServiceState>,
    behavior: Box<dyn ServiceBehavior>,
}

impl Service {
    pub fn new(identity: ServiceIdentity, behavior: Box<dyn ServiceBehavior>) -> Self {
        let state = ServiceState {
            config: behavior.default_config(),
            ..ServiceState::default()
        };
        Self {
            fullname: identity.fullname(),
            identity,
            state: Mutex::new(state),
            behavior,
        }
    }

    /// Rebuild a service from a peer's snapshot, keeping its public state.
    pub fn from_snapshot(snapshot: &ServiceSnapshot, behavior: Box<dyn ServiceBehavior>) -> Self {
        let identity = ServiceIdentity {
            name: snapshot.name.clone(),
            id: snapshot.id.clone(),
            type_key: snapshot.type_key.clone().unwrap_or_default(),
            version: snapshot.version.clone().unwrap_or_default(),
            hostname: snapshot.hostname.clone(),
        };
        let state = ServiceState {
            config: snapshot.config.clone(),
            notify: NotifyList::from(snapshot.notify_list.clone()),
            ready: snapshot.ready,
            installed: snapshot.installed,
            start_time: snapshot
                .start_time
                .and_then(DateTime::<Utc>::from_timestamp_millis),
        };
        Self {
            fullname: identity.fullname(),
            identity,
            state: Mutex::new(state),
            behavior,
        }
    }

    // -- identity -----------------------------------------------------------

    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn id(&self) -> &str {
        &self.identity.id
    }

    pub fn type_key(&self) -> &str {
        &self.identity.type_key
    }

    pub fn fullname(&self) -> &str {
        &self.fullname
    }

    pub fn behavior(&self) -> &dyn ServiceBehavior {
        self.behavior.as_ref()
    }

    /// Downcast the behavior to a concrete type.
    pub fn behavior_as<T: ServiceBehavior>(&self) -> Option<&T> {
        self.behavior.as_any().downcast_ref::<T>()
    }

    // -- config -------------------------------------------------------------

    pub fn config(&self) -> Map<String, Value> {
        self.state.lock().config.clone()
    }

    /// Parse the current config into a typed view.
    pub fn typed_config<T: DeserializeOwned>(&self) -> Result<T, WeaveError> {
        let config = self.config();
        serde_json::from_value(Value::Object(config))
            .map_err(|e| WeaveError::Config(format!("{}: {e}", self.fullname)))
    }

    /// Replace (never merge) the config, then let the type react.
    pub fn apply_config(
        &self,
        runtime: &Runtime,
        config: Map<String, Value>,
    ) -> Result<(), WeaveError> {
        self.behavior.validate_config(&config)?;
        info!(service = %self.fullname, "applying config");
        self.state.lock().config = config;
        self.behavior.on_config(runtime, self);
        Ok(())
    }

    /// Set one key without notifying the type.
    pub fn set_config_value(&self, key: &str, value: Value) {
        self.state.lock().config.insert(key.to_string(), value);
    }

    // -- subscriptions ------------------------------------------------------

    pub fn add_listener(&self, listener: SubscriptionListener) -> SubscriptionListener {
        self.state.lock().notify.add(listener)
    }

    pub fn remove_listener(&self, topic: &str, callback_name: &str, callback_method: &str) -> bool {
        self.state
            .lock()
            .notify
            .remove(topic, callback_name, callback_method)
    }

    pub fn listeners(&self, topic: &str) -> Vec<SubscriptionListener> {
        self.state.lock().notify.listeners(topic)
    }

    pub fn notify_list(&self) -> ListenerMap {
        self.state.lock().notify.to_map()
    }

    pub fn replace_notify_list(&self, listeners: ListenerMap) {
        self.state.lock().notify.replace(listeners);
    }

    // -- lifecycle ----------------------------------------------------------

    /// Mark ready and stamp the start time.  Repeated starts only refresh
    /// the start time.
    pub fn start(&self, runtime: &Runtime) {
        let was_ready = {
            let mut state = self.state.lock();
            let was_ready = state.ready;
            state.ready = true;
            state.start_time = Some(Utc::now());
            was_ready
        };
        if !was_ready {
            info!(service = %self.fullname, type_key = %self.identity.type_key, "service started");
            self.behavior.on_start(runtime, self);
        }
    }

    /// Clear ready and the start time.  Stopping a stopped service is a
    /// no-op.
    pub fn stop(&self, runtime: &Runtime) {
        let was_ready = {
            let mut state = self.state.lock();
            let was_ready = state.ready;
            state.ready = false;
            state.start_time = None;
            was_ready
        };
        if was_ready {
            info!(service = %self.fullname, "service stopped");
            self.behavior.on_stop(runtime, self);
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    pub fn is_installed(&self) -> bool {
        self.state.lock().installed
    }

    pub fn set_installed(&self, installed: bool) {
        self.state.lock().installed = installed;
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.state.lock().start_time
    }

    /// Human-readable uptime.
    pub fn uptime(&self) -> String {
        match self.start_time() {
            Some(started) => {
                let ms = (Utc::now() - started).num_milliseconds();
                format!("Uptime: {} seconds", ms as f64 / 1000.0)
            }
            None => "Service not started".to_string(),
        }
    }

    /// Public state without transport handles or timers.
    pub fn snapshot(&self) -> ServiceSnapshot {
        let (config, notify_list, ready, installed, start_time) = {
            let state = self.state.lock();
            (
                state.config.clone(),
                state.notify.to_map(),
                state.ready,
                state.installed,
                state.start_time.map(|t| t.timestamp_millis()),
            )
        };
        ServiceSnapshot {
            config,
            fullname: self.fullname.clone(),
            hostname: self.identity.hostname.clone(),
            id: self.identity.id.clone(),
            installed,
            name: self.identity.name.clone(),
            notify_list,
            ready,
            type_key: Some(self.identity.type_key.clone()),
            version: Some(self.identity.version.clone()),
            start_time,
            extra: self.behavior.snapshot_extra(),
        }
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("fullname", &self.fullname)
            .field("type_key", &self.identity.type_key)
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Plain;

    impl ServiceBehavior for Plain {
        fn default_config(&self) -> Map<String, Value> {
            let mut m = Map::new();
            m.insert("rate".to_string(), json!(10));
            m
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn plain() -> Service {
        let id = ServiceIdentity::new("plain", "P1", "Plain", "0.0.1").unwrap();
        Service::new(id, Box::new(Plain))
    }

    #[test]
    fn new_service_uses_default_config() {
        let svc = plain();
        assert_eq!(svc.fullname(), "plain@P1");
        assert_eq!(svc.config()["rate"], 10);
        assert!(!svc.is_ready());
        assert!(svc.start_time().is_none());
        assert_eq!(svc.uptime(), "Service not started");
    }

    #[test]
    fn apply_config_replaces() {
        let runtime = Runtime::builder("P1").build();
        let svc = plain();
        let mut cfg = Map::new();
        cfg.insert("other".to_string(), json!(true));
        svc.apply_config(&runtime, cfg).unwrap();
        let config = svc.config();
        assert!(config.get("rate").is_none(), "config must be replaced, not merged");
        assert_eq!(config["other"], true);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let runtime = Runtime::builder("P1").build();
        let svc = plain();
        svc.start(&runtime);
        let first = svc.start_time();
        assert!(svc.is_ready());
        svc.start(&runtime);
        assert!(svc.is_ready());
        assert!(svc.start_time() >= first);

        svc.stop(&runtime);
        svc.stop(&runtime);
        assert!(!svc.is_ready());
        assert!(svc.start_time().is_none());
    }

    #[test]
    fn snapshot_round_trips_public_state() {
        let runtime = Runtime::builder("P1").build();
        let svc = plain();
        svc.add_listener(SubscriptionListener::new("ping", "other@P1", "onPing"));
        svc.start(&runtime);

        let snap = svc.snapshot();
        assert_eq!(snap.fullname, "plain@P1");
        assert!(snap.ready);
        assert!(snap.start_time.is_some());

        let mirror = Service::from_snapshot(&snap, Box::new(Plain));
        assert_eq!(mirror.fullname(), "plain@P1");
        assert!(mirror.is_ready());
        assert_eq!(mirror.listeners("ping").len(), 1);
    }

    #[test]
    fn downcast_behavior() {
        let svc = plain();
        assert!(svc.behavior_as::<Plain>().is_some());
    }
}
