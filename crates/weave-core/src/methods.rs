//! Method tables.
//!
//! Each service type registers its callable methods once, in a
//! `LazyLock<MethodTable<Self>>`, as `name → handler`.  The router looks a
//! method up in the type's table first and in [`BASE_METHODS`] second, so
//! every service answers the base methods below unless its type overrides
//! them.
//!
//! | method | args | result |
//! |---|---|---|
//! | `addListener` | topic, callbackName, callbackMethod? | the listener |
//! | `removeListener` | topic, callbackName, callbackMethod? | removed? |
//! | `getMethods` | prefixes? | sorted names |
//! | `applyConfig` | config | config |
//! | `applyConfigValue` | key, value | config |
//! | `getConfig` | | config |
//! | `getConfigSchema` | | JSON schema or `null` |
//! | `startService` / `stopService` | | ready flag |
//! | `broadcastState` | | snapshot |
//! | `getUptime` | | string |
//! | `getNotifyList` | | notify list |
//! | `isReady` | | bool |
//! | `getName` / `getId` / `getFullname` / `getTypeKey` | | string |
//! | `publishStatus` | status | status |
//! | `releaseService` | | released? |
//! | `setInstalled` | bool | bool |

use std::collections::BTreeMap;
use std::sync::LazyLock;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use weave_types::address::{callback_topic_name, promote};
use weave_types::{Status, StatusLevel, SubscriptionListener, WeaveError};

use crate::service::{Invocation, Service};

/// A method handler bound to a target of type `T`.
pub type Handler<T> = fn(&T, &Invocation<'_>) -> Result<Value, WeaveError>;

pub struct MethodTable<T: 'static> {
    entries: BTreeMap<&'static str, Handler<T>>,
}

impl<T: 'static> Default for MethodTable<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T: 'static> MethodTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration.  A later entry with the same name
    /// replaces the earlier one.
    pub fn with(mut self, name: &'static str, handler: Handler<T>) -> Self {
        self.entries.insert(name, handler);
        self
    }

    pub fn call(
        &self,
        target: &T,
        method: &str,
        inv: &Invocation<'_>,
    ) -> Option<Result<Value, WeaveError>> {
        self.entries.get(method).map(|handler| handler(target, inv))
    }

    pub fn contains(&self, method: &str) -> bool {
        self.entries.contains_key(method)
    }

    /// Sorted method names.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }
}

/// Serialize a handler result.
pub fn to_value<T: Serialize>(value: T) -> Result<Value, WeaveError> {
    Ok(serde_json::to_value(value)?)
}

/// `true` when `service` answers `method`, either through its type or the
/// base methods.
pub fn has_method(service: &Service, method: &str) -> bool {
    BASE_METHODS.contains(method) || service.behavior().method_names().contains(&method)
}

/// Methods every service answers.
pub static BASE_METHODS: LazyLock<MethodTable<Service>> = LazyLock::new(|| {
    MethodTable::<Service>::new()
        .with("addListener", add_listener)
        .with("removeListener", remove_listener)
        .with("getMethods", get_methods)
        .with("applyConfig", apply_config)
        .with("applyConfigValue", apply_config_value)
        .with("getConfig", |svc, _| to_value(svc.config()))
        .with("getConfigSchema", |svc, _| {
            Ok(svc.behavior().config_schema().unwrap_or(Value::Null))
        })
        .with("startService", |svc, inv| {
            svc.start(inv.runtime);
            Ok(Value::Bool(svc.is_ready()))
        })
        .with("stopService", |svc, inv| {
            svc.stop(inv.runtime);
            Ok(Value::Bool(svc.is_ready()))
        })
        .with("broadcastState", |svc, _| to_value(svc.snapshot()))
        .with("getUptime", |svc, _| Ok(Value::String(svc.uptime())))
        .with("getNotifyList", |svc, _| to_value(svc.notify_list()))
        .with("isReady", |svc, _| Ok(Value::Bool(svc.is_ready())))
        .with("getName", |svc, _| Ok(Value::String(svc.name().to_string())))
        .with("getId", |svc, _| Ok(Value::String(svc.id().to_string())))
        .with("getFullname", |svc, _| Ok(Value::String(svc.fullname().to_string())))
        .with("getTypeKey", |svc, _| Ok(Value::String(svc.type_key().to_string())))
        .with("publishStatus", publish_status)
        .with("releaseService", |svc, inv| {
            info!(service = %svc.fullname(), "release requested");
            Ok(Value::Bool(inv.runtime.release(svc.fullname())))
        })
        .with("setInstalled", |svc, inv| {
            let installed: bool = inv.arg(0)?;
            svc.set_installed(installed);
            Ok(Value::Bool(installed))
        })
});

fn listener_args(
    svc: &Service,
    inv: &Invocation<'_>,
) -> Result<(String, String, String), WeaveError> {
    let topic: String = inv.arg(0)?;
    let callback_name: String = inv.arg(1)?;
    let callback_method: Option<String> = inv.arg(2)?;
    let callback_name = promote(&callback_name, inv.runtime.id())?;
    let callback_method = callback_method
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| callback_topic_name(&topic));
    debug!(service = %svc.fullname(), %topic, %callback_name, %callback_method, "listener args");
    Ok((topic, callback_name, callback_method))
}

fn add_listener(svc: &Service, inv: &Invocation<'_>) -> Result<Value, WeaveError> {
    let (topic, name, method) = listener_args(svc, inv)?;
    to_value(svc.add_listener(SubscriptionListener::new(topic, name, method)))
}

fn remove_listener(svc: &Service, inv: &Invocation<'_>) -> Result<Value, WeaveError> {
    let (topic, name, method) = listener_args(svc, inv)?;
    Ok(Value::Bool(svc.remove_listener(&topic, &name, &method)))
}

fn get_methods(svc: &Service, inv: &Invocation<'_>) -> Result<Value, WeaveError> {
    let filters: Option<Vec<String>> = inv.arg(0)?;
    let mut names: Vec<&'static str> = svc.behavior().method_names();
    names.extend(BASE_METHODS.names());
    names.sort_unstable();
    names.dedup();
    let names: Vec<&str> = names
        .into_iter()
        .filter(|name| match &filters {
            Some(prefixes) if !prefixes.is_empty() => {
                prefixes.iter().any(|p| name.starts_with(p.as_str()))
            }
            _ => true,
        })
        .collect();
    to_value(names)
}

fn apply_config(svc: &Service, inv: &Invocation<'_>) -> Result<Value, WeaveError> {
    let config: Map<String, Value> = inv.arg(0)?;
    svc.apply_config(inv.runtime, config)?;
    to_value(svc.config())
}

fn apply_config_value(svc: &Service, inv: &Invocation<'_>) -> Result<Value, WeaveError> {
    let key: String = inv.arg(0)?;
    let value: Value = inv.arg(1)?;
    let mut config = svc.config();
    config.insert(key, value);
    svc.apply_config(inv.runtime, config)?;
    inv.invoke("broadcastState", Vec::new());
    to_value(svc.config())
}

fn publish_status(svc: &Service, inv: &Invocation<'_>) -> Result<Value, WeaveError> {
    let mut status: Status = inv.arg(0)?;
    status.name = Some(svc.fullname().to_string());
    match status.level {
        StatusLevel::Error => error!(service = %svc.fullname(), detail = %status.detail, "status"),
        StatusLevel::Warn => warn!(service = %svc.fullname(), detail = %status.detail, "status"),
        StatusLevel::Info => info!(service = %svc.fullname(), detail = %status.detail, "status"),
        StatusLevel::Debug => debug!(service = %svc.fullname(), detail = %status.detail, "status"),
    }
    to_value(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weave_types::Message;

    use crate::runtime::Runtime;

    #[test]
    fn table_lookup_and_names() {
        let table = MethodTable::<u32>::new()
            .with("double", |n, _| Ok(json!(n * 2)))
            .with("answer", |_, _| Ok(json!(42)));
        assert!(table.contains("double"));
        assert_eq!(table.names(), ["answer", "double"]);

        let runtime = Runtime::builder("P1").build();
        let svc = runtime.runtime_service().unwrap();
        let msg = Message::new("runtime@P1", "double", vec![]);
        let inv = Invocation::new(&runtime, &svc, &msg);
        assert_eq!(table.call(&21, "double", &inv).unwrap().unwrap(), json!(42));
        assert!(table.call(&21, "missing", &inv).is_none());
    }

    #[test]
    fn add_listener_defaults_callback_and_promotes_name() {
        let runtime = Runtime::builder("P1").build();
        let result = runtime.dispatch(Message::new(
            "runtime@P1",
            "addListener",
            vec![json!("getRegistry"), json!("ui")],
        ));
        assert_eq!(result["callbackName"], "ui@P1");
        assert_eq!(result["callbackMethod"], "onRegistry");
        assert_eq!(result["topicMethod"], "getRegistry");
    }

    #[test]
    fn get_methods_filters_by_prefix() {
        let runtime = Runtime::builder("P1").build();
        let all = runtime.dispatch(Message::new("runtime@P1", "getMethods", vec![]));
        let all: Vec<String> = serde_json::from_value(all).unwrap();
        assert!(all.contains(&"addListener".to_string()));
        assert!(all.contains(&"getRegistry".to_string()));

        let some = runtime.dispatch(Message::new(
            "runtime@P1",
            "getMethods",
            vec![json!(["getRoute", "isR"])],
        ));
        let some: Vec<String> = serde_json::from_value(some).unwrap();
        assert_eq!(some, ["getRouteTable", "isReady"]);
    }

    #[test]
    fn publish_status_fills_name() {
        let runtime = Runtime::builder("P1").build();
        let result = runtime.dispatch(Message::new(
            "runtime@P1",
            "publishStatus",
            vec![json!({"level": "warn", "detail": "low battery"})],
        ));
        assert_eq!(result["name"], "runtime@P1");
        assert_eq!(result["level"], "warn");
    }

    #[test]
    fn bad_argument_is_normalized_to_null() {
        let runtime = Runtime::builder("P1").build();
        let result = runtime.dispatch(Message::new(
            "runtime@P1",
            "setInstalled",
            vec![json!("not a bool")],
        ));
        assert_eq!(result, Value::Null);
    }
}
