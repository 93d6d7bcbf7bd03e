//! The `Runtime` service type: the process runtime exposed as a service.
//!
//! Peers talk to a process through `runtime@<id>`: the connect handshake
//! calls `addListener`, `getRegistry`, `registerProcess`, `register` and
//! `registerHost` on it, and registry changes are published through its
//! `registered`, `released` and `getRegistry` methods.

use std::any::Any;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::warn;

use weave_types::{
    ConnectionState, HostData, LaunchDescription, ProcessData, ServiceSnapshot, WeaveError,
};

use crate::methods::{MethodTable, to_value};
use crate::runtime::Runtime;
use crate::service::{Invocation, Service, ServiceBehavior};

pub const TYPE_KEY: &str = "Runtime";

/// Typed view of the runtime service config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Process id this runtime was started with.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Port of the gateway server.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Processes to connect to, as `ws://host:port` URLs.
    #[serde(default)]
    pub connect: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    3001
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            id: None,
            log_level: default_log_level(),
            port: default_port(),
            connect: Vec::new(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct RuntimeService;

impl RuntimeService {
    pub fn new() -> Self {
        Self
    }

    /// Open every configured connection that is not already up.
    fn connect_configured(&self, runtime: &Runtime, service: &Service) {
        let config: RuntimeConfig = match service.typed_config() {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "runtime config unreadable");
                return;
            }
        };
        for url in config.connect {
            if runtime.is_connected_to(&url) {
                continue;
            }
            if let Err(e) = runtime.connect(&url) {
                warn!(%url, error = %e, "cannot connect");
            }
        }
    }
}

static METHODS: LazyLock<MethodTable<RuntimeService>> = LazyLock::new(|| {
    MethodTable::<RuntimeService>::new()
        .with("getId", |_, inv| Ok(Value::String(inv.runtime.id().to_string())))
        .with("getHostname", |_, inv| {
            Ok(Value::String(inv.runtime.hostname().to_string()))
        })
        .with("register", |_, inv| {
            let snapshot: ServiceSnapshot = inv.arg(0)?;
            match inv.runtime.register_snapshot(snapshot) {
                Some(service) => to_value(service.snapshot()),
                None => Ok(Value::Null),
            }
        })
        .with("registered", |_, inv| inv.arg::<Value>(0))
        .with("released", |_, inv| inv.arg::<Value>(0))
        .with("registerProcess", |_, inv| {
            let process: ProcessData = inv.arg(0)?;
            inv.runtime.register_process(process.clone());
            to_value(process)
        })
        .with("registerHost", |_, inv| {
            let host: HostData = inv.arg(0)?;
            inv.runtime.register_host(host.clone());
            to_value(host)
        })
        .with("getRegistry", |_, inv| to_value(inv.runtime.registry_snapshot()))
        .with("onRegistry", |_, inv| {
            let registry: BTreeMap<String, ServiceSnapshot> = inv.arg(0)?;
            let mut mirrored = 0;
            for snapshot in registry.into_values() {
                if inv.runtime.register_snapshot(snapshot).is_some() {
                    mirrored += 1;
                }
            }
            Ok(json!(mirrored))
        })
        .with("getServiceNames", |_, inv| to_value(inv.runtime.service_names()))
        .with("getLocalServiceNames", |_, inv| {
            to_value(inv.runtime.local_service_names())
        })
        .with("getService", |_, inv| {
            let name: String = inv.arg(0)?;
            match inv.runtime.get_service(&name) {
                Some(service) => to_value(service.snapshot()),
                None => Ok(Value::Null),
            }
        })
        .with("release", |_, inv| {
            let name: String = inv.arg(0)?;
            Ok(Value::Bool(inv.runtime.release(&name)))
        })
        .with("addRoute", |_, inv| {
            let remote_id: String = inv.arg(0)?;
            let gateway_id: String = inv.arg(1)?;
            let gateway: String = inv.arg(2)?;
            Ok(Value::Bool(inv.runtime.add_route(&remote_id, &gateway_id, &gateway)))
        })
        .with("removeRoute", |_, inv| {
            let remote_id: String = inv.arg(0)?;
            to_value(inv.runtime.remove_route(&remote_id))
        })
        .with("getRouteTable", |_, inv| {
            let table = inv.runtime.route_table();
            Ok(json!({
                "routes": table.entries(),
                "defaultRoute": table.default_route(),
            }))
        })
        .with("getConnections", |_, inv| to_value(inv.runtime.connections()))
        .with("updateConnection", |_, inv| {
            let gateway_id: String = inv.arg(0)?;
            let state: ConnectionState = inv.arg(1)?;
            Ok(Value::Bool(inv.runtime.update_connection(&gateway_id, state)))
        })
        .with("removeConnection", |_, inv| {
            let gateway_id: String = inv.arg(0)?;
            Ok(Value::Bool(inv.runtime.remove_connection(&gateway_id)))
        })
        .with("getHosts", |_, inv| to_value(inv.runtime.hosts()))
        .with("getProcesses", |_, inv| to_value(inv.runtime.processes()))
        .with("getPackages", |_, inv| to_value(inv.runtime.catalog().packages()))
        .with("connect", |_, inv| {
            let url: String = inv.arg(0)?;
            inv.runtime.connect(&url)?;
            Ok(Value::String(url))
        })
        .with("launch", |_, inv| {
            let description: LaunchDescription = inv.arg(0)?;
            to_value(inv.runtime.launch(&description))
        })
        .with("startServiceType", |_, inv| {
            let name: String = inv.arg(0)?;
            let package: String = inv.arg(1)?;
            match inv.runtime.start_service_type(&name, &package) {
                Some(service) => to_value(service.snapshot()),
                None => Ok(Value::Null),
            }
        })
        .with("saveAll", |_, inv| {
            let path: Option<PathBuf> = inv.arg(0)?;
            let description = match path {
                Some(path) => inv.runtime.save_all_to(&path)?,
                None => inv.runtime.save_all(),
            };
            to_value(description)
        })
        .with("getLatestServiceData", |_, inv| {
            let name: String = inv.arg(0)?;
            Ok(inv.runtime.latest_service_data(&name))
        })
});

impl ServiceBehavior for RuntimeService {
    fn call(&self, method: &str, inv: &Invocation<'_>) -> Option<Result<Value, WeaveError>> {
        METHODS.call(self, method, inv)
    }

    fn method_names(&self) -> Vec<&'static str> {
        METHODS.names()
    }

    fn default_config(&self) -> Map<String, Value> {
        match serde_json::to_value(RuntimeConfig::default()) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    fn config_schema(&self) -> Option<Value> {
        serde_json::to_value(schemars::schema_for!(RuntimeConfig)).ok()
    }

    fn validate_config(&self, config: &Map<String, Value>) -> Result<(), WeaveError> {
        serde_json::from_value::<RuntimeConfig>(Value::Object(config.clone()))
            .map(|_| ())
            .map_err(|e| WeaveError::Config(e.to_string()))
    }

    fn on_config(&self, runtime: &Runtime, service: &Service) {
        if service.is_ready() {
            self.connect_configured(runtime, service);
        }
    }

    fn on_start(&self, runtime: &Runtime, service: &Service) {
        self.connect_configured(runtime, service);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_types::Message;

    fn call(runtime: &Runtime, method: &str, data: Vec<Value>) -> Value {
        runtime.dispatch(Message::new(runtime.fullname(), method, data))
    }

    #[test]
    fn get_id_and_registry() {
        let runtime = Runtime::builder("P1").build();
        assert_eq!(call(&runtime, "getId", vec![]), json!("P1"));
        let registry = call(&runtime, "getRegistry", vec![]);
        assert_eq!(registry["runtime@P1"]["typeKey"], "Runtime");
        assert_eq!(registry["runtime@P1"]["config"]["port"], 3001);
    }

    #[test]
    fn on_registry_mirrors_remote_entries_only() {
        let runtime = Runtime::builder("P1").build();
        let peer = json!({
            "runtime@P2": {"name": "runtime", "id": "P2", "typeKey": "Runtime"},
            "clock01@P2": {"name": "clock01", "id": "P2", "typeKey": "Clock"},
            "ghost@P1": {"name": "ghost", "id": "P1", "typeKey": "Clock"}
        });
        assert_eq!(call(&runtime, "onRegistry", vec![peer]), json!(2));
        let names = call(&runtime, "getServiceNames", vec![]);
        assert_eq!(names, json!(["clock01@P2", "runtime@P1", "runtime@P2"]));
        assert_eq!(call(&runtime, "getLocalServiceNames", vec![]), json!(["runtime@P1"]));
    }

    #[test]
    fn register_process_and_host() {
        let runtime = Runtime::builder("P1").with_hostname("a").build();
        call(&runtime, "registerProcess", vec![json!({"id": "P2", "hostname": "b"})]);
        call(&runtime, "registerHost", vec![json!({"hostname": "b"})]);
        let processes = call(&runtime, "getProcesses", vec![]);
        assert!(processes.get("P2@b").is_some());
        let hosts = call(&runtime, "getHosts", vec![]);
        assert!(hosts.get("b").is_some());
    }

    #[test]
    fn route_methods() {
        let runtime = Runtime::builder("P1").build();
        assert_eq!(
            call(&runtime, "addRoute", vec![json!("P2"), json!("P2"), json!("runtime@P1")]),
            json!(true)
        );
        let table = call(&runtime, "getRouteTable", vec![]);
        assert_eq!(table["routes"]["P2"]["gatewayId"], "P2");
        assert_eq!(table["defaultRoute"]["remoteId"], "P2");

        let removed = call(&runtime, "removeRoute", vec![json!("P2")]);
        assert_eq!(removed["remoteId"], "P2");
    }

    #[test]
    fn invalid_config_is_rejected() {
        let runtime = Runtime::builder("P1").build();
        let result = call(&runtime, "applyConfig", vec![json!({"port": "not a port"})]);
        assert_eq!(result, Value::Null);
        assert_eq!(call(&runtime, "getConfig", vec![])["port"], 3001);
    }

    #[test]
    fn config_schema_lists_fields() {
        let runtime = Runtime::builder("P1").build();
        let schema = call(&runtime, "getConfigSchema", vec![]);
        assert!(schema["properties"].get("connect").is_some());
    }

    #[test]
    fn registry_changes_are_published() {
        let runtime = Runtime::builder("P1").build();
        let (handle, mut rx) = crate::connection::TransportHandle::channel();
        runtime.register_connection(
            "runtime@P1",
            "P2",
            "ws://p2",
            weave_types::Direction::Inbound,
            Some(handle),
        );
        call(
            &runtime,
            "addListener",
            vec![json!("getRegistry"), json!("runtime@P2")],
        );
        runtime.register_snapshot(ServiceSnapshot {
            name: "cam".into(),
            id: "P3".into(),
            ..ServiceSnapshot::default()
        });
        let frame = rx.try_recv().unwrap();
        let msg = Message::from_json(&frame).unwrap();
        assert_eq!(msg.name, "runtime@P2");
        assert_eq!(msg.method, "onRegistry");
        assert!(msg.data[0].get("cam@P3").is_some());
    }
}
