//! `Clock` – publishes the current epoch on an interval.
//!
//! The timer is a tokio interval task that dispatches `onTick` to the
//! clock through the router, so ticks enter the same serialized dispatch
//! path as any inbound message.  `onTick` invokes `publishEpoch`, whose
//! result (milliseconds since the Unix epoch) fans out to its listeners.
//!
//! ```json
//! {"package": "clock", "name": "clock01", "config": {"intervalMs": 1000, "start": true}}
//! ```

use std::any::Any;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use weave_types::{Message, WeaveError};

use crate::methods::MethodTable;
use crate::runtime::Runtime;
use crate::service::{Invocation, Service, ServiceBehavior};

pub const TYPE_KEY: &str = "Clock";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClockConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Run the timer while the service is started.
    #[serde(default)]
    pub start: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_interval_ms() -> u64 {
    1000
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            start: false,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Clock {
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.timer.lock().as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Spawn the interval task.  Needs a running tokio runtime; without one
    /// the clock stays configured but silent.
    fn start_timer(&self, runtime: &Runtime, service: &Service, interval_ms: u64) {
        let mut timer = self.timer.lock();
        if timer.as_ref().is_some_and(|t| !t.is_finished()) {
            warn!(service = %service.fullname(), "clock already running");
            return;
        }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(service = %service.fullname(), "no async runtime, clock timer not started");
                return;
            }
        };
        let period = Duration::from_millis(interval_ms.max(1));
        let weak = runtime.weak();
        let fullname = service.fullname().to_string();
        info!(service = %fullname, interval_ms, "starting clock");
        *timer = Some(handle.spawn(async move {
            let mut ticks = tokio::time::interval(period);
            // The first tick of a tokio interval completes immediately.
            ticks.tick().await;
            loop {
                ticks.tick().await;
                let Some(runtime) = weak.upgrade() else {
                    break;
                };
                let msg = Message::new(fullname.as_str(), "onTick", Vec::new())
                    .with_sender(fullname.as_str());
                runtime.dispatch(msg);
            }
        }));
    }

    fn stop_timer(&self, service: &Service) {
        match self.timer.lock().take() {
            Some(timer) => {
                info!(service = %service.fullname(), "stopping clock");
                timer.abort();
            }
            None => debug!(service = %service.fullname(), "clock not running"),
        }
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
    }
}

static METHODS: LazyLock<MethodTable<Clock>> = LazyLock::new(|| {
    MethodTable::<Clock>::new()
        .with("publishEpoch", |_, inv| {
            let epoch = Utc::now().timestamp_millis();
            debug!(service = %inv.service.fullname(), epoch, "epoch");
            Ok(json!(epoch))
        })
        .with("onTick", |_, inv| Ok(inv.invoke("publishEpoch", Vec::new())))
        .with("startClock", |clock, inv| {
            let interval_ms: Option<u64> = inv.arg(0)?;
            let mut config: ClockConfig = inv.service.typed_config()?;
            config.start = true;
            if let Some(ms) = interval_ms.filter(|ms| *ms > 0) {
                config.interval_ms = ms;
            }
            inv.service.set_config_value("start", json!(true));
            inv.service
                .set_config_value("intervalMs", json!(config.interval_ms));
            clock.start_timer(inv.runtime, inv.service, config.interval_ms);
            Ok(Value::Bool(clock.is_running()))
        })
        .with("stopClock", |clock, inv| {
            inv.service.set_config_value("start", json!(false));
            clock.stop_timer(inv.service);
            Ok(Value::Bool(false))
        })
});

impl ServiceBehavior for Clock {
    fn call(&self, method: &str, inv: &Invocation<'_>) -> Option<Result<Value, WeaveError>> {
        METHODS.call(self, method, inv)
    }

    fn method_names(&self) -> Vec<&'static str> {
        METHODS.names()
    }

    fn default_config(&self) -> Map<String, Value> {
        match serde_json::to_value(ClockConfig::default()) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    fn config_schema(&self) -> Option<Value> {
        serde_json::to_value(schemars::schema_for!(ClockConfig)).ok()
    }

    fn validate_config(&self, config: &Map<String, Value>) -> Result<(), WeaveError> {
        serde_json::from_value::<ClockConfig>(Value::Object(config.clone()))
            .map(|_| ())
            .map_err(|e| WeaveError::Config(e.to_string()))
    }

    fn on_config(&self, runtime: &Runtime, service: &Service) {
        if !service.is_ready() {
            return;
        }
        let Ok(config) = service.typed_config::<ClockConfig>() else {
            return;
        };
        // A new interval takes effect on restart.
        self.stop_timer(service);
        if config.start {
            self.start_timer(runtime, service, config.interval_ms);
        }
    }

    fn on_start(&self, runtime: &Runtime, service: &Service) {
        match service.typed_config::<ClockConfig>() {
            Ok(config) if config.start => self.start_timer(runtime, service, config.interval_ms),
            Ok(_) => {}
            Err(e) => warn!(service = %service.fullname(), error = %e, "clock config unreadable"),
        }
    }

    fn on_stop(&self, _runtime: &Runtime, service: &Service) {
        self.stop_timer(service);
    }

    fn snapshot_extra(&self) -> Map<String, Value> {
        let mut extra = Map::new();
        extra.insert("running".to_string(), Value::Bool(self.is_running()));
        extra
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use weave_types::{Direction, LaunchAction, LaunchDescription, SubscriptionListener};

    use crate::connection::TransportHandle;

    #[test]
    fn publish_epoch_returns_millis() {
        let runtime = Runtime::builder("P1").build();
        runtime.launch(&{
            let mut ld = LaunchDescription::new("clock");
            ld.add_action(LaunchAction::new("clock", "clock01"));
            ld
        });
        let before = Utc::now().timestamp_millis();
        let epoch = runtime.dispatch(Message::new("clock01", "publishEpoch", vec![]));
        assert!(epoch.as_i64().unwrap() >= before);
    }

    #[test]
    fn config_defaults() {
        let clock = Clock::new();
        let cfg = clock.default_config();
        assert_eq!(cfg["intervalMs"], 1000);
        assert_eq!(cfg["start"], false);
        assert!(clock.validate_config(&cfg).is_ok());

        let mut bad = Map::new();
        bad.insert("intervalMs".into(), json!("fast"));
        assert!(clock.validate_config(&bad).is_err());
    }

    #[test]
    fn start_clock_without_async_runtime_updates_config() {
        let runtime = Runtime::builder("P1").build();
        let mut ld = LaunchDescription::new("clock");
        ld.add_action(LaunchAction::new("clock", "clock01"));
        runtime.launch(&ld);

        let running = runtime.dispatch(Message::new("clock01", "startClock", vec![json!(250)]));
        assert_eq!(running, json!(false));
        let config = runtime.dispatch(Message::new("clock01", "getConfig", vec![]));
        assert_eq!(config["start"], true);
        assert_eq!(config["intervalMs"], 250);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn ticks_publish_to_listeners() -> Result<(), Box<dyn std::error::Error>> {
        let runtime = Runtime::builder("P1").build();
        let (handle, mut rx) = TransportHandle::channel();
        runtime.register_connection("runtime@P1", "P2", "ws://p2", Direction::Inbound, Some(handle));

        let mut ld = LaunchDescription::new("clock");
        let mut cfg = Map::new();
        cfg.insert("intervalMs".into(), json!(20));
        cfg.insert("start".into(), json!(true));
        ld.add_action(LaunchAction::new("clock", "clock01").with_config(cfg));
        runtime.launch(&ld);

        let clock = runtime.get_service("clock01").ok_or("clock missing")?;
        clock.add_listener(SubscriptionListener::new("publishEpoch", "ui@P2", "onEpoch"));
        assert!(clock.behavior_as::<Clock>().ok_or("not a clock")?.is_running());

        tokio::time::sleep(Duration::from_millis(150)).await;
        runtime.dispatch(Message::new("clock01", "stopClock", vec![]));
        assert!(!clock.behavior_as::<Clock>().ok_or("not a clock")?.is_running());

        let mut epochs = 0;
        while let Ok(frame) = rx.try_recv() {
            let msg = Message::from_json(&frame)?;
            if msg.method == "onEpoch" {
                assert_eq!(msg.name, "ui@P2");
                assert!(msg.data[0].is_i64());
                epochs += 1;
            }
        }
        assert!(epochs >= 2, "only {epochs} ticks published");
        Ok(())
    }
}
