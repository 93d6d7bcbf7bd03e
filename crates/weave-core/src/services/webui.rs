//! `WebUi` – local placeholder for a browser user interface.
//!
//! A browser holds no durable state, so the placeholder keeps the UI's
//! config and subscriptions.  When a `broadcastState` request is forwarded
//! to the browser it is rewritten to `onBroadcastState` carrying the
//! placeholder's own snapshot, so the page renders the state it is
//! configured with.

use std::any::Any;

use serde_json::{Map, Value, json};
use tracing::{debug, info};

use weave_types::Message;

use crate::runtime::Runtime;
use crate::service::{Service, ServiceBehavior};
use crate::services::proxy::await_client;

pub const TYPE_KEY: &str = "WebUi";

#[derive(Debug, Default)]
pub struct WebUi;

impl WebUi {
    pub fn new() -> Self {
        Self
    }
}

impl ServiceBehavior for WebUi {
    fn default_config(&self) -> Map<String, Value> {
        let mut config = Map::new();
        config.insert(
            "dashboards".to_string(),
            json!({"default": {"runtime": {"x": "0", "y": "0", "w": "4", "h": "3"}}}),
        );
        config
    }

    fn on_start(&self, runtime: &Runtime, service: &Service) {
        service.set_installed(true);
        info!(service = %service.fullname(), "ui waiting for browser");
        await_client(runtime, service);
    }

    fn send_remote(&self, runtime: &Runtime, service: &Service, mut msg: Message) -> Value {
        if msg.name == service.fullname() && msg.method == "broadcastState" {
            debug!(service = %service.fullname(), "sending placeholder state to ui");
            msg.method = "onBroadcastState".to_string();
            msg.data = vec![json!(service.snapshot())];
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
