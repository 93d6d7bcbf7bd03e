//! Declarative launch descriptions.
//!
//! A [`LaunchDescription`] is an ordered list of [`LaunchAction`]s, each
//! naming a package, a service name and optional initial config and
//! listeners.  Launching the same description twice is idempotent: existing
//! services are reconfigured in place.
//!
//! ```json
//! {
//!   "description": "simple clock",
//!   "version": "0.0.1",
//!   "actions": [
//!     {"package": "clock", "name": "clock01", "config": {"intervalMs": 1000, "start": true}}
//!   ]
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::WeaveError;
use crate::service::SubscriptionListener;

/// Published method → ordered listeners.
pub type ListenerMap = BTreeMap<String, Vec<SubscriptionListener>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchAction {
    pub package: String,
    /// Short name, or an explicit `name@id` fullname.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listeners: Option<ListenerMap>,
}

impl LaunchAction {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
            config: None,
            listeners: None,
        }
    }

    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_listeners(mut self, listeners: ListenerMap) -> Self {
        self.listeners = Some(listeners);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchDescription {
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub actions: Vec<LaunchAction>,
}

fn default_description() -> String {
    "Default description".to_string()
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for LaunchDescription {
    fn default() -> Self {
        Self {
            description: default_description(),
            version: default_version(),
            actions: Vec::new(),
        }
    }
}

impl LaunchDescription {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn add_action(&mut self, action: LaunchAction) {
        self.actions.push(action);
    }

    pub fn from_json(text: &str) -> Result<Self, WeaveError> {
        Ok(serde_json::from_str(text)?)
    }
}
