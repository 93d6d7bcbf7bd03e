//! Serializable service records: identity, subscription listeners, public
//! snapshots and status reports.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::address::{self, AddressError};

// ────────────────────────────────────────────────────────────────────────────
// Identity
// ────────────────────────────────────────────────────────────────────────────

/// Who a service is.  `name@id` is its unique key inside a process registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceIdentity {
    pub name: String,
    /// Owning process id.
    pub id: String,
    pub type_key: String,
    pub version: String,
    #[serde(default)]
    pub hostname: Option<String>,
}

impl ServiceIdentity {
    pub fn new(
        name: impl Into<String>,
        id: impl Into<String>,
        type_key: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self, AddressError> {
        let name = name.into();
        if name.is_empty() {
            return Err(AddressError::EmptyName);
        }
        Ok(Self {
            name,
            id: id.into(),
            type_key: type_key.into(),
            version: version.into(),
            hostname: None,
        })
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn fullname(&self) -> String {
        format!("{}{}{}", self.name, address::SEPARATOR, self.id)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Subscriptions
// ────────────────────────────────────────────────────────────────────────────

/// One subscriber of a published method.
///
/// Unique per `(topic_method, callback_name, callback_method)` within a
/// notify list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionListener {
    #[serde(default)]
    pub topic_method: String,
    pub callback_name: String,
    pub callback_method: String,
}

impl SubscriptionListener {
    pub fn new(
        topic_method: impl Into<String>,
        callback_name: impl Into<String>,
        callback_method: impl Into<String>,
    ) -> Self {
        Self {
            topic_method: topic_method.into(),
            callback_name: callback_name.into(),
            callback_method: callback_method.into(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Snapshot
// ────────────────────────────────────────────────────────────────────────────

/// Public, transport-free state of a service.
///
/// Exchanged by `register`, returned by `broadcastState`, and used to build
/// mirror entries for services living in other processes.  `start_time` is
/// milliseconds since the Unix epoch.  Type-specific public fields land in
/// `extra`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSnapshot {
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub hostname: Option<String>,
    pub id: String,
    #[serde(default)]
    pub installed: bool,
    pub name: String,
    #[serde(default)]
    pub notify_list: BTreeMap<String, Vec<SubscriptionListener>>,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub type_key: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServiceSnapshot {
    /// `name@id`, derived from the parts when the `fullname` field is blank.
    pub fn key(&self) -> String {
        if self.fullname.is_empty() {
            format!("{}{}{}", self.name, address::SEPARATOR, self.id)
        } else {
            self.fullname.clone()
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Status
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// A human-readable status report published by a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub level: StatusLevel,
    pub detail: String,
    /// Fullname of the reporting service, filled in on publish.
    #[serde(default)]
    pub name: Option<String>,
}

impl Status {
    pub fn new(level: StatusLevel, detail: impl Into<String>) -> Self {
        Self {
            level,
            detail: detail.into(),
            name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_fullname() {
        let id = ServiceIdentity::new("clock01", "P1", "Clock", "0.0.1").unwrap();
        assert_eq!(id.fullname(), "clock01@P1");
        assert!(ServiceIdentity::new("", "P1", "Clock", "0.0.1").is_err());
    }

    #[test]
    fn snapshot_keeps_unknown_fields() {
        let raw = json!({
            "name": "cam",
            "id": "P2",
            "typeKey": "OakD",
            "ready": true,
            "notifyList": {
                "publishImage": [
                    {"topicMethod": "publishImage", "callbackName": "ui@P1", "callbackMethod": "onImage"}
                ]
            },
            "fps": 30
        });
        let snap: ServiceSnapshot = serde_json::from_value(raw).unwrap();
        assert_eq!(snap.key(), "cam@P2");
        assert!(snap.ready);
        assert_eq!(snap.notify_list["publishImage"].len(), 1);
        assert_eq!(snap.extra["fps"], 30);

        let back = serde_json::to_value(&snap).unwrap();
        assert_eq!(back["fps"], 30);
        assert_eq!(back["typeKey"], "OakD");
    }

    #[test]
    fn listener_topic_defaults_to_empty() {
        let l: SubscriptionListener =
            serde_json::from_value(json!({"callbackName": "a@P1", "callbackMethod": "onX"}))
                .unwrap();
        assert!(l.topic_method.is_empty());
    }

    #[test]
    fn status_level_lowercase() {
        let s: Status = serde_json::from_value(json!({"level": "warn", "detail": "low battery"}))
            .unwrap();
        assert_eq!(s.level, StatusLevel::Warn);
        assert!(s.name.is_none());
    }
}
