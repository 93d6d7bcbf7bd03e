//! The [`Message`] envelope.
//!
//! Every call, publish and remote forward is a `Message`: a target fullname,
//! a method name and an ordered list of positional JSON arguments.  On the
//! wire it is a single JSON object per transport frame:
//!
//! ```json
//! {"name":"clock01@P1","method":"startClock","data":[500],"sender":"runtime@P2"}
//! ```
//!
//! `gatewayId` and `gateway` are never set by the originator.  The
//! receiving hop stamps them before local dispatch so that routes can be
//! learned from traffic.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::WeaveError;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Correlation id, carried but never interpreted by routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,
    /// Free-form message type, carried but never interpreted by routing.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Target service, fullname or local short name.
    pub name: String,
    pub method: String,
    /// Positional arguments.  `null` on the wire decodes as no arguments.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Vec<Value>,
    /// Fullname of the originating service.
    #[serde(default)]
    pub sender: Option<String>,
    /// Id of the connection the message arrived on (stamped by the hop).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_id: Option<String>,
    /// Fullname of the local service owning that connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
}

impl Message {
    pub fn new(name: impl Into<String>, method: impl Into<String>, data: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            method: method.into(),
            data,
            ..Self::default()
        }
    }

    /// Builder-style sender assignment.
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Stamp the hop details of the connection this message arrived on.
    pub fn stamp_gateway(&mut self, gateway_id: impl Into<String>, gateway: impl Into<String>) {
        self.gateway_id = Some(gateway_id.into());
        self.gateway = Some(gateway.into());
    }

    /// Encode as one transport frame.
    pub fn to_json(&self) -> Result<String, WeaveError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode one transport frame.
    pub fn from_json(text: &str) -> Result<Self, WeaveError> {
        Ok(serde_json::from_str(text)?)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_format_uses_camel_case() {
        let mut msg = Message::new("clock01@P1", "startClock", vec![json!(500)])
            .with_sender("runtime@P2");
        msg.stamp_gateway("P2", "runtime@P1");

        let value: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["gatewayId"], "P2");
        assert_eq!(value["gateway"], "runtime@P1");
        assert_eq!(value["data"], json!([500]));
        assert!(value.get("msgId").is_none(), "unset optional fields are omitted");
    }

    #[test]
    fn null_data_decodes_as_no_arguments() {
        let msg = Message::from_json(r#"{"name":"runtime","method":"getId","data":null}"#).unwrap();
        assert!(msg.data.is_empty());
        assert!(msg.sender.is_none());
    }

    #[test]
    fn missing_data_decodes_as_no_arguments() {
        let msg = Message::from_json(r#"{"name":"runtime@P1","method":"getRegistry"}"#).unwrap();
        assert!(msg.data.is_empty());
    }

    #[test]
    fn frame_without_method_is_rejected() {
        let result = Message::from_json(r#"{"name":"runtime@P1"}"#);
        assert!(matches!(result, Err(WeaveError::Serialization(_))));
    }

    #[test]
    fn type_field_maps_to_kind() {
        let msg = Message::from_json(
            r#"{"name":"a@P1","method":"m","type":"service","msgId":"42"}"#,
        )
        .unwrap();
        assert_eq!(msg.kind.as_deref(), Some("service"));
        assert_eq!(msg.msg_id.as_deref(), Some("42"));
    }
}
