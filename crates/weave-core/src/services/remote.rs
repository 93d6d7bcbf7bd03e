//! `Remote` – local mirror of a service living in another process.
//!
//! Mirrors carry no methods.  Messages addressed to them never reach this
//! behavior: the router forwards anything for a foreign id to a gateway.
//! Fields of the announced snapshot this process does not model are kept
//! verbatim so they survive re-publication.

use std::any::Any;

use serde_json::{Map, Value};

use crate::service::ServiceBehavior;

#[derive(Debug, Clone, Default)]
pub struct Remote {
    extra: Map<String, Value>,
}

impl Remote {
    pub fn new(extra: Map<String, Value>) -> Self {
        Self { extra }
    }
}

impl ServiceBehavior for Remote {
    fn snapshot_extra(&self) -> Map<String, Value> {
        self.extra.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;
    use weave_types::ServiceSnapshot;

    use crate::runtime::Runtime;

    #[test]
    fn extra_fields_survive_mirroring() {
        let runtime = Runtime::builder("P1").build();
        let snapshot: ServiceSnapshot = serde_json::from_value(json!({
            "name": "ui",
            "id": "ui",
            "typeKey": "WebUi",
            "theme": "dark"
        }))
        .unwrap();
        let mirror = runtime.register_snapshot(snapshot).unwrap();
        assert!(mirror.behavior_as::<Remote>().is_some());
        let republished = serde_json::to_value(mirror.snapshot()).unwrap();
        assert_eq!(republished["theme"], "dark");
        assert!(Arc::ptr_eq(&mirror, &runtime.get_service("ui@ui").unwrap()));
    }
}
