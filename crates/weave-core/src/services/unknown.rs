//! `Unknown` – stand-in for a service whose type cannot be built here.
//!
//! Launching a package that is missing from the catalog, or whose type has
//! no registered constructor, yields an `Unknown` so the service still
//! takes part in the registry.  The requested type key is kept and shown
//! in its state.

use std::any::Any;
use std::sync::LazyLock;

use serde_json::{Map, Value};

use weave_types::WeaveError;

use crate::methods::MethodTable;
use crate::service::{Invocation, ServiceBehavior};

pub const TYPE_KEY: &str = "Unknown";

#[derive(Debug, Clone)]
pub struct Unknown {
    request_type_key: String,
}

impl Unknown {
    pub fn new(request_type_key: impl Into<String>) -> Self {
        Self {
            request_type_key: request_type_key.into(),
        }
    }

    pub fn request_type_key(&self) -> &str {
        &self.request_type_key
    }
}

static METHODS: LazyLock<MethodTable<Unknown>> = LazyLock::new(|| {
    MethodTable::<Unknown>::new().with("getRequestTypeKey", |unknown, _| {
        Ok(Value::String(unknown.request_type_key.clone()))
    })
});

impl ServiceBehavior for Unknown {
    fn call(&self, method: &str, inv: &Invocation<'_>) -> Option<Result<Value, WeaveError>> {
        METHODS.call(self, method, inv)
    }

    fn method_names(&self) -> Vec<&'static str> {
        METHODS.names()
    }

    fn snapshot_extra(&self) -> Map<String, Value> {
        let mut extra = Map::new();
        extra.insert(
            "requestTypeKey".to_string(),
            Value::String(self.request_type_key.clone()),
        );
        extra
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
