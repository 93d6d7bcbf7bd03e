use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::AddressError;

/// Error taxonomy spanning addressing, dispatch, routing, transport and
/// launch resolution.
///
/// None of these is fatal to a process.  The router logs them and answers
/// `null`; the transport layer logs and keeps the connection; the launch
/// orchestrator substitutes a placeholder service.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WeaveError {
    #[error("Addressing Error: {0}")]
    Address(String),

    #[error("Service Not Found: {0}")]
    ServiceNotFound(String),

    #[error("Method Not Found: {service}.{method}")]
    MethodNotFound { service: String, method: String },

    #[error("Invalid Argument {index} for {method}: {reason}")]
    InvalidArgument {
        method: String,
        index: usize,
        reason: String,
    },

    #[error("Invocation Failed: {0}")]
    Invocation(String),

    #[error("No Route to process {0}")]
    NoRoute(String),

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Unknown Package: {0}")]
    UnknownPackage(String),

    #[error("Config Error: {0}")]
    Config(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}

impl From<AddressError> for WeaveError {
    fn from(err: AddressError) -> Self {
        WeaveError::Address(err.to_string())
    }
}

impl From<serde_json::Error> for WeaveError {
    fn from(err: serde_json::Error) -> Self {
        WeaveError::Serialization(err.to_string())
    }
}
