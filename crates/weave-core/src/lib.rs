//! `weave-core` – message routing and service lifecycle engine.
//!
//! A [`Runtime`] is one process context.  It owns the service [`Registry`],
//! the inter-process [`RoutingTable`], the [`ConnectionTable`] and the
//! package catalog used by [`Runtime::launch`].  Every call, publish and
//! remote forward flows through one recursive primitive, the router
//! ([`Runtime::dispatch`]).
//!
//! | module | role |
//! |---|---|
//! | [`service`] | [`Service`] record, [`ServiceBehavior`] contract, [`Invocation`] |
//! | [`methods`] | per-type method tables and the base methods every service answers |
//! | [`subscription`] | per-service notify list |
//! | [`registry`] | `fullname → service` store |
//! | [`routing`] | route entries and the default route |
//! | [`connection`] | connection records and transport handles |
//! | [`router`] | the dispatcher and the connection boundary |
//! | [`launch`] | declarative launch and reconciliation |
//! | [`catalog`] / [`factory`] | package metadata and service constructors |
//! | [`services`] | built-in service types |
//! | [`telemetry`] | `tracing` subscriber and optional OTLP export |

pub mod catalog;
pub mod connection;
pub mod connector;
pub mod factory;
pub mod launch;
pub mod methods;
pub mod registry;
pub mod router;
pub mod routing;
pub mod runtime;
pub mod service;
pub mod services;
pub mod subscription;
pub mod telemetry;

pub use catalog::{BuiltinCatalog, PackageCatalog};
pub use connection::{ConnectionTable, TransportHandle};
pub use connector::Connector;
pub use factory::{ServiceFactories, ServiceFactory};
pub use methods::{Handler, MethodTable};
pub use registry::Registry;
pub use routing::RoutingTable;
pub use runtime::{Runtime, RuntimeBuilder};
pub use service::{Invocation, Service, ServiceBehavior};
pub use subscription::NotifyList;
