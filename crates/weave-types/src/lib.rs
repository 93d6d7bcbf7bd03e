//! `weave-types` – shared vocabulary of the Weave service runtime.
//!
//! Every other crate speaks in these types: the `name@id` addressing
//! scheme, the [`Message`] envelope that travels between services and
//! processes, the serializable records describing services, routes and
//! connections, and the declarative [`LaunchDescription`].
//!
//! # Modules
//!
//! - [`address`] – compose and split `name@id` fullnames.
//! - [`message`] – the JSON envelope exchanged over every transport.
//! - [`service`] – service identity, subscription listeners, snapshots and
//!   status records.
//! - [`route`] – route entries and connection records.
//! - [`launch`] – launch actions and descriptions.
//! - [`package`] – package metadata consumed by the launch mechanism.
//! - [`process`] – process and host descriptors exchanged on connect.
//! - [`error`] – the [`WeaveError`] taxonomy.

pub mod address;
pub mod error;
pub mod launch;
pub mod message;
pub mod package;
pub mod process;
pub mod route;
pub mod service;

pub use address::AddressError;
pub use error::WeaveError;
pub use launch::{LaunchAction, LaunchDescription, ListenerMap};
pub use message::Message;
pub use package::{Package, Platform};
pub use process::{HostData, ProcessData};
pub use route::{Connection, ConnectionState, Direction, RouteEntry};
pub use service::{ServiceIdentity, ServiceSnapshot, Status, StatusLevel, SubscriptionListener};
