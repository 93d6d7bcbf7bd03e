//! Built-in service types.
//!
//! | type key | module | role |
//! |---|---|---|
//! | `Runtime` | [`runtime`] | process runtime: registry, routes, connections, launch |
//! | `Clock` | [`clock`] | publishes the epoch on an interval |
//! | `Proxy` | [`proxy`] | local placeholder for an out-of-process service |
//! | `WebUi` | [`webui`] | local placeholder for a browser user interface |
//! | `Unknown` | [`unknown`] | stands in for a type that could not be resolved |
//! | (any) | [`remote`] | mirror of a service announced by a peer |

pub mod clock;
pub mod proxy;
pub mod remote;
pub mod runtime;
pub mod unknown;
pub mod webui;
