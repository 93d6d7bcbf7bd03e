//! [`RoutingTable`] – how to reach other processes.
//!
//! One [`RouteEntry`] per remote process id, plus a default route used for
//! ids with no entry of their own.
//!
//! * [`RoutingTable::add_route`] is first-writer-wins for the entry, but the
//!   default route always moves to the most recently *added* entry.
//! * [`RoutingTable::remove_route`] leaves the default route alone, even when
//!   it points at the removed entry.

use std::collections::BTreeMap;

use tracing::{error, info};

use weave_types::RouteEntry;

#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    routes: BTreeMap<String, RouteEntry>,
    default_route: Option<RouteEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record how to reach `remote_id`.  Returns `true` when a new entry
    /// was inserted.
    pub fn add_route(&mut self, remote_id: &str, gateway_id: &str, gateway: &str) -> bool {
        if remote_id.is_empty() || gateway_id.is_empty() || gateway.is_empty() {
            error!(remote_id, gateway_id, gateway, "add_route rejected: missing parameter");
            return false;
        }
        if self.routes.contains_key(remote_id) {
            return false;
        }
        info!(remote_id, gateway_id, gateway, "new route");
        let entry = RouteEntry::new(remote_id, gateway_id, gateway);
        self.default_route = Some(entry.clone());
        self.routes.insert(remote_id.to_string(), entry);
        true
    }

    pub fn remove_route(&mut self, remote_id: &str) -> Option<RouteEntry> {
        info!(remote_id, "remove route");
        self.routes.remove(remote_id)
    }

    /// The entry for `remote_id`, or the default route.
    pub fn resolve(&self, remote_id: &str) -> Option<&RouteEntry> {
        self.routes.get(remote_id).or(self.default_route.as_ref())
    }

    /// Fullname of the local service acting as gateway for `remote_id`.
    pub fn gateway(&self, remote_id: &str) -> Option<String> {
        self.resolve(remote_id).map(|e| e.gateway.clone())
    }

    /// Connection id used to reach `remote_id`.
    pub fn route_id(&self, remote_id: &str) -> Option<String> {
        self.resolve(remote_id).map(|e| e.gateway_id.clone())
    }

    pub fn get(&self, remote_id: &str) -> Option<&RouteEntry> {
        self.routes.get(remote_id)
    }

    pub fn default_route(&self) -> Option<&RouteEntry> {
        self.default_route.as_ref()
    }

    pub fn entries(&self) -> &BTreeMap<String, RouteEntry> {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
