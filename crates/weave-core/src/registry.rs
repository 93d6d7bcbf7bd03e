//! [`Registry`] – the per-process `fullname → service` store.
//!
//! Holds local services and mirrors of services living in connected
//! processes.  Keys are always fullnames; callers promote short names
//! before lookup.

use std::collections::BTreeMap;
use std::sync::Arc;

use weave_types::ServiceSnapshot;

use crate::service::Service;

#[derive(Default)]
pub struct Registry {
    services: BTreeMap<String, Arc<Service>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite.  Returns the previous entry, if any.
    pub fn register(&mut self, key: impl Into<String>, service: Arc<Service>) -> Option<Arc<Service>> {
        self.services.insert(key.into(), service)
    }

    pub fn get(&self, key: &str) -> Option<Arc<Service>> {
        self.services.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.services.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Arc<Service>> {
        self.services.remove(key)
    }

    /// All services, ordered by fullname.
    pub fn list(&self) -> Vec<Arc<Service>> {
        self.services.values().cloned().collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    /// Services owned by process `id`.
    pub fn with_id(&self, id: &str) -> Vec<Arc<Service>> {
        self.services
            .values()
            .filter(|s| s.id() == id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Public snapshot of every entry, keyed by fullname.
    pub fn snapshot(&self) -> BTreeMap<String, ServiceSnapshot> {
        self.services
            .iter()
            .map(|(k, s)| (k.clone(), s.snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::unknown::Unknown;
    use weave_types::ServiceIdentity;

    fn svc(name: &str, id: &str) -> Arc<Service> {
        let identity = ServiceIdentity::new(name, id, "Unknown", "0.0.1").unwrap();
        Arc::new(Service::new(identity, Box::new(Unknown::new("Nothing"))))
    }

    #[test]
    fn register_get_remove() {
        let mut reg = Registry::new();
        assert!(reg.register("a@P1", svc("a", "P1")).is_none());
        assert!(reg.register("a@P1", svc("a", "P1")).is_some(), "overwrite returns previous");
        assert_eq!(reg.len(), 1);
        assert!(reg.get("a@P1").is_some());
        assert!(reg.remove("a@P1").is_some());
        assert!(reg.is_empty());
    }

    #[test]
    fn with_id_filters_by_process() {
        let mut reg = Registry::new();
        reg.register("a@P1", svc("a", "P1"));
        reg.register("b@P2", svc("b", "P2"));
        reg.register("c@P2", svc("c", "P2"));
        let names: Vec<_> = reg.with_id("P2").iter().map(|s| s.fullname().to_string()).collect();
        assert_eq!(names, ["b@P2", "c@P2"]);
        assert_eq!(reg.names(), ["a@P1", "b@P2", "c@P2"]);
    }

    #[test]
    fn snapshot_is_keyed_by_fullname() {
        let mut reg = Registry::new();
        reg.register("a@P1", svc("a", "P1"));
        let snap = reg.snapshot();
        assert_eq!(snap["a@P1"].name, "a");
    }
}
