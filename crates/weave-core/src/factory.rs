//! Service type registry: `type key → constructor`.

use std::collections::BTreeMap;
use std::sync::Arc;

use weave_types::ServiceIdentity;

use crate::service::ServiceBehavior;
use crate::services::{clock, proxy, unknown, webui};

/// Builds the behavior of a new service instance.
pub type ServiceFactory = Arc<dyn Fn(&ServiceIdentity) -> Box<dyn ServiceBehavior> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ServiceFactories {
    factories: BTreeMap<String, ServiceFactory>,
}

impl ServiceFactories {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Factories for the built-in instantiable types.
    pub fn builtin() -> Self {
        let mut f = Self::empty();
        f.register(clock::TYPE_KEY, |_| Box::new(clock::Clock::new()));
        f.register(proxy::TYPE_KEY, |_| Box::new(proxy::Proxy::new()));
        f.register(webui::TYPE_KEY, |_| Box::new(webui::WebUi::new()));
        f.register(unknown::TYPE_KEY, |id| {
            Box::new(unknown::Unknown::new(id.type_key.clone()))
        });
        f
    }

    pub fn register<F>(&mut self, type_key: impl Into<String>, factory: F)
    where
        F: Fn(&ServiceIdentity) -> Box<dyn ServiceBehavior> + Send + Sync + 'static,
    {
        self.factories.insert(type_key.into(), Arc::new(factory));
    }

    pub fn contains(&self, type_key: &str) -> bool {
        self.factories.contains_key(type_key)
    }

    /// `None` when no constructor is registered for `identity.type_key`.
    pub fn create(&self, identity: &ServiceIdentity) -> Option<Box<dyn ServiceBehavior>> {
        self.factories.get(&identity.type_key).map(|f| f(identity))
    }

    pub fn type_keys(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}
