//! Launch orchestrator.
//!
//! Turns a [`LaunchDescription`] into running services.  For each action the
//! package is resolved through the catalog and the fullname derived:
//!
//! - an explicit `name@id` is used as given;
//! - in-process packages take the local process id;
//! - any other package runs in a process named after the service, and is
//!   represented here by its `proxyTypeKey` type when it has one.
//!
//! A service that already exists is reconfigured in place.  New services are
//! queued and, once every action is resolved, started and registered in
//! action order.  Whatever cannot be resolved becomes an `Unknown` carrying
//! the requested type key.

use std::path::Path;
use std::sync::Arc;

use serde_json::Map;
use tracing::{error, info, warn};

use weave_types::address::{self, id_of, promote, short_name};
use weave_types::{LaunchAction, LaunchDescription, ListenerMap, ServiceIdentity, WeaveError};

use crate::runtime::Runtime;
use crate::service::Service;
use crate::services::unknown::{self, Unknown};
use crate::services::webui;

/// Version stamped on generated and saved descriptions.
const GENERATED_VERSION: &str = "0.0.1";

impl Runtime {
    /// Launch every action of `description`.  Returns the fullnames of the
    /// services the actions resolved to, new or existing, in action order.
    pub fn launch(&self, description: &LaunchDescription) -> Vec<String> {
        let _gate = self.enter();
        info!(
            description = %description.description,
            actions = description.actions.len(),
            "launching"
        );

        let mut launched = Vec::with_capacity(description.actions.len());
        let mut queued: Vec<Arc<Service>> = Vec::new();
        for action in &description.actions {
            match self.prepare(action) {
                Ok(Prepared::Existing(fullname)) => launched.push(fullname),
                Ok(Prepared::New(service)) => {
                    launched.push(service.fullname().to_string());
                    queued.push(service);
                }
                Err(e) => error!(package = %action.package, name = %action.name, error = %e, "skipping action"),
            }
        }

        for service in queued {
            service.start(self);
            self.register(service);
        }
        launched
    }

    /// Start a single service of `package` named `name`, or return the
    /// existing one.  `None` when the package is not in the catalog.
    pub fn start_service_type(&self, name: &str, package: &str) -> Option<Arc<Service>> {
        info!(name, package, "start service type");
        if self.catalog().package(package).is_none() {
            error!(package, "package not found");
            return None;
        }
        if let Some(existing) = self.get_service(name) {
            info!(service = %existing.fullname(), "already exists");
            return Some(existing);
        }

        let mut description = LaunchDescription::new(format!("Generated {name} {package}"));
        description.version = GENERATED_VERSION.to_string();
        description.add_action(LaunchAction::new(package.to_lowercase(), name));
        let fullname = self.launch(&description).into_iter().next()?;
        self.get_service(&fullname)
    }

    /// Rebuild a launch description from the running registry.
    ///
    /// Covers local services and local placeholders.  Browser UIs and
    /// untyped services are left out, as are listeners targeting a UI;
    /// callbacks into this process are saved by short name.
    pub fn save_all(&self) -> LaunchDescription {
        let _gate = self.enter();
        let mut description = LaunchDescription::new(format!("Saved from {}", self.fullname()));
        description.version = GENERATED_VERSION.to_string();

        for service in self.services() {
            let local = service.id() == self.id();
            if !local && !service.behavior().is_placeholder() {
                continue;
            }
            if service.type_key().is_empty() || service.type_key() == webui::TYPE_KEY {
                info!(service = %service.fullname(), "not saved");
                continue;
            }

            let name = if local {
                service.name().to_string()
            } else {
                service.fullname().to_string()
            };
            let mut action = LaunchAction::new(service.type_key().to_lowercase(), name)
                .with_config(service.config());
            let listeners = self.saved_listeners(service.notify_list());
            if !listeners.is_empty() {
                action = action.with_listeners(listeners);
            }
            description.add_action(action);
        }
        description
    }

    /// [`Runtime::save_all`], written to `path` as JSON, or TOML for a
    /// `.toml` extension.
    pub fn save_all_to(&self, path: &Path) -> Result<LaunchDescription, WeaveError> {
        let description = self.save_all();
        let text = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::to_string_pretty(&description)
                .map_err(|e| WeaveError::Serialization(e.to_string()))?,
            _ => serde_json::to_string_pretty(&description)?,
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| WeaveError::Config(format!("{}: {e}", dir.display())))?;
        }
        std::fs::write(path, text)
            .map_err(|e| WeaveError::Config(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), actions = description.actions.len(), "launch description saved");
        Ok(description)
    }

    // -- helpers ------------------------------------------------------------

    fn prepare(&self, action: &LaunchAction) -> Result<Prepared, WeaveError> {
        let package = self.catalog().package(&action.package);

        let (name, id) = match id_of(&action.name) {
            Some(id) => (short_name(&action.name).to_string(), id.to_string()),
            None => match &package {
                Some(pkg) if !pkg.is_in_process() => (action.name.clone(), action.name.clone()),
                _ => (action.name.clone(), self.id().to_string()),
            },
        };
        let fullname = address::fullname(&name, &id)?;
        info!(%fullname, package = %action.package, "resolving");

        let listeners = action
            .listeners
            .as_ref()
            .map(|l| self.promote_listeners(l));

        if let Some(existing) = self.get_service(&fullname) {
            info!(service = %fullname, "already exists, reconfiguring");
            if let Some(config) = &action.config {
                existing.apply_config(self, config.clone())?;
            }
            if let Some(listeners) = listeners {
                existing.replace_notify_list(listeners);
            }
            return Ok(Prepared::Existing(fullname));
        }

        let (requested, version, package_config) = match &package {
            Some(pkg) => {
                let type_key = match &pkg.proxy_type_key {
                    Some(proxy) if id != self.id() => proxy.clone(),
                    _ => pkg.type_key.clone(),
                };
                (type_key, pkg.version.clone(), pkg.config.clone())
            }
            None => {
                warn!(package = %action.package, "package not in catalog");
                (action.package.clone(), GENERATED_VERSION.to_string(), Map::new())
            }
        };

        let identity = ServiceIdentity::new(&name, &id, &requested, &version)?
            .with_hostname(self.hostname());
        let behavior = match package.as_ref().and(self.factories().create(&identity)) {
            Some(behavior) => behavior,
            None => {
                warn!(service = %fullname, type_key = %requested, "no constructor, using Unknown");
                return Ok(Prepared::New(self.unknown_service(identity, requested)));
            }
        };
        let service = Arc::new(Service::new(identity, behavior));

        let mut config = service.config();
        config.extend(package_config);
        if let Some(overrides) = &action.config {
            config.extend(overrides.clone());
        }
        if let Err(e) = service.apply_config(self, config) {
            warn!(service = %fullname, error = %e, "launch config rejected, keeping defaults");
        }
        if let Some(listeners) = listeners {
            service.replace_notify_list(listeners);
        }
        Ok(Prepared::New(service))
    }

    fn unknown_service(&self, identity: ServiceIdentity, requested: String) -> Arc<Service> {
        let identity = ServiceIdentity {
            type_key: unknown::TYPE_KEY.to_string(),
            ..identity
        };
        Arc::new(Service::new(identity, Box::new(Unknown::new(requested))))
    }

    /// Short callback names in a launch file address this process.
    fn promote_listeners(&self, listeners: &ListenerMap) -> ListenerMap {
        let mut promoted = listeners.clone();
        for entries in promoted.values_mut() {
            for listener in entries.iter_mut() {
                match promote(&listener.callback_name, self.id()) {
                    Ok(fullname) => listener.callback_name = fullname,
                    Err(e) => warn!(error = %e, "listener without callback name"),
                }
            }
            entries.retain(|l| !l.callback_name.is_empty());
        }
        promoted
    }

    fn saved_listeners(&self, listeners: ListenerMap) -> ListenerMap {
        let local_suffix = format!("{}{}", address::SEPARATOR, self.id());
        listeners
            .into_iter()
            .filter_map(|(topic, entries)| {
                let kept: Vec<_> = entries
                    .into_iter()
                    .filter(|l| {
                        self.get_service(&l.callback_name)
                            .is_none_or(|target| target.type_key() != webui::TYPE_KEY)
                    })
                    .map(|mut l| {
                        if let Some(short) = l.callback_name.strip_suffix(&local_suffix) {
                            l.callback_name = short.to_string();
                        }
                        l
                    })
                    .collect();
                (!kept.is_empty()).then_some((topic, kept))
            })
            .collect()
    }
}

enum Prepared {
    Existing(String),
    New(Arc<Service>),
}
