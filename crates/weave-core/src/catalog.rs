//! Package catalog: `package name → Package`.
//!
//! The launch orchestrator consults a [`PackageCatalog`] but does not own
//! package metadata.  [`BuiltinCatalog`] carries the packages shipped with
//! this crate and can be extended from a JSON or TOML file:
//!
//! ```toml
//! [[packages]]
//! name = "pyvosk"
//! typeKey = "PyVosk"
//! platform = "python"
//! proxyTypeKey = "Proxy"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use weave_types::{Package, Platform, WeaveError};

use crate::services::{clock, proxy, runtime as runtime_service, unknown, webui};

pub trait PackageCatalog: Send + Sync {
    fn package(&self, name: &str) -> Option<Package>;

    fn packages(&self) -> Vec<Package>;
}

/// In-memory catalog.  Lookup is case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct BuiltinCatalog {
    packages: BTreeMap<String, Package>,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default)]
    packages: Vec<Package>,
}

impl BuiltinCatalog {
    /// An empty catalog.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The packages bundled with the runtime.
    pub fn new() -> Self {
        let mut catalog = Self::empty();
        catalog.insert(
            Package::native("runtime", runtime_service::TYPE_KEY)
                .with_description("Process runtime: registry, routes and connections"),
        );
        catalog.insert(
            Package::native("clock", clock::TYPE_KEY)
                .with_description("Publishes the current epoch on an interval"),
        );
        catalog.insert(
            Package::native("proxy", proxy::TYPE_KEY)
                .with_description("Local placeholder for an out-of-process service"),
        );
        catalog.insert(
            Package::native("webui", webui::TYPE_KEY)
                .hosted_on(Platform::Browser, webui::TYPE_KEY)
                .with_description("Browser user interface, represented by a local placeholder"),
        );
        catalog.insert(
            Package::native("unknown", unknown::TYPE_KEY)
                .with_description("Placeholder for an unresolvable type"),
        );
        catalog
    }

    pub fn insert(&mut self, package: Package) {
        self.packages.insert(package.name.to_lowercase(), package);
    }

    /// Add the packages listed in `text`, a JSON document.
    pub fn extend_from_json(&mut self, text: &str) -> Result<usize, WeaveError> {
        let file: CatalogFile = serde_json::from_str(text)?;
        Ok(self.extend(file.packages))
    }

    /// Add the packages listed in `text`, a TOML document.
    pub fn extend_from_toml(&mut self, text: &str) -> Result<usize, WeaveError> {
        let file: CatalogFile =
            toml::from_str(text).map_err(|e| WeaveError::Serialization(e.to_string()))?;
        Ok(self.extend(file.packages))
    }

    /// Add the packages of a `.json` or `.toml` file.
    pub fn extend_from_file(&mut self, path: &Path) -> Result<usize, WeaveError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| WeaveError::Config(format!("{}: {e}", path.display())))?;
        let added = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => self.extend_from_toml(&text)?,
            _ => self.extend_from_json(&text)?,
        };
        info!(path = %path.display(), added, "package catalog extended");
        Ok(added)
    }

    fn extend(&mut self, packages: Vec<Package>) -> usize {
        let n = packages.len();
        for p in packages {
            self.insert(p);
        }
        n
    }
}

impl PackageCatalog for BuiltinCatalog {
    fn package(&self, name: &str) -> Option<Package> {
        self.packages.get(&name.to_lowercase()).cloned()
    }

    fn packages(&self) -> Vec<Package> {
        self.packages.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_packages_are_in_process() {
        let catalog = BuiltinCatalog::new();
        let clock = catalog.package("Clock").unwrap();
        assert_eq!(clock.type_key, "Clock");
        assert!(clock.is_in_process());
        assert!(catalog.package("nope").is_none());

        let webui = catalog.package("webui").unwrap();
        assert!(!webui.is_in_process());
        assert_eq!(webui.proxy_type_key.as_deref(), Some("WebUi"));
    }

    #[test]
    fn extend_from_toml() {
        let mut catalog = BuiltinCatalog::new();
        let added = catalog
            .extend_from_toml(
                r#"
                [[packages]]
                name = "pyvosk"
                typeKey = "PyVosk"
                platform = "python"
                proxyTypeKey = "Proxy"
                "#,
            )
            .unwrap();
        assert_eq!(added, 1);
        let pkg = catalog.package("pyvosk").unwrap();
        assert!(!pkg.is_in_process());
    }

    #[test]
    fn extend_from_json_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile()?;
        write!(
            file,
            r#"{{"packages":[{{"name":"oakd","typeKey":"OakD","platform":"python","proxyTypeKey":"Proxy"}}]}}"#
        )?;
        let mut catalog = BuiltinCatalog::empty();
        assert_eq!(catalog.extend_from_file(file.path())?, 1);
        assert_eq!(catalog.packages().len(), 1);
        Ok(())
    }

    #[test]
    fn missing_file_is_config_error() {
        let mut catalog = BuiltinCatalog::empty();
        let err = catalog
            .extend_from_file(Path::new("/definitely/not/here.toml"))
            .unwrap_err();
        assert!(matches!(err, WeaveError::Config(_)));
    }
}
