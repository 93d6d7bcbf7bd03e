//! Package metadata, limited to the fields the launch mechanism consumes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Where a package's services execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Built into this process.
    #[default]
    #[serde(alias = "node")]
    Native,
    Python,
    Java,
    Go,
    Browser,
    Docker,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub name: String,
    pub type_key: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub platform: Platform,
    /// Local placeholder type used when the package runs elsewhere.
    #[serde(default)]
    pub proxy_type_key: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Default config merged under the action's config.
    #[serde(default)]
    pub config: Map<String, Value>,
}

fn default_version() -> String {
    "0.0.1".to_string()
}

impl Package {
    pub fn native(name: impl Into<String>, type_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_key: type_key.into(),
            version: default_version(),
            platform: Platform::Native,
            proxy_type_key: None,
            description: None,
            config: Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark the package as running outside this process, represented
    /// locally by a `proxy_type_key` service.
    pub fn hosted_on(mut self, platform: Platform, proxy_type_key: impl Into<String>) -> Self {
        self.platform = platform;
        self.proxy_type_key = Some(proxy_type_key.into());
        self
    }

    /// `true` when services of this package are instantiated in this process.
    pub fn is_in_process(&self) -> bool {
        self.platform == Platform::Native
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_process_package() {
        let pkg: Package = serde_json::from_str(
            r#"{"name":"pyvosk","typeKey":"PyVosk","platform":"python","proxyTypeKey":"Proxy"}"#,
        )
        .unwrap();
        assert!(!pkg.is_in_process());
        assert_eq!(pkg.proxy_type_key.as_deref(), Some("Proxy"));
        assert_eq!(pkg.version, "0.0.1");
    }

    #[test]
    fn node_alias_is_in_process() {
        let pkg: Package =
            serde_json::from_str(r#"{"name":"clock","typeKey":"Clock","platform":"node"}"#).unwrap();
        assert!(pkg.is_in_process());
    }

    #[test]
    fn unknown_platform_is_other() {
        let pkg: Package =
            serde_json::from_str(r#"{"name":"x","typeKey":"X","platform":"electron"}"#).unwrap();
        assert_eq!(pkg.platform, Platform::Other);
    }
}
