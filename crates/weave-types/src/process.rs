//! Process and host descriptors exchanged during the connect handshake.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessData {
    pub id: String,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub platform_version: Option<String>,
}

impl ProcessData {
    /// Descriptor of the current OS process running runtime `id`.
    pub fn local(id: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pid: Some(std::process::id()),
            hostname: Some(hostname.into()),
            platform: Some("rust".to_string()),
            platform_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostData {
    pub hostname: String,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default, rename = "numberOfCPUs")]
    pub number_of_cpus: Option<usize>,
}

impl HostData {
    pub fn local(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            platform: Some(std::env::consts::OS.to_string()),
            architecture: Some(std::env::consts::ARCH.to_string()),
            number_of_cpus: std::thread::available_parallelism().ok().map(|n| n.get()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_process_has_pid() {
        let p = ProcessData::local("P1", "robot-01");
        assert_eq!(p.id, "P1");
        assert_eq!(p.pid, Some(std::process::id()));
    }

    #[test]
    fn host_wire_names() {
        let h = HostData::local("robot-01");
        let v = serde_json::to_value(&h).unwrap();
        assert_eq!(v["hostname"], "robot-01");
        assert!(v.get("numberOfCPUs").is_some());
    }
}
