//! Configuration vault – reads/writes `~/.weave/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use weave_gateway::DEFAULT_PORT;

/// Persisted process configuration stored in `~/.weave/config.toml`.
///
/// A `runtime` action in the launch file takes precedence over these
/// values for the fields it sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Process id.  A random one is generated when neither this nor the
    /// launch file names one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Port of the gateway server (WebSocket peers and HTTP API).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Launch description applied at startup (`.json` or `.toml`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch: Option<PathBuf>,

    /// Processes to connect to, as `ws://host:port` URLs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connect: Vec<String>,

    /// Extra packages merged into the built-in catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<PathBuf>,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id: None,
            port: default_port(),
            log_level: default_log_level(),
            launch: None,
            connect: Vec::new(),
            catalog: None,
        }
    }
}

/// Return the path to `~/.weave/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".weave").join("config.toml")
}

/// Load the config from disk with environment overrides applied.
/// Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    Ok(load_from(&config_path())?.map(|mut cfg| {
        apply_env_overrides(&mut cfg);
        cfg
    }))
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `WEAVE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `WEAVE_ID` | `id` |
/// | `WEAVE_PORT` | `port` |
/// | `WEAVE_LAUNCH` | `launch` |
/// | `WEAVE_CONNECT` | `connect` (comma separated) |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("WEAVE_ID")
        && !v.trim().is_empty()
    {
        cfg.id = Some(v.trim().to_string());
    }
    if let Ok(v) = std::env::var("WEAVE_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.port = port;
    }
    if let Ok(v) = std::env::var("WEAVE_LAUNCH") {
        cfg.launch = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("WEAVE_CONNECT") {
        cfg.connect = v
            .split(',')
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect();
    }
}

/// Save the config to disk, creating `~/.weave/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config {
            id: Some("robot".to_string()),
            launch: Some(PathBuf::from("/etc/weave/launch.toml")),
            connect: vec!["ws://base:3001".to_string()],
            ..Config::default()
        };
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.id.as_deref(), Some("robot"));
        assert_eq!(loaded.port, 3001);
        assert_eq!(loaded.log_level, "info");
        assert_eq!(loaded.connect, vec!["ws://base:3001".to_string()]);
        assert_eq!(loaded.launch, Some(PathBuf::from("/etc/weave/launch.toml")));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: Config = toml::from_str("id = \"arm\"").expect("parse");
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert!(cfg.connect.is_empty());
        assert!(cfg.catalog.is_none());
    }

    #[test]
    fn config_path_points_to_weave_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".weave"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = \"not a number\"").expect("write");
        assert!(load_from(&path).unwrap_err().contains("parse"));
    }

    #[test]
    fn apply_env_overrides_changes_id() {
        // SAFETY: each override test owns its variable.
        unsafe { std::env::set_var("WEAVE_ID", " arm ") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.id.as_deref(), Some("arm"));
        unsafe { std::env::remove_var("WEAVE_ID") };
    }

    #[test]
    fn apply_env_overrides_port() {
        // SAFETY: each override test owns its variable.
        unsafe { std::env::set_var("WEAVE_PORT", "not-a-port") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.port, DEFAULT_PORT);

        unsafe { std::env::set_var("WEAVE_PORT", "4100") };
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.port, 4100);
        unsafe { std::env::remove_var("WEAVE_PORT") };
    }

    #[test]
    fn apply_env_overrides_splits_connect_list() {
        // SAFETY: each override test owns its variable.
        unsafe { std::env::set_var("WEAVE_CONNECT", "ws://a:3001, ,ws://b:3001") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.connect, vec!["ws://a:3001".to_string(), "ws://b:3001".to_string()]);
        unsafe { std::env::remove_var("WEAVE_CONNECT") };
    }

    #[test]
    fn apply_env_overrides_changes_launch() {
        // SAFETY: each override test owns its variable.
        unsafe { std::env::set_var("WEAVE_LAUNCH", "/tmp/robot.json") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.launch, Some(PathBuf::from("/tmp/robot.json")));
        unsafe { std::env::remove_var("WEAVE_LAUNCH") };
    }
}
