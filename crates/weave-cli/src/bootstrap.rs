//! Launch-file loading and the effective runtime settings of the process.

use std::path::Path;

use serde_json::Value;
use uuid::Uuid;

use weave_core::runtime::RUNTIME_NAME;
use weave_core::services::runtime::RuntimeConfig;
use weave_types::{LaunchAction, LaunchDescription, WeaveError};

use crate::config::Config;

/// Read a launch description from a `.toml` or `.json` file.
pub fn load_launch(path: &Path) -> Result<LaunchDescription, WeaveError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| WeaveError::Config(format!("{}: {e}", path.display())))?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => {
            toml::from_str(&text).map_err(|e| WeaveError::Serialization(e.to_string()))
        }
        _ => LaunchDescription::from_json(&text),
    }
}

/// Merge `cfg` under the config of the `runtime` action of `ld` and write
/// the result back, adding the action first when `ld` has none.
///
/// Values set in the launch file win.  The returned settings always carry
/// an id, generated when neither source names one.
pub fn runtime_settings(cfg: &Config, ld: &mut LaunchDescription) -> Result<RuntimeConfig, WeaveError> {
    let base = RuntimeConfig {
        id: cfg.id.clone(),
        log_level: cfg.log_level.clone(),
        port: cfg.port,
        connect: cfg.connect.clone(),
        ..RuntimeConfig::default()
    };
    let Value::Object(mut merged) = serde_json::to_value(&base)? else {
        return Err(WeaveError::Config("runtime config is not an object".to_string()));
    };

    let index = match ld.actions.iter().position(is_runtime_action) {
        Some(index) => index,
        None => {
            ld.actions.insert(0, LaunchAction::new(RUNTIME_NAME, RUNTIME_NAME));
            0
        }
    };
    let action = &mut ld.actions[index];
    if let Some(own) = action.config.take() {
        merged.extend(own.into_iter().filter(|(_, v)| !v.is_null()));
    }

    let mut settings: RuntimeConfig = serde_json::from_value(Value::Object(merged.clone()))
        .map_err(|e| WeaveError::Config(format!("runtime config: {e}")))?;
    if settings.id.as_deref().is_none_or(str::is_empty) {
        let id = generated_id();
        merged.insert("id".to_string(), Value::String(id.clone()));
        settings.id = Some(id);
    }
    action.config = Some(merged);
    Ok(settings)
}

fn is_runtime_action(action: &LaunchAction) -> bool {
    action.package.eq_ignore_ascii_case(RUNTIME_NAME)
}

fn generated_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("weave-{}", &uuid[..8])
}
