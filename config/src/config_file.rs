//! `[env]` table from `$XDG_CONFIG_HOME/<app>/config.toml`.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::LoadError;

#[derive(serde::Deserialize, Default)]
struct AppConfigFile {
    #[serde(default)]
    env: HashMap<String, String>,
}

/// Path of the app config file, or `None` when it does not exist.
///
/// `$XDG_CONFIG_HOME` is honoured explicitly so tests can redirect it;
/// otherwise the platform config dir from `dirs` is used.
fn config_path(app_name: &str) -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(dirs::config_dir)?;
    let path = base.join(app_name).join("config.toml");
    path.is_file().then_some(path)
}

/// Returns the `[env]` key/value pairs for the app. Missing file or missing
/// `[env]` section yields an empty map; unreadable or invalid TOML is an error.
pub fn load(app_name: &str) -> Result<HashMap<String, String>, LoadError> {
    let Some(path) = config_path(app_name) else {
        return Ok(HashMap::new());
    };
    let content = std::fs::read_to_string(&path).map_err(LoadError::ConfigRead)?;
    let parsed: AppConfigFile = toml::from_str(&content)?;
    Ok(parsed.env)
}
