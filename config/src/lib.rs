//! Environment loading for fathom: project `.env` plus XDG `config.toml`,
//! applied to the process environment with priority **existing env > .env > XDG**.
//!
//! Call [`load_and_apply`] once at startup (the serve binary does); library
//! code then reads plain environment variables.

mod config_file;
mod env_file;

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("read config.toml: {0}")]
    ConfigRead(std::io::Error),
    #[error("parse config.toml: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("read .env: {0}")]
    EnvRead(std::io::Error),
}

/// Loads `.env` (from `dir` or the current directory) and
/// `$XDG_CONFIG_HOME/<app_name>/config.toml` `[env]`, then sets each key that
/// is **not** already present in the process environment. For keys present in
/// both sources, `.env` wins over the TOML file.
pub fn load_and_apply(app_name: &str, dir: Option<&Path>) -> Result<(), LoadError> {
    let from_config = config_file::load(app_name)?;
    let from_env_file = env_file::load(dir).map_err(LoadError::EnvRead)?;

    let mut keys: std::collections::HashSet<&String> = from_config.keys().collect();
    keys.extend(from_env_file.keys());

    for key in keys {
        if std::env::var(key).is_ok() {
            continue;
        }
        if let Some(value) = from_env_file.get(key).or_else(|| from_config.get(key)) {
            std::env::set_var(key, value);
        }
    }
    Ok(())
}

/// Serialises tests that mutate process environment variables; cargo runs
/// tests in parallel threads and the environment is process-global.
#[cfg(test)]
pub(crate) fn test_env_lock() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// **Scenario**: A variable already in the environment is not overwritten.
    #[test]
    fn existing_env_has_priority() {
        let _env = crate::test_env_lock();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "FATHOM_LOAD_TEST_A=file\n").unwrap();
        env::set_var("FATHOM_LOAD_TEST_A", "env");

        load_and_apply("fathom-load-test-none", Some(dir.path())).unwrap();
        assert_eq!(env::var("FATHOM_LOAD_TEST_A").as_deref(), Ok("env"));
        env::remove_var("FATHOM_LOAD_TEST_A");
    }

    /// **Scenario**: A key only in .env lands in the environment.
    #[test]
    fn env_file_applied_when_unset() {
        let _env = crate::test_env_lock();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "FATHOM_LOAD_TEST_B=from_file\n").unwrap();
        env::remove_var("FATHOM_LOAD_TEST_B");

        load_and_apply("fathom-load-test-none", Some(dir.path())).unwrap();
        let got = env::var("FATHOM_LOAD_TEST_B");
        env::remove_var("FATHOM_LOAD_TEST_B");
        assert_eq!(got.as_deref(), Ok("from_file"));
    }

    /// **Scenario**: With neither source present, the call is a no-op Ok.
    #[test]
    fn nothing_to_load_is_ok() {
        let _env = crate::test_env_lock();
        let dir = tempfile::tempdir().unwrap();
        assert!(load_and_apply("fathom-load-test-none", Some(dir.path())).is_ok());
    }

    /// **Scenario**: .env wins over the XDG TOML value for the same key.
    #[test]
    fn env_file_beats_config_file() {
        let _env = crate::test_env_lock();
        let xdg = tempfile::tempdir().unwrap();
        let app = xdg.path().join("fathom-prio-test");
        std::fs::create_dir_all(&app).unwrap();
        std::fs::write(app.join("config.toml"), "[env]\nFATHOM_LOAD_TEST_C = \"xdg\"\n").unwrap();
        let dotenv = tempfile::tempdir().unwrap();
        std::fs::write(dotenv.path().join(".env"), "FATHOM_LOAD_TEST_C=dotenv\n").unwrap();

        let prev = env::var("XDG_CONFIG_HOME").ok();
        env::set_var("XDG_CONFIG_HOME", xdg.path());
        env::remove_var("FATHOM_LOAD_TEST_C");
        let result = load_and_apply("fathom-prio-test", Some(dotenv.path()));
        let got = env::var("FATHOM_LOAD_TEST_C");
        env::remove_var("FATHOM_LOAD_TEST_C");
        match prev {
            Some(v) => env::set_var("XDG_CONFIG_HOME", v),
            None => env::remove_var("XDG_CONFIG_HOME"),
        }

        result.unwrap();
        assert_eq!(got.as_deref(), Ok("dotenv"));
    }
}
