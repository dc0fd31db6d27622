// Settings loading
// Layers, lowest precedence first: built-in defaults, doorstop-harness.toml, DOORSTOP_HARNESS_* env.
// Nested keys use a double underscore: DOORSTOP_HARNESS_RETRY__MAX_ATTEMPTS=5

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use doorstop_harness_core::domain::HarnessSettings;

pub const CONFIG_FILE: &str = "doorstop-harness.toml";
pub const ENV_PREFIX: &str = "DOORSTOP_HARNESS";

/// Load settings from `path` (or ./doorstop-harness.toml if present) and the process environment
pub fn load(path: Option<&Path>) -> Result<HarnessSettings> {
    load_with_env(path, None)
}

/// Same as `load`, with an explicit environment instead of the process one
pub fn load_with_env(
    path: Option<&Path>,
    env: Option<HashMap<String, String>>,
) -> Result<HarnessSettings> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::new(CONFIG_FILE, FileFormat::Toml).required(false),
    };

    let settings: HarnessSettings = Config::builder()
        .add_source(Config::try_from(&defaults())?)
        .add_source(file)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        )
        .build()
        .context("Failed to read settings")?
        .try_deserialize()
        .context("Invalid settings")?;

    let settings = expand_paths(settings);
    settings.validate()?;
    Ok(settings)
}

/// Built-in defaults; the cache goes to the per-user cache directory when there is one
fn defaults() -> HarnessSettings {
    let mut settings = HarnessSettings::default();
    if let Some(dirs) = ProjectDirs::from("", "", "doorstop-harness") {
        settings.cache_root = dirs.cache_dir().to_path_buf();
    }
    settings
}

fn expand_paths(mut settings: HarnessSettings) -> HarnessSettings {
    settings.cache_root = expand(&settings.cache_root);
    settings.companion_dir = expand(&settings.companion_dir);
    settings.entrypoints.mono = expand(&settings.entrypoints.mono);
    settings.entrypoints.il2cpp = expand(&settings.entrypoints.il2cpp);
    settings.wine_prefix = settings.wine_prefix.as_deref().map(expand);
    settings.log_dir = settings.log_dir.as_deref().map(expand);
    settings
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> Option<HashMap<String, String>> {
        Some(HashMap::new())
    }

    #[test]
    fn test_defaults_without_file() {
        let settings = load_with_env(None, no_env()).unwrap();

        assert_eq!(settings.launch_timeout_secs, 60);
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.display_id, "3785252");
    }

    #[test]
    fn test_file_then_env_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.toml");
        std::fs::write(
            &path,
            r#"
cache_root = "/var/cache/doorstop"
launch_timeout_secs = 120

[retry]
max_attempts = 5
"#,
        )
        .unwrap();

        let env = HashMap::from([
            ("DOORSTOP_HARNESS_LAUNCH_TIMEOUT_SECS".to_string(), "90".to_string()),
            ("DOORSTOP_HARNESS_RETRY__BASE_DELAY_SECS".to_string(), "1".to_string()),
        ]);
        let settings = load_with_env(Some(&path), Some(env)).unwrap();

        assert_eq!(settings.cache_root, PathBuf::from("/var/cache/doorstop"));
        assert_eq!(settings.launch_timeout_secs, 90);
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.base_delay_secs, 1);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let env = HashMap::from([("DOORSTOP_HARNESS_LOCK_WAIT_SECS".to_string(), "0".to_string())]);
        assert!(load_with_env(None, Some(env)).is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_with_env(Some(&dir.path().join("absent.toml")), no_env()).is_err());
    }

    #[test]
    fn test_tilde_is_expanded() {
        let env = HashMap::from([("DOORSTOP_HARNESS_CACHE_ROOT".to_string(), "~/doorstop".to_string())]);
        let settings = load_with_env(None, Some(env)).unwrap();
        if std::env::var_os("HOME").is_some() {
            assert!(!settings.cache_root.starts_with("~"));
        }
    }
}
