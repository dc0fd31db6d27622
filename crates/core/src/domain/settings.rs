// Harness Settings
// Deserialized by the CLI from defaults + doorstop-harness.toml + DOORSTOP_HARNESS_* env

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::error::{DomainError, Result};
use super::target::RuntimeFlavor;

/// Entry assembly injected into each runtime flavor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntrypointSettings {
    pub mono: PathBuf,
    pub il2cpp: PathBuf,
}

impl EntrypointSettings {
    pub fn for_flavor(&self, flavor: RuntimeFlavor) -> &PathBuf {
        match flavor {
            RuntimeFlavor::Mono => &self.mono,
            RuntimeFlavor::Il2Cpp => &self.il2cpp,
        }
    }
}

impl Default for EntrypointSettings {
    fn default() -> Self {
        Self {
            mono: PathBuf::from("entrypoints/mono/Entrypoint.dll"),
            il2cpp: PathBuf::from("entrypoints/il2cpp/Entrypoint.dll"),
        }
    }
}

/// Bounded linear retry of transient launch failures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessSettings {
    /// Root of the artifact cache (`<root>/<artifactId>/...`)
    pub cache_root: PathBuf,
    /// Build output root of the injection binaries (`<dir>/target/<triple>/release`)
    pub companion_dir: PathBuf,
    pub entrypoints: EntrypointSettings,
    pub launch_timeout_secs: u64,
    pub lock_wait_secs: u64,
    pub lock_poll_ms: u64,
    pub retry: RetrySettings,
    /// X display number used for the virtual display
    pub display_id: String,
    /// Defaults to `<cache_root>/.wine`
    pub wine_prefix: Option<PathBuf>,
    /// Enables file logging when set
    pub log_dir: Option<PathBuf>,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from("cache"),
            companion_dir: PathBuf::from("."),
            entrypoints: EntrypointSettings::default(),
            launch_timeout_secs: 60,
            lock_wait_secs: 300,
            lock_poll_ms: 500,
            retry: RetrySettings::default(),
            display_id: "3785252".to_string(),
            wine_prefix: None,
            log_dir: None,
        }
    }
}

impl HarnessSettings {
    pub fn validate(&self) -> Result<()> {
        let zero = |name: &str| DomainError::ValidationError(format!("{name} must be greater than 0"));

        if self.launch_timeout_secs == 0 {
            return Err(zero("launch_timeout_secs"));
        }
        if self.lock_wait_secs == 0 {
            return Err(zero("lock_wait_secs"));
        }
        if self.lock_poll_ms == 0 {
            return Err(zero("lock_poll_ms"));
        }
        if self.retry.max_attempts == 0 {
            return Err(zero("retry.max_attempts"));
        }
        if self.display_id.is_empty() || !self.display_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::ValidationError(format!(
                "display_id must be numeric, got '{}'",
                self.display_id
            )));
        }
        Ok(())
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_secs(self.lock_wait_secs)
    }

    pub fn lock_poll(&self) -> Duration {
        Duration::from_millis(self.lock_poll_ms)
    }

    pub fn wine_prefix(&self) -> PathBuf {
        self.wine_prefix
            .clone()
            .unwrap_or_else(|| self.cache_root.join(".wine"))
    }
}
