// Host probe implementation
// OS and CPU come from the compile target; NixOS from its config directory.

use std::path::PathBuf;
use tracing::debug;

use doorstop_harness_core::domain::{Architecture, DomainError, HostEnvironment, Platform};
use doorstop_harness_core::port::HostProbe;
use doorstop_harness_core::Result;

const NIXOS_MARKER: &str = "/etc/nixos";

pub struct SystemHostProbe {
    nixos_marker: PathBuf,
}

impl SystemHostProbe {
    pub fn new() -> Self {
        Self {
            nixos_marker: PathBuf::from(NIXOS_MARKER),
        }
    }

    /// Probe with a different NixOS marker directory (tests)
    pub fn with_nixos_marker(marker: impl Into<PathBuf>) -> Self {
        Self {
            nixos_marker: marker.into(),
        }
    }
}

impl Default for SystemHostProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for SystemHostProbe {
    fn detect(&self) -> Result<HostEnvironment> {
        let platform = Platform::host().ok_or_else(|| {
            DomainError::UnsupportedPlatform(format!("host OS '{}'", std::env::consts::OS))
        })?;
        let architecture = Architecture::host().ok_or_else(|| {
            DomainError::UnsupportedPlatform(format!("host CPU '{}'", std::env::consts::ARCH))
        })?;
        let is_nixos = platform == Platform::Linux && self.nixos_marker.is_dir();

        debug!(platform = %platform, architecture = %architecture, is_nixos = %is_nixos, "Detected host");
        Ok(HostEnvironment::new(platform, architecture).with_nixos(is_nixos))
    }
}
