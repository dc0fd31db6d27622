// Test Build Domain Model
// A published test game build, named `<engineVersion>-<target>.zip`

use super::error::{DomainError, Result};
use super::target::{Architecture, EngineVersion, HostEnvironment, LaunchTarget, Platform};

/// Oldest engine release the entrypoint supports (older ones target net20)
pub const MIN_ENGINE_VERSION: (u32, u32) = (4, 6);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestBuild {
    pub asset_name: String,
    pub engine: EngineVersion,
    pub target: LaunchTarget,
    pub url: String,
    /// Release digest, usually `sha256:<hex>`
    pub digest: String,
}

impl TestBuild {
    /// Parse a release asset such as `2019.4.40f1-linux-x64-mono.zip`
    pub fn from_asset(
        asset_name: impl Into<String>,
        url: impl Into<String>,
        digest: impl Into<String>,
    ) -> Result<Self> {
        let asset_name = asset_name.into();
        let invalid = || DomainError::InvalidAssetName(asset_name.clone());

        let stem = asset_name.strip_suffix(".zip").ok_or_else(invalid)?;
        let (version, target) = stem.split_once('-').ok_or_else(invalid)?;

        Ok(Self {
            engine: version.parse()?,
            target: target.parse()?,
            asset_name,
            url: url.into(),
            digest: digest.into(),
        })
    }

    /// Asset name without the `.zip` extension
    pub fn asset_stem(&self) -> &str {
        self.asset_name
            .strip_suffix(".zip")
            .unwrap_or(&self.asset_name)
    }

    pub fn is_supported_engine(&self) -> bool {
        self.engine
            .is_at_least(MIN_ENGINE_VERSION.0, MIN_ENGINE_VERSION.1)
    }

    /// Concrete architectures this build is run as on `host`
    ///
    /// Multi-arch builds only exist for macOS; `x64arm64` runs twice, `x64x86` once as x64.
    pub fn run_architectures(&self, host: &HostEnvironment) -> Result<Vec<Architecture>> {
        let multi_arch = |arches: Vec<Architecture>| {
            if host.platform == Platform::MacOS {
                Ok(arches)
            } else {
                Err(DomainError::UnsupportedPlatform(format!(
                    "{} build on {} host",
                    self.target.architecture, host.platform
                )))
            }
        };

        match self.target.architecture {
            Architecture::X64Arm64 => multi_arch(vec![Architecture::X64, Architecture::Arm64]),
            Architecture::X64X86 => multi_arch(vec![Architecture::X64]),
            Architecture::Universal => Err(DomainError::UniversalArchitecture(
                self.target.architecture.to_string(),
            )),
            concrete => Ok(vec![concrete]),
        }
    }
}
