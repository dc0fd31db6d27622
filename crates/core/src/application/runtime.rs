// Runtime flavor profiles
//
// One implementation per scripting backend, picked from configuration at runtime,
// so command assembly never branches on the flavor itself.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::catalog;
use crate::domain::launch::env;
use crate::domain::{Artifact, EntrypointSettings, LaunchTarget, RuntimeFlavor};
use crate::error::Result;

pub trait RuntimeProfile: Send + Sync {
    fn flavor(&self) -> RuntimeFlavor;

    /// Entry assembly the injected code loads
    fn entrypoint(&self) -> &Path;

    /// Artifacts that must be ensured before launching `target`
    fn required_artifacts(&self, target: &LaunchTarget) -> Result<Vec<Artifact>>;

    /// Flavor-specific environment; `cache_root` locates required artifacts
    fn environment(
        &self,
        target: &LaunchTarget,
        cache_root: &Path,
    ) -> Result<BTreeMap<String, String>> {
        let _ = (target, cache_root);
        Ok(self.base_environment())
    }

    fn base_environment(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (
                env::TARGET_ASSEMBLY.to_string(),
                self.entrypoint().display().to_string(),
            ),
            (
                env::ASSERT_RUNTIME.to_string(),
                self.flavor().expected_runtime().to_string(),
            ),
        ])
    }
}

/// Mono builds run the entrypoint in the engine's own runtime
pub struct MonoProfile {
    entrypoint: PathBuf,
}

impl MonoProfile {
    pub fn new(entrypoint: impl Into<PathBuf>) -> Self {
        Self {
            entrypoint: entrypoint.into(),
        }
    }
}

impl RuntimeProfile for MonoProfile {
    fn flavor(&self) -> RuntimeFlavor {
        RuntimeFlavor::Mono
    }

    fn entrypoint(&self) -> &Path {
        &self.entrypoint
    }

    fn required_artifacts(&self, _target: &LaunchTarget) -> Result<Vec<Artifact>> {
        Ok(Vec::new())
    }
}

/// IL2CPP builds host a separate managed runtime for the entrypoint
pub struct Il2CppProfile {
    entrypoint: PathBuf,
}

impl Il2CppProfile {
    pub fn new(entrypoint: impl Into<PathBuf>) -> Self {
        Self {
            entrypoint: entrypoint.into(),
        }
    }
}

impl RuntimeProfile for Il2CppProfile {
    fn flavor(&self) -> RuntimeFlavor {
        RuntimeFlavor::Il2Cpp
    }

    fn entrypoint(&self) -> &Path {
        &self.entrypoint
    }

    fn required_artifacts(&self, target: &LaunchTarget) -> Result<Vec<Artifact>> {
        Ok(vec![catalog::dotnet_runtime(target)?])
    }

    fn environment(
        &self,
        target: &LaunchTarget,
        cache_root: &Path,
    ) -> Result<BTreeMap<String, String>> {
        let runtime = catalog::dotnet_runtime(target)?;
        let corlib = catalog::dotnet_runtime_dir(&runtime.install_dir(cache_root));

        let mut vars = self.base_environment();
        vars.insert(env::CLR_CORLIB_DIR.to_string(), corlib.display().to_string());
        Ok(vars)
    }
}

/// Flavor -> profile lookup built from settings
#[derive(Clone)]
pub struct RuntimeRegistry {
    profiles: Vec<Arc<dyn RuntimeProfile>>,
}

impl RuntimeRegistry {
    pub fn new(profiles: Vec<Arc<dyn RuntimeProfile>>) -> Self {
        Self { profiles }
    }

    pub fn from_settings(entrypoints: &EntrypointSettings) -> Self {
        Self::new(vec![
            Arc::new(MonoProfile::new(entrypoints.mono.clone())),
            Arc::new(Il2CppProfile::new(entrypoints.il2cpp.clone())),
        ])
    }

    pub fn profile(&self, flavor: RuntimeFlavor) -> Result<Arc<dyn RuntimeProfile>> {
        self.profiles
            .iter()
            .find(|p| p.flavor() == flavor)
            .cloned()
            .ok_or_else(|| {
                crate::HarnessError::Config(format!("no runtime profile configured for {flavor}"))
            })
    }
}
