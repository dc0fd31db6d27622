// Platform Target Resolver
// Pure mapping from (target, engine, host) to launch-time constants. No state, no I/O.

use serde::Serialize;
use std::path::PathBuf;

use crate::domain::error::{DomainError, Result};
use crate::domain::{
    Architecture, EngineVersion, HostEnvironment, InjectionMethod, LaunchTarget, Platform,
};

/// Engine releases up to this major need the container runtime on Linux
pub const CONTAINER_RUNTIME_MAX_MAJOR: u32 = 5;

/// Wrapper needed on this host to run the target, outermost first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Wrapper {
    /// `steam-run` on NixOS hosts
    Sandbox,
    /// Container runtime run script followed by `--`
    ContainerRuntime,
    /// `wine` for Windows binaries on a non-Windows host
    CompatibilityLayer,
    /// `DISPLAY=:<id>` backed by a virtual X server
    HeadlessDisplay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTarget {
    pub exe_suffix: &'static str,
    /// Executable relative to the install directory
    pub executable: PathBuf,
    pub runtime_identifier: String,
    pub rust_triple: String,
    pub default_method: InjectionMethod,
    pub wrappers: Vec<Wrapper>,
    /// Engine supports `-batchmode -nographics`
    pub headless_args: bool,
}

impl ResolvedTarget {
    /// Explicit override if given, else the platform default; validated against the platform
    pub fn select_method(
        &self,
        target: &LaunchTarget,
        requested: Option<InjectionMethod>,
    ) -> Result<InjectionMethod> {
        let method = requested.unwrap_or(self.default_method);
        if method == InjectionMethod::DllProxy && target.platform != Platform::Windows {
            return Err(DomainError::UnsupportedInjectionMethod {
                method: method.to_string(),
                platform: target.platform.to_string(),
            });
        }
        Ok(method)
    }

    pub fn has_wrapper(&self, wrapper: &Wrapper) -> bool {
        self.wrappers.contains(wrapper)
    }
}

pub struct PlatformTargetResolver;

impl PlatformTargetResolver {
    /// Resolve a concrete target for `host`
    ///
    /// # Errors
    /// - DomainError::UniversalArchitecture for multi-arch targets
    /// - DomainError::UnsupportedPlatform for Android
    pub fn resolve(
        target: &LaunchTarget,
        engine: &EngineVersion,
        host: &HostEnvironment,
    ) -> Result<ResolvedTarget> {
        let exe_suffix = target.platform.exe_suffix();
        let executable = match target.platform {
            Platform::MacOS => PathBuf::from("TestGame.app/Contents/MacOS/TestGame"),
            _ => PathBuf::from(format!("TestGame{exe_suffix}")),
        };

        let default_method = match target.platform {
            Platform::Windows => InjectionMethod::DllProxy,
            _ => InjectionMethod::Launcher,
        };

        Ok(ResolvedTarget {
            exe_suffix,
            executable,
            runtime_identifier: target.runtime_identifier()?,
            rust_triple: target.rust_triple()?,
            default_method,
            wrappers: Self::wrappers(target, engine, host),
            headless_args: engine.major() > 4,
        })
    }

    fn wrappers(target: &LaunchTarget, engine: &EngineVersion, host: &HostEnvironment) -> Vec<Wrapper> {
        let mut wrappers = Vec::new();

        if target.platform == Platform::Windows && host.platform != Platform::Windows {
            wrappers.push(Wrapper::CompatibilityLayer);
        } else if target.platform == Platform::Linux {
            if host.is_nixos {
                wrappers.push(Wrapper::Sandbox);
            }
            if engine.major() <= CONTAINER_RUNTIME_MAX_MAJOR {
                wrappers.push(Wrapper::ContainerRuntime);
            }
        }

        if host.platform == Platform::Linux {
            wrappers.push(Wrapper::HeadlessDisplay);
        }

        wrappers
    }

    /// Whether `host` can execute `target` at all
    pub fn can_run(target: &LaunchTarget, host: &HostEnvironment) -> bool {
        let platform_ok = target.platform == host.platform
            || (host.platform == Platform::Linux && target.platform == Platform::Windows);
        if !platform_ok {
            return false;
        }

        let is_mac = host.platform == Platform::MacOS;
        let supported: &[Architecture] = match (host.architecture, is_mac) {
            (Architecture::X64, false) => &[
                Architecture::X64,
                Architecture::X86,
                Architecture::X64X86,
                Architecture::X64Arm64,
            ],
            (Architecture::X64, true) => &[
                Architecture::X64,
                Architecture::X64X86,
                Architecture::X64Arm64,
            ],
            (Architecture::Arm64, false) => &[Architecture::Arm64, Architecture::X64Arm64],
            (Architecture::Arm64, true) => &[
                Architecture::Arm64,
                Architecture::X64Arm64,
                Architecture::X64,
                Architecture::X64X86,
            ],
            _ => &[],
        };

        supported.contains(&target.architecture)
    }

    /// Injection methods the companion binaries support for this target and engine
    pub fn supported_methods(target: &LaunchTarget, engine: &EngineVersion) -> Vec<InjectionMethod> {
        let mut methods = Vec::new();

        // launcher cannot inject into win-arm64 yet
        if !(target.platform == Platform::Windows && target.architecture == Architecture::Arm64) {
            methods.push(InjectionMethod::Launcher);
        }
        if target.platform == Platform::Windows {
            methods.push(InjectionMethod::DllProxy);
        }

        let player = match target.platform {
            Platform::Windows => engine.is_at_least(2017, 2),
            Platform::Linux => engine.is_at_least(2019, 3),
            Platform::MacOS | Platform::Android => false,
        };
        if player {
            methods.push(InjectionMethod::Player);
        }

        methods
    }
}
