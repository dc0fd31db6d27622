// Launch command assembly
//
// Pure: turns (target, engine, install dir, options) into a LaunchPlan.
// Everything that touches the filesystem is emitted as a StagingStep instead.
//
// Argument order: [sandbox] [container runtime | compatibility layer] [launcher] <exe> [engine args]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use super::catalog;
use super::constants::{DLL_PROXY_DIR, DLL_PROXY_SHIM_NAME};
use super::resolver::{PlatformTargetResolver, ResolvedTarget, Wrapper};
use super::runtime::RuntimeRegistry;
use crate::domain::launch::env;
use crate::domain::{
    Artifact, EngineVersion, HarnessSettings, HostEnvironment, InjectionMethod, LaunchOptions,
    LaunchPlan, LaunchTarget, StagingStep,
};
use crate::error::{HarnessError, Result};

pub const LAUNCHER_BINARY: &str = "doorstop_launcher";
pub const PLAYER_BINARY: &str = "doorstop_player";
pub const DLL_PROXY_LIBRARY: &str = "doorstop.dll";

/// What is being launched
#[derive(Debug, Clone, Copy)]
pub struct LaunchSubject<'a> {
    /// Concrete (narrowed) target
    pub target: &'a LaunchTarget,
    pub engine: &'a EngineVersion,
    pub install_dir: &'a Path,
}

#[derive(Clone)]
pub struct LaunchCommandBuilder {
    host: HostEnvironment,
    runtimes: RuntimeRegistry,
    cache_root: PathBuf,
    companion_dir: PathBuf,
    wine_prefix: PathBuf,
    display_id: String,
    timeout: Duration,
}

impl LaunchCommandBuilder {
    pub fn new(settings: &HarnessSettings, host: HostEnvironment, runtimes: RuntimeRegistry) -> Self {
        Self {
            host,
            runtimes,
            cache_root: settings.cache_root.clone(),
            companion_dir: settings.companion_dir.clone(),
            wine_prefix: settings.wine_prefix(),
            display_id: settings.display_id.clone(),
            timeout: settings.launch_timeout(),
        }
    }

    pub fn host(&self) -> &HostEnvironment {
        &self.host
    }

    pub fn resolve(&self, subject: &LaunchSubject<'_>) -> Result<ResolvedTarget> {
        Ok(PlatformTargetResolver::resolve(
            subject.target,
            subject.engine,
            &self.host,
        )?)
    }

    /// Artifacts besides the test build itself that must be ensured first
    pub fn companion_artifacts(&self, subject: &LaunchSubject<'_>) -> Result<Vec<Artifact>> {
        let resolved = self.resolve(subject)?;
        let profile = self.runtimes.profile(subject.target.flavor)?;

        let mut artifacts = profile.required_artifacts(subject.target)?;
        if resolved.has_wrapper(&Wrapper::ContainerRuntime) {
            artifacts.push(catalog::steam_linux_runtime()?);
        }
        Ok(artifacts)
    }

    /// Directory holding the companion binaries for `triple`
    pub fn companion_output_dir(&self, triple: &str) -> PathBuf {
        self.companion_dir
            .join("target")
            .join(triple)
            .join("release")
    }

    pub fn build(&self, subject: &LaunchSubject<'_>, options: &LaunchOptions) -> Result<LaunchPlan> {
        let target = subject.target;
        let resolved = self.resolve(subject)?;
        let method = resolved.select_method(target, options.injection_method)?;
        let companions = self.companion_output_dir(&resolved.rust_triple);

        let executable = subject.install_dir.join(&resolved.executable);
        let mut staging = vec![StagingStep::RequireFile(executable.clone())];
        let mut working_dir = subject.install_dir.to_path_buf();
        let mut vars = base_environment();
        let mut argv = vec![path_arg(&executable)];

        match method {
            InjectionMethod::Launcher => {
                let launcher = companions.join(format!("{LAUNCHER_BINARY}{}", resolved.exe_suffix));
                staging.push(StagingStep::RequireFile(launcher.clone()));
                argv.insert(0, path_arg(&launcher));
            }
            InjectionMethod::Player => {
                let player = companions.join(format!("{PLAYER_BINARY}{}", resolved.exe_suffix));
                staging.push(StagingStep::RequireFile(player.clone()));
                vars.insert(env::PLAYER_EXECUTABLE.to_string(), path_arg(&executable));
                argv[0] = path_arg(&player);
            }
            InjectionMethod::DllProxy => {
                let shim = companions.join(DLL_PROXY_LIBRARY);
                let shadow = subject.install_dir.join(DLL_PROXY_DIR);
                let exe_name = resolved.executable.file_name().ok_or_else(|| {
                    HarnessError::Internal(format!(
                        "executable path {} has no file name",
                        resolved.executable.display()
                    ))
                })?;

                staging.push(StagingStep::RequireFile(shim.clone()));
                staging.push(StagingStep::ShadowInstall {
                    source: subject.install_dir.to_path_buf(),
                    shadow: shadow.clone(),
                    shim,
                    shim_name: DLL_PROXY_SHIM_NAME.to_string(),
                });
                argv[0] = path_arg(&shadow.join(exe_name));
                working_dir = shadow;
            }
        }

        // innermost wrapper is prepended first
        for wrapper in resolved.wrappers.iter().rev() {
            match wrapper {
                Wrapper::CompatibilityLayer => {
                    vars.insert("WINEPREFIX".into(), path_arg(&self.wine_prefix));
                    vars.insert("WINEDEBUG".into(), "fixme-all".into());
                    vars.insert("DXVK_LOG_LEVEL".into(), "error".into());
                    if method == InjectionMethod::DllProxy {
                        vars.insert("WINEDLLOVERRIDES".into(), "winhttp=n,b".into());
                    }
                    staging.push(StagingStep::WinePrefix {
                        prefix: self.wine_prefix.clone(),
                    });
                    argv.insert(0, "wine".into());
                }
                Wrapper::ContainerRuntime => {
                    let runtime = catalog::steam_linux_runtime()?;
                    let run = catalog::steam_linux_runtime_run_script(
                        &runtime.install_dir(&self.cache_root),
                    );
                    vars.insert("PRESSURE_VESSEL_GENERATE_LOCALES".into(), "0".into());
                    argv.splice(0..0, [path_arg(&run), "--".to_string()]);
                }
                Wrapper::Sandbox => {
                    argv.insert(0, "steam-run".into());
                }
                Wrapper::HeadlessDisplay => {
                    vars.insert("DISPLAY".into(), format!(":{}", self.display_id));
                    staging.push(StagingStep::VirtualDisplay {
                        display_id: self.display_id.clone(),
                    });
                }
            }
        }

        argv.extend(["-logFile".to_string(), "-".to_string()]);
        // -batchmode is a Pro-only flag before engine 5
        if resolved.headless_args {
            argv.extend(["-batchmode".to_string(), "-nographics".to_string()]);
            vars.insert("SDL_VIDEODRIVER".into(), "dummy".into());
        }
        argv.extend(["-hidewindow".to_string(), "1".to_string()]);

        let profile = self.runtimes.profile(target.flavor)?;
        vars.extend(profile.environment(target, &self.cache_root)?);

        vars.extend(
            options
                .env_overrides
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let program = argv.remove(0);
        let plan = LaunchPlan {
            program,
            args: argv,
            env: vars,
            working_dir,
            staging,
            timeout: self.timeout,
            method,
        };

        debug!(
            target = %target,
            method = %method,
            command = %plan.command_line(),
            "Assembled launch plan"
        );

        Ok(plan)
    }
}

fn base_environment() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("RUST_BACKTRACE".to_string(), "full".to_string()),
        (env::LOG_LEVEL.to_string(), "trace".to_string()),
    ])
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Architecture, Platform};

    fn settings() -> HarnessSettings {
        HarnessSettings {
            cache_root: PathBuf::from("/cache"),
            companion_dir: PathBuf::from("/doorstop"),
            ..HarnessSettings::default()
        }
    }

    fn builder(host: HostEnvironment) -> LaunchCommandBuilder {
        let settings = settings();
        LaunchCommandBuilder::new(
            &settings,
            host,
            RuntimeRegistry::from_settings(&settings.entrypoints),
        )
    }

    fn plan_for(
        host: HostEnvironment,
        target: &str,
        engine: &str,
        options: &LaunchOptions,
    ) -> Result<LaunchPlan> {
        let target: LaunchTarget = target.parse().unwrap();
        let engine: EngineVersion = engine.parse().unwrap();
        let install = PathBuf::from("/cache/TestGame/build");
        builder(host).build(
            &LaunchSubject {
                target: &target,
                engine: &engine,
                install_dir: &install,
            },
            options,
        )
    }

    fn linux() -> HostEnvironment {
        HostEnvironment::new(Platform::Linux, Architecture::X64)
    }

    #[test]
    fn test_launcher_on_native_linux() {
        let plan = plan_for(linux(), "linux-x64-mono", "2019.4.40f1", &LaunchOptions::default())
            .unwrap();

        assert_eq!(
            plan.program,
            "/doorstop/target/x86_64-unknown-linux-gnu/release/doorstop_launcher"
        );
        assert_eq!(
            plan.args,
            vec![
                "/cache/TestGame/build/TestGame",
                "-logFile",
                "-",
                "-batchmode",
                "-nographics",
                "-hidewindow",
                "1"
            ]
        );
        assert_eq!(plan.working_dir, PathBuf::from("/cache/TestGame/build"));
        assert_eq!(plan.env["RUST_BACKTRACE"], "full");
        assert_eq!(plan.env[env::LOG_LEVEL], "trace");
        assert_eq!(plan.env[env::ASSERT_RUNTIME], "Mono");
        assert_eq!(plan.env["DISPLAY"], ":3785252");
        assert_eq!(plan.env["SDL_VIDEODRIVER"], "dummy");
        assert_eq!(plan.method, InjectionMethod::Launcher);
        assert_eq!(plan.timeout, Duration::from_secs(60));
        assert!(plan.staging.contains(&StagingStep::VirtualDisplay {
            display_id: "3785252".into()
        }));
        assert!(plan.staging.contains(&StagingStep::RequireFile(PathBuf::from(
            "/doorstop/target/x86_64-unknown-linux-gnu/release/doorstop_launcher"
        ))));
    }

    #[test]
    fn test_dll_proxy_under_wine() {
        let plan = plan_for(linux(), "win-x64-mono", "2019.4.40f1", &LaunchOptions::default())
            .unwrap();

        assert_eq!(plan.method, InjectionMethod::DllProxy);
        assert_eq!(plan.program, "wine");
        assert_eq!(plan.args[0], "/cache/TestGame/build/dll-proxy/TestGame.exe");
        assert_eq!(plan.working_dir, PathBuf::from("/cache/TestGame/build/dll-proxy"));
        assert_eq!(plan.env["WINEDLLOVERRIDES"], "winhttp=n,b");
        assert_eq!(plan.env["WINEPREFIX"], "/cache/.wine");
        assert_eq!(plan.env["WINEDEBUG"], "fixme-all");
        assert!(plan.staging.contains(&StagingStep::ShadowInstall {
            source: PathBuf::from("/cache/TestGame/build"),
            shadow: PathBuf::from("/cache/TestGame/build/dll-proxy"),
            shim: PathBuf::from("/doorstop/target/x86_64-pc-windows-msvc/release/doorstop.dll"),
            shim_name: "winhttp.dll".into(),
        }));
        assert!(plan.staging.contains(&StagingStep::WinePrefix {
            prefix: PathBuf::from("/cache/.wine")
        }));
    }

    #[test]
    fn test_launcher_under_wine_has_no_dll_override() {
        let options = LaunchOptions::default().with_method(InjectionMethod::Launcher);
        let plan = plan_for(linux(), "win-x86-mono", "2019.4.40f1", &options).unwrap();

        assert_eq!(plan.program, "wine");
        assert_eq!(
            plan.args[0],
            "/doorstop/target/i686-pc-windows-msvc/release/doorstop_launcher.exe"
        );
        assert_eq!(plan.args[1], "/cache/TestGame/build/TestGame.exe");
        assert!(!plan.env.contains_key("WINEDLLOVERRIDES"));
    }

    #[test]
    fn test_player_replaces_executable() {
        let options = LaunchOptions::default().with_method(InjectionMethod::Player);
        let plan = plan_for(linux(), "linux-x64-il2cpp", "2021.3.0f1", &options).unwrap();

        assert_eq!(
            plan.program,
            "/doorstop/target/x86_64-unknown-linux-gnu/release/doorstop_player"
        );
        assert_eq!(plan.args[0], "-logFile");
        assert_eq!(
            plan.env[env::PLAYER_EXECUTABLE],
            "/cache/TestGame/build/TestGame"
        );
        assert_eq!(plan.env[env::ASSERT_RUNTIME], "CoreCLR");
        assert_eq!(
            plan.env[env::CLR_CORLIB_DIR],
            "/cache/dotnet/linux-x64/shared/Microsoft.NETCore.App/9.0.9"
        );
    }

    #[test]
    fn test_old_engine_in_container_on_nixos() {
        let host = linux().with_nixos(true);
        let plan = plan_for(host, "linux-x64-mono", "5.6.7f1", &LaunchOptions::default()).unwrap();

        assert_eq!(plan.program, "steam-run");
        assert_eq!(
            plan.args[..4],
            [
                "/cache/SteamLinuxRuntime/SteamLinuxRuntime_sniper/run".to_string(),
                "--".to_string(),
                "/doorstop/target/x86_64-unknown-linux-gnu/release/doorstop_launcher".to_string(),
                "/cache/TestGame/build/TestGame".to_string(),
            ]
        );
        assert_eq!(plan.env["PRESSURE_VESSEL_GENERATE_LOCALES"], "0");
    }

    #[test]
    fn test_engine_4_keeps_graphics() {
        let plan = plan_for(linux(), "linux-x86-mono", "4.7.2f1", &LaunchOptions::default())
            .unwrap();
        assert!(!plan.args.contains(&"-batchmode".to_string()));
        assert!(!plan.env.contains_key("SDL_VIDEODRIVER"));
        assert!(plan.args.ends_with(&["-hidewindow".to_string(), "1".to_string()]));
    }

    #[test]
    fn test_overrides_win_over_computed_env() {
        let options = LaunchOptions::default()
            .with_env(env::LOG_LEVEL, "info")
            .with_env("DISPLAY", ":0")
            .with_scenario("throw");
        let plan = plan_for(linux(), "linux-x64-mono", "2019.4.40f1", &options).unwrap();

        assert_eq!(plan.env[env::LOG_LEVEL], "info");
        assert_eq!(plan.env["DISPLAY"], ":0");
        assert_eq!(plan.env[env::SCENARIO], "throw");
    }

    #[test]
    fn test_dll_proxy_rejected_off_windows() {
        let options = LaunchOptions::default().with_method(InjectionMethod::DllProxy);
        let err = plan_for(linux(), "linux-x64-mono", "2019.4.40f1", &options).unwrap_err();
        assert!(matches!(err, HarnessError::Domain(_)));
    }

    #[test]
    fn test_companion_artifacts() {
        let b = builder(linux());
        let engine: EngineVersion = "5.6.7f1".parse().unwrap();
        let target: LaunchTarget = "linux-x64-il2cpp".parse().unwrap();
        let install = PathBuf::from("/cache/TestGame/build");
        let subject = LaunchSubject {
            target: &target,
            engine: &engine,
            install_dir: &install,
        };

        let ids: Vec<String> = b
            .companion_artifacts(&subject)
            .unwrap()
            .iter()
            .map(|a| a.id().to_string())
            .collect();
        assert_eq!(ids, vec!["dotnet/linux-x64", "SteamLinuxRuntime"]);
    }

    #[test]
    fn test_native_windows_has_no_wrappers() {
        let host = HostEnvironment::new(Platform::Windows, Architecture::X64);
        let plan = plan_for(host, "win-x64-mono", "2019.4.40f1", &LaunchOptions::default()).unwrap();
        assert_eq!(plan.program, "/cache/TestGame/build/dll-proxy/TestGame.exe");
        assert!(!plan.env.contains_key("DISPLAY"));
        assert!(!plan.env.contains_key("WINEPREFIX"));
    }
}
