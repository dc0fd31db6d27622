// Launch Domain Model
//
// LaunchOptions go in, a LaunchPlan is assembled from them, a LaunchReport comes out.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::error::{DomainError, Result};

/// Ordinary success reported by the test entrypoint
pub const EXIT_CODE_SUCCESS: i32 = 0xAA;

/// Success path of the debugging scenario
pub const EXIT_CODE_DEBUGGING: i32 = 0xAB;

/// Environment variables understood by the injected entrypoint
pub mod env {
    pub const SCENARIO: &str = "DOORSTOPTESTS_SCENARIO";
    pub const ASSERT_RUNTIME: &str = "DOORSTOPTESTS_ASSERT_RUNTIME";
    pub const LOG_LEVEL: &str = "DOORSTOP_LOG_LEVEL";
    pub const TARGET_ASSEMBLY: &str = "DOORSTOP_TARGET_ASSEMBLY";
    pub const CLR_CORLIB_DIR: &str = "DOORSTOP_CLR_CORLIB_DIR";
    pub const PLAYER_EXECUTABLE: &str = "DOORSTOP_PLAYER_EXECUTABLE";
    pub const MONO_DEBUG_ENABLED: &str = "DOORSTOP_MONO_DEBUG_ENABLED";
    pub const MONO_DEBUG_CONNECT: &str = "DOORSTOP_MONO_DEBUG_CONNECT";
    pub const MONO_DEBUG_SUSPEND: &str = "DOORSTOP_MONO_DEBUG_SUSPEND";
    pub const MONO_DEBUG_ADDRESS: &str = "DOORSTOP_MONO_DEBUG_ADDRESS";
}

/// Strategy for getting harness code into the target process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InjectionMethod {
    /// Helper executable in front of the real one
    Launcher,
    /// Shim library in a symlinked shadow install (Windows only)
    DllProxy,
    /// Custom entry binary in place of the real executable
    Player,
}

impl InjectionMethod {
    pub const ALL: [InjectionMethod; 3] = [
        InjectionMethod::Launcher,
        InjectionMethod::DllProxy,
        InjectionMethod::Player,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InjectionMethod::Launcher => "launcher",
            InjectionMethod::DllProxy => "dll-proxy",
            InjectionMethod::Player => "player",
        }
    }
}

impl fmt::Display for InjectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InjectionMethod {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "launcher" => Ok(InjectionMethod::Launcher),
            "dll-proxy" | "dllproxy" => Ok(InjectionMethod::DllProxy),
            "player" => Ok(InjectionMethod::Player),
            _ => Err(DomainError::ValidationError(format!(
                "unknown injection method '{s}'"
            ))),
        }
    }
}

/// Per-launch caller options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    /// None = platform default
    pub injection_method: Option<InjectionMethod>,
    pub expected_exit_code: i32,
    /// Applied last, overriding computed variables
    pub env_overrides: BTreeMap<String, String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            injection_method: None,
            expected_exit_code: EXIT_CODE_SUCCESS,
            env_overrides: BTreeMap::new(),
        }
    }
}

impl LaunchOptions {
    pub fn with_method(mut self, method: InjectionMethod) -> Self {
        self.injection_method = Some(method);
        self
    }

    pub fn with_expected_exit_code(mut self, code: i32) -> Self {
        self.expected_exit_code = code;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_overrides.insert(key.into(), value.into());
        self
    }

    pub fn with_scenario(self, scenario: &str) -> Self {
        self.with_env(env::SCENARIO, scenario)
    }

    /// Debugging scenario: the entrypoint connects to a debugger on `127.0.0.1:<port>`
    /// and reports `EXIT_CODE_DEBUGGING` on success.
    pub fn debugging(self, port: u16) -> Self {
        self.with_scenario("debugging")
            .with_expected_exit_code(EXIT_CODE_DEBUGGING)
            .with_env(env::MONO_DEBUG_ENABLED, "true")
            .with_env(env::MONO_DEBUG_CONNECT, "true")
            .with_env(env::MONO_DEBUG_SUSPEND, "true")
            .with_env(env::MONO_DEBUG_ADDRESS, format!("127.0.0.1:{port}"))
    }
}

/// Terminal classification of one launch; exactly one variant is ever produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessOutcome {
    ExitCode(i32),
    Retry(String),
    Timeout,
}

impl fmt::Display for ProcessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessOutcome::ExitCode(code) => write!(f, "exit code {code:#X}"),
            ProcessOutcome::Retry(reason) => write!(f, "retry ({reason})"),
            ProcessOutcome::Timeout => write!(f, "timeout"),
        }
    }
}

/// Everything a launch observed
#[derive(Debug, Clone)]
pub struct LaunchReport {
    pub outcome: ProcessOutcome,
    /// OS exit code, only when the process exited on its own
    pub os_exit_code: Option<i32>,
    pub elapsed: Duration,
    /// Last lines of combined output, oldest first
    pub tail: Vec<String>,
}

/// Filesystem and service preparation done right before spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagingStep {
    /// Companion binary or executable that must exist
    RequireFile(PathBuf),
    /// Symlinked copy of `source` at `shadow` with `shim` copied in as `shim_name`
    ShadowInstall {
        source: PathBuf,
        shadow: PathBuf,
        shim: PathBuf,
        shim_name: String,
    },
    /// Compatibility-layer prefix with the crash dialog disabled
    WinePrefix { prefix: PathBuf },
    /// Virtual X server on `:<display_id>`
    VirtualDisplay { display_id: String },
}

/// Fully assembled command, ready to stage and spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: PathBuf,
    pub staging: Vec<StagingStep>,
    pub timeout: Duration,
    pub method: InjectionMethod,
}

impl LaunchPlan {
    /// Shell-ish rendering for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| {
                if part.contains(' ') {
                    format!("\"{part}\"")
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}
