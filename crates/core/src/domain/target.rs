// Launch Target Domain Model
//
// A target is `<platform>-<arch>-<flavor>`, e.g. `linux-x64-mono` or `osx-x64arm64-il2cpp`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::error::{DomainError, Result};

/// Operating system a test build was produced for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[serde(rename = "win")]
    Windows,
    #[serde(rename = "osx")]
    MacOS,
    Linux,
    Android,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Windows,
        Platform::MacOS,
        Platform::Linux,
        Platform::Android,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "win",
            Platform::MacOS => "osx",
            Platform::Linux => "linux",
            Platform::Android => "android",
        }
    }

    /// Suffix appended to executable file names (`.exe` on Windows only)
    pub fn exe_suffix(&self) -> &'static str {
        match self {
            Platform::Windows => ".exe",
            _ => "",
        }
    }

    /// Vendor/OS part of the companion-binary target triple
    pub fn triple_suffix(&self) -> Result<&'static str> {
        match self {
            Platform::Windows => Ok("pc-windows-msvc"),
            Platform::MacOS => Ok("apple-darwin"),
            Platform::Linux => Ok("unknown-linux-gnu"),
            Platform::Android => Err(DomainError::UnsupportedPlatform(self.to_string())),
        }
    }

    /// Platform of the machine running the harness, if it is one we know
    pub fn host() -> Option<Platform> {
        match std::env::consts::OS {
            "windows" => Some(Platform::Windows),
            "macos" => Some(Platform::MacOS),
            "linux" => Some(Platform::Linux),
            "android" => Some(Platform::Android),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "win" => Ok(Platform::Windows),
            "osx" => Ok(Platform::MacOS),
            "linux" => Ok(Platform::Linux),
            "android" => Ok(Platform::Android),
            other => Err(DomainError::InvalidTarget(format!("unknown platform '{other}'"))),
        }
    }
}

/// CPU architecture of a build
///
/// `X64X86`, `X64Arm64` and `Universal` are multi-architecture build flavours.
/// They must be narrowed to a concrete architecture before anything is resolved
/// from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    X64,
    X86,
    Arm,
    Arm64,
    X64X86,
    X64Arm64,
    Universal,
}

impl Architecture {
    pub const ALL: [Architecture; 7] = [
        Architecture::X64,
        Architecture::X86,
        Architecture::Arm,
        Architecture::Arm64,
        Architecture::X64X86,
        Architecture::X64Arm64,
        Architecture::Universal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::X64 => "x64",
            Architecture::X86 => "x86",
            Architecture::Arm => "arm",
            Architecture::Arm64 => "arm64",
            Architecture::X64X86 => "x64x86",
            Architecture::X64Arm64 => "x64arm64",
            Architecture::Universal => "universal",
        }
    }

    pub fn is_concrete(&self) -> bool {
        matches!(
            self,
            Architecture::X64 | Architecture::X86 | Architecture::Arm | Architecture::Arm64
        )
    }

    /// Fails with `UniversalArchitecture` for multi-arch flavours
    pub fn require_concrete(&self) -> Result<Architecture> {
        if self.is_concrete() {
            Ok(*self)
        } else {
            Err(DomainError::UniversalArchitecture(self.to_string()))
        }
    }

    /// CPU part of the companion-binary target triple
    pub fn triple_prefix(&self) -> Result<&'static str> {
        match self.require_concrete()? {
            Architecture::X64 => Ok("x86_64"),
            Architecture::X86 => Ok("i686"),
            Architecture::Arm64 => Ok("aarch64"),
            _ => Ok("arm"),
        }
    }

    /// Architecture of the machine running the harness
    pub fn host() -> Option<Architecture> {
        match std::env::consts::ARCH {
            "x86_64" => Some(Architecture::X64),
            "x86" => Some(Architecture::X86),
            "aarch64" => Some(Architecture::Arm64),
            "arm" => Some(Architecture::Arm),
            _ => None,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Architecture {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        Architecture::ALL
            .into_iter()
            .find(|arch| arch.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| DomainError::InvalidTarget(format!("unknown architecture '{s}'")))
    }
}

/// Scripting backend of the engine build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeFlavor {
    Mono,
    Il2Cpp,
}

impl RuntimeFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeFlavor::Mono => "mono",
            RuntimeFlavor::Il2Cpp => "il2cpp",
        }
    }

    /// Value of the expected-runtime assertion passed to the entrypoint
    pub fn expected_runtime(&self) -> &'static str {
        match self {
            RuntimeFlavor::Mono => "Mono",
            RuntimeFlavor::Il2Cpp => "CoreCLR",
        }
    }
}

impl fmt::Display for RuntimeFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeFlavor {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mono" => Ok(RuntimeFlavor::Mono),
            "il2cpp" => Ok(RuntimeFlavor::Il2Cpp),
            _ => Err(DomainError::InvalidTarget(format!("unknown runtime flavor '{s}'"))),
        }
    }
}

/// Logical run target (immutable once parsed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchTarget {
    pub platform: Platform,
    pub architecture: Architecture,
    pub flavor: RuntimeFlavor,
}

impl LaunchTarget {
    pub fn new(platform: Platform, architecture: Architecture, flavor: RuntimeFlavor) -> Self {
        Self {
            platform,
            architecture,
            flavor,
        }
    }

    /// Same target with a concrete architecture picked out of a multi-arch build
    pub fn with_architecture(self, architecture: Architecture) -> Self {
        Self {
            architecture,
            ..self
        }
    }

    /// Runtime identifier, e.g. `linux-x64`
    pub fn runtime_identifier(&self) -> Result<String> {
        let arch = self.architecture.require_concrete()?;
        Ok(format!("{}-{}", self.platform, arch))
    }

    /// Companion-binary target triple, e.g. `x86_64-unknown-linux-gnu`
    pub fn rust_triple(&self) -> Result<String> {
        Ok(format!(
            "{}-{}",
            self.architecture.triple_prefix()?,
            self.platform.triple_suffix()?
        ))
    }
}

impl fmt::Display for LaunchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.platform, self.architecture, self.flavor)
    }
}

impl FromStr for LaunchTarget {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('-').collect();
        let [platform, arch, flavor] = parts.as_slice() else {
            return Err(DomainError::InvalidTarget(s.to_string()));
        };

        Ok(Self {
            platform: platform.parse()?,
            architecture: arch.parse()?,
            flavor: flavor.parse()?,
        })
    }
}

/// Engine version such as `2019.4.40f1` or `5.6.7f1`
///
/// Only (major, minor) take part in comparisons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineVersion {
    major: u32,
    minor: u32,
    raw: String,
}

impl EngineVersion {
    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn is_at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for EngineVersion {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || DomainError::InvalidEngineVersion(s.to_string());

        let mut parts = s.split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let minor = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;

        Ok(Self {
            major,
            minor,
            raw: s.to_string(),
        })
    }
}

/// Facts about the machine running the harness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEnvironment {
    pub platform: Platform,
    pub architecture: Architecture,
    /// `/etc/nixos` exists; Linux binaries need the `steam-run` sandbox
    pub is_nixos: bool,
}

impl HostEnvironment {
    pub fn new(platform: Platform, architecture: Architecture) -> Self {
        Self {
            platform,
            architecture,
            is_nixos: false,
        }
    }

    pub fn with_nixos(mut self, is_nixos: bool) -> Self {
        self.is_nixos = is_nixos;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parse_and_display() {
        let target: LaunchTarget = "osx-x64arm64-il2cpp".parse().unwrap();
        assert_eq!(target.platform, Platform::MacOS);
        assert_eq!(target.architecture, Architecture::X64Arm64);
        assert_eq!(target.flavor, RuntimeFlavor::Il2Cpp);
        assert_eq!(target.to_string(), "osx-x64arm64-il2cpp");
    }

    #[test]
    fn test_target_parse_rejects_garbage() {
        assert!("linux-x64".parse::<LaunchTarget>().is_err());
        assert!("linux-x64-mono-extra".parse::<LaunchTarget>().is_err());
        assert!("beos-x64-mono".parse::<LaunchTarget>().is_err());
        assert!("linux-sparc-mono".parse::<LaunchTarget>().is_err());
    }

    #[test]
    fn test_runtime_identifier_requires_concrete_arch() {
        let target: LaunchTarget = "win-x86-mono".parse().unwrap();
        assert_eq!(target.runtime_identifier().unwrap(), "win-x86");

        let universal: LaunchTarget = "osx-universal-mono".parse().unwrap();
        assert!(matches!(
            universal.runtime_identifier(),
            Err(DomainError::UniversalArchitecture(_))
        ));
    }

    #[test]
    fn test_rust_triple() {
        let cases = [
            ("win-x64-mono", "x86_64-pc-windows-msvc"),
            ("win-x86-mono", "i686-pc-windows-msvc"),
            ("linux-x64-il2cpp", "x86_64-unknown-linux-gnu"),
            ("osx-arm64-mono", "aarch64-apple-darwin"),
        ];
        for (text, triple) in cases {
            let target: LaunchTarget = text.parse().unwrap();
            assert_eq!(target.rust_triple().unwrap(), triple, "{text}");
        }

        let android: LaunchTarget = "android-arm64-il2cpp".parse().unwrap();
        assert!(android.rust_triple().is_err());
    }

    #[test]
    fn test_engine_version_ordering() {
        let old: EngineVersion = "4.5.5f1".parse().unwrap();
        let edge: EngineVersion = "4.6.0f3".parse().unwrap();
        let modern: EngineVersion = "2019.4.40f1".parse().unwrap();

        assert!(!old.is_at_least(4, 6));
        assert!(edge.is_at_least(4, 6));
        assert!(modern.is_at_least(4, 6));
        assert_eq!(modern.major(), 2019);
        assert_eq!(modern.to_string(), "2019.4.40f1");
        assert!("banana".parse::<EngineVersion>().is_err());
    }
}
