// Artifact Catalog
// The concrete artifacts a scenario depends on: test builds, managed runtime, container runtime

use std::path::{Path, PathBuf};

use crate::domain::error::{DomainError, Result};
use crate::domain::{
    ArchiveKind, Artifact, HostEnvironment, LaunchTarget, Platform, PostExtract, TestBuild,
};

/// Managed runtime shipped next to IL2CPP builds
pub const DOTNET_RUNTIME_VERSION: &str = "9.0.9";

const DOTNET_DOWNLOAD_BASE: &str = "https://builds.dotnet.microsoft.com/dotnet/Runtime";

pub const STEAM_LINUX_RUNTIME_ID: &str = "SteamLinuxRuntime";

const STEAM_LINUX_RUNTIME_URL: &str =
    "https://repo.steampowered.com/steamrt3/images/latest-public-stable/SteamLinuxRuntime_sniper.tar.xz";

/// Editor backup folder shipped inside test builds; removed to save disk space
const BUILD_BACKUP_DIR: &str = "TestGame_BackUpThisFolder_ButDontShipItWithYourGame";

/// Artifact for a test build; `executable` is relative to its install dir
pub fn test_build(build: &TestBuild, executable: &Path, host: &HostEnvironment) -> Result<Artifact> {
    let mut artifact = Artifact::new(
        format!("TestGame/{}", build.asset_stem()),
        build.url.clone(),
        build.digest.clone(),
        ArchiveKind::Zip,
    )?
    .with_post_extract(PostExtract::RemoveDir(PathBuf::from(BUILD_BACKUP_DIR)));

    if host.platform != Platform::Windows && build.target.platform != Platform::Windows {
        artifact = artifact.with_post_extract(PostExtract::MakeExecutable(executable.to_path_buf()));
    }

    Ok(artifact)
}

/// Managed runtime for `target` (IL2CPP flavor)
pub fn dotnet_runtime(target: &LaunchTarget) -> Result<Artifact> {
    let rid = target.runtime_identifier()?;
    let archive = match target.platform {
        Platform::Windows => ArchiveKind::Zip,
        Platform::Linux | Platform::MacOS => ArchiveKind::TarGz,
        Platform::Android => {
            return Err(DomainError::UnsupportedPlatform(target.platform.to_string()))
        }
    };

    let url = format!(
        "{DOTNET_DOWNLOAD_BASE}/{v}/dotnet-runtime-{v}-{rid}.{ext}",
        v = DOTNET_RUNTIME_VERSION,
        ext = archive.extension()
    );

    Artifact::new(format!("dotnet/{rid}"), url, DOTNET_RUNTIME_VERSION, archive)
}

/// Corlib directory inside an installed managed runtime
pub fn dotnet_runtime_dir(install_dir: &Path) -> PathBuf {
    install_dir
        .join("shared")
        .join("Microsoft.NETCore.App")
        .join(DOTNET_RUNTIME_VERSION)
}

/// Container runtime used for old Linux engine builds (unversioned)
pub fn steam_linux_runtime() -> Result<Artifact> {
    Artifact::new(
        STEAM_LINUX_RUNTIME_ID,
        STEAM_LINUX_RUNTIME_URL,
        "",
        ArchiveKind::TarXz,
    )
}

pub fn steam_linux_runtime_run_script(install_dir: &Path) -> PathBuf {
    install_dir.join("SteamLinuxRuntime_sniper").join("run")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Architecture;

    #[test]
    fn test_dotnet_runtime_urls() {
        let linux: LaunchTarget = "linux-x64-il2cpp".parse().unwrap();
        let artifact = dotnet_runtime(&linux).unwrap();
        assert_eq!(artifact.id(), "dotnet/linux-x64");
        assert_eq!(artifact.expected_hash, "9.0.9");
        assert_eq!(artifact.archive, ArchiveKind::TarGz);
        assert_eq!(
            artifact.url,
            "https://builds.dotnet.microsoft.com/dotnet/Runtime/9.0.9/dotnet-runtime-9.0.9-linux-x64.tar.gz"
        );

        let win: LaunchTarget = "win-x86-il2cpp".parse().unwrap();
        let artifact = dotnet_runtime(&win).unwrap();
        assert_eq!(artifact.archive, ArchiveKind::Zip);
        assert!(artifact.url.ends_with("dotnet-runtime-9.0.9-win-x86.zip"));

        let android: LaunchTarget = "android-arm64-il2cpp".parse().unwrap();
        assert!(dotnet_runtime(&android).is_err());
    }

    #[test]
    fn test_dotnet_runtime_dir() {
        assert_eq!(
            dotnet_runtime_dir(Path::new("/c/dotnet/linux-x64")),
            PathBuf::from("/c/dotnet/linux-x64/shared/Microsoft.NETCore.App/9.0.9")
        );
    }

    #[test]
    fn test_steam_runtime_is_unversioned() {
        let artifact = steam_linux_runtime().unwrap();
        assert_eq!(artifact.expected_hash, "");
        assert_eq!(artifact.archive, ArchiveKind::TarXz);
        assert_eq!(
            steam_linux_runtime_run_script(Path::new("/c/SteamLinuxRuntime")),
            PathBuf::from("/c/SteamLinuxRuntime/SteamLinuxRuntime_sniper/run")
        );
    }

    #[test]
    fn test_build_post_extract_steps() {
        let build =
            TestBuild::from_asset("2019.4.40f1-linux-x64-mono.zip", "https://x/y.zip", "sha256:ab")
                .unwrap();
        let linux = HostEnvironment::new(Platform::Linux, Architecture::X64);

        let artifact = test_build(&build, Path::new("TestGame"), &linux).unwrap();
        assert_eq!(artifact.id(), "TestGame/2019.4.40f1-linux-x64-mono");
        assert_eq!(artifact.sha256_digest(), Some("ab"));
        assert_eq!(
            artifact.post_extract,
            vec![
                PostExtract::RemoveDir(PathBuf::from(BUILD_BACKUP_DIR)),
                PostExtract::MakeExecutable(PathBuf::from("TestGame")),
            ]
        );

        let win_build =
            TestBuild::from_asset("2019.4.40f1-win-x64-mono.zip", "https://x/y.zip", "sha256:ab")
                .unwrap();
        let artifact = test_build(&win_build, Path::new("TestGame.exe"), &linux).unwrap();
        assert_eq!(artifact.post_extract.len(), 1);
    }
}
