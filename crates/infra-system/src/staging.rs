// Filesystem launch staging
// Applies the StagingStep list of a plan right before spawn.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use doorstop_harness_core::application::constants::WINE_CRASH_DIALOG_SETTING;
use doorstop_harness_core::domain::{LaunchPlan, StagingStep};
use doorstop_harness_core::port::LaunchStaging;
use doorstop_harness_core::{HarnessError, Result};

use crate::virtual_display::VirtualDisplay;

const WINE_USER_REGISTRY: &str = "user.reg";

pub struct FsLaunchStaging {
    /// Process-wide X server, started on first demand
    display: Mutex<Option<VirtualDisplay>>,
}

impl FsLaunchStaging {
    pub fn new() -> Self {
        Self {
            display: Mutex::new(None),
        }
    }

    async fn apply(&self, step: &StagingStep) -> Result<()> {
        match step {
            StagingStep::RequireFile(path) => require_file(path).await,
            StagingStep::ShadowInstall {
                source,
                shadow,
                shim,
                shim_name,
            } => {
                shadow_install(source, shadow, shim_name).await?;
                copy_shim(shim, &shadow.join(shim_name)).await
            }
            StagingStep::WinePrefix { prefix } => prepare_wine_prefix(prefix).await,
            StagingStep::VirtualDisplay { display_id } => {
                let mut display = self.display.lock().await;
                if display.is_none() {
                    *display = Some(VirtualDisplay::start(display_id).await?);
                }
                Ok(())
            }
        }
    }
}

impl Default for FsLaunchStaging {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LaunchStaging for FsLaunchStaging {
    async fn stage(&self, plan: &LaunchPlan) -> Result<()> {
        for step in &plan.staging {
            debug!(step = ?step, "Staging");
            self.apply(step).await?;
        }
        Ok(())
    }
}

async fn require_file(path: &Path) -> Result<()> {
    if tokio::fs::try_exists(path).await? {
        return Ok(());
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Err(HarnessError::Misconfiguration(format!(
        "{name} was not found (expected it at {})",
        path.display()
    )))
}

/// Mirror `source` into `shadow` with symlinks, once
///
/// Skips dot-files, logs, the shadow directory itself and anything named like
/// the shim (it is copied in, never linked). An existing shadow directory is
/// reused as is. The mirror is built under a hidden sibling and renamed into
/// place, so a concurrent stager either sees the whole shadow or none of it.
async fn shadow_install(source: &Path, shadow: &Path, shim_name: &str) -> Result<()> {
    if tokio::fs::try_exists(shadow).await? {
        return Ok(());
    }

    let mut entries = tokio::fs::read_dir(source).await?;
    let mut linked = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if name_str.starts_with('.')
            || name_str.ends_with(".log")
            || name_str == shim_name
            || entry.path() == shadow
        {
            continue;
        }
        linked.push((entry.path(), entry.file_type().await?.is_dir()));
    }

    let building = building_dir(shadow);
    tokio::fs::create_dir_all(&building).await?;
    for (target, is_dir) in &linked {
        let link = match target.file_name() {
            Some(name) => building.join(name),
            None => continue,
        };
        if let Err(e) = symlink(target, &link, *is_dir).await {
            let _ = tokio::fs::remove_dir_all(&building).await;
            return Err(e);
        }
    }

    if let Err(e) = tokio::fs::rename(&building, shadow).await {
        let _ = tokio::fs::remove_dir_all(&building).await;
        if tokio::fs::try_exists(shadow).await? {
            debug!(shadow = %shadow.display(), "Shadow install created concurrently");
            return Ok(());
        }
        return Err(e.into());
    }

    info!(source = %source.display(), shadow = %shadow.display(), entries = %linked.len(), "Created shadow install");
    Ok(())
}

/// Hidden sibling of `shadow`, unique per process and call
fn building_dir(shadow: &Path) -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    let name = shadow
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    shadow.with_file_name(format!(
        ".{name}.{}.{}",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    ))
}

#[cfg(unix)]
async fn symlink(target: &Path, link: &Path, _is_dir: bool) -> Result<()> {
    tokio::fs::symlink(target, link).await?;
    Ok(())
}

#[cfg(windows)]
async fn symlink(target: &Path, link: &Path, is_dir: bool) -> Result<()> {
    if is_dir {
        tokio::fs::symlink_dir(target, link).await?;
    } else {
        tokio::fs::symlink_file(target, link).await?;
    }
    Ok(())
}

/// Copy the proxy library in; a locked copy from a still-running game is kept
async fn copy_shim(shim: &Path, destination: &Path) -> Result<()> {
    match tokio::fs::copy(shim, destination).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied || is_sharing_violation(&e) => {
            if tokio::fs::try_exists(destination).await? {
                warn!(destination = %destination.display(), error = %e, "Shim is locked, keeping the existing copy");
                Ok(())
            } else {
                Err(e.into())
            }
        }
        Err(e) => Err(e.into()),
    }
}

fn is_sharing_violation(e: &std::io::Error) -> bool {
    // ERROR_SHARING_VIOLATION
    cfg!(windows) && e.raw_os_error() == Some(32)
}

/// Make sure the prefix exists and the crash dialog is off
async fn prepare_wine_prefix(prefix: &Path) -> Result<()> {
    let registry = prefix.join(WINE_USER_REGISTRY);
    match tokio::fs::read_to_string(&registry).await {
        Ok(content) if content.contains(WINE_CRASH_DIALOG_SETTING) => return Ok(()),
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    tokio::fs::create_dir_all(prefix).await?;
    info!(prefix = %prefix.display(), "Configuring wine prefix");

    let status = Command::new("wine")
        .args([
            "reg",
            "add",
            "HKEY_CURRENT_USER\\SOFTWARE\\Wine\\WineDbg",
            "/v",
            "ShowCrashDialog",
            "/t",
            "REG_DWORD",
            "/d",
            "0",
            "/f",
        ])
        .env("WINEPREFIX", prefix)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|e| HarnessError::Spawn(format!("wine: {e}")))?;

    if !status.success() {
        return Err(HarnessError::Misconfiguration(format!(
            "wine reg add failed ({status}) for prefix {}",
            prefix.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use doorstop_harness_core::domain::InjectionMethod;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn plan(staging: Vec<StagingStep>) -> LaunchPlan {
        LaunchPlan {
            program: "game".to_string(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: PathBuf::from("."),
            staging,
            timeout: Duration::from_secs(1),
            method: InjectionMethod::Launcher,
        }
    }

    #[tokio::test]
    async fn test_missing_required_file_is_misconfiguration() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = dir.path().join("doorstop_launcher");

        let err = FsLaunchStaging::new()
            .stage(&plan(vec![StagingStep::RequireFile(launcher.clone())]))
            .await
            .unwrap_err();

        match err {
            HarnessError::Misconfiguration(message) => {
                assert!(message.starts_with("doorstop_launcher was not found"));
                assert!(message.contains(&launcher.display().to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_present_file_passes() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = dir.path().join("doorstop_launcher");
        std::fs::write(&launcher, b"").unwrap();

        FsLaunchStaging::new()
            .stage(&plan(vec![StagingStep::RequireFile(launcher)]))
            .await
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shadow_install_links_payload_and_copies_shim() {
        let dir = tempfile::tempdir().unwrap();
        let install = dir.path().join("build");
        std::fs::create_dir_all(install.join("Game_Data")).unwrap();
        std::fs::write(install.join("Game.exe"), b"exe").unwrap();
        std::fs::write(install.join("Player.log"), b"log").unwrap();
        std::fs::write(install.join(".hash"), b"h").unwrap();
        let shim = dir.path().join("doorstop.dll");
        std::fs::write(&shim, b"dll").unwrap();
        let shadow = install.join("dll-proxy");

        let step = StagingStep::ShadowInstall {
            source: install.clone(),
            shadow: shadow.clone(),
            shim: shim.clone(),
            shim_name: "winhttp.dll".to_string(),
        };
        let staging = FsLaunchStaging::new();
        staging.stage(&plan(vec![step.clone()])).await.unwrap();

        let mut names: Vec<String> = std::fs::read_dir(&shadow)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["Game.exe", "Game_Data", "winhttp.dll"]);
        assert!(std::fs::symlink_metadata(shadow.join("Game.exe"))
            .unwrap()
            .file_type()
            .is_symlink());
        assert_eq!(std::fs::read(shadow.join("winhttp.dll")).unwrap(), b"dll");

        // second run reuses the shadow and refreshes the shim
        std::fs::write(&shim, b"dll2").unwrap();
        staging.stage(&plan(vec![step])).await.unwrap();
        assert_eq!(std::fs::read(shadow.join("winhttp.dll")).unwrap(), b"dll2");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_concurrent_shadow_installs_agree() {
        let dir = tempfile::tempdir().unwrap();
        let install = dir.path().join("build");
        std::fs::create_dir_all(install.join("Game_Data")).unwrap();
        std::fs::write(install.join("Game.exe"), b"exe").unwrap();
        let shim = dir.path().join("doorstop.dll");
        std::fs::write(&shim, b"dll").unwrap();
        let shadow = install.join("dll-proxy");
        let step = StagingStep::ShadowInstall {
            source: install.clone(),
            shadow: shadow.clone(),
            shim,
            shim_name: "winhttp.dll".to_string(),
        };

        // separate stagers, as separate harness processes would be
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let plan = plan(vec![step.clone()]);
                tokio::spawn(async move { FsLaunchStaging::new().stage(&plan).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut names: Vec<String> = std::fs::read_dir(&shadow)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["Game.exe", "Game_Data", "winhttp.dll"]);

        let mut leftovers: Vec<String> = std::fs::read_dir(&install)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        leftovers.sort();
        assert_eq!(leftovers, vec!["Game.exe", "Game_Data", "dll-proxy"]);
    }

    #[tokio::test]
    async fn test_configured_wine_prefix_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join(".wine");
        std::fs::create_dir_all(&prefix).unwrap();
        std::fs::write(
            prefix.join("user.reg"),
            format!("[Software\\\\Wine\\\\WineDbg]\n{WINE_CRASH_DIALOG_SETTING}\n"),
        )
        .unwrap();

        // would need wine otherwise
        FsLaunchStaging::new()
            .stage(&plan(vec![StagingStep::WinePrefix { prefix }]))
            .await
            .unwrap();
    }
}
