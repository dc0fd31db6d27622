// Archive extraction (zip, gzip-tar, xz-tar)
// Blocking decoders run on the blocking pool; existing files are overwritten.

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use doorstop_harness_core::domain::ArchiveKind;
use doorstop_harness_core::{HarnessError, Result};

/// Unpack `archive` into `destination`; failures name `artifact_id`
pub async fn extract(
    artifact_id: &str,
    kind: ArchiveKind,
    archive: &Path,
    destination: &Path,
) -> Result<()> {
    let artifact_id = artifact_id.to_string();
    let archive: PathBuf = archive.to_path_buf();
    let destination: PathBuf = destination.to_path_buf();

    tokio::task::spawn_blocking(move || extract_blocking(&artifact_id, kind, &archive, &destination))
        .await
        .map_err(|e| HarnessError::Internal(format!("extraction task failed: {e}")))?
}

fn extract_blocking(artifact_id: &str, kind: ArchiveKind, archive: &Path, destination: &Path) -> Result<()> {
    let file = File::open(archive)?;
    let failed = |message: String| HarnessError::Extraction {
        artifact: artifact_id.to_string(),
        message,
    };

    match kind {
        ArchiveKind::Zip => unpack_zip(file, destination).map_err(failed),
        ArchiveKind::TarGz => unpack_tar(flate2::read::GzDecoder::new(file), destination)
            .map_err(|e| failed(e.to_string())),
        ArchiveKind::TarXz => unpack_tar(xz2::read::XzDecoder::new(file), destination)
            .map_err(|e| failed(e.to_string())),
    }
}

/// Entry-by-entry so re-extraction over partial state truncates existing files
fn unpack_zip(file: File, destination: &Path) -> std::result::Result<(), String> {
    let mut zip = zip::ZipArchive::new(file).map_err(|e| e.to_string())?;

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(|e| e.to_string())?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(format!("entry '{}' escapes the destination", entry.name()));
        };
        let target = destination.join(&relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| e.to_string())?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        // app bundles carry symlinks; the entry body is the link target
        #[cfg(unix)]
        {
            if entry.unix_mode().is_some_and(|mode| mode & 0o170000 == 0o120000) {
                let mut link = String::new();
                entry.read_to_string(&mut link).map_err(|e| e.to_string())?;
                if !link_stays_inside(&relative, Path::new(&link)) {
                    return Err(format!(
                        "symlink '{}' -> '{link}' escapes the destination",
                        entry.name()
                    ));
                }
                match std::fs::remove_file(&target) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(format!("cannot replace '{}': {e}", target.display())),
                }
                std::os::unix::fs::symlink(link, &target).map_err(|e| e.to_string())?;
                continue;
            }
        }

        let mut out = File::create(&target).map_err(|e| e.to_string())?;
        std::io::copy(&mut entry, &mut out).map_err(|e| e.to_string())?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&target, std::fs::Permissions::from_mode(mode & 0o7777))
                    .map_err(|e| e.to_string())?;
            }
        }
    }

    Ok(())
}

#[cfg_attr(not(unix), allow(dead_code))]
/// Whether a link at `entry` (relative to the destination) pointing at `link` resolves inside it
fn link_stays_inside(entry: &Path, link: &Path) -> bool {
    let mut depth = entry.parent().map_or(0, |parent| {
        parent
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .count()
    });

    for component in link.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

fn unpack_tar<R: Read>(reader: R, destination: &Path) -> std::io::Result<()> {
    let mut archive = tar::Archive::new(reader);
    archive.set_overwrite(true);
    archive.set_preserve_permissions(true);
    archive.unpack(destination)
}
