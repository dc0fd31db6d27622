// Disk Artifact Cache
//
// ensure() protocol:
//   1. in-process guard (one populate per cache instance at a time)
//   2. marker fast path: verified artifacts cost one read and no writes
//   3. cross-process lock on `.lock`, then re-check the marker under it
//   4. fetch -> verify digest -> extract -> post-extract -> marker
// The marker is written last, so a crash anywhere before it forces a redo.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use doorstop_harness_core::domain::{
    Artifact, ArtifactState, HarnessSettings, PostExtract, HASH_MARKER_FILE, LOCK_FILE,
};
use doorstop_harness_core::port::{ArtifactSource, ArtifactStore};
use doorstop_harness_core::{HarnessError, Result};

use crate::digest::sha256_file;
use crate::extract::extract;
use crate::file_lock::{FileLock, LockOptions};
use crate::marker;

pub struct DiskArtifactCache {
    root: PathBuf,
    source: Arc<dyn ArtifactSource>,
    guard: Arc<Semaphore>,
    lock: LockOptions,
}

impl DiskArtifactCache {
    pub fn new(root: impl Into<PathBuf>, source: Arc<dyn ArtifactSource>) -> Self {
        Self {
            root: root.into(),
            source,
            guard: Arc::new(Semaphore::new(1)),
            lock: LockOptions::default(),
        }
    }

    pub fn from_settings(settings: &HarnessSettings, source: Arc<dyn ArtifactSource>) -> Self {
        Self::new(settings.cache_root.clone(), source).with_lock_options(LockOptions {
            wait: settings.lock_wait(),
            poll: settings.lock_poll(),
        })
    }

    pub fn with_lock_options(mut self, lock: LockOptions) -> Self {
        self.lock = lock;
        self
    }

    async fn populate(&self, artifact: &Artifact, install: &Path) -> Result<()> {
        let started = Instant::now();
        let marker_path = install.join(HASH_MARKER_FILE);

        // a stale marker must not survive a half-finished redo
        marker::remove(&marker_path).await?;

        let archive = install.join(format!(
            ".download-{}.{}",
            uuid::Uuid::new_v4(),
            artifact.archive.extension()
        ));
        info!(artifact = %artifact.id(), url = %artifact.url, "Downloading artifact");

        if let Err(e) = self.source.fetch(&artifact.url, &archive).await {
            remove_quietly(&archive).await;
            return Err(e);
        }

        if let Some(expected) = artifact.sha256_digest() {
            let actual = match sha256_file(&archive).await {
                Ok(actual) => actual,
                Err(e) => {
                    remove_quietly(&archive).await;
                    return Err(e);
                }
            };
            if !actual.eq_ignore_ascii_case(expected) {
                remove_quietly(&archive).await;
                return Err(HarnessError::DigestMismatch {
                    artifact: artifact.id().to_string(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        let extracted = extract(artifact.id(), artifact.archive, &archive, install).await;
        remove_quietly(&archive).await;
        extracted?;

        for step in &artifact.post_extract {
            apply_post_extract(install, step).await?;
        }

        marker::write(&marker_path, &artifact.expected_hash).await?;
        info!(
            artifact = %artifact.id(),
            elapsed_ms = %started.elapsed().as_millis(),
            "Artifact ready"
        );
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for DiskArtifactCache {
    async fn ensure(&self, artifact: &Artifact) -> Result<PathBuf> {
        let install = self.install_dir(artifact);
        let marker_path = artifact.marker_path(&self.root);

        let _permit = self
            .guard
            .acquire()
            .await
            .map_err(|e| HarnessError::Internal(format!("cache guard closed: {e}")))?;

        if marker::matches(&marker_path, &artifact.expected_hash).await? {
            debug!(artifact = %artifact.id(), "Artifact already verified");
            return Ok(install);
        }

        tokio::fs::create_dir_all(&install).await?;
        let _lock = FileLock::acquire(&artifact.lock_path(&self.root), &self.lock).await?;

        // another process may have finished while we waited
        if marker::matches(&marker_path, &artifact.expected_hash).await? {
            debug!(artifact = %artifact.id(), "Artifact verified by another holder");
            return Ok(install);
        }

        self.populate(artifact, &install).await?;
        Ok(install)
    }

    async fn state(&self, artifact: &Artifact) -> Result<ArtifactState> {
        let install = self.install_dir(artifact);

        if marker::matches(&artifact.marker_path(&self.root), &artifact.expected_hash).await? {
            return Ok(ArtifactState::Verified);
        }
        if FileLock::is_held(&artifact.lock_path(&self.root))? {
            return Ok(ArtifactState::Downloading);
        }

        let mut entries = match tokio::fs::read_dir(&install).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ArtifactState::Absent),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if name != HASH_MARKER_FILE && name != LOCK_FILE {
                return Ok(ArtifactState::ExtractedUnverified);
            }
        }
        Ok(ArtifactState::Absent)
    }

    fn install_dir(&self, artifact: &Artifact) -> PathBuf {
        artifact.install_dir(&self.root)
    }
}

async fn apply_post_extract(install: &Path, step: &PostExtract) -> Result<()> {
    match step {
        PostExtract::RemoveDir(relative) => match tokio::fs::remove_dir_all(install.join(relative)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        },
        PostExtract::MakeExecutable(relative) => make_executable(&install.join(relative)).await,
    }
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = tokio::fs::metadata(path).await?.permissions();
    permissions.set_mode(permissions.mode() | 0o700);
    tokio::fs::set_permissions(path, permissions).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove downloaded archive");
        }
    }
}
