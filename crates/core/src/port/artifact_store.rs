// Artifact Store Port
// reason: async-trait for object-safe async methods

use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::{Artifact, ArtifactState};
use crate::error::Result;

/// Makes artifacts present and verified on disk
///
/// Implementations:
/// - DiskArtifactCache: in-process guard + cross-process lock file (infra-cache)
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Ensure the artifact is extracted and its marker matches the expected hash
    ///
    /// Idempotent and safe to call concurrently from many tasks and processes.
    /// Returns the install directory.
    ///
    /// # Errors
    /// - HarnessError::LockTimeout if another holder keeps the lock past the ceiling
    /// - HarnessError::Download / DigestMismatch / Extraction on fetch failures
    async fn ensure(&self, artifact: &Artifact) -> Result<PathBuf>;

    /// Current on-disk lifecycle state, without taking any lock
    async fn state(&self, artifact: &Artifact) -> Result<ArtifactState>;

    fn install_dir(&self, artifact: &Artifact) -> PathBuf;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Mock store: records ensured ids, never touches the filesystem
    pub struct MockArtifactStore {
        root: PathBuf,
        ensured: Arc<Mutex<Vec<String>>>,
        fail_with: Option<String>,
    }

    impl MockArtifactStore {
        pub fn new(root: impl Into<PathBuf>) -> Self {
            Self {
                root: root.into(),
                ensured: Arc::new(Mutex::new(Vec::new())),
                fail_with: None,
            }
        }

        pub fn new_failing(message: impl Into<String>) -> Self {
            Self {
                fail_with: Some(message.into()),
                ..Self::new("/mock-cache")
            }
        }

        pub fn ensured_ids(&self) -> Vec<String> {
            self.ensured.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ArtifactStore for MockArtifactStore {
        async fn ensure(&self, artifact: &Artifact) -> Result<PathBuf> {
            if let Some(message) = &self.fail_with {
                return Err(crate::HarnessError::Download {
                    url: artifact.url.clone(),
                    message: message.clone(),
                });
            }
            self.ensured
                .lock()
                .unwrap()
                .push(artifact.id().to_string());
            Ok(self.install_dir(artifact))
        }

        async fn state(&self, artifact: &Artifact) -> Result<ArtifactState> {
            let ensured = self.ensured.lock().unwrap();
            if ensured.iter().any(|id| id == artifact.id()) {
                Ok(ArtifactState::Verified)
            } else {
                Ok(ArtifactState::Absent)
            }
        }

        fn install_dir(&self, artifact: &Artifact) -> PathBuf {
            artifact.install_dir(&self.root)
        }
    }
}
