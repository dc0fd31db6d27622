// Artifact Source Port
// Where archive bytes come from (HTTP in production, canned bytes in tests)

use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;

#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Download `url` into `destination`, returning the number of bytes written
    ///
    /// A failed fetch may leave a partial file behind; callers own cleanup.
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::HarnessError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Serves fixed archive bytes for every URL
    pub struct MockArtifactSource {
        payload: Arc<Mutex<Vec<u8>>>,
        delay: Duration,
        fail_with: Option<String>,
        call_count: Arc<AtomicUsize>,
    }

    impl MockArtifactSource {
        pub fn new(payload: Vec<u8>) -> Self {
            Self {
                payload: Arc::new(Mutex::new(payload)),
                delay: Duration::ZERO,
                fail_with: None,
                call_count: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn new_failing(message: impl Into<String>) -> Self {
            Self {
                fail_with: Some(message.into()),
                ..Self::new(Vec::new())
            }
        }

        /// Sleep before writing, to widen race windows
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn set_payload(&self, payload: Vec<u8>) {
            *self.payload.lock().unwrap() = payload;
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ArtifactSource for MockArtifactSource {
        async fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
            self.call_count.fetch_add(1, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            if let Some(message) = &self.fail_with {
                return Err(HarnessError::Download {
                    url: url.to_string(),
                    message: message.clone(),
                });
            }

            let payload = self.payload.lock().unwrap().clone();
            tokio::fs::write(destination, &payload).await?;
            Ok(payload.len() as u64)
        }
    }
}
