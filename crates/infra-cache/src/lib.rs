// Doorstop Harness Infra Cache
// Artifact download, verification and extraction behind the ArtifactStore port

pub mod artifact_cache;
pub mod digest;
pub mod extract;
pub mod file_lock;
pub mod http_source;
pub mod marker;

pub use artifact_cache::DiskArtifactCache;
pub use file_lock::{FileLock, LockOptions};
pub use http_source::HttpArtifactSource;
