// Port Layer - Interfaces for external dependencies

pub mod artifact_source;
pub mod artifact_store;
pub mod host_probe;
pub mod process_launcher;
pub mod staging;

// Re-exports
pub use artifact_source::ArtifactSource;
pub use artifact_store::ArtifactStore;
pub use host_probe::HostProbe;
pub use process_launcher::ProcessLauncher;
pub use staging::LaunchStaging;
