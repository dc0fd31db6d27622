// Domain Layer - Pure harness entities, no I/O

pub mod artifact;
pub mod build;
pub mod error;
pub mod launch;
pub mod settings;
pub mod target;

// Re-exports
pub use artifact::{
    ArchiveKind, Artifact, ArtifactState, PostExtract, HASH_MARKER_FILE, LOCK_FILE, SHA256_PREFIX,
};
pub use build::TestBuild;
pub use error::DomainError;
pub use launch::{
    InjectionMethod, LaunchOptions, LaunchPlan, LaunchReport, ProcessOutcome, StagingStep,
    EXIT_CODE_DEBUGGING, EXIT_CODE_SUCCESS,
};
pub use settings::{EntrypointSettings, HarnessSettings, RetrySettings};
pub use target::{
    Architecture, EngineVersion, HostEnvironment, LaunchTarget, Platform, RuntimeFlavor,
};
