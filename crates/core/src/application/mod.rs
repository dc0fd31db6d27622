// Application Layer - Use Cases and Harness Logic

pub mod catalog;
pub mod classifier;
pub mod command;
pub mod constants;
pub mod resolver;
pub mod retry;
pub mod runtime;
pub mod scenario;

// Re-exports
pub use classifier::{LineSignal, OutputClassifier, OutputStream};
pub use command::{LaunchCommandBuilder, LaunchSubject};
pub use resolver::{PlatformTargetResolver, ResolvedTarget, Wrapper};
pub use retry::{RetryDecision, RetryPolicy};
pub use runtime::{Il2CppProfile, MonoProfile, RuntimeProfile, RuntimeRegistry};
pub use scenario::{ScenarioReport, ScenarioRunner};
