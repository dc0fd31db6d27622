// Launch Staging Port
// Filesystem and service preparation that must happen before spawn

use async_trait::async_trait;

use crate::domain::LaunchPlan;
use crate::error::Result;

#[async_trait]
pub trait LaunchStaging: Send + Sync {
    /// Apply every staging step of `plan` in order
    ///
    /// # Errors
    /// - HarnessError::Misconfiguration when a required companion binary is missing
    async fn stage(&self, plan: &LaunchPlan) -> Result<()>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::StagingStep;
    use std::sync::{Arc, Mutex};

    /// Records steps; optionally reports the first RequireFile as missing
    #[derive(Default)]
    pub struct MockLaunchStaging {
        staged: Arc<Mutex<Vec<StagingStep>>>,
        missing_files: bool,
    }

    impl MockLaunchStaging {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn new_missing_files() -> Self {
            Self {
                missing_files: true,
                ..Self::default()
            }
        }

        pub fn staged_steps(&self) -> Vec<StagingStep> {
            self.staged.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LaunchStaging for MockLaunchStaging {
        async fn stage(&self, plan: &LaunchPlan) -> Result<()> {
            for step in &plan.staging {
                if let StagingStep::RequireFile(path) = step {
                    if self.missing_files {
                        return Err(crate::HarnessError::Misconfiguration(format!(
                            "{} was not found",
                            path.display()
                        )));
                    }
                }
                self.staged.lock().unwrap().push(step.clone());
            }
            Ok(())
        }
    }
}
