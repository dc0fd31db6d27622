// Process Launcher Port
// Abstraction for running one assembled launch plan to a terminal outcome

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::{LaunchPlan, LaunchReport};
use crate::error::Result;

/// Process Launcher trait
///
/// Implementations:
/// - SubprocessLauncher: spawns the plan, classifies output lines, kills the tree (infra-system)
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Run `plan` until exactly one outcome is decided
    ///
    /// The process tree is gone by the time this returns.
    ///
    /// # Errors
    /// - HarnessError::Spawn if the process cannot be started
    /// - HarnessError::Cancelled if `cancel` fired before any outcome
    async fn launch(&self, plan: &LaunchPlan, cancel: CancellationToken) -> Result<LaunchReport>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::ProcessOutcome;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Replays scripted outcomes in order; the last one repeats
    pub struct MockProcessLauncher {
        outcomes: Arc<Mutex<VecDeque<ProcessOutcome>>>,
        plans: Arc<Mutex<Vec<LaunchPlan>>>,
    }

    impl MockProcessLauncher {
        pub fn new(outcomes: Vec<ProcessOutcome>) -> Self {
            Self {
                outcomes: Arc::new(Mutex::new(outcomes.into())),
                plans: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn new_exit(code: i32) -> Self {
            Self::new(vec![ProcessOutcome::ExitCode(code)])
        }

        pub fn call_count(&self) -> usize {
            self.plans.lock().unwrap().len()
        }

        pub fn launched_plans(&self) -> Vec<LaunchPlan> {
            self.plans.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProcessLauncher for MockProcessLauncher {
        async fn launch(&self, plan: &LaunchPlan, cancel: CancellationToken) -> Result<LaunchReport> {
            if cancel.is_cancelled() {
                return Err(crate::HarnessError::Cancelled);
            }
            self.plans.lock().unwrap().push(plan.clone());

            let outcome = {
                let mut outcomes = self.outcomes.lock().unwrap();
                if outcomes.len() > 1 {
                    outcomes.pop_front()
                } else {
                    outcomes.front().cloned()
                }
            }
            .unwrap_or(ProcessOutcome::Timeout);

            Ok(LaunchReport {
                outcome,
                os_exit_code: None,
                elapsed: Duration::from_millis(10),
                tail: vec!["mock output".to_string()],
            })
        }
    }
}
