// Scenario runner
//
// ensure artifacts -> assemble plan -> stage -> launch -> judge outcome, under the retry policy.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::catalog;
use super::command::{LaunchCommandBuilder, LaunchSubject};
use super::resolver::PlatformTargetResolver;
use super::retry::{RetryDecision, RetryPolicy};
use crate::domain::{Architecture, LaunchOptions, LaunchReport, ProcessOutcome, TestBuild};
use crate::error::{HarnessError, Result};
use crate::port::{ArtifactStore, LaunchStaging, ProcessLauncher};

/// Successful scenario
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    /// 1-based attempt that succeeded
    pub attempts: u32,
    pub report: LaunchReport,
}

pub struct ScenarioRunner {
    store: Arc<dyn ArtifactStore>,
    staging: Arc<dyn LaunchStaging>,
    launcher: Arc<dyn ProcessLauncher>,
    commands: LaunchCommandBuilder,
    retry: RetryPolicy,
}

impl ScenarioRunner {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        staging: Arc<dyn LaunchStaging>,
        launcher: Arc<dyn ProcessLauncher>,
        commands: LaunchCommandBuilder,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            staging,
            launcher,
            commands,
            retry,
        }
    }

    /// Run `build` as `architecture` until it passes, fails, or runs out of retries
    ///
    /// # Errors
    /// - HarnessError::Transient after the last attempt was still transient
    /// - HarnessError::ExitCodeMismatch / TimedOut on an ordinary test failure
    /// - any fatal artifact or staging error, unchanged
    pub async fn run(
        &self,
        build: &TestBuild,
        architecture: Architecture,
        options: &LaunchOptions,
        cancel: CancellationToken,
    ) -> Result<ScenarioReport> {
        let mut attempt = 1;

        loop {
            info!(
                asset = %build.asset_name,
                architecture = %architecture,
                attempt = %attempt,
                "Starting scenario attempt"
            );

            let err = match self.attempt(build, architecture, options, &cancel).await {
                Ok(report) => {
                    return Ok(ScenarioReport {
                        attempts: attempt,
                        report,
                    })
                }
                Err(e) => e,
            };

            match self.retry.decide(attempt, &err) {
                RetryDecision::Retry(delay) => {
                    wait_or_cancel(delay, &cancel).await?;
                    attempt += 1;
                }
                RetryDecision::GiveUp => {
                    error!(asset = %build.asset_name, attempt = %attempt, error = %err, "Scenario failed");
                    return Err(err);
                }
            }
        }
    }

    async fn attempt(
        &self,
        build: &TestBuild,
        architecture: Architecture,
        options: &LaunchOptions,
        cancel: &CancellationToken,
    ) -> Result<LaunchReport> {
        let target = build.target.with_architecture(architecture.require_concrete()?);
        let resolved = PlatformTargetResolver::resolve(&target, &build.engine, self.commands.host())?;

        let build_artifact = catalog::test_build(build, &resolved.executable, self.commands.host())?;
        let install_dir = self.store.ensure(&build_artifact).await?;

        let subject = LaunchSubject {
            target: &target,
            engine: &build.engine,
            install_dir: &install_dir,
        };
        for artifact in self.commands.companion_artifacts(&subject)? {
            self.store.ensure(&artifact).await?;
        }

        let plan = self.commands.build(&subject, options)?;
        self.staging.stage(&plan).await?;

        let report = self.launcher.launch(&plan, cancel.child_token()).await?;
        judge(report, options.expected_exit_code, plan.timeout)
    }
}

/// Map a terminal outcome to pass / fail / retry
fn judge(report: LaunchReport, expected: i32, timeout: Duration) -> Result<LaunchReport> {
    match &report.outcome {
        ProcessOutcome::ExitCode(code) if *code == expected => Ok(report),
        ProcessOutcome::ExitCode(code) => Err(HarnessError::ExitCodeMismatch {
            expected,
            actual: *code,
        }),
        ProcessOutcome::Retry(reason) => Err(HarnessError::Transient(reason.clone())),
        ProcessOutcome::Timeout => Err(HarnessError::TimedOut {
            after_secs: timeout.as_secs(),
        }),
    }
}

async fn wait_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = tokio::time::sleep(delay) => Ok(()),
        _ = cancel.cancelled() => Err(HarnessError::Cancelled),
    }
}
