//! Scenario runner integration tests
//!
//! Real DiskArtifactCache on a temp dir, scripted launcher outcomes.

use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use doorstop_harness_core::application::{
    LaunchCommandBuilder, RetryPolicy, RuntimeRegistry, ScenarioRunner,
};
use doorstop_harness_core::domain::{
    Architecture, HarnessSettings, HostEnvironment, LaunchOptions, Platform, ProcessOutcome,
    TestBuild, EXIT_CODE_SUCCESS,
};
use doorstop_harness_core::port::artifact_source::mocks::MockArtifactSource;
use doorstop_harness_core::port::process_launcher::mocks::MockProcessLauncher;
use doorstop_harness_core::port::staging::mocks::MockLaunchStaging;
use doorstop_harness_core::HarnessError;
use doorstop_harness_infra_cache::DiskArtifactCache;

const ASSET: &str = "2022.3.0f1-linux-x64-mono.zip";
const ASSET_STEM: &str = "2022.3.0f1-linux-x64-mono";
const BACKUP_DIR: &str = "TestGame_BackUpThisFolder_ButDontShipItWithYourGame";

fn game_zip() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    writer.start_file("TestGame", options).unwrap();
    writer.write_all(b"#!/bin/sh\n").unwrap();
    writer.start_file("TestGame_Data/globalgamemanagers", options).unwrap();
    writer.write_all(b"assets").unwrap();
    writer
        .start_file(format!("{BACKUP_DIR}/il2cpp.pdb"), options)
        .unwrap();
    writer.write_all(b"debug").unwrap();
    writer.finish().unwrap().into_inner()
}

fn sha256_digest(bytes: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(bytes)))
}

struct Fixture {
    source: Arc<MockArtifactSource>,
    launcher: Arc<MockProcessLauncher>,
    runner: ScenarioRunner,
}

fn fixture(cache_root: &Path, outcomes: Vec<ProcessOutcome>, max_attempts: u32) -> Fixture {
    let settings = HarnessSettings {
        cache_root: cache_root.to_path_buf(),
        ..HarnessSettings::default()
    };
    let host = HostEnvironment::new(Platform::Linux, Architecture::X64);
    let commands = LaunchCommandBuilder::new(
        &settings,
        host,
        RuntimeRegistry::from_settings(&settings.entrypoints),
    );

    let source = Arc::new(MockArtifactSource::new(game_zip()));
    let launcher = Arc::new(MockProcessLauncher::new(outcomes));
    let runner = ScenarioRunner::new(
        Arc::new(DiskArtifactCache::new(cache_root, source.clone())),
        Arc::new(MockLaunchStaging::new()),
        launcher.clone(),
        commands,
        RetryPolicy::new(max_attempts, Duration::ZERO),
    );

    Fixture {
        source,
        launcher,
        runner,
    }
}

fn build(digest: String) -> TestBuild {
    TestBuild::from_asset(ASSET, format!("https://example.invalid/{ASSET}"), digest).unwrap()
}

/// A transient failure is retried against the already-installed build
#[tokio::test]
async fn test_retry_reuses_installed_build() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture(
        dir.path(),
        vec![
            ProcessOutcome::Retry("X11 transient error".into()),
            ProcessOutcome::ExitCode(EXIT_CODE_SUCCESS),
        ],
        3,
    );

    let report = f
        .runner
        .run(
            &build(sha256_digest(&game_zip())),
            Architecture::X64,
            &LaunchOptions::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.attempts, 2);
    assert_eq!(f.launcher.call_count(), 2);
    assert_eq!(f.source.call_count(), 1);

    let install = dir.path().join("TestGame").join(ASSET_STEM);
    assert!(install.join("TestGame_Data/globalgamemanagers").exists());
    assert!(!install.join(BACKUP_DIR).exists());
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(install.join("TestGame")).unwrap().permissions().mode();
        assert_eq!(mode & 0o700, 0o700);
    }

    let plan = &f.launcher.launched_plans()[0];
    assert!(plan.args.contains(&install.join("TestGame").display().to_string()));
    assert_eq!(plan.working_dir, install);
    println!("✅ retried once, downloaded once");
}

/// The wrong exit code fails the scenario without another attempt
#[tokio::test]
async fn test_exit_code_mismatch_fails_once() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture(dir.path(), vec![ProcessOutcome::ExitCode(1)], 3);

    let err = f
        .runner
        .run(
            &build(sha256_digest(&game_zip())),
            Architecture::X64,
            &LaunchOptions::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        HarnessError::ExitCodeMismatch {
            expected: EXIT_CODE_SUCCESS,
            actual: 1
        }
    ));
    assert_eq!(f.launcher.call_count(), 1);
}

/// A build that never stops being transient gives up after the last attempt
#[tokio::test]
async fn test_persistent_transient_exhausts_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture(dir.path(), vec![ProcessOutcome::Retry("wine deadlock".into())], 4);

    let err = f
        .runner
        .run(
            &build(sha256_digest(&game_zip())),
            Architecture::X64,
            &LaunchOptions::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::Transient(ref reason) if reason == "wine deadlock"));
    assert_eq!(f.launcher.call_count(), 4);
    assert_eq!(f.source.call_count(), 1);
}

/// A tampered download never reaches the launcher and leaves nothing verified
#[tokio::test]
async fn test_digest_mismatch_blocks_launch() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture(dir.path(), vec![ProcessOutcome::ExitCode(EXIT_CODE_SUCCESS)], 3);

    let err = f
        .runner
        .run(
            &build(format!("sha256:{}", "0".repeat(64))),
            Architecture::X64,
            &LaunchOptions::default(),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::DigestMismatch { .. }));
    assert_eq!(f.launcher.call_count(), 0);
    assert_eq!(f.source.call_count(), 1);
    assert!(!dir.path().join("TestGame").join(ASSET_STEM).join(".hash").exists());
}
