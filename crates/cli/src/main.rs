//! Doorstop Harness CLI - resolve, fetch and run test game builds

mod config;
mod logging;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::{Table, Tabled};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use doorstop_harness_core::application::{
    catalog, LaunchCommandBuilder, LaunchSubject, PlatformTargetResolver, RetryPolicy,
    RuntimeRegistry, ScenarioRunner,
};
use doorstop_harness_core::domain::{
    ArchiveKind, Architecture, Artifact, EngineVersion, HarnessSettings, HostEnvironment,
    InjectionMethod, LaunchOptions, LaunchTarget, Platform, RuntimeFlavor, TestBuild,
};
use doorstop_harness_core::port::{ArtifactStore, HostProbe};
use doorstop_harness_core::HarnessError;
use doorstop_harness_infra_cache::{DiskArtifactCache, HttpArtifactSource};
use doorstop_harness_infra_system::{FsLaunchStaging, SubprocessLauncher, SystemHostProbe};

const DEFAULT_ENGINE: &str = "2022.3.0f1";

#[derive(Parser)]
#[command(name = "doorstop-harness")]
#[command(about = "End-to-end harness for Doorstop injection tests", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (default: ./doorstop-harness.toml when present)
    #[arg(long, global = true, env = "DOORSTOP_HARNESS_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List launch targets with their runtime ids, wrappers and injection methods
    Targets {
        /// Engine version the methods are evaluated for
        #[arg(long, default_value = DEFAULT_ENGINE)]
        engine: EngineVersion,

        /// Only targets this host can run
        #[arg(long)]
        runnable: bool,
    },

    /// Show the launch plan for a test build without running it
    Resolve {
        /// Release asset name, e.g. 2019.4.40f1-linux-x64-mono.zip
        asset: String,

        #[arg(short, long)]
        method: Option<InjectionMethod>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Make an artifact present and verified in the cache
    Fetch {
        /// Cache-relative id, e.g. dotnet/linux-x64
        id: String,

        url: String,

        /// Expected hash; `sha256:<hex>` is also checked against the download
        #[arg(long, default_value = "")]
        hash: String,

        /// Archive format (default: guessed from the URL)
        #[arg(long)]
        archive: Option<ArchiveKind>,
    },

    /// Show the cache state of an artifact
    Status {
        id: String,

        #[arg(long, default_value = "")]
        hash: String,
    },

    /// Download, stage and run a test build scenario
    Run {
        /// Release asset name, e.g. 2019.4.40f1-linux-x64-mono.zip
        asset: String,

        /// Download URL of the asset
        #[arg(long)]
        url: String,

        /// Release digest (`sha256:<hex>`)
        #[arg(long, default_value = "")]
        digest: String,

        #[arg(short, long)]
        method: Option<InjectionMethod>,

        /// Run only this architecture of a multi-arch build
        #[arg(long)]
        arch: Option<Architecture>,

        /// Scenario name passed to the entrypoint
        #[arg(long)]
        scenario: Option<String>,

        /// Expected logical exit code (decimal or 0x-hex)
        #[arg(long, value_parser = parse_exit_code, default_value = "0xAA")]
        expected_exit_code: i32,

        /// Run the debugging scenario against a debugger on this port
        #[arg(long, conflicts_with = "scenario")]
        debug_port: Option<u16>,

        /// Extra environment for the game, KEY=VALUE (repeatable, applied last)
        #[arg(short, long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,
    },
}

#[derive(Tabled)]
struct TargetRow {
    target: String,
    #[tabled(rename = "runtime id")]
    runtime_id: String,
    #[tabled(rename = "rust triple")]
    rust_triple: String,
    runnable: String,
    wrappers: String,
    methods: String,
}

fn parse_exit_code(raw: &str) -> std::result::Result<i32, String> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => i32::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|e| format!("invalid exit code '{raw}': {e}"))
}

fn parse_env_pair(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

/// Wired adapters for one CLI invocation
struct Harness {
    settings: HarnessSettings,
    host: HostEnvironment,
    store: Arc<DiskArtifactCache>,
}

impl Harness {
    fn new(settings: HarnessSettings) -> Result<Self> {
        let host = SystemHostProbe::new().detect()?;
        let source = Arc::new(HttpArtifactSource::new()?);
        let store = Arc::new(DiskArtifactCache::from_settings(&settings, source));

        Ok(Self {
            settings,
            host,
            store,
        })
    }

    fn commands(&self) -> LaunchCommandBuilder {
        LaunchCommandBuilder::new(
            &self.settings,
            self.host.clone(),
            RuntimeRegistry::from_settings(&self.settings.entrypoints),
        )
    }

    fn runner(&self) -> ScenarioRunner {
        ScenarioRunner::new(
            self.store.clone(),
            Arc::new(FsLaunchStaging::new()),
            Arc::new(SubprocessLauncher::default()),
            self.commands(),
            RetryPolicy::from_settings(&self.settings.retry),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = config::load(cli.config.as_deref())?;
    let _log_guard = logging::init(settings.log_dir.as_deref(), cli.verbose)?;
    info!(
        version = %doorstop_harness_core::VERSION,
        cache_root = %settings.cache_root.display(),
        "Doorstop harness starting"
    );

    let harness = Harness::new(settings)?;

    match cli.command {
        Commands::Targets { engine, runnable } => print_targets(&harness.host, &engine, runnable),
        Commands::Resolve {
            asset,
            method,
            json,
        } => resolve(&harness, &asset, method, json),
        Commands::Fetch {
            id,
            url,
            hash,
            archive,
        } => fetch(&harness, id, url, hash, archive).await,
        Commands::Status { id, hash } => {
            // archive kind is irrelevant for the on-disk state
            let artifact = Artifact::new(id, "", hash, ArchiveKind::Zip)?;
            let state = harness.store.state(&artifact).await?;
            println!(
                "{} {}  {}",
                "•".bold(),
                artifact.id(),
                state.to_string().cyan()
            );
            Ok(())
        }
        Commands::Run {
            asset,
            url,
            digest,
            method,
            arch,
            scenario,
            expected_exit_code,
            debug_port,
            env,
        } => {
            let mut options = LaunchOptions::default().with_expected_exit_code(expected_exit_code);
            if let Some(method) = method {
                options = options.with_method(method);
            }
            if let Some(scenario) = scenario {
                options = options.with_scenario(&scenario);
            }
            if let Some(port) = debug_port {
                options = options.debugging(port);
            }
            for (key, value) in env {
                options = options.with_env(key, value);
            }

            let build = TestBuild::from_asset(asset, url, digest)?;
            run(&harness, &build, arch, &options).await
        }
    }
}

fn print_targets(host: &HostEnvironment, engine: &EngineVersion, runnable_only: bool) -> Result<()> {
    let mut rows = Vec::new();

    for platform in Platform::ALL {
        for architecture in Architecture::ALL {
            let target = LaunchTarget::new(platform, architecture, RuntimeFlavor::Mono);
            let runnable = PlatformTargetResolver::can_run(&target, host);
            if runnable_only && !runnable {
                continue;
            }
            let Ok(resolved) = PlatformTargetResolver::resolve(&target, engine, host) else {
                continue;
            };

            let join = |items: Vec<String>| if items.is_empty() { "-".to_string() } else { items.join(", ") };
            rows.push(TargetRow {
                target: format!("{}-{}", platform, architecture),
                runtime_id: resolved.runtime_identifier,
                rust_triple: resolved.rust_triple,
                runnable: if runnable { "yes".green().to_string() } else { "no".dimmed().to_string() },
                wrappers: join(resolved.wrappers.iter().map(|w| format!("{w:?}")).collect()),
                methods: join(
                    PlatformTargetResolver::supported_methods(&target, engine)
                        .iter()
                        .map(|m| m.to_string())
                        .collect(),
                ),
            });
        }
    }

    println!(
        "{} engine {} on {}-{}{}",
        "Targets".cyan().bold(),
        engine,
        host.platform,
        host.architecture,
        if host.is_nixos { " (NixOS)" } else { "" }
    );
    println!("{}", Table::new(rows));
    Ok(())
}

fn resolve(
    harness: &Harness,
    asset: &str,
    method: Option<InjectionMethod>,
    as_json: bool,
) -> Result<()> {
    let build = TestBuild::from_asset(asset, "", "")?;
    let commands = harness.commands();
    let options = match method {
        Some(method) => LaunchOptions::default().with_method(method),
        None => LaunchOptions::default(),
    };

    let mut plans = Vec::new();
    for architecture in build.run_architectures(&harness.host)? {
        let target = build.target.with_architecture(architecture);
        let resolved = PlatformTargetResolver::resolve(&target, &build.engine, &harness.host)?;
        let artifact = catalog::test_build(&build, &resolved.executable, &harness.host)?;
        let install_dir = harness.store.install_dir(&artifact);
        let subject = LaunchSubject {
            target: &target,
            engine: &build.engine,
            install_dir: &install_dir,
        };
        let plan = commands.build(&subject, &options)?;
        plans.push((target, resolved, plan));
    }

    if as_json {
        let value: Vec<_> = plans
            .iter()
            .map(|(target, resolved, plan)| {
                json!({
                    "target": target.to_string(),
                    "resolved": resolved,
                    "method": plan.method,
                    "program": plan.program,
                    "args": plan.args,
                    "env": plan.env,
                    "working_dir": plan.working_dir,
                    "staging": plan.staging.iter().map(|s| format!("{s:?}")).collect::<Vec<_>>(),
                    "timeout_secs": plan.timeout.as_secs(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    for (target, _, plan) in &plans {
        println!("{} {} ({})", "▶".cyan(), target.to_string().bold(), plan.method);
        println!("  {} {}", "cwd:".bold(), plan.working_dir.display());
        for (key, value) in &plan.env {
            println!("  {} {key}={value}", "env:".bold());
        }
        for step in &plan.staging {
            println!("  {} {step:?}", "stage:".bold());
        }
        println!("  {} {}", "run:".bold(), plan.command_line());
        println!();
    }
    Ok(())
}

async fn fetch(
    harness: &Harness,
    id: String,
    url: String,
    hash: String,
    archive: Option<ArchiveKind>,
) -> Result<()> {
    let archive = match archive.or_else(|| ArchiveKind::from_file_name(&url)) {
        Some(kind) => kind,
        None => anyhow::bail!("Cannot guess the archive format of {url}; pass --archive"),
    };
    let artifact = Artifact::new(id, url, hash, archive)?;

    let install_dir = harness.store.ensure(&artifact).await?;
    println!(
        "{} {} → {}",
        "✓".green().bold(),
        artifact.id(),
        install_dir.display()
    );
    Ok(())
}

async fn run(
    harness: &Harness,
    build: &TestBuild,
    only: Option<Architecture>,
    options: &LaunchOptions,
) -> Result<()> {
    if !build.is_supported_engine() {
        warn!(engine = %build.engine, "Engine is older than the entrypoint supports");
    }

    let mut architectures = build.run_architectures(&harness.host)?;
    if let Some(only) = only {
        architectures.retain(|a| *a == only);
        if architectures.is_empty() {
            anyhow::bail!("{} does not run as {only}", build.asset_name);
        }
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping the running game");
            ctrl_c.cancel();
        }
    });

    let runner = harness.runner();
    let mut failures = 0;

    for architecture in architectures {
        let label = format!("{} [{}]", build.asset_name, architecture);
        match runner.run(build, architecture, options, cancel.clone()).await {
            Ok(scenario) => {
                println!(
                    "{} {label} ({}, attempt {}, {:.1}s)",
                    "PASS".green().bold(),
                    scenario.report.outcome,
                    scenario.attempts,
                    scenario.report.elapsed.as_secs_f64()
                );
            }
            Err(HarnessError::Cancelled) => {
                println!("{} {label}", "CANCELLED".yellow().bold());
                anyhow::bail!("cancelled");
            }
            Err(e) => {
                failures += 1;
                println!("{} {label}: {e}", "FAIL".red().bold());
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} run(s) failed");
    }
    Ok(())
}
