// Subprocess launcher
// reason: async-trait, tokio for async process management
//
// One launch resolves to exactly one outcome, whichever comes first:
//   - a decisive output line (self-reported exit code, transient signature)
//   - natural exit (a self-report seen while draining still wins over the OS code)
//   - timeout
//   - external cancellation (surfaced as an error, never as an outcome)
// Every path kills the process tree; after a natural exit only the leftover group is signalled.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use doorstop_harness_core::application::constants::{
    IO_DRAIN_TIMEOUT, KILL_WAIT_TIMEOUT, OUTPUT_TAIL_LINES,
};
use doorstop_harness_core::application::{LineSignal, OutputClassifier, OutputStream};
use doorstop_harness_core::domain::{LaunchPlan, LaunchReport, ProcessOutcome};
use doorstop_harness_core::port::ProcessLauncher;
use doorstop_harness_core::{HarnessError, Result};

use crate::process_tree::{kill_group, kill_tree};

type Tail = Arc<Mutex<VecDeque<String>>>;

/// What ended the wait on the child
enum Trigger {
    Signal(LineSignal),
    Exited(std::io::Result<ExitStatus>),
    Timeout,
    Cancelled,
}

pub struct SubprocessLauncher {
    classifier: Arc<OutputClassifier>,
}

impl SubprocessLauncher {
    pub fn new(classifier: OutputClassifier) -> Self {
        Self {
            classifier: Arc::new(classifier),
        }
    }

    fn spawn(&self, plan: &LaunchPlan) -> Result<Child> {
        let mut command = Command::new(&plan.program);
        command
            .args(&plan.args)
            .envs(&plan.env)
            .current_dir(&plan.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // own process group, so the whole tree can be signalled at once
        #[cfg(unix)]
        command.process_group(0);

        command
            .spawn()
            .map_err(|e| HarnessError::Spawn(format!("{}: {e}", plan.program)))
    }

    /// Read one stream line by line until EOF
    ///
    /// Lines are decoded lossily; game logs are not guaranteed to be UTF-8.
    fn spawn_reader<R>(
        &self,
        stream: OutputStream,
        reader: R,
        tail: Tail,
        decided: Arc<AtomicBool>,
        signals: mpsc::UnboundedSender<LineSignal>,
    ) -> JoinHandle<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let classifier = self.classifier.clone();

        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            let mut buf = Vec::new();

            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(stream = %stream.as_str(), error = %e, "Output reader failed");
                        break;
                    }
                }

                // keep draining after a decision so the child never blocks on a full pipe
                if decided.load(Ordering::SeqCst) {
                    continue;
                }

                let raw = String::from_utf8_lossy(&buf);
                let line = raw.trim_end_matches(['\r', '\n']);
                debug!(stream = %stream.as_str(), "{}", line);

                if let Ok(mut tail) = tail.lock() {
                    if tail.len() == OUTPUT_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line.to_string());
                }

                if let Some(signal) = classifier.classify(stream, line) {
                    let _ = signals.send(signal);
                }
            }
        })
    }
}

impl Default for SubprocessLauncher {
    fn default() -> Self {
        Self::new(OutputClassifier::standard())
    }
}

#[async_trait]
impl ProcessLauncher for SubprocessLauncher {
    async fn launch(&self, plan: &LaunchPlan, cancel: CancellationToken) -> Result<LaunchReport> {
        let started = Instant::now();
        info!(
            command = %plan.command_line(),
            working_dir = %plan.working_dir.display(),
            method = %plan.method,
            timeout_secs = %plan.timeout.as_secs(),
            "Launching"
        );

        let mut child = self.spawn(plan)?;
        let pid = child.id();

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HarnessError::Internal("child stdout was not piped".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| HarnessError::Internal("child stderr was not piped".to_string()))?;

        let tail: Tail = Arc::new(Mutex::new(VecDeque::with_capacity(OUTPUT_TAIL_LINES)));
        let decided = Arc::new(AtomicBool::new(false));
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();

        let readers = [
            self.spawn_reader(
                OutputStream::Stdout,
                stdout,
                tail.clone(),
                decided.clone(),
                signal_tx.clone(),
            ),
            self.spawn_reader(
                OutputStream::Stderr,
                stderr,
                tail.clone(),
                decided.clone(),
                signal_tx,
            ),
        ];

        let deadline = tokio::time::sleep(plan.timeout);
        tokio::pin!(deadline);

        let trigger = tokio::select! {
            biased;
            Some(signal) = signal_rx.recv() => Trigger::Signal(signal),
            status = child.wait() => Trigger::Exited(status),
            _ = &mut deadline => Trigger::Timeout,
            _ = cancel.cancelled() => Trigger::Cancelled,
        };

        let (outcome, os_exit_code) = match trigger {
            Trigger::Exited(status) => {
                let status = status?;
                let [stdout_reader, stderr_reader] = readers;
                let drained = tokio::time::timeout(IO_DRAIN_TIMEOUT, async {
                    let _ = stdout_reader.await;
                    let _ = stderr_reader.await;
                })
                .await;
                if drained.is_err() {
                    warn!(pid = ?pid, "Output still open after exit (orphaned children?)");
                }
                decided.store(true, Ordering::SeqCst);
                if let Some(pid) = pid {
                    kill_group(pid);
                }

                let os_code = exit_code(&status);
                let outcome = match signal_rx.try_recv() {
                    Ok(LineSignal::ExitCode(code)) => ProcessOutcome::ExitCode(code),
                    Ok(LineSignal::Retry(reason)) => ProcessOutcome::Retry(reason),
                    Err(_) => ProcessOutcome::ExitCode(os_code),
                };
                (outcome, Some(os_code))
            }
            trigger => {
                decided.store(true, Ordering::SeqCst);
                terminate(&mut child, pid).await;
                for reader in readers {
                    reader.abort();
                }

                match trigger {
                    Trigger::Signal(LineSignal::ExitCode(code)) => (ProcessOutcome::ExitCode(code), None),
                    Trigger::Signal(LineSignal::Retry(reason)) => (ProcessOutcome::Retry(reason), None),
                    Trigger::Timeout => {
                        warn!(pid = ?pid, timeout_secs = %plan.timeout.as_secs(), "Launch timed out");
                        (ProcessOutcome::Timeout, None)
                    }
                    _ => {
                        info!(pid = ?pid, "Launch cancelled");
                        return Err(HarnessError::Cancelled);
                    }
                }
            }
        };

        let elapsed = started.elapsed();
        let tail: Vec<String> = tail
            .lock()
            .map(|lines| lines.iter().cloned().collect())
            .unwrap_or_default();

        info!(
            pid = ?pid,
            outcome = %outcome,
            os_exit_code = ?os_exit_code,
            elapsed_ms = %elapsed.as_millis(),
            "Launch finished"
        );

        Ok(LaunchReport {
            outcome,
            os_exit_code,
            elapsed,
            tail,
        })
    }
}

/// Kill the tree and reap the child, bounded
async fn terminate(child: &mut Child, pid: Option<u32>) {
    if let Some(pid) = pid {
        kill_tree(pid).await;
    }
    let _ = child.start_kill();

    match tokio::time::timeout(KILL_WAIT_TIMEOUT, child.wait()).await {
        Ok(Ok(status)) => debug!(pid = ?pid, status = %status, "Killed process reaped"),
        Ok(Err(e)) => warn!(pid = ?pid, error = %e, "Failed to reap killed process"),
        Err(_) => warn!(pid = ?pid, "Killed process did not exit in time"),
    }
}

/// Exit code, or 128 + signal for signal deaths (shell convention)
fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}
