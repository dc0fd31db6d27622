// Harness constants
use std::time::Duration;

/// Prefix of the self-reported exit line on stdout
pub const SELF_REPORT_PREFIX: &str = "Terminating with exit code ";

/// Lines of combined output kept for failure messages
pub const OUTPUT_TAIL_LINES: usize = 64;

/// How long to wait for output readers to drain after the process exited
pub const IO_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Upper bound on waiting for a killed process to be reaped
pub const KILL_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Grace period for the virtual X server to either fail or come up
/// From Xvfb startup handling
pub const VIRTUAL_DISPLAY_STARTUP: Duration = Duration::from_secs(15);

/// Upper bound on a single lock poll interval after backoff
pub const LOCK_POLL_MAX: Duration = Duration::from_secs(5);

/// Name of the symlinked shadow install used by DllProxy
pub const DLL_PROXY_DIR: &str = "dll-proxy";

/// File name the loader probes first for the target executable
pub const DLL_PROXY_SHIM_NAME: &str = "winhttp.dll";

/// Registry value that stops the compatibility layer from opening a crash dialog
pub const WINE_CRASH_DIALOG_SETTING: &str = "\"ShowCrashDialog\"=dword:00000000";
