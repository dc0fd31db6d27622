// Process tree termination
// reason: sysinfo for descendant discovery, nix for process-group signals
//
// Launched games run in their own process group (unix); wrappers such as
// wine or the container runtime fork helpers that must not outlive a launch.

use sysinfo::{Pid, System};
use tracing::{debug, warn};

#[cfg(unix)]
use nix::sys::signal::{killpg, Signal};
#[cfg(unix)]
use nix::unistd::Pid as UnixPid;

/// Kill `root` and every descendant, best effort
pub async fn kill_tree(root: u32) {
    if let Err(e) = tokio::task::spawn_blocking(move || kill_tree_blocking(root)).await {
        warn!(pid = %root, error = %e, "Process tree kill task failed");
    }
}

fn kill_tree_blocking(root: u32) {
    let mut system = System::new();
    system.refresh_processes();

    // collected before anything dies, orphans get reparented
    let descendants = descendants(&system, root);

    #[cfg(unix)]
    {
        if let Err(e) = killpg(UnixPid::from_raw(root as i32), Signal::SIGKILL) {
            debug!(pid = %root, error = %e, "killpg failed (group already gone?)");
        }
    }

    for pid in std::iter::once(root).chain(descendants.iter().copied()) {
        if let Some(process) = system.process(Pid::from_u32(pid)) {
            process.kill();
        }
    }

    debug!(pid = %root, descendants = %descendants.len(), "Killed process tree");
}

/// Signal whatever is left of `root`'s process group after `root` itself was reaped
///
/// The reaped pid may already belong to an unrelated process, so only the
/// group is addressed. No-op off unix.
pub fn kill_group(root: u32) {
    #[cfg(unix)]
    {
        if killpg(UnixPid::from_raw(root as i32), Signal::SIGKILL).is_ok() {
            debug!(pid = %root, "Killed leftover process group members");
        }
    }
    #[cfg(not(unix))]
    {
        let _ = root;
    }
}

/// Breadth-first walk of the parent links, nearest first
fn descendants(system: &System, root: u32) -> Vec<u32> {
    let mut found: Vec<u32> = Vec::new();
    let mut frontier = vec![Pid::from_u32(root)];

    while let Some(parent) = frontier.pop() {
        for (pid, process) in system.processes() {
            if process.parent() == Some(parent) && !found.contains(&pid.as_u32()) {
                found.push(pid.as_u32());
                frontier.push(*pid);
            }
        }
    }

    found
}
