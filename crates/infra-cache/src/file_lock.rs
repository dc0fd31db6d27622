// Cross-process lock file
//
// Advisory exclusive lock (flock on unix) on `<install>/.lock`, polled with bounded backoff + jitter.
// The file itself stays empty and is never deleted; the OS drops the lock when the holder
// closes it or dies, so a crashed holder cannot wedge the cache.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use doorstop_harness_core::application::constants::LOCK_POLL_MAX;
use doorstop_harness_core::{HarnessError, Result};

/// Maximum jitter added to each poll interval (milliseconds)
const LOCK_POLL_JITTER_MS: u64 = 100;

#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    /// Overall ceiling; exceeding it is fatal
    pub wait: Duration,
    /// First poll interval, grown up to LOCK_POLL_MAX
    pub poll: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            wait: Duration::from_secs(300),
            poll: Duration::from_millis(500),
        }
    }
}

/// Held lock; released when dropped
pub struct FileLock {
    path: PathBuf,
    #[cfg(unix)]
    _held: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _held: File,
}

impl fmt::Debug for FileLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileLock").field("path", &self.path).finish()
    }
}

impl FileLock {
    /// Try once without waiting
    ///
    /// Locks are per open file, so a second handle in the same process is refused too.
    pub fn try_acquire(path: &Path) -> Result<Option<FileLock>> {
        let lock_error = |message: String| HarnessError::Lock {
            path: path.to_path_buf(),
            message,
        };

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| lock_error(e.to_string()))?;

        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::fcntl::{Flock, FlockArg};

            match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(held) => Ok(Some(FileLock {
                    path: path.to_path_buf(),
                    _held: held,
                })),
                Err((_, errno)) if errno == Errno::EWOULDBLOCK => Ok(None),
                Err((_, errno)) => Err(lock_error(errno.desc().to_string())),
            }
        }

        #[cfg(not(unix))]
        {
            match file.try_lock() {
                Ok(()) => Ok(Some(FileLock {
                    path: path.to_path_buf(),
                    _held: file,
                })),
                Err(std::fs::TryLockError::WouldBlock) => Ok(None),
                Err(std::fs::TryLockError::Error(e)) => Err(lock_error(e.to_string())),
            }
        }
    }

    /// Poll until the lock is ours or `options.wait` elapses
    ///
    /// # Errors
    /// - HarnessError::LockTimeout after the ceiling
    /// - HarnessError::Lock if the file cannot be opened or locked for another reason
    pub async fn acquire(path: &Path, options: &LockOptions) -> Result<FileLock> {
        let started = Instant::now();
        let mut interval = options.poll;
        let mut announced = false;

        loop {
            if let Some(lock) = Self::try_acquire(path)? {
                debug!(path = %path.display(), waited_ms = %started.elapsed().as_millis(), "Acquired lock");
                return Ok(lock);
            }

            let elapsed = started.elapsed();
            if elapsed >= options.wait {
                warn!(path = %path.display(), waited_secs = %elapsed.as_secs(), "Timed out waiting for lock");
                return Err(HarnessError::LockTimeout {
                    path: PathBuf::from(path),
                    waited_secs: elapsed.as_secs(),
                });
            }

            if !announced {
                info!(path = %path.display(), "Waiting for lock");
                announced = true;
            }

            let jitter = Duration::from_millis(rand::random::<u64>() % (LOCK_POLL_JITTER_MS + 1));
            let remaining = options.wait.saturating_sub(elapsed);
            tokio::time::sleep((interval + jitter).min(remaining.max(Duration::from_millis(1)))).await;

            interval = (interval * 3 / 2).min(LOCK_POLL_MAX);
        }
    }

    /// Whether someone currently holds the lock at `path`, without waiting
    pub fn is_held(path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        Ok(Self::try_acquire(path)?.is_none())
    }
}
