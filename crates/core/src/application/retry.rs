// Retry logic
//
// Bounded linear backoff for transient launch failures only.
// Lock timeouts, download failures and exit-code mismatches are never retried.
use std::time::Duration;
use tracing::warn;

use crate::domain::RetrySettings;
use crate::error::HarnessError;

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-run the whole launch after this delay
    Retry(Duration),
    /// Surface the error unchanged
    GiveUp,
}

/// Retry policy
///
/// delay = base_delay * attempt
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Arguments
    /// * `max_attempts` - Total launches allowed, including the first
    /// * `base_delay` - Delay after the first failed attempt
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            Duration::from_secs(settings.base_delay_secs),
        )
    }

    /// Decide what to do after `attempt` (1-based) failed with `error`
    ///
    /// Emits one warning per retry.
    pub fn decide(&self, attempt: u32, error: &HarnessError) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::GiveUp;
        }

        if attempt >= self.max_attempts {
            warn!(
                attempt = %attempt,
                max_attempts = %self.max_attempts,
                error = %error,
                "Max retry attempts reached"
            );
            return RetryDecision::GiveUp;
        }

        let delay = self.base_delay * attempt;

        warn!(
            attempt = %attempt,
            max_attempts = %self.max_attempts,
            delay_ms = %delay.as_millis(),
            error = %error,
            "Retrying launch after transient failure"
        );

        RetryDecision::Retry(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn policy() -> RetryPolicy {
        RetryPolicy::from_settings(&RetrySettings::default())
    }

    #[test]
    fn test_linear_backoff() {
        let err = HarnessError::Transient("wine deadlock".into());
        assert_eq!(
            policy().decide(1, &err),
            RetryDecision::Retry(Duration::from_secs(10))
        );
        assert_eq!(
            policy().decide(2, &err),
            RetryDecision::Retry(Duration::from_secs(20))
        );
        assert_eq!(policy().decide(3, &err), RetryDecision::GiveUp);
    }

    #[test]
    fn test_fatal_errors_are_not_retried() {
        let fatal = [
            HarnessError::TimedOut { after_secs: 60 },
            HarnessError::ExitCodeMismatch {
                expected: 0xAA,
                actual: 0,
            },
            HarnessError::LockTimeout {
                path: PathBuf::from("/c/.lock"),
                waited_secs: 300,
            },
            HarnessError::Download {
                url: "u".into(),
                message: "503".into(),
            },
            HarnessError::Misconfiguration("doorstop_launcher missing".into()),
        ];
        for err in &fatal {
            assert_eq!(policy().decide(1, err), RetryDecision::GiveUp, "{err}");
        }
    }

    #[test]
    fn test_single_attempt_policy() {
        let policy = RetryPolicy::new(1, Duration::from_millis(1));
        assert_eq!(
            policy.decide(1, &HarnessError::Transient("x".into())),
            RetryDecision::GiveUp
        );
    }
}
