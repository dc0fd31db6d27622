// Host Probe Port
// Detects the platform facts the resolver needs (OS, CPU, NixOS)

use crate::domain::HostEnvironment;
use crate::error::Result;

pub trait HostProbe: Send + Sync {
    /// # Errors
    /// - HarnessError::Domain(UnsupportedPlatform) on hosts the harness cannot drive
    fn detect(&self) -> Result<HostEnvironment>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;

    /// Always reports the same host
    pub struct FixedHostProbe(pub HostEnvironment);

    impl HostProbe for FixedHostProbe {
        fn detect(&self) -> Result<HostEnvironment> {
            Ok(self.0.clone())
        }
    }
}
