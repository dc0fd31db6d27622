// Doorstop Harness Core - Domain Logic & Ports
// NO infrastructure dependencies: downloads, locks and processes live behind ports

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{HarnessError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
