// Doorstop Harness Infrastructure - System Adapters
// Implements: ProcessLauncher, LaunchStaging, HostProbe

pub mod process_tree;
pub mod staging;
pub mod subprocess_launcher;
pub mod system_host_probe;
pub mod virtual_display;

pub use staging::FsLaunchStaging;
pub use subprocess_launcher::SubprocessLauncher;
pub use system_host_probe::SystemHostProbe;
pub use virtual_display::VirtualDisplay;
