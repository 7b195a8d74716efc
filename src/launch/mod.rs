//! Platform process-launch capability.
//!
//! The service state machine is platform-agnostic; everything OS-shaped
//! about starting and signaling a child lives behind [`ProcessLauncher`].
//! Unix gets credentials, its own process group and a niceness hint;
//! other platforms get a fallback with no privilege control.

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::process::Child;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::UnixLauncher;

#[cfg(not(unix))]
mod portable;
#[cfg(not(unix))]
pub use portable::PortableLauncher;

/// Credentials a child process is switched to at launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunAs {
    /// Numeric user id.
    pub uid: u32,
    /// Primary group id of that user.
    pub gid: u32,
}

/// Everything needed to start one incarnation of a service.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Service name; becomes argv[0] where the platform allows it.
    pub name: String,
    /// Path to the binary.
    pub binary: PathBuf,
    /// Arguments (argv[1..]).
    pub args: Vec<String>,
    /// Working directory, if configured.
    pub working_dir: Option<PathBuf>,
    /// Credentials to switch to, if configured.
    pub run_as: Option<RunAs>,
    /// Scheduling niceness, -20..=19.
    pub priority: i32,
}

/// Capability for starting and signaling supervised processes.
///
/// `spawn` must redirect stdin from the null device and merge
/// stdout/stderr into `log`. `set_priority` and `terminate` are
/// best-effort: the caller logs failures and carries on.
pub trait ProcessLauncher: Send + Sync {
    /// Start the process described by `spec`.
    fn spawn(&self, spec: &LaunchSpec, log: File) -> io::Result<Child>;

    /// Apply the configured scheduling priority to a live process.
    fn set_priority(&self, pid: u32, priority: i32) -> io::Result<()>;

    /// Ask a live process to exit (graceful termination signal).
    ///
    /// A process that has already exited is not an error. The forceful
    /// kill is not delivered here; it goes through the owned child
    /// handle so every platform can escalate.
    fn terminate(&self, pid: u32) -> io::Result<()>;
}

/// The launcher for the current target platform.
pub fn platform_launcher() -> Arc<dyn ProcessLauncher> {
    #[cfg(unix)]
    {
        Arc::new(UnixLauncher)
    }
    #[cfg(not(unix))]
    {
        Arc::new(PortableLauncher)
    }
}
