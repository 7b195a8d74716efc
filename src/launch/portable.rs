//! Fallback launcher for platforms without POSIX process control.
//!
//! No credential switching, no process group, no niceness. Graceful
//! termination is unavailable, so `terminate` is a no-op and a stopping
//! service simply waits out its grace period before the in-band
//! forceful kill (delivered through the owned child handle) fires.

use std::fs::File;
use std::io;
use std::process::Stdio;

use tokio::process::{Child, Command};

use super::{LaunchSpec, ProcessLauncher};

/// Launcher with no privilege or scheduling control.
pub struct PortableLauncher;

impl ProcessLauncher for PortableLauncher {
    fn spawn(&self, spec: &LaunchSpec, log: File) -> io::Result<Child> {
        let stderr = log.try_clone()?;

        let mut cmd = Command::new(&spec.binary);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(stderr));
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        cmd.spawn()
    }

    fn set_priority(&self, _pid: u32, _priority: i32) -> io::Result<()> {
        Ok(())
    }

    fn terminate(&self, _pid: u32) -> io::Result<()> {
        Ok(())
    }
}
