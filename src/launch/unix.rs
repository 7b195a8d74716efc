//! POSIX launcher: credentials, process group, argv0 and niceness.

use std::fs::File;
use std::io;
use std::process::Stdio;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

use super::{LaunchSpec, ProcessLauncher};

/// Launcher using POSIX credential and process-group attributes.
pub struct UnixLauncher;

impl ProcessLauncher for UnixLauncher {
    fn spawn(&self, spec: &LaunchSpec, log: File) -> io::Result<Child> {
        let stderr = log.try_clone()?;

        let mut cmd = Command::new(&spec.binary);
        cmd.args(&spec.args)
            .arg0(&spec.name)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(stderr));
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        if let Some(ids) = spec.run_as {
            cmd.uid(ids.uid).gid(ids.gid);
        }
        // Own process group, so signals aimed at the supervisor do not
        // reach supervised children directly.
        cmd.process_group(0);

        cmd.spawn()
    }

    #[allow(unsafe_code)]
    fn set_priority(&self, pid: u32, priority: i32) -> io::Result<()> {
        // SAFETY: setpriority only takes scalar arguments and touches no
        // memory owned by this process.
        let rc = unsafe {
            libc::setpriority(libc::PRIO_PROCESS as _, pid as libc::id_t, priority)
        };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            Ok(()) => Ok(()),
            // Already exited between our pid snapshot and the signal.
            Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(io::Error::from_raw_os_error(e as i32)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::{LogSink, NullLogSink};
    use std::path::PathBuf;

    fn spec(binary: &str, args: &[&str]) -> LaunchSpec {
        LaunchSpec {
            name: "test".to_string(),
            binary: PathBuf::from(binary),
            args: args.iter().map(|a| (*a).to_string()).collect(),
            working_dir: None,
            run_as: None,
            priority: 0,
        }
    }

    #[tokio::test]
    async fn spawns_and_reaps_a_child() {
        let log = NullLogSink.open("test").unwrap();
        let mut child = UnixLauncher.spawn(&spec("/bin/sh", &["-c", "exit 0"]), log).unwrap();
        let status = child.wait().await.unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn terminate_delivers_sigterm() {
        let log = NullLogSink.open("test").unwrap();
        let mut child = UnixLauncher.spawn(&spec("/bin/sleep", &["30"]), log).unwrap();
        let pid = child.id().unwrap();
        UnixLauncher.terminate(pid).unwrap();
        let status = child.wait().await.unwrap();
        assert!(!status.success());
    }

    #[test]
    fn terminate_of_nonexistent_pid_is_not_an_error() {
        // Positive pid far beyond any platform's pid ceiling, so ESRCH
        // is guaranteed without signaling a real process.
        UnixLauncher.terminate(0x7fff_fff0).unwrap();
    }

    #[test]
    fn set_priority_rejects_unknown_pid() {
        // pid 0 targets our own process group; use an (almost certainly)
        // dead pid instead to exercise the error path.
        assert!(UnixLauncher.set_priority(u32::MAX - 1, 0).is_err());
    }
}
