//! Per-service lifecycle state machine.
//!
//! Every supervised unit gets two cooperating tasks: a run path
//! (dependency wait, then a launch/backoff loop) and a stop path
//! (dependent wait, TERM, grace period, KILL). They coordinate through
//! one-shot broadcast signals; the only shared mutable state is the
//! live pid and the failure/restart counters, each behind its own
//! mutex.

use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::launch::{LaunchSpec, ProcessLauncher, RunAs};
use crate::logs::LogSink;

/// Pause between a process exit and the next launch attempt.
pub(crate) const RESTART_SETTLE_DELAY: Duration = Duration::from_secs(2);
/// Extra delay per consecutive failure.
pub(crate) const RESTART_BACKOFF_STEP: Duration = Duration::from_secs(5);
/// Ceiling on the failure backoff.
pub(crate) const RESTART_BACKOFF_MAX: Duration = Duration::from_secs(60);
/// Default grace period between TERM and KILL.
pub(crate) const DEFAULT_TERM_TIMEOUT: Duration = Duration::from_secs(5);

/// Linear capped backoff: `min(failures * 5s, 60s)`.
pub(crate) fn backoff_delay(failures: u64) -> Duration {
    RESTART_BACKOFF_STEP
        .checked_mul(u32::try_from(failures).unwrap_or(u32::MAX))
        .map_or(RESTART_BACKOFF_MAX, |d| d.min(RESTART_BACKOFF_MAX))
}

/// Pre-run configuration for one supervised unit.
///
/// Handed out by [`Supervisor::add_service`](crate::Supervisor::add_service)
/// and only meaningful before the supervisor runs; the dependency set
/// is frozen at graph resolution.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub(crate) name: String,
    pub(crate) binary: PathBuf,
    pub(crate) args: Vec<String>,
    pub(crate) working_dir: Option<PathBuf>,
    pub(crate) run_as: Option<RunAs>,
    pub(crate) priority: i32,
    pub(crate) term_timeout: Duration,
    pub(crate) dependencies: BTreeSet<String>,
}

impl ServiceConfig {
    pub(crate) fn new(name: impl Into<String>, binary: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            binary: binary.into(),
            args: Vec::new(),
            working_dir: None,
            run_as: None,
            priority: 0,
            term_timeout: DEFAULT_TERM_TIMEOUT,
            dependencies: BTreeSet::new(),
        }
    }

    /// Replace the argument list with a whitespace-split string.
    pub fn add_args(&mut self, args: &str) -> &mut Self {
        self.args = args.split_whitespace().map(str::to_string).collect();
        self
    }

    /// Append a single argument verbatim (may contain whitespace).
    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Set the working directory for launched processes.
    pub fn set_working_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Declare that this service must not start before `name` has.
    pub fn add_dependency(&mut self, name: impl Into<String>) -> &mut Self {
        self.dependencies.insert(name.into());
        self
    }

    /// Set the grace period between TERM and KILL on shutdown.
    pub fn set_term_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.term_timeout = timeout;
        self
    }

    /// Set the scheduling niceness applied after each launch.
    pub fn set_priority(&mut self, priority: i32) -> Result<&mut Self, ConfigError> {
        if !(-20..=19).contains(&priority) {
            return Err(ConfigError::InvalidPriority(priority));
        }
        self.priority = priority;
        Ok(self)
    }

    /// Resolve `username` in the host user database and run the service
    /// under that identity.
    ///
    /// On platforms without POSIX credentials the name is accepted and
    /// ignored, matching the launcher's no-privilege fallback.
    pub fn set_user(&mut self, username: &str) -> Result<&mut Self, ConfigError> {
        #[cfg(unix)]
        {
            match nix::unistd::User::from_name(username) {
                Ok(Some(user)) => {
                    self.run_as = Some(RunAs {
                        uid: user.uid.as_raw(),
                        gid: user.gid.as_raw(),
                    });
                    Ok(self)
                }
                Ok(None) => Err(ConfigError::UnknownUser(username.to_string())),
                Err(e) => Err(ConfigError::UserLookup {
                    user: username.to_string(),
                    reason: e.to_string(),
                }),
            }
        }
        #[cfg(not(unix))]
        {
            let _ = username;
            Ok(self)
        }
    }

    pub(crate) fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            name: self.name.clone(),
            binary: self.binary.clone(),
            args: self.args.clone(),
            working_dir: self.working_dir.clone(),
            run_as: self.run_as,
            priority: self.priority,
        }
    }
}

/// Failure and restart accounting, owned by the run path.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ServiceStats {
    /// Consecutive failed launches/exits; reset by a clean exit.
    pub(crate) failures: u64,
    /// Cumulative launch attempts.
    pub(crate) restarts: u64,
    pub(crate) last_failure: Option<SystemTime>,
    pub(crate) last_restart: Option<SystemTime>,
}

/// A named one-shot signal belonging to another service.
#[derive(Clone)]
pub(crate) struct SignalHandle {
    pub(crate) name: String,
    pub(crate) signal: CancellationToken,
}

/// Runtime state of one supervised unit, shared between its run task
/// and its stop task.
pub(crate) struct Service {
    spec: LaunchSpec,
    term_timeout: Duration,
    launcher: Arc<dyn ProcessLauncher>,
    log_sink: Arc<dyn LogSink>,

    /// "Started" signals of the services this one requires.
    deps: Vec<SignalHandle>,
    /// "Stopped" signals of the services that require this one.
    dependents: Vec<SignalHandle>,

    /// Fired once this service has launched successfully at least once.
    started: CancellationToken,
    /// Fired once this service has fully stopped.
    stopped: CancellationToken,
    /// Internal: tells the run path to wind down. Fired by the stop
    /// path only after every dependent has stopped, so a unit others
    /// depend on keeps being supervised until they are gone.
    shutdown: CancellationToken,
    /// Internal: the run path has exited its loop.
    done: CancellationToken,
    /// Internal: grace period expired, put the process down now.
    kill: CancellationToken,

    /// Pid of the live process, if one is running.
    process: Mutex<Option<u32>>,
    stats: Mutex<ServiceStats>,
}

impl Service {
    pub(crate) fn new(
        config: &ServiceConfig,
        started: CancellationToken,
        stopped: CancellationToken,
        deps: Vec<SignalHandle>,
        dependents: Vec<SignalHandle>,
        launcher: Arc<dyn ProcessLauncher>,
        log_sink: Arc<dyn LogSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            spec: config.launch_spec(),
            term_timeout: config.term_timeout,
            launcher,
            log_sink,
            deps,
            dependents,
            started,
            stopped,
            shutdown: CancellationToken::new(),
            done: CancellationToken::new(),
            kill: CancellationToken::new(),
            process: Mutex::new(None),
            stats: Mutex::new(ServiceStats::default()),
        })
    }

    pub(crate) fn stats(&self) -> ServiceStats {
        *self.stats.lock().unwrap()
    }

    /// Run path: wait for dependencies, then launch and relaunch until
    /// shutdown.
    pub(crate) async fn run(&self) {
        for dep in &self.deps {
            info!(service = %self.spec.name, dependency = %dep.name, "waiting for dependency to start");
            tokio::select! {
                () = dep.signal.cancelled() => {}
                () = self.shutdown.cancelled() => {
                    self.done.cancel();
                    return;
                }
            }
        }

        loop {
            let failures = self.stats.lock().unwrap().failures;
            if failures > 0 {
                let delay = backoff_delay(failures);
                warn!(
                    service = %self.spec.name,
                    failures,
                    delay_secs = delay.as_secs(),
                    "delaying restart after repeated failures"
                );
                tokio::select! {
                    () = sleep(delay) => {}
                    () = self.shutdown.cancelled() => break,
                }
            }

            {
                let mut stats = self.stats.lock().unwrap();
                stats.restarts += 1;
                stats.last_restart = Some(SystemTime::now());
            }
            self.run_once().await;

            tokio::select! {
                () = sleep(RESTART_SETTLE_DELAY) => {}
                () = self.shutdown.cancelled() => break,
            }
        }
        self.done.cancel();
    }

    /// One launch-and-wait cycle.
    async fn run_once(&self) {
        let log = match self.log_sink.open(&self.spec.name) {
            Ok(file) => file,
            Err(e) => {
                // Not counted as a service failure: the unit itself
                // never ran. Retried after the settle delay.
                warn!(service = %self.spec.name, error = %e, "failed to open log sink");
                return;
            }
        };

        info!(service = %self.spec.name, binary = %self.spec.binary.display(), "starting service");
        let mut child = match self.launcher.spawn(&self.spec, log) {
            Ok(child) => child,
            Err(e) => {
                warn!(service = %self.spec.name, error = %e, "failed to start service");
                self.record_failure();
                return;
            }
        };

        if let Some(pid) = child.id() {
            *self.process.lock().unwrap() = Some(pid);
            if let Err(e) = self.launcher.set_priority(pid, self.spec.priority) {
                warn!(
                    service = %self.spec.name,
                    priority = self.spec.priority,
                    error = %e,
                    "failed to set priority"
                );
            }
        }
        self.started.cancel();

        let exited = tokio::select! {
            status = child.wait() => Some(status),
            () = self.kill.cancelled() => None,
        };
        let status = match exited {
            Some(status) => status,
            None => {
                // Grace period expired in the stop path. Put the
                // process down and wait unconditionally for the exit.
                let _ = child.start_kill();
                child.wait().await
            }
        };
        *self.process.lock().unwrap() = None;

        match status {
            Ok(status) if status.success() => {
                self.stats.lock().unwrap().failures = 0;
                info!(service = %self.spec.name, "service exited normally");
            }
            Ok(status) => {
                warn!(service = %self.spec.name, %status, "service exited abnormally");
                self.record_failure();
            }
            Err(e) => {
                warn!(service = %self.spec.name, error = %e, "wait on service failed");
                self.record_failure();
            }
        }
    }

    /// Stop path: wait out the dependents, then terminate the process
    /// with TERM, the grace period, and finally KILL.
    pub(crate) async fn stop(&self) {
        info!(service = %self.spec.name, "stopping service");
        for dep in &self.dependents {
            info!(service = %self.spec.name, dependent = %dep.name, "waiting for dependent to stop");
            dep.signal.cancelled().await;
        }

        self.shutdown.cancel();
        if let Err(e) = self.signal_term() {
            warn!(service = %self.spec.name, error = %e, "failed to deliver termination signal");
        }

        tokio::select! {
            () = self.done.cancelled() => {}
            () = sleep(self.term_timeout) => {
                warn!(
                    service = %self.spec.name,
                    timeout_secs = self.term_timeout.as_secs_f64(),
                    "grace period expired, killing service"
                );
                self.kill.cancel();
                self.done.cancelled().await;
            }
        }

        info!(
            service = %self.spec.name,
            restarts = self.stats().restarts,
            "service stopped"
        );
        self.stopped.cancel();
    }

    fn signal_term(&self) -> io::Result<()> {
        let pid = *self.process.lock().unwrap();
        match pid {
            Some(pid) => self.launcher.terminate(pid),
            None => Ok(()),
        }
    }

    fn record_failure(&self) {
        let mut stats = self.stats.lock().unwrap();
        stats.failures += 1;
        stats.last_failure = Some(SystemTime::now());
    }
}
