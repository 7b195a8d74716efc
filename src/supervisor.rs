//! Service registry and the two-phase run/stop driver.
//!
//! The supervisor owns every [`ServiceConfig`] until [`Supervisor::run`]
//! is called, resolves the declared dependency names into a
//! bidirectional graph exactly once, then spawns one run task per
//! service, blocks on the shutdown trigger, spawns one stop task per
//! service, and returns when all of them report stopped. It never
//! starts a service after shutdown has begun.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::ConfigError;
use crate::graph;
use crate::launch::{ProcessLauncher, platform_launcher};
use crate::logs::LogSink;
use crate::service::{Service, ServiceConfig, SignalHandle};

/// Non-blocking, idempotent trigger for the stop sequence.
///
/// Safe to fire from a signal handler task; concurrent or repeated
/// calls collapse into a single stop sequence.
#[derive(Clone)]
pub struct ShutdownHandle {
    trigger: CancellationToken,
}

impl ShutdownHandle {
    /// Request the supervisor to begin stopping all services.
    pub fn shutdown(&self) {
        self.trigger.cancel();
    }
}

/// Registry and coordinator for a fixed set of supervised services.
pub struct Supervisor {
    services: BTreeMap<String, ServiceConfig>,
    trigger: CancellationToken,
    launcher: Arc<dyn ProcessLauncher>,
    log_sink: Arc<dyn LogSink>,
}

impl Supervisor {
    /// Create a supervisor writing process output through `log_sink`,
    /// using the launcher for the current platform.
    pub fn new(log_sink: Arc<dyn LogSink>) -> Self {
        Self::with_launcher(platform_launcher(), log_sink)
    }

    /// Create a supervisor with an explicit launcher capability.
    pub fn with_launcher(launcher: Arc<dyn ProcessLauncher>, log_sink: Arc<dyn LogSink>) -> Self {
        Self {
            services: BTreeMap::new(),
            trigger: CancellationToken::new(),
            launcher,
            log_sink,
        }
    }

    /// Register a service. Must be called for every unit before
    /// [`run`](Self::run); the returned config is only meaningful until
    /// then.
    pub fn add_service(
        &mut self,
        name: impl Into<String>,
        binary: impl Into<std::path::PathBuf>,
    ) -> Result<&mut ServiceConfig, ConfigError> {
        let name = name.into();
        if self.services.contains_key(&name) {
            return Err(ConfigError::DuplicateService(name));
        }
        let config = ServiceConfig::new(name.clone(), binary);
        Ok(self.services.entry(name).or_insert(config))
    }

    /// Whether a service with this name has been registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// The configuration registered under `name`, if any.
    pub fn config(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.get(name)
    }

    /// Handle for requesting shutdown while [`run`](Self::run) blocks.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            trigger: self.trigger.clone(),
        }
    }

    /// Resolve the dependency graph and supervise every service until
    /// shutdown completes.
    ///
    /// Resolution failures (unknown dependency name, cycle) are
    /// returned before any lifecycle task starts and before any process
    /// is launched; no partial start is possible.
    pub async fn run(self) -> Result<(), ConfigError> {
        let Self {
            services,
            trigger,
            launcher,
            log_sink,
        } = self;

        let declared = services
            .iter()
            .map(|(name, config)| (name.clone(), config.dependencies.clone()))
            .collect();
        graph::validate(&declared)?;

        // One "started" and one "stopped" broadcast signal per service,
        // wired into both directions of the resolved graph.
        struct Signals {
            started: CancellationToken,
            stopped: CancellationToken,
        }
        let signals: BTreeMap<&str, Signals> = services
            .keys()
            .map(|name| {
                (
                    name.as_str(),
                    Signals {
                        started: CancellationToken::new(),
                        stopped: CancellationToken::new(),
                    },
                )
            })
            .collect();

        let mut units = Vec::with_capacity(services.len());
        for (name, config) in &services {
            let deps = config
                .dependencies
                .iter()
                .map(|dep| SignalHandle {
                    name: dep.clone(),
                    signal: signals[dep.as_str()].started.clone(),
                })
                .collect();
            let dependents = services
                .iter()
                .filter(|(_, other)| other.dependencies.contains(name))
                .map(|(other, _)| SignalHandle {
                    name: other.clone(),
                    signal: signals[other.as_str()].stopped.clone(),
                })
                .collect();
            units.push(Service::new(
                config,
                signals[name.as_str()].started.clone(),
                signals[name.as_str()].stopped.clone(),
                deps,
                dependents,
                Arc::clone(&launcher),
                Arc::clone(&log_sink),
            ));
        }

        info!(services = units.len(), "supervisor starting");
        let run_tasks: Vec<_> = units
            .iter()
            .map(|unit| {
                let unit = Arc::clone(unit);
                tokio::spawn(async move { unit.run().await })
            })
            .collect();

        trigger.cancelled().await;
        info!("shutdown requested, stopping all services");

        let stop_tasks: Vec<_> = units
            .iter()
            .map(|unit| {
                let unit = Arc::clone(unit);
                tokio::spawn(async move { unit.stop().await })
            })
            .collect();
        for task in stop_tasks {
            let _ = task.await;
        }
        for task in run_tasks {
            let _ = task.await;
        }

        info!("all services stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::NullLogSink;

    fn supervisor() -> Supervisor {
        Supervisor::new(Arc::new(NullLogSink))
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut sup = supervisor();
        sup.add_service("web", "/bin/true").unwrap();
        assert!(matches!(
            sup.add_service("web", "/bin/false"),
            Err(ConfigError::DuplicateService(name)) if name == "web"
        ));
    }

    #[tokio::test]
    async fn unknown_dependency_aborts_before_any_launch() {
        let mut sup = supervisor();
        sup.add_service("web", "/bin/true")
            .unwrap()
            .add_dependency("db");
        match sup.run().await {
            Err(ConfigError::UnknownDependency {
                service,
                dependency,
            }) => {
                assert_eq!(service, "web");
                assert_eq!(dependency, "db");
            }
            other => panic!("expected UnknownDependency, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dependency_cycle_aborts_before_any_launch() {
        let mut sup = supervisor();
        sup.add_service("a", "/bin/true").unwrap().add_dependency("b");
        sup.add_service("b", "/bin/true").unwrap().add_dependency("a");
        assert!(matches!(
            sup.run().await,
            Err(ConfigError::DependencyCycle(_))
        ));
    }

    #[tokio::test]
    async fn empty_supervisor_runs_and_shuts_down() {
        let sup = supervisor();
        let handle = sup.shutdown_handle();
        // Idempotent: both calls collapse into one stop sequence.
        handle.shutdown();
        handle.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(1), sup.run())
            .await
            .expect("run must return after shutdown")
            .unwrap();
    }
}
