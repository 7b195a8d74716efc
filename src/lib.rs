//! Dependency-aware process supervisor.
//!
//! `procwatch` launches a fixed set of named external processes,
//! restarts them on failure with linear capped backoff, and starts and
//! stops them in an order derived from a declared dependency graph: a
//! service never launches before its dependencies have started, and is
//! never terminated while anything depending on it is still running.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use procwatch::{LogDir, Supervisor};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), procwatch::ConfigError> {
//! let mut supervisor = Supervisor::new(Arc::new(LogDir::new("log")));
//! supervisor.add_service("db", "/usr/sbin/db")?;
//! supervisor
//!     .add_service("web", "/usr/sbin/web")?
//!     .add_args("--listen 127.0.0.1:8080")
//!     .add_dependency("db");
//!
//! let handle = supervisor.shutdown_handle();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     handle.shutdown();
//! });
//!
//! // Blocks until every service has stopped after a shutdown request.
//! supervisor.run().await
//! # }
//! ```
//!
//! Configuration errors (duplicate names, unresolved or cyclic
//! dependencies, invalid priority or user) are returned before any
//! process launches. Runtime failures never surface as errors; a
//! failing service is retried forever at the capped backoff interval.

pub mod config;
mod error;
mod graph;
pub mod launch;
mod logs;
mod service;
mod supervisor;

pub use error::ConfigError;
pub use launch::{LaunchSpec, ProcessLauncher, RunAs, platform_launcher};
pub use logs::{LogDir, LogSink, NullLogSink};
pub use service::ServiceConfig;
pub use supervisor::{ShutdownHandle, Supervisor};
