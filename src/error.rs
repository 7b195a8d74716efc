//! Typed configuration errors.
//!
//! The supervisor has a strict two-tier failure model: everything in
//! this module is a configuration-time error, returned synchronously to
//! the registering caller before any lifecycle task starts. Runtime
//! failures (spawn errors, abnormal exits, undeliverable signals) are
//! never surfaced as errors; they feed the restart/backoff policy and
//! are only logged.

use thiserror::Error;

/// Error from service registration or dependency-graph resolution.
///
/// Any of these aborts supervisor startup entirely; a partially wired
/// supervisor is never run.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A service with this name is already registered.
    #[error("service {0:?} already exists")]
    DuplicateService(String),

    /// A declared dependency does not name a registered service.
    #[error("service {service:?} depends on unknown service {dependency:?}")]
    UnknownDependency {
        /// Service carrying the bad declaration.
        service: String,
        /// The name that failed to resolve.
        dependency: String,
    },

    /// The declared dependency graph contains a cycle.
    ///
    /// Every service on a cycle would block forever waiting for a
    /// "started" signal that can never arrive, so this is rejected at
    /// resolution time.
    #[error("dependency cycle involving service {0:?}")]
    DependencyCycle(String),

    /// Priority outside the valid niceness range.
    #[error("invalid priority {0} - must be between -20 and 19")]
    InvalidPriority(i32),

    /// The run-as user could not be resolved in the host user database.
    #[error("unknown user {0:?}")]
    UnknownUser(String),

    /// The user database lookup itself failed.
    #[error("failed to look up user {user:?}: {reason}")]
    UserLookup {
        /// The name being resolved.
        user: String,
        /// OS-level failure description.
        reason: String,
    },
}
