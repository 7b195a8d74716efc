//! Service descriptor file loading.
//!
//! A configuration file is a TOML document with one table per service:
//!
//! ```toml
//! [web]
//! binary = "/usr/sbin/web"
//! args = "--listen 127.0.0.1:8080"
//! dependency = "db"
//! priority = -5
//! term_timeout = "10s"
//! user = "www-data"
//! ```
//!
//! The reserved `default` table is skipped rather than registered as a
//! service. Loading is strictly configuration-time: every problem in
//! the file aborts startup with a typed error before anything runs.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::error::ConfigError;
use crate::logs::LogSink;
use crate::supervisor::Supervisor;

/// Section name that never becomes a service.
pub const RESERVED_SECTION: &str = "default";

/// Sample configuration, written out by `procwatch --create-config`.
pub const EXAMPLE: &str = r#"# procwatch sample configuration: one table per service.
# Keys: binary (required), args, dir, dependency, priority,
# term_timeout, user.

[srv_01]
binary = "/usr/local/bin/srv_01"
args = "--listen 127.0.0.1:7001"
term_timeout = "10s"
priority = -10

[srv_02]
binary = "/usr/local/bin/srv_02"
args = "--upstream 127.0.0.1:7001"
term_timeout = "10s"
dependency = "srv_01"
"#;

/// One service descriptor as it appears in the file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServiceEntry {
    binary: PathBuf,
    args: Option<String>,
    dir: Option<PathBuf>,
    dependency: Option<String>,
    priority: Option<i32>,
    term_timeout: Option<String>,
    user: Option<String>,
}

/// Error from loading a descriptor file.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// The document is not valid TOML.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A section is malformed (not a table, missing `binary`, unknown
    /// key, wrong value type).
    #[error("service {section:?}: {reason}")]
    Section {
        /// Section name.
        section: String,
        /// Deserializer description of the problem.
        reason: String,
    },

    /// A section carried an unparseable `term_timeout`.
    #[error("service {section:?} has invalid term_timeout {value:?}: {reason}")]
    TermTimeout {
        /// Section name.
        section: String,
        /// The rejected string.
        value: String,
        /// Parser description of the problem.
        reason: String,
    },

    /// A descriptor failed service-level validation.
    #[error("service {section:?}: {source}")]
    Service {
        /// Section name.
        section: String,
        /// The underlying configuration error.
        #[source]
        source: ConfigError,
    },
}

/// Register every service described in `text` with `supervisor`.
pub fn apply(text: &str, supervisor: &mut Supervisor) -> Result<(), ConfigFileError> {
    let table: toml::Table = text.parse()?;
    for (section, value) in table {
        if section == RESERVED_SECTION {
            continue;
        }
        let entry: ServiceEntry =
            value
                .try_into()
                .map_err(|e: toml::de::Error| ConfigFileError::Section {
                    section: section.clone(),
                    reason: e.message().to_string(),
                })?;

        let wrap = |source: ConfigError| ConfigFileError::Service {
            section: section.clone(),
            source,
        };
        let service = supervisor.add_service(&section, entry.binary).map_err(wrap)?;
        if let Some(args) = &entry.args {
            service.add_args(args);
        }
        if let Some(dir) = entry.dir {
            service.set_working_dir(dir);
        }
        if let Some(dependency) = entry.dependency {
            service.add_dependency(dependency);
        }
        if let Some(priority) = entry.priority {
            service.set_priority(priority).map_err(wrap)?;
        }
        if let Some(value) = &entry.term_timeout {
            let timeout =
                humantime::parse_duration(value).map_err(|e| ConfigFileError::TermTimeout {
                    section: section.clone(),
                    value: value.clone(),
                    reason: e.to_string(),
                })?;
            service.set_term_timeout(timeout);
        }
        if let Some(user) = &entry.user {
            service.set_user(user).map_err(wrap)?;
        }
    }
    Ok(())
}

/// Build a supervisor from a descriptor document.
pub fn load_str(text: &str, log_sink: Arc<dyn LogSink>) -> Result<Supervisor, ConfigFileError> {
    let mut supervisor = Supervisor::new(log_sink);
    apply(text, &mut supervisor)?;
    Ok(supervisor)
}
