//! Per-service log sinks.
//!
//! The supervisor core only needs an already-open appendable file to
//! hand a child process as merged stdout/stderr; where that file lives
//! is the sink's concern. `LogDir` is the production implementation
//! (one `<name>.log` per service), `NullLogSink` discards everything
//! and exists for tests and embedders that capture output elsewhere.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::Local;

/// Source of per-service log files.
///
/// `open` is called once per launch attempt and must return a file the
/// child can append to; every incarnation of the service writes its raw
/// stdout/stderr bytes to the same sink.
pub trait LogSink: Send + Sync {
    /// Open (or reopen) the sink for the named service.
    fn open(&self, service: &str) -> io::Result<File>;
}

/// Directory of `<service>.log` files, opened in append mode.
///
/// The first open for a given service in the lifetime of this sink
/// writes a one-line header banner, so each supervisor start is visible
/// in the log; later opens (restarts of the same service) append raw
/// process output only.
pub struct LogDir {
    dir: PathBuf,
    opened: Mutex<HashSet<String>>,
}

impl LogDir {
    /// Create a sink rooted at `dir`. The directory is created lazily
    /// on first open.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            opened: Mutex::new(HashSet::new()),
        }
    }
}

impl LogSink for LogDir {
    fn open(&self, service: &str) -> io::Result<File> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{service}.log"));
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        let first = self.opened.lock().unwrap().insert(service.to_string());
        if first {
            writeln!(
                file,
                "--- {service} (stdout/stderr) supervisor started {} ---",
                Local::now().format("%Y/%m/%d %H:%M:%S")
            )?;
        }
        Ok(file)
    }
}

/// Sink that discards all process output via the platform null device.
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn open(&self, _service: &str) -> io::Result<File> {
        let null = if cfg!(windows) { "NUL" } else { "/dev/null" };
        OpenOptions::new().write(true).open(null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn banner_written_once_per_supervisor_start() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LogDir::new(dir.path());

        let mut f = sink.open("web").unwrap();
        writeln!(f, "first incarnation").unwrap();
        drop(f);
        let mut f = sink.open("web").unwrap();
        writeln!(f, "second incarnation").unwrap();
        drop(f);

        let mut text = String::new();
        File::open(dir.path().join("web.log"))
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text.matches("supervisor started").count(), 1);
        assert!(text.contains("first incarnation"));
        assert!(text.contains("second incarnation"));
    }

    #[test]
    fn services_get_separate_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = LogDir::new(dir.path());
        sink.open("a").unwrap();
        sink.open("b").unwrap();
        assert!(dir.path().join("a.log").exists());
        assert!(dir.path().join("b.log").exists());
    }

    #[test]
    fn null_sink_accepts_writes() {
        let mut f = NullLogSink.open("anything").unwrap();
        writeln!(f, "discarded").unwrap();
    }
}
