//! Append-only human-readable event log

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tracing::warn;

use crate::clock::Clock;

/// Timestamped line log (`[YYYY-MM-DD HH:MM:SS] message`)
#[derive(Clone)]
pub struct EventLog {
    path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").field("path", &self.path).finish()
    }
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            clock,
        }
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Append one line. Failures are reported through tracing only.
    pub fn record(&self, message: impl AsRef<str>) {
        let line = format!(
            "[{}] {}\n",
            self.clock.now().with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
            message.as_ref()
        );

        if let Err(e) = self.append(&line) {
            warn!(path = ?self.path, error = %e, "failed to write event log");
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}

#[cfg(test)]
pub(crate) fn read_lines(log: &EventLog) -> Vec<String> {
    std::fs::read_to_string(log.path())
        .unwrap_or_default()
        .lines()
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_record_appends_timestamped_lines() {
        let dir = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
        let log = EventLog::new(dir.path().join("logs").join("security.log"), Arc::new(clock));

        log.record("first");
        log.record("second");

        let lines = read_lines(&log);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('['));
        assert!(lines[0].ends_with("] first"));
        assert!(lines[1].ends_with("] second"));
    }

    #[test]
    fn test_record_unwritable_path_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let clock = ManualClock::new(Utc::now());
        let log = EventLog::new(blocker.join("security.log"), Arc::new(clock));

        log.record("dropped");
        assert!(read_lines(&log).is_empty());
    }
}
