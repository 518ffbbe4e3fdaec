//! Bounded wait for a file that another process creates asynchronously.
//!
//! The tor daemon writes `hostname` into the hidden service directory some time
//! after it starts; there is no other signal that initialization finished.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::debug;

use crate::error::{ProvisionError, Result};
use crate::host::HostEnvironment;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollResult {
    pub path: PathBuf,
    /// Trimmed file content when the file appeared in time.
    pub value: Option<String>,
    pub elapsed: Duration,
}

impl PollResult {
    pub fn found(&self) -> bool {
        self.value.is_some()
    }

    /// Treat absence as fatal.
    pub fn require(self, max_wait: Duration) -> Result<String> {
        match self.value {
            Some(value) => Ok(value),
            None => Err(ProvisionError::Timeout {
                path: self.path,
                waited_secs: max_wait.as_secs(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Poller {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Poller {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self { interval, max_wait }
    }

    /// Check for `path` every `interval` until it exists or `max_wait` has
    /// elapsed. An absent result is only returned once `elapsed >= max_wait`.
    pub fn await_file(&self, host: &dyn HostEnvironment, path: &Path) -> Result<PollResult> {
        let start = Instant::now();
        loop {
            if host.file_exists(path) {
                // An empty file means the writer has not finished yet.
                if let Some(data) = host.read_file(path)?.filter(|d| !d.trim().is_empty()) {
                    return Ok(PollResult {
                        path: path.to_path_buf(),
                        value: Some(data.trim().to_string()),
                        elapsed: start.elapsed(),
                    });
                }
            }
            let elapsed = start.elapsed();
            if elapsed >= self.max_wait {
                return Ok(PollResult {
                    path: path.to_path_buf(),
                    value: None,
                    elapsed,
                });
            }
            let remaining = self.max_wait - elapsed;
            debug!(
                "{} not present yet ({}s elapsed)",
                path.display(),
                elapsed.as_secs()
            );
            std::thread::sleep(self.interval.min(remaining));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SystemHost;
    use crate::runner::{CommandRunner, Privilege};
    use crate::test_helpers::RecordingHost;
    use tempfile::TempDir;

    const HOSTNAME: &str = "/var/lib/tor/hidden_service/hostname";

    fn fast() -> Poller {
        Poller::new(Duration::from_millis(10), Duration::from_millis(200))
    }

    #[test]
    fn existing_file_is_returned_immediately_and_trimmed() {
        let host = RecordingHost::new().with_file(HOSTNAME, "  abcdef.onion\n");
        let result = fast().await_file(&host, Path::new(HOSTNAME)).unwrap();
        assert!(result.found());
        assert_eq!(result.value.as_deref(), Some("abcdef.onion"));
        assert!(result.elapsed < Duration::from_millis(200));
    }

    #[test]
    fn late_file_is_picked_up_before_timeout() {
        let host = RecordingHost::new().appears_after(HOSTNAME, "late.onion\n", 3);
        let result = fast().await_file(&host, Path::new(HOSTNAME)).unwrap();
        assert_eq!(result.value.as_deref(), Some("late.onion"));
        assert!(result.elapsed >= Duration::from_millis(30));
    }

    #[test]
    fn missing_file_times_out_no_earlier_than_max_wait() {
        let host = RecordingHost::new();
        let poller = Poller::new(Duration::from_millis(15), Duration::from_millis(100));
        let result = poller.await_file(&host, Path::new(HOSTNAME)).unwrap();
        assert!(!result.found());
        assert!(result.elapsed >= Duration::from_millis(100));
        assert!(result.elapsed < Duration::from_secs(5));
    }

    #[test]
    fn absent_result_requires_into_timeout() {
        let result = PollResult {
            path: PathBuf::from(HOSTNAME),
            value: None,
            elapsed: Duration::from_secs(60),
        };
        let err = result.require(Duration::from_secs(60)).unwrap_err();
        assert!(matches!(err, ProvisionError::Timeout { waited_secs: 60, .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn file_created_by_another_thread_is_seen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hostname");
        let writer_path = path.clone();
        let writer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(40));
            let tmp = writer_path.with_extension("tmp");
            std::fs::write(&tmp, "threaded.onion\n").unwrap();
            std::fs::rename(tmp, writer_path).unwrap();
        });
        let host = SystemHost::new(CommandRunner::new(Privilege::Elevated));
        let poller = Poller::new(Duration::from_millis(10), Duration::from_secs(5));
        let result = poller.await_file(&host, &path).unwrap();
        writer.join().unwrap();
        assert_eq!(result.value.as_deref(), Some("threaded.onion"));
    }
}
