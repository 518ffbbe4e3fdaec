use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("this command must run as root or be able to escalate with sudo: {0}")]
    Privilege(String),

    #[error("invalid input: {0}")]
    Input(String),

    #[error("console input closed while waiting for an answer")]
    EndOfInput,

    #[error("command failed ({}): {command}: {stderr}", status_label(.status))]
    Command {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("{} did not appear within {waited_secs}s", .path.display())]
    Timeout { path: PathBuf, waited_secs: u64 },

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("no replaceable return line found in {}", .0.display())]
    NoMatch(PathBuf),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl ProvisionError {
    /// Soft errors abort only the current action; everything else ends the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ProvisionError::Input(_) | ProvisionError::FileNotFound(_) | ProvisionError::NoMatch(_)
        )
    }
}

fn status_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit {code}"),
        None => "killed by signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_and_fatal_classes() {
        assert!(!ProvisionError::Input("maybe".into()).is_fatal());
        assert!(!ProvisionError::FileNotFound(PathBuf::from("/x")).is_fatal());
        assert!(!ProvisionError::NoMatch(PathBuf::from("/x")).is_fatal());
        assert!(ProvisionError::EndOfInput.is_fatal());
        assert!(ProvisionError::Privilege("uid 1000".into()).is_fatal());
        assert!(ProvisionError::Timeout {
            path: PathBuf::from("/var/lib/tor/hidden_service/hostname"),
            waited_secs: 60,
        }
        .is_fatal());
    }

    #[test]
    fn command_error_mentions_status_and_stderr() {
        let err = ProvisionError::Command {
            command: "apt-get install -y tor".into(),
            status: Some(100),
            stderr: "E: Unable to locate package tor".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit 100"));
        assert!(msg.contains("apt-get install -y tor"));
        assert!(msg.contains("Unable to locate package"));
    }
}
