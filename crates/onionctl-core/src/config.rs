use crate::error::{ProvisionError, Result};
use crate::host::{Direction, FirewallRule, Policy};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// TorConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TorConfig {
    #[serde(default = "default_torrc_path")]
    pub torrc_path: PathBuf,
    #[serde(default = "default_socks_port")]
    pub socks_port: u16,
    /// Tor's state directory; its contents are wiped by the purge step.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_hidden_service_dir")]
    pub hidden_service_dir: PathBuf,
    /// Port exposed on the onion address.
    #[serde(default = "default_virtual_port")]
    pub virtual_port: u16,
    /// Local address the onion port is forwarded to.
    #[serde(default = "default_target_addr")]
    pub target_addr: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_tor_service")]
    pub service: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

fn default_torrc_path() -> PathBuf {
    PathBuf::from(paths::TORRC)
}

fn default_socks_port() -> u16 {
    9050
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(paths::TOR_DATA_DIR)
}

fn default_hidden_service_dir() -> PathBuf {
    PathBuf::from(paths::HIDDEN_SERVICE_DIR)
}

fn default_virtual_port() -> u16 {
    80
}

fn default_target_addr() -> String {
    "127.0.0.1:80".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(paths::TOR_LOG_DIR)
}

fn default_tor_service() -> String {
    "tor".to_string()
}

fn default_poll_interval() -> u64 {
    5
}

fn default_poll_timeout() -> u64 {
    60
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            torrc_path: default_torrc_path(),
            socks_port: default_socks_port(),
            data_dir: default_data_dir(),
            hidden_service_dir: default_hidden_service_dir(),
            virtual_port: default_virtual_port(),
            target_addr: default_target_addr(),
            log_dir: default_log_dir(),
            service: default_tor_service(),
            poll_interval_secs: default_poll_interval(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

impl TorConfig {
    pub fn hostname_file(&self) -> PathBuf {
        paths::hostname_file(&self.hidden_service_dir)
    }

    /// Whether the hidden service keys are removed along with `data_dir`.
    pub fn hidden_service_in_data_dir(&self) -> bool {
        self.hidden_service_dir.starts_with(&self.data_dir)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// PackageConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Overlay daemon plus hardening tools.
    #[serde(default = "default_base_packages")]
    pub base: Vec<String>,
    /// Runtime for the web front end.
    #[serde(default = "default_web_packages")]
    pub web: Vec<String>,
    #[serde(default = "default_time_sync_packages")]
    pub time_sync: Vec<String>,
    #[serde(default = "default_ntp_server")]
    pub ntp_server: String,
}

fn default_base_packages() -> Vec<String> {
    ["tor", "ufw", "fail2ban", "git", "build-essential", "openssl"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_web_packages() -> Vec<String> {
    ["python3", "python3-pip", "python3-flask"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_time_sync_packages() -> Vec<String> {
    vec!["ntpdate".to_string()]
}

fn default_ntp_server() -> String {
    "pool.ntp.org".to_string()
}

impl Default for PackageConfig {
    fn default() -> Self {
        Self {
            base: default_base_packages(),
            web: default_web_packages(),
            time_sync: default_time_sync_packages(),
            ntp_server: default_ntp_server(),
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_app_file")]
    pub file_name: String,
    #[serde(default = "default_app_port")]
    pub port: u16,
    #[serde(default = "default_app_service")]
    pub service: String,
    #[serde(default = "default_app_user")]
    pub user: String,
    #[serde(default = "default_python")]
    pub python: PathBuf,
    #[serde(default = "default_message")]
    pub message: String,
    #[serde(default = "default_backup_extension")]
    pub backup_extension: String,
    #[serde(default = "default_unit_dir")]
    pub unit_dir: PathBuf,
}

fn default_app_dir() -> PathBuf {
    PathBuf::from(paths::APP_DIR)
}

fn default_app_file() -> String {
    paths::APP_FILE.to_string()
}

fn default_app_port() -> u16 {
    80
}

fn default_app_service() -> String {
    "onion_landing".to_string()
}

fn default_app_user() -> String {
    "root".to_string()
}

fn default_python() -> PathBuf {
    PathBuf::from("/usr/bin/python3")
}

fn default_message() -> String {
    "Hello from the onion".to_string()
}

fn default_backup_extension() -> String {
    "bak".to_string()
}

fn default_unit_dir() -> PathBuf {
    PathBuf::from(paths::SYSTEMD_UNIT_DIR)
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            dir: default_app_dir(),
            file_name: default_app_file(),
            port: default_app_port(),
            service: default_app_service(),
            user: default_app_user(),
            python: default_python(),
            message: default_message(),
            backup_extension: default_backup_extension(),
            unit_dir: default_unit_dir(),
        }
    }
}

impl AppConfig {
    pub fn app_file(&self, dir: &Path) -> PathBuf {
        paths::app_file(dir, &self.file_name)
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub tor: TorConfig,
    #[serde(default)]
    pub packages: PackageConfig,
    /// Applied in order before the firewall is enabled.
    #[serde(default = "default_firewall")]
    pub firewall: Vec<FirewallRule>,
    #[serde(default)]
    pub app: AppConfig,
}

fn default_version() -> u32 {
    1
}

fn default_firewall() -> Vec<FirewallRule> {
    vec![
        FirewallRule::Default {
            direction: Direction::Outgoing,
            policy: Policy::Allow,
        },
        FirewallRule::Default {
            direction: Direction::Incoming,
            policy: Policy::Deny,
        },
        FirewallRule::Allow {
            port: "22/tcp".to_string(),
        },
        FirewallRule::Allow {
            port: "9050".to_string(),
        },
        FirewallRule::Allow {
            port: "80".to_string(),
        },
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            tor: TorConfig::default(),
            packages: PackageConfig::default(),
            firewall: default_firewall(),
            app: AppConfig::default(),
        }
    }
}

impl Config {
    /// Resolve the active configuration.
    ///
    /// An explicit path must exist. Without one, the system-wide file is used
    /// when present and the built-in defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ProvisionError::FileNotFound(path.to_path_buf()));
            }
            return Self::load_from(path);
        }
        let system = Path::new(paths::DEFAULT_CONFIG_FILE);
        if system.exists() {
            return Self::load_from(system);
        }
        Ok(Self::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        // An empty document is a valid "use the defaults" file.
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(data)?;
        if cfg.version != default_version() {
            return Err(ProvisionError::InvalidConfig(format!(
                "unsupported config version {} (expected {})",
                cfg.version,
                default_version()
            )));
        }
        Ok(cfg)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = self.to_yaml()?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message });
        };

        if self.tor.poll_interval_secs == 0 {
            push(
                WarnLevel::Error,
                "tor.poll_interval_secs must be greater than zero".to_string(),
            );
        }
        if self.tor.poll_timeout_secs == 0 {
            push(
                WarnLevel::Error,
                "tor.poll_timeout_secs must be greater than zero".to_string(),
            );
        }
        if self.tor.poll_interval_secs > self.tor.poll_timeout_secs {
            push(
                WarnLevel::Warning,
                format!(
                    "tor.poll_interval_secs ({}) exceeds tor.poll_timeout_secs ({}); \
                     the hostname will be checked only once",
                    self.tor.poll_interval_secs, self.tor.poll_timeout_secs
                ),
            );
        }
        if self.tor.data_dir.parent().is_none() {
            push(
                WarnLevel::Error,
                format!(
                    "tor.data_dir '{}' must not be the filesystem root",
                    self.tor.data_dir.display()
                ),
            );
        }
        if self.tor.virtual_port == 0 {
            push(
                WarnLevel::Error,
                "tor.virtual_port must be greater than zero".to_string(),
            );
        }
        if !self.tor.target_addr.contains(':') {
            push(
                WarnLevel::Error,
                format!(
                    "tor.target_addr '{}' must be host:port",
                    self.tor.target_addr
                ),
            );
        }
        if self.app.port == 0 {
            push(
                WarnLevel::Error,
                "app.port must be greater than zero".to_string(),
            );
        }
        if self.app.backup_extension.trim().is_empty() {
            push(
                WarnLevel::Error,
                "app.backup_extension must not be empty".to_string(),
            );
        }
        if self.packages.base.is_empty() {
            push(
                WarnLevel::Warning,
                "packages.base is empty; the install step will only refresh the package index"
                    .to_string(),
            );
        }
        if self.packages.web.is_empty() {
            push(
                WarnLevel::Warning,
                "packages.web is empty; the web front end runtime will not be installed"
                    .to_string(),
            );
        }
        let ssh_allowed = self.firewall.iter().any(
            |rule| matches!(rule, FirewallRule::Allow { port } if port == "22" || port == "22/tcp" || port == "ssh"),
        );
        if !ssh_allowed {
            push(
                WarnLevel::Warning,
                "firewall has no rule allowing 22/tcp; enabling it may cut off SSH access"
                    .to_string(),
            );
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_yaml_gives_defaults() {
        let cfg = Config::from_yaml("{}").unwrap();
        assert_eq!(cfg.tor.socks_port, 9050);
        assert_eq!(cfg.tor.poll_interval_secs, 5);
        assert_eq!(cfg.tor.poll_timeout_secs, 60);
        assert_eq!(
            cfg.tor.hostname_file(),
            PathBuf::from("/var/lib/tor/hidden_service/hostname")
        );
        assert_eq!(cfg.app.port, 80);
        assert_eq!(cfg.app.backup_extension, "bak");
        assert_eq!(cfg.firewall.len(), 5);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn blank_file_gives_defaults() {
        let cfg = Config::from_yaml("\n  \n").unwrap();
        assert_eq!(cfg.app.service, "onion_landing");
    }

    #[test]
    fn root_data_dir_is_an_error() {
        let cfg = Config::from_yaml("tor:\n  data_dir: /\n").unwrap();
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("tor.data_dir")));
    }

    #[test]
    fn hidden_service_dir_outside_data_dir_is_detected() {
        let mut cfg = Config::default();
        assert!(cfg.tor.hidden_service_in_data_dir());
        cfg.tor.hidden_service_dir = PathBuf::from("/srv/onion");
        assert!(!cfg.tor.hidden_service_in_data_dir());
    }

    #[test]
    fn unknown_version_is_rejected() {
        let err = Config::from_yaml("version: 2\n").unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidConfig(_)));
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let yaml = "tor:\n  poll_timeout_secs: 120\napp:\n  service: landing\n";
        let cfg = Config::from_yaml(yaml).unwrap();
        assert_eq!(cfg.tor.poll_timeout_secs, 120);
        assert_eq!(cfg.tor.poll_interval_secs, 5);
        assert_eq!(cfg.app.service, "landing");
        assert_eq!(cfg.app.file_name, "app.py");
    }

    #[test]
    fn firewall_rules_parse_from_yaml() {
        let yaml = "firewall:\n  - rule: default\n    direction: incoming\n    policy: deny\n  - rule: allow\n    port: 22/tcp\n";
        let cfg = Config::from_yaml(yaml).unwrap();
        assert_eq!(cfg.firewall.len(), 2);
        assert_eq!(
            cfg.firewall[1],
            FirewallRule::Allow {
                port: "22/tcp".to_string()
            }
        );
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        let mut cfg = Config::default();
        cfg.app.message = "Custom landing".to_string();
        cfg.save(&path).unwrap();
        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.app.message, "Custom landing");
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.yaml");
        let err = Config::load(Some(&missing)).unwrap_err();
        assert!(matches!(err, ProvisionError::FileNotFound(_)));
    }

    #[test]
    fn zero_interval_is_an_error() {
        let mut cfg = Config::default();
        cfg.tor.poll_interval_secs = 0;
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("poll_interval_secs")));
    }

    #[test]
    fn interval_above_timeout_warns() {
        let mut cfg = Config::default();
        cfg.tor.poll_interval_secs = 90;
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, WarnLevel::Warning);
    }

    #[test]
    fn missing_ssh_rule_warns() {
        let mut cfg = Config::default();
        cfg.firewall.retain(|r| !matches!(r, FirewallRule::Allow { port } if port == "22/tcp"));
        let warnings = cfg.validate();
        assert!(warnings.iter().any(|w| w.message.contains("SSH")));
    }
}
