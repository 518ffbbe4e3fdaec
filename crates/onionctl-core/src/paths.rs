use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Host path constants
// ---------------------------------------------------------------------------

pub const DEFAULT_CONFIG_FILE: &str = "/etc/onionctl/config.yaml";

pub const TORRC: &str = "/etc/tor/torrc";
pub const TOR_INSTANCES_DIR: &str = "/etc/tor/instances";
pub const TOR_DATA_DIR: &str = "/var/lib/tor";
pub const TOR_LOG_DIR: &str = "/var/log/tor";
pub const HIDDEN_SERVICE_DIR: &str = "/var/lib/tor/hidden_service";
pub const HOSTNAME_FILE: &str = "hostname";

pub const SELINUX_CONFIG: &str = "/etc/selinux/config";
pub const SSHD_CONFIG: &str = "/etc/ssh/sshd_config";

pub const SYSTEMD_UNIT_DIR: &str = "/etc/systemd/system";
pub const APP_DIR: &str = "/opt/onion_landing";
pub const APP_FILE: &str = "app.py";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// File the tor daemon writes once the hidden service directory is initialized.
pub fn hostname_file(hidden_service_dir: &Path) -> PathBuf {
    hidden_service_dir.join(HOSTNAME_FILE)
}

pub fn unit_file(unit_dir: &Path, service: &str) -> PathBuf {
    unit_dir.join(format!("{service}.service"))
}

pub fn app_file(app_dir: &Path, file_name: &str) -> PathBuf {
    app_dir.join(file_name)
}

/// Single-generation backup sibling: `app.py` → `app.bak`.
pub fn backup_path(target: &Path, extension: &str) -> PathBuf {
    target.with_extension(extension)
}
