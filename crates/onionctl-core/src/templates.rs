//! Text of the files this tool generates.

use std::path::Path;

use crate::config::{AppConfig, TorConfig};

/// Minimal single-instance torrc: one SOCKS port and one hidden service.
pub fn torrc(tor: &TorConfig) -> String {
    let log_dir = tor.log_dir.display();
    format!(
        "SocksPort {socks}\n\
         Log notice file {log_dir}/notice.log\n\
         Log debug file {log_dir}/debug.log\n\
         \n\
         HiddenServiceDir {dir}\n\
         HiddenServicePort {virtual_port} {target}\n",
        socks = tor.socks_port,
        dir = tor.hidden_service_dir.display(),
        virtual_port = tor.virtual_port,
        target = tor.target_addr,
    )
}

/// Flask application serving `message` at `/`.
///
/// The `return "...", 200` line is the one the landing-page patch rewrites.
pub fn flask_app(message: &str, port: u16) -> String {
    let escaped = message.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        r#"#!/usr/bin/env python3
from flask import Flask

app = Flask(__name__)

@app.route('/')
def home():
    return "{escaped}", 200

if __name__ == "__main__":
    app.run(host="0.0.0.0", port={port})
"#
    )
}

/// systemd unit running the web front end.
pub fn service_unit(app: &AppConfig, app_dir: &Path, user: &str) -> String {
    let dir = app_dir.display();
    let entry = app.app_file(app_dir);
    format!(
        "[Unit]\n\
         Description=Onion landing page\n\
         After=network.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         User={user}\n\
         WorkingDirectory={dir}\n\
         ExecStart={python} {entry}\n\
         Restart=always\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        python = app.python.display(),
        entry = entry.display(),
    )
}
