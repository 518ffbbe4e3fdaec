//! The three operator workflows: hidden-service setup, web front end
//! deployment and in-place update of the deployed front end.

pub mod deploy;
pub mod setup;
pub mod update;

/// Fact holding the discovered `.onion` hostname.
pub const ONION_ADDRESS: &str = "onion_address";
/// Shown in summaries when the address was never discovered.
pub const NOT_GENERATED: &str = "(not generated)";

/// Fact keys recorded by the deploy workflow.
pub const APP_DIR: &str = "app_dir";
pub const APP_PORT: &str = "app_port";
pub const SERVICE: &str = "service";

/// Frame a title the way every workflow opens.
pub fn banner(lines: &[&str]) -> String {
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 8;
    let rule = "=".repeat(width);
    let mut out = String::new();
    out.push_str(&rule);
    out.push('\n');
    for line in lines {
        out.push_str("    ");
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&rule);
    out
}
