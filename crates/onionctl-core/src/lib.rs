pub mod config;
pub mod console;
pub mod error;
pub mod host;
pub mod io;
pub mod mutator;
pub mod orchestrator;
pub mod paths;
pub mod poller;
pub mod runner;
pub mod templates;
pub mod workflow;

#[cfg(test)]
mod test_helpers;

pub use error::{ProvisionError, Result};
