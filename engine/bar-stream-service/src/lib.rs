//! Bar Stream Service Library
//!
//! Configuration loading, logging setup and the run loop behind the `bar-stream` binary.

pub mod config;
pub mod logging;
pub mod service;

pub use crate::config::{Cli, ServiceConfig};
pub use crate::logging::initialize_logging;
pub use crate::service::run_service;

/// Load configuration from files, environment variables and the command line
pub fn load_configuration(cli: &Cli) -> anyhow::Result<ServiceConfig> {
    crate::config::load_config(cli)
}
