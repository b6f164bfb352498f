use clap::Parser;
use std::path::PathBuf;

use crate::common::config::BrokerConfig;
use crate::server::error::BrokerResult;

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    /// YAML configuration file; reloaded for role mappings on SIGHUP
    #[arg(short, long, env = "ROLE_BROKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to serve the metadata API on
    #[arg(short, long, env = "ROLE_BROKER_PORT")]
    pub port: Option<u16>,

    /// Port to serve health checks and metrics on
    #[arg(long, env = "ROLE_BROKER_HEALTH_PORT")]
    pub health_port: Option<u16>,

    /// Request timeout in seconds
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub request_timeout: Option<u64>,

    /// Trust a single-hop X-Forwarded-For header as the caller address
    #[arg(long)]
    pub trust_forwarded_for: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct ValidateCommand {
    /// YAML configuration file to check
    #[arg(short, long)]
    pub config: PathBuf,
}

impl ServerCommand {
    /// Apply command-line overrides on top of the loaded configuration and
    /// validate the result.
    pub fn apply(&self, config: &mut BrokerConfig) -> BrokerResult<()> {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(health_port) = self.health_port {
            config.server.health_port = health_port;
        }
        if let Some(timeout) = self.request_timeout {
            config.server.request_timeout = timeout;
        }
        if self.trust_forwarded_for {
            config.server.trust_forwarded_for = true;
        }
        config.validate()
    }
}
