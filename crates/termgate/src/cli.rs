use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use crate::config::BrokerConfig;
use termgate_types::RiskLevel;

/// CLI arguments for termgate-server
#[derive(Parser, Debug)]
#[command(name = "termgate-server")]
#[command(about = "PTY shell-session broker with command risk interception")]
#[command(version = "0.1.0")]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, value_name = "FILE", env = "TERMGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind (overrides the config file)
    #[arg(long, value_name = "ADDR", env = "TERMGATE_BIND")]
    pub bind: Option<SocketAddr>,

    /// Shell spawned into each session (overrides the config file)
    #[arg(long, value_name = "SHELL", env = "TERMGATE_SHELL")]
    pub shell: Option<String>,

    /// Block commands at or above this risk level: caution, dangerous, critical
    #[arg(long, value_name = "LEVEL")]
    pub block_threshold: Option<String>,

    /// Directory for the block-record audit log
    #[arg(long, value_name = "DIR", env = "TERMGATE_AUDIT_DIR")]
    pub audit_dir: Option<PathBuf>,
}

impl Cli {
    /// Resolve the effective configuration: file (or defaults), then
    /// flag overrides, then validation.
    pub fn into_config(self) -> Result<BrokerConfig> {
        let mut config = match &self.config {
            Some(path) => BrokerConfig::load_from_file(path)?,
            None => BrokerConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        if let Some(shell) = self.shell {
            config.shell = shell;
        }
        if let Some(level) = self.block_threshold {
            config.block_threshold = match RiskLevel::parse(&level) {
                Some(parsed) => parsed,
                None => bail!("unknown risk level {level:?}; expected caution, dangerous, or critical"),
            };
        }
        if let Some(dir) = self.audit_dir {
            config.audit_dir = Some(dir);
        }

        config.validate()?;
        Ok(config)
    }
}
