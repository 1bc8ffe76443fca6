//! Broker configuration.
//!
//! Every recognized option with its default, loadable from a TOML file
//! and validated at startup. Invalid combinations fail fast before any
//! session exists.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use termgate_pty::PtySpawnConfig;
use termgate_rules::AnalyzerConfig;
use termgate_types::{RiskLevel, CONTEXT_WINDOW_COMMANDS, DEFAULT_ANALYSIS_TIMEOUT_MS, MAX_CONCURRENT_SESSIONS};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
    /// Address the web server binds to.
    pub bind_addr: SocketAddr,
    /// Shell spawned into each session's PTY.
    pub shell: String,
    /// Hard cap on concurrent sessions.
    pub max_sessions: usize,
    /// Verdicts at or above this level block the command.
    pub block_threshold: RiskLevel,
    /// May the owner's gesture lift an admin-issued block?
    pub allow_self_unblock_on_admin_block: bool,
    /// Tear the session down when the owning client disconnects.
    pub close_on_owner_disconnect: bool,
    /// Risk-analysis latency budget; violations fail open.
    pub analysis_timeout_ms: u64,
    /// Rolling command-context window per session.
    pub context_window: usize,
    /// Enable the consecutive-caution escalation rule.
    pub caution_streak_enabled: bool,
    pub caution_streak_threshold: usize,
    /// Directory for the block-record audit log. None disables auditing.
    pub audit_dir: Option<PathBuf>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7070".parse().expect("static addr"),
            shell: PtySpawnConfig::default_shell(),
            max_sessions: MAX_CONCURRENT_SESSIONS,
            block_threshold: RiskLevel::Dangerous,
            allow_self_unblock_on_admin_block: false,
            close_on_owner_disconnect: false,
            analysis_timeout_ms: DEFAULT_ANALYSIS_TIMEOUT_MS,
            context_window: CONTEXT_WINDOW_COMMANDS,
            caution_streak_enabled: false,
            caution_streak_threshold: 3,
            audit_dir: None,
        }
    }
}

impl BrokerConfig {
    /// Load from a TOML file. Unknown keys are rejected.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: BrokerConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that cannot work before the server starts.
    pub fn validate(&self) -> Result<()> {
        if self.block_threshold == RiskLevel::Safe {
            bail!("block_threshold = \"safe\" would block every command, including safe ones");
        }
        if self.analysis_timeout_ms == 0 {
            bail!("analysis_timeout_ms must be greater than zero");
        }
        if self.max_sessions == 0 {
            bail!("max_sessions must be at least 1");
        }
        if self.context_window == 0 {
            bail!("context_window must be at least 1");
        }
        if self.caution_streak_enabled && self.caution_streak_threshold < 2 {
            bail!("caution_streak_threshold must be at least 2 when the streak rule is enabled");
        }
        if self.shell.trim().is_empty() {
            bail!("shell must not be empty");
        }
        Ok(())
    }

    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            block_threshold: self.block_threshold,
            caution_streak_enabled: self.caution_streak_enabled,
            caution_streak_threshold: self.caution_streak_threshold,
        }
    }
}
