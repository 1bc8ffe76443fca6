//! Core types shared across the termgate crates.
//!
//! This crate provides the foundational vocabulary of the broker:
//! session identifiers, risk classification, command events, block
//! records, control directives, and the error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of concurrent PTY sessions the broker will host
pub const MAX_CONCURRENT_SESSIONS: usize = 15;

/// Number of prior commands kept as rolling analysis context per session
pub const CONTEXT_WINDOW_COMMANDS: usize = 5;

/// Latency budget for a single risk analysis, in milliseconds.
/// A budget violation is treated as SAFE (fail-open) and logged.
pub const DEFAULT_ANALYSIS_TIMEOUT_MS: u64 = 50;

/// The unblock gesture byte: Ctrl-] (GS). Intercepted ahead of line
/// assembly and honored even while a session is blocked.
pub const UNBLOCK_GESTURE: u8 = 0x1d;

// ============================================================================
// Identifiers
// ============================================================================

/// Session ID type
pub type SessionId = Uuid;

/// Identifier of one open/closed block episode
pub type BlockId = Uuid;

/// Identifier of one attached client connection
pub type ClientId = Uuid;

// ============================================================================
// Risk classification
// ============================================================================

/// Ordered classification of command danger.
///
/// The derived `Ord` follows declaration order, so
/// `Safe < Caution < Dangerous < Critical` holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Caution,
    Dangerous,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Safe => "safe",
            RiskLevel::Caution => "caution",
            RiskLevel::Dangerous => "dangerous",
            RiskLevel::Critical => "critical",
        }
    }

    /// Parse a level from its config spelling. Unknown spellings return None
    /// so configuration loading can fail fast with a useful message.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "safe" => Some(RiskLevel::Safe),
            "caution" => Some(RiskLevel::Caution),
            "dangerous" => Some(RiskLevel::Dangerous),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Command events and analysis results
// ============================================================================

/// A logical command line reassembled from the raw input stream.
///
/// Produced by the interceptor when it sees a line terminator; consumed
/// once by the risk analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEvent {
    pub session_id: SessionId,
    /// Reconstructed command text, terminator excluded
    pub raw_text: String,
    pub timestamp: DateTime<Utc>,
    /// Previous command texts for this session, oldest first, bounded
    /// by [`CONTEXT_WINDOW_COMMANDS`]
    pub context: Vec<String>,
}

impl CommandEvent {
    pub fn new(session_id: SessionId, raw_text: impl Into<String>, context: Vec<String>) -> Self {
        Self {
            session_id,
            raw_text: raw_text.into(),
            timestamp: Utc::now(),
            context,
        }
    }
}

/// Immutable verdict for one [`CommandEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub risk_level: RiskLevel,
    /// Identifier of the rule that fired, if any
    pub matched_rule: Option<String>,
    /// Ordered human-readable remediation hints
    pub suggestions: Vec<String>,
    pub should_block: bool,
}

impl AnalysisResult {
    /// The no-match verdict: SAFE, nothing to suggest, never blocking.
    pub fn safe() -> Self {
        Self {
            risk_level: RiskLevel::Safe,
            matched_rule: None,
            suggestions: Vec::new(),
            should_block: false,
        }
    }
}

// ============================================================================
// Block bookkeeping
// ============================================================================

/// Per-session block state. Mutated only through the block state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockState {
    Armed,
    Blocked,
}

impl std::fmt::Display for BlockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockState::Armed => write!(f, "armed"),
            BlockState::Blocked => write!(f, "blocked"),
        }
    }
}

/// Who initiated a block transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockSource {
    Analyzer,
    Admin,
}

/// Audit record of one block episode. Opened on ARMED -> BLOCKED,
/// closed (released_at set) on BLOCKED -> ARMED.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRecord {
    pub block_id: BlockId,
    pub session_id: SessionId,
    pub reason: String,
    pub source: BlockSource,
    pub created_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

impl BlockRecord {
    pub fn open(session_id: SessionId, reason: impl Into<String>, source: BlockSource) -> Self {
        Self {
            block_id: Uuid::new_v4(),
            session_id,
            reason: reason.into(),
            source,
            created_at: Utc::now(),
            released_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.released_at.is_none()
    }
}

// ============================================================================
// Control directives
// ============================================================================

/// Kind of administrator directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    BlockAll,
    BlockOne,
    UnblockOne,
}

/// An administrator directive received over the control channel.
///
/// Transient; the durable trace is the BlockRecord it produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMessage {
    pub kind: ControlKind,
    /// Required for block_one / unblock_one, ignored for block_all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_session_id: Option<SessionId>,
    pub reason: String,
    pub issuer: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Error taxonomy
// ============================================================================

/// Broker-level failures. Everything here is local to one request or
/// one session; nothing in this taxonomy is process-fatal.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// PTY allocation denied by the OS, or the session limit reached.
    /// Fatal to the create request only; never retried.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A directive or input referenced a stale session id.
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// A malformed control directive (e.g. block_one without a target).
    #[error("invalid directive: {0}")]
    InvalidDirective(String),

    /// The control broadcaster is gone; only happens during shutdown.
    #[error("control channel unavailable")]
    ControlUnavailable,

    /// The analyzer missed its latency budget; the caller fails open.
    #[error("risk analysis exceeded its {0} ms budget")]
    AnalysisTimeout(u64),

    /// A state-machine transition that is not valid from the current
    /// state. Logged and ignored by callers.
    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: BlockState, to: BlockState },

    /// An unblock attempt that policy does not permit (admin-sourced
    /// block with self-unblock disabled).
    #[error("unblock not permitted: {0}")]
    UnblockDenied(String),

    #[error("pty error: {0}")]
    Pty(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type BrokerResult<T> = Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Safe < RiskLevel::Caution);
        assert!(RiskLevel::Caution < RiskLevel::Dangerous);
        assert!(RiskLevel::Dangerous < RiskLevel::Critical);
    }

    #[test]
    fn test_risk_level_parse() {
        assert_eq!(RiskLevel::parse("critical"), Some(RiskLevel::Critical));
        assert_eq!(RiskLevel::parse("CAUTION"), Some(RiskLevel::Caution));
        assert_eq!(RiskLevel::parse("harmless"), None);
    }

    #[test]
    fn test_block_record_lifecycle() {
        let mut record = BlockRecord::open(Uuid::new_v4(), "test", BlockSource::Analyzer);
        assert!(record.is_open());
        record.released_at = Some(Utc::now());
        assert!(!record.is_open());
    }

    #[test]
    fn test_control_message_roundtrip() {
        let msg = ControlMessage {
            kind: ControlKind::BlockAll,
            target_session_id: None,
            reason: "maintenance".into(),
            issuer: "ops".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("block_all"));
        let back: ControlMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, ControlKind::BlockAll);
    }
}
