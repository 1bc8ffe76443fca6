use serde::{Deserialize, Serialize};

use termgate_types::{BlockId, BlockSource, BlockState, RiskLevel, SessionId};

/// Body of `POST /api/sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default = "default_owner")]
    pub owner: String,
    #[serde(default = "default_cols")]
    pub cols: u16,
    #[serde(default = "default_rows")]
    pub rows: u16,
}

fn default_owner() -> String {
    "anonymous".to_string()
}

fn default_cols() -> u16 {
    80
}

fn default_rows() -> u16 {
    24
}

/// Messages sent from client to server over the session WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    Input {
        session_id: SessionId,
        data: String,
    },
    Resize {
        session_id: SessionId,
        cols: u16,
        rows: u16,
    },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    // Session lifecycle
    Attached {
        session_id: SessionId,
        owner: String,
        created_at: String,
        cols: u16,
        rows: u16,
        block_state: BlockState,
    },
    SessionClosed {
        session_id: SessionId,
        exit_code: i32,
    },

    // Terminal stream
    Output {
        session_id: SessionId,
        data: String,
    },

    // Safety pipeline
    Blocked {
        session_id: SessionId,
        block_id: BlockId,
        source: BlockSource,
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        risk_level: Option<RiskLevel>,
        #[serde(skip_serializing_if = "Option::is_none")]
        matched_rule: Option<String>,
        suggestions: Vec<String>,
    },
    Unblocked {
        session_id: SessionId,
        block_id: BlockId,
    },

    // Errors
    Error {
        message: String,
        recoverable: bool,
    },
}

/// Session information for listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub owner: String,
    pub created_at: String,
    pub cols: u16,
    pub rows: u16,
    pub block_state: BlockState,
    pub active_clients: usize,
}
