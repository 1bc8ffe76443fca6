//! Per-session block state machine.
//!
//! Two states, ARMED and BLOCKED. Every transition is driven through
//! this type; nothing else mutates a session's block state. The machine
//! itself is not thread-safe — the owning session guards it with its
//! per-session lock.

use tracing::debug;

use termgate_types::{BlockRecord, BlockSource, BlockState, BrokerError, BrokerResult, SessionId};

/// Deployment policy knobs consulted by transitions.
#[derive(Debug, Clone, Copy)]
pub struct BlockPolicy {
    /// May the owner's gesture lift an admin-issued block?
    pub allow_self_unblock_on_admin_block: bool,
}

impl Default for BlockPolicy {
    fn default() -> Self {
        Self {
            allow_self_unblock_on_admin_block: false,
        }
    }
}

/// Who is asking for BLOCKED -> ARMED.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnblockInitiator {
    /// The session owner's unblock gesture.
    OwnerGesture,
    /// An explicit admin unblock directive naming this session.
    Admin,
}

/// Result of a block request.
#[derive(Debug, Clone)]
pub enum BlockTransition {
    /// ARMED -> BLOCKED; a new record was opened.
    Entered(BlockRecord),
    /// Already BLOCKED; the open record's reason/source were refreshed,
    /// no second record was opened.
    Updated(BlockRecord),
}

impl BlockTransition {
    pub fn record(&self) -> &BlockRecord {
        match self {
            BlockTransition::Entered(r) | BlockTransition::Updated(r) => r,
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self, BlockTransition::Entered(_))
    }
}

pub struct BlockStateMachine {
    session_id: SessionId,
    state: BlockState,
    open_record: Option<BlockRecord>,
    policy: BlockPolicy,
}

impl BlockStateMachine {
    pub fn new(session_id: SessionId, policy: BlockPolicy) -> Self {
        Self {
            session_id,
            state: BlockState::Armed,
            open_record: None,
            policy,
        }
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    pub fn is_blocked(&self) -> bool {
        self.state == BlockState::Blocked
    }

    /// The currently open record, if the session is blocked.
    pub fn open_record(&self) -> Option<&BlockRecord> {
        self.open_record.as_ref()
    }

    /// Request ARMED -> BLOCKED. Re-entrant: a repeat block while
    /// already BLOCKED updates the open record instead of opening a
    /// duplicate.
    pub fn block(&mut self, reason: impl Into<String>, source: BlockSource) -> BlockTransition {
        match self.open_record.as_mut() {
            Some(record) => {
                record.reason = reason.into();
                record.source = source;
                debug!(session_id = %self.session_id, ?source, "repeat block; record updated");
                BlockTransition::Updated(record.clone())
            }
            None => {
                let record = BlockRecord::open(self.session_id, reason, source);
                self.state = BlockState::Blocked;
                self.open_record = Some(record.clone());
                BlockTransition::Entered(record)
            }
        }
    }

    /// Request BLOCKED -> ARMED. Closes the open record on success.
    ///
    /// An admin-sourced block refuses the owner gesture unless policy
    /// allows it. Unblocking an ARMED session is an `InvalidTransition`
    /// the caller logs at debug and ignores.
    pub fn unblock(&mut self, initiator: UnblockInitiator) -> BrokerResult<BlockRecord> {
        let mut record = match self.open_record.take() {
            Some(r) => r,
            None => {
                return Err(BrokerError::InvalidTransition {
                    from: BlockState::Armed,
                    to: BlockState::Armed,
                })
            }
        };

        if initiator == UnblockInitiator::OwnerGesture
            && record.source == BlockSource::Admin
            && !self.policy.allow_self_unblock_on_admin_block
        {
            self.open_record = Some(record);
            return Err(BrokerError::UnblockDenied(
                "session is locked by an administrator".to_string(),
            ));
        }

        record.released_at = Some(chrono::Utc::now());
        self.state = BlockState::Armed;
        Ok(record)
    }
}
