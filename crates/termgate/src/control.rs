//! The control broadcaster.
//!
//! Administrator directives arrive over a channel and are applied one
//! at a time, in receipt order, against the session registry. Per-
//! session delivery is at-least-once: the block state machine is
//! idempotent on repeat blocks, so duplicates are harmless. There is no
//! cross-session ordering guarantee — sessions are independent.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::registry::SessionRegistry;
use termgate_types::{BrokerError, BrokerResult, ControlKind, ControlMessage, SessionId};

/// What a directive did, reported back to the issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectiveReport {
    pub kind: ControlKind,
    /// Sessions whose state actually changed (or, for block_all, the
    /// number of live sessions the block was applied to).
    pub affected: usize,
}

type Submission = (
    ControlMessage,
    oneshot::Sender<BrokerResult<DirectiveReport>>,
);

/// Cheap handle for submitting directives to the broadcaster task.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::UnboundedSender<Submission>,
}

impl ControlHandle {
    pub async fn submit(&self, message: ControlMessage) -> BrokerResult<DirectiveReport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((message, reply_tx))
            .map_err(|_| BrokerError::ControlUnavailable)?;
        reply_rx.await.map_err(|_| BrokerError::ControlUnavailable)?
    }
}

pub struct ControlBroadcaster;

impl ControlBroadcaster {
    /// Start the broadcaster task and return the submission handle.
    pub fn spawn(registry: Arc<SessionRegistry>) -> ControlHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<Submission>();

        tokio::spawn(async move {
            // One directive at a time keeps receipt order authoritative.
            while let Some((message, reply)) = rx.recv().await {
                let result = Self::handle(&registry, message).await;
                let _ = reply.send(result);
            }
        });

        ControlHandle { tx }
    }

    async fn handle(
        registry: &SessionRegistry,
        message: ControlMessage,
    ) -> BrokerResult<DirectiveReport> {
        info!(
            kind = ?message.kind,
            issuer = %message.issuer,
            target = ?message.target_session_id,
            "control directive received"
        );

        match message.kind {
            ControlKind::BlockAll => {
                let sessions = registry.list_active().await;
                let affected = sessions.len();
                for session in sessions {
                    session.admin_block(&message.reason).await;
                }
                Ok(DirectiveReport {
                    kind: ControlKind::BlockAll,
                    affected,
                })
            }
            ControlKind::BlockOne => {
                let session = Self::target(registry, &message).await?;
                session.admin_block(&message.reason).await;
                Ok(DirectiveReport {
                    kind: ControlKind::BlockOne,
                    affected: 1,
                })
            }
            ControlKind::UnblockOne => {
                let session = Self::target(registry, &message).await?;
                let affected = match session.admin_unblock().await {
                    Ok(()) => 1,
                    Err(BrokerError::InvalidTransition { .. }) => {
                        debug!(session_id = %session.id, "unblock_one on an armed session; no-op");
                        0
                    }
                    Err(e) => return Err(e),
                };
                Ok(DirectiveReport {
                    kind: ControlKind::UnblockOne,
                    affected,
                })
            }
        }
    }

    async fn target(
        registry: &SessionRegistry,
        message: &ControlMessage,
    ) -> BrokerResult<Arc<crate::session::Session>> {
        let id: SessionId = message.target_session_id.ok_or_else(|| {
            BrokerError::InvalidDirective(format!(
                "{:?} requires target_session_id",
                message.kind
            ))
        })?;
        registry
            .lookup(&id)
            .await
            .ok_or(BrokerError::SessionNotFound(id))
    }
}
