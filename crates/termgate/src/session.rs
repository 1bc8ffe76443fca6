//! A live shell session: one PTY process, its attached clients, and
//! the interception pipeline in between.
//!
//! All mutable per-session state (line buffer, block machine, context
//! ring, geometry) lives behind one per-session lock, so sessions never
//! contend with each other. Input is applied in arrival order; output
//! is fanned out in production order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink};
use crate::block::{BlockPolicy, BlockStateMachine, UnblockInitiator};
use crate::config::BrokerConfig;
use crate::fanout::OutputFanout;
use crate::interceptor::{CommandInterceptor, InputAction};
use crate::registry::SessionRegistry;
use crate::web::protocol::{ServerMessage, SessionInfo};
use termgate_pty::{OutputEvent, PtyProcess, PtySpawnConfig};
use termgate_rules::RiskAnalyzer;
use termgate_types::{
    AnalysisResult, BlockSource, BlockState, BrokerError, BrokerResult, ClientId, CommandEvent,
    SessionId,
};

/// Everything guarded by the per-session lock.
struct GuardedState {
    interceptor: CommandInterceptor,
    block: BlockStateMachine,
    /// Rolling window of prior command texts, oldest first. Private to
    /// this session; never read by any other session's analysis.
    context: VecDeque<String>,
    cols: u16,
    rows: u16,
}

pub struct Session {
    pub id: SessionId,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pty: PtyProcess,
    fanout: OutputFanout,
    state: Mutex<GuardedState>,
    analyzer: Arc<RiskAnalyzer>,
    audit: AuditSink,
    analysis_timeout: Duration,
    context_window: usize,
    close_on_owner_disconnect: bool,
}

impl Session {
    /// Spawn the shell, register the session, and start its output pump.
    ///
    /// On any failure the PTY (if it got as far as spawning) is killed
    /// when the partially built session drops.
    pub async fn create(
        owner: String,
        cols: u16,
        rows: u16,
        config: &BrokerConfig,
        analyzer: Arc<RiskAnalyzer>,
        audit: AuditSink,
        registry: Arc<SessionRegistry>,
    ) -> BrokerResult<Arc<Session>> {
        let id = Uuid::new_v4();

        let spawn_config = PtySpawnConfig::new(config.shell.clone(), cols, rows);
        let mut pty = PtyProcess::spawn(&spawn_config)?;
        let output = pty
            .take_output()
            .ok_or_else(|| BrokerError::Pty("pty output stream unavailable".to_string()))?;

        let session = Arc::new(Session {
            id,
            owner,
            created_at: Utc::now(),
            pty,
            fanout: OutputFanout::new(),
            state: Mutex::new(GuardedState {
                interceptor: CommandInterceptor::new(),
                block: BlockStateMachine::new(
                    id,
                    BlockPolicy {
                        allow_self_unblock_on_admin_block: config
                            .allow_self_unblock_on_admin_block,
                    },
                ),
                context: VecDeque::with_capacity(config.context_window),
                cols,
                rows,
            }),
            analyzer,
            audit,
            analysis_timeout: Duration::from_millis(config.analysis_timeout_ms),
            context_window: config.context_window,
            close_on_owner_disconnect: config.close_on_owner_disconnect,
        });

        registry.register(Arc::clone(&session)).await?;
        info!(session_id = %id, owner = %session.owner, "session created");

        let pump_session = Arc::clone(&session);
        tokio::spawn(async move {
            Session::output_pump(pump_session, registry, output).await;
        });

        Ok(session)
    }

    /// Forward shell output to every attached client until the shell
    /// exits, then unregister and announce the close.
    async fn output_pump(
        session: Arc<Session>,
        registry: Arc<SessionRegistry>,
        mut output: mpsc::UnboundedReceiver<OutputEvent>,
    ) {
        while let Some(event) = output.recv().await {
            match event {
                OutputEvent::Data(bytes) => {
                    session
                        .fanout
                        .broadcast(ServerMessage::Output {
                            session_id: session.id,
                            data: String::from_utf8_lossy(&bytes).to_string(),
                        })
                        .await;
                }
                OutputEvent::Exited(code) => {
                    info!(session_id = %session.id, code, "shell exited; tearing session down");
                    registry.unregister(&session.id).await;
                    session
                        .fanout
                        .broadcast(ServerMessage::SessionClosed {
                            session_id: session.id,
                            exit_code: code,
                        })
                        .await;
                    break;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Client attachment
    // ------------------------------------------------------------------

    /// Attach a client connection. The connection is the owning client
    /// iff its identity matches the session owner.
    pub async fn attach(
        &self,
        client_id: ClientId,
        identity: &str,
        ws_sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> bool {
        let is_owner = identity == self.owner;
        self.fanout
            .add_client(client_id, identity.to_string(), is_owner, ws_sender)
            .await;
        is_owner
    }

    /// Drop a client's fanout registration; applies the
    /// close-on-owner-disconnect policy.
    pub async fn client_disconnected(&self, client_id: ClientId) {
        let was_owner = self.fanout.remove_client(client_id).await;
        if was_owner && self.close_on_owner_disconnect {
            debug!(session_id = %self.id, "owner disconnected; closing session per policy");
            self.close();
        }
    }

    pub async fn send_to_client(&self, client_id: ClientId, message: ServerMessage) {
        self.fanout.send_to_client(client_id, message).await;
    }

    // ------------------------------------------------------------------
    // Input path
    // ------------------------------------------------------------------

    /// Feed raw client input through the interception pipeline.
    ///
    /// Holds the per-session lock for the whole chunk so verdicts and
    /// forwards happen in arrival order.
    pub async fn handle_input(&self, client_id: ClientId, bytes: &[u8]) -> BrokerResult<()> {
        let mut state = self.state.lock().await;

        for action in state.interceptor.feed(bytes) {
            match action {
                InputAction::Gesture => {
                    self.handle_gesture(&mut state, client_id).await;
                }
                InputAction::Forward(line) => {
                    if !state.block.is_blocked() {
                        self.pty.send_bytes(line)?;
                    }
                }
                InputAction::Analyze { command, line } => {
                    // A block decided earlier in this same chunk voids
                    // the lines queued behind it.
                    if state.block.is_blocked() {
                        continue;
                    }
                    self.handle_command(&mut state, command, line).await?;
                }
            }
        }

        Ok(())
    }

    async fn handle_command(
        &self,
        state: &mut GuardedState,
        command: String,
        line: Vec<u8>,
    ) -> BrokerResult<()> {
        let context: Vec<String> = state.context.iter().cloned().collect();
        let event = CommandEvent::new(self.id, command.clone(), context);
        let verdict = self.analyze_with_deadline(event).await;

        if state.context.len() >= self.context_window {
            state.context.pop_front();
        }
        state.context.push_back(command);

        if verdict.should_block {
            let reason = match &verdict.matched_rule {
                Some(rule) => format!("{} command matched rule {rule}", verdict.risk_level),
                None => format!("{} command", verdict.risk_level),
            };
            self.enter_block(state, reason, BlockSource::Analyzer, Some(&verdict))
                .await;
        } else {
            // Pass: the withheld line goes out exactly as typed.
            self.pty.send_bytes(line)?;
        }
        Ok(())
    }

    /// Run the analyzer under its latency budget. A budget violation
    /// fails open: availability over perfect safety, and the warning
    /// below is the documented trace of that choice.
    async fn analyze_with_deadline(&self, event: CommandEvent) -> AnalysisResult {
        let analyzer = Arc::clone(&self.analyzer);
        let work = tokio::task::spawn_blocking(move || analyzer.analyze(&event));

        match tokio::time::timeout(self.analysis_timeout, work).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(session_id = %self.id, error = %e, "risk analysis task failed; failing open");
                AnalysisResult::safe()
            }
            Err(_) => {
                warn!(
                    session_id = %self.id,
                    budget_ms = self.analysis_timeout.as_millis() as u64,
                    "risk analysis exceeded its budget; failing open"
                );
                AnalysisResult::safe()
            }
        }
    }

    // ------------------------------------------------------------------
    // Block transitions
    // ------------------------------------------------------------------

    async fn enter_block(
        &self,
        state: &mut GuardedState,
        reason: String,
        source: BlockSource,
        verdict: Option<&AnalysisResult>,
    ) {
        let transition = state.block.block(reason, source);
        state.interceptor.set_blocked(true);
        let record = transition.record().clone();

        self.audit.record(if transition.is_entry() {
            AuditEvent::BlockOpened {
                record: record.clone(),
            }
        } else {
            AuditEvent::BlockUpdated {
                record: record.clone(),
            }
        });

        self.fanout
            .broadcast(ServerMessage::Blocked {
                session_id: self.id,
                block_id: record.block_id,
                source,
                reason: record.reason,
                risk_level: verdict.map(|v| v.risk_level),
                matched_rule: verdict.and_then(|v| v.matched_rule.clone()),
                suggestions: verdict.map(|v| v.suggestions.clone()).unwrap_or_default(),
            })
            .await;
    }

    async fn handle_gesture(&self, state: &mut GuardedState, client_id: ClientId) {
        if !self.fanout.is_owner(client_id).await {
            debug!(session_id = %self.id, %client_id, "unblock gesture from non-owner ignored");
            return;
        }

        match state.block.unblock(UnblockInitiator::OwnerGesture) {
            Ok(record) => {
                state.interceptor.set_blocked(false);
                self.audit.record(AuditEvent::BlockReleased {
                    record: record.clone(),
                });
                self.fanout
                    .broadcast(ServerMessage::Unblocked {
                        session_id: self.id,
                        block_id: record.block_id,
                    })
                    .await;
            }
            Err(BrokerError::UnblockDenied(message)) => {
                self.fanout
                    .send_to_client(
                        client_id,
                        ServerMessage::Error {
                            message,
                            recoverable: true,
                        },
                    )
                    .await;
            }
            Err(e) => {
                debug!(session_id = %self.id, error = %e, "gesture with nothing to unblock");
            }
        }
    }

    /// Admin-issued block. Always succeeds; repeat blocks refresh the
    /// open record.
    pub async fn admin_block(&self, reason: &str) {
        let mut state = self.state.lock().await;
        self.enter_block(&mut state, reason.to_string(), BlockSource::Admin, None)
            .await;
    }

    /// Admin-issued unblock. `InvalidTransition` when already armed is
    /// the caller's no-op to log.
    pub async fn admin_unblock(&self) -> BrokerResult<()> {
        let mut state = self.state.lock().await;
        let record = state.block.unblock(UnblockInitiator::Admin)?;
        state.interceptor.set_blocked(false);
        self.audit.record(AuditEvent::BlockReleased {
            record: record.clone(),
        });
        self.fanout
            .broadcast(ServerMessage::Unblocked {
                session_id: self.id,
                block_id: record.block_id,
            })
            .await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Geometry and lifecycle
    // ------------------------------------------------------------------

    pub async fn resize(&self, cols: u16, rows: u16) -> BrokerResult<()> {
        self.pty.resize(cols, rows)?;
        let mut state = self.state.lock().await;
        state.cols = cols;
        state.rows = rows;
        Ok(())
    }

    /// Kill the shell. The output pump observes the exit, unregisters
    /// the session, and notifies clients.
    pub fn close(&self) {
        self.pty.kill();
    }

    pub async fn block_state(&self) -> BlockState {
        self.state.lock().await.block.state()
    }

    pub async fn info(&self) -> SessionInfo {
        let state = self.state.lock().await;
        SessionInfo {
            id: self.id,
            owner: self.owner.clone(),
            created_at: self.created_at.to_rfc3339(),
            cols: state.cols,
            rows: state.rows,
            block_state: state.block.state(),
            active_clients: self.fanout.client_count().await,
        }
    }
}
