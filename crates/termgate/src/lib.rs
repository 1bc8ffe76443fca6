//! termgate — a shell-session broker with inline command safety.
//!
//! The broker exposes PTY-backed shell sessions over WebSocket. Between
//! the client's keystrokes and the shell sits an interception pipeline:
//! every emitted command line is reassembled, classified for risk, and
//! either flushed to the shell unchanged or withheld while the session
//! is placed in a blocked state. An administrator control channel can
//! force-block or force-unblock any session fleet-wide.

pub mod audit;
pub mod block;
pub mod cli;
pub mod config;
pub mod control;
pub mod fanout;
pub mod interceptor;
pub mod registry;
pub mod session;
pub mod web;

pub use audit::{AuditEvent, AuditLog, AuditSink};
pub use block::{BlockPolicy, BlockStateMachine, BlockTransition, UnblockInitiator};
pub use cli::Cli;
pub use config::BrokerConfig;
pub use control::{ControlHandle, DirectiveReport};
pub use interceptor::{CommandInterceptor, InputAction};
pub use registry::SessionRegistry;
pub use session::Session;
pub use web::server::WebServer;
