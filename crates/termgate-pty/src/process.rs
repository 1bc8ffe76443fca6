use std::io::Read;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use portable_pty::{native_pty_system, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::{OutputEvent, READ_CHUNK_BYTES};
use termgate_types::{BrokerError, BrokerResult};

/// How to spawn the shell for a session.
#[derive(Debug, Clone)]
pub struct PtySpawnConfig {
    pub shell: String,
    pub working_dir: PathBuf,
    pub cols: u16,
    pub rows: u16,
}

impl PtySpawnConfig {
    pub fn new(shell: impl Into<String>, cols: u16, rows: u16) -> Self {
        Self {
            shell: shell.into(),
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
            cols,
            rows,
        }
    }

    /// The platform's default interactive shell.
    pub fn default_shell() -> String {
        if cfg!(windows) {
            "cmd.exe".to_string()
        } else {
            std::env::var("SHELL").unwrap_or_else(|_| "/bin/bash".to_string())
        }
    }
}

/// A live pseudo-terminal with a shell attached.
///
/// Input goes through an unbounded channel drained by a blocking writer
/// task, so callers never block on the PTY fd. Output arrives on the
/// receiver returned by [`PtyProcess::take_output`], in production
/// order, terminated by [`OutputEvent::Exited`].
pub struct PtyProcess {
    master: Mutex<Box<dyn MasterPty + Send>>,
    child: Arc<Mutex<Box<dyn portable_pty::Child + Send + Sync>>>,
    input_tx: mpsc::UnboundedSender<Vec<u8>>,
    output_rx: Option<mpsc::UnboundedReceiver<OutputEvent>>,
}

impl PtyProcess {
    /// Allocate a PTY pair and spawn the shell bound to the slave side.
    ///
    /// portable-pty gives the child its own session (setsid) with the
    /// slave as controlling terminal, so signals aimed at the broker do
    /// not propagate to the shells it hosts.
    ///
    /// Allocation failure (ulimit on PTYs) surfaces as
    /// [`BrokerError::ResourceExhausted`]; it is never retried.
    ///
    /// Must be called from within a tokio runtime; the pumps run as
    /// blocking tasks.
    pub fn spawn(config: &PtySpawnConfig) -> BrokerResult<Self> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(PtySize {
                rows: config.rows,
                cols: config.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| BrokerError::ResourceExhausted(format!("pty allocation failed: {e}")))?;

        let mut cmd = CommandBuilder::new(&config.shell);
        cmd.cwd(&config.working_dir);

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| BrokerError::Pty(format!("failed to spawn {}: {e}", config.shell)))?;

        // Close our copy of the slave side; the child holds its own.
        drop(pair.slave);

        let master = pair.master;
        let mut reader = master
            .try_clone_reader()
            .map_err(|e| BrokerError::Pty(format!("failed to clone pty reader: {e}")))?;
        let mut writer = master
            .take_writer()
            .map_err(|e| BrokerError::Pty(format!("failed to take pty writer: {e}")))?;

        let child: Arc<Mutex<Box<dyn portable_pty::Child + Send + Sync>>> =
            Arc::new(Mutex::new(child));

        // Writer pump: drains the input channel in order.
        let (input_tx, mut input_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        tokio::task::spawn_blocking(move || {
            while let Some(bytes) = input_rx.blocking_recv() {
                if writer.write_all(&bytes).is_err() || writer.flush().is_err() {
                    break;
                }
            }
        });

        // Reader pump: forwards chunks until EOF, then reaps the child
        // and emits the exit sentinel.
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let child_for_reader = Arc::clone(&child);
        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; READ_CHUNK_BYTES];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if output_tx.send(OutputEvent::Data(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(std::time::Duration::from_millis(10));
                    }
                    Err(_) => break,
                }
            }

            // Reap so no zombie is left behind, whatever ended the loop.
            let code = match child_for_reader.lock() {
                Ok(mut child) => child
                    .wait()
                    .map(|status| status.exit_code() as i32)
                    .unwrap_or(-1),
                Err(_) => -1,
            };
            debug!(code, "pty child exited");
            let _ = output_tx.send(OutputEvent::Exited(code));
        });

        Ok(Self {
            master: Mutex::new(master),
            child,
            input_tx,
            output_rx: Some(output_rx),
        })
    }

    /// Queue bytes for the shell. Never blocks; order is preserved.
    pub fn send_bytes(&self, bytes: Vec<u8>) -> BrokerResult<()> {
        self.input_tx
            .send(bytes)
            .map_err(|_| BrokerError::Pty("pty input channel closed".to_string()))
    }

    /// Issue the window-size ioctl. Idempotent.
    pub fn resize(&self, cols: u16, rows: u16) -> BrokerResult<()> {
        self.master
            .lock()
            .map_err(|_| BrokerError::Pty("pty master lock poisoned".to_string()))?
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| BrokerError::Pty(format!("pty resize failed: {e}")))
    }

    /// Take the output stream. Yields `Some` exactly once.
    pub fn take_output(&mut self) -> Option<mpsc::UnboundedReceiver<OutputEvent>> {
        self.output_rx.take()
    }

    /// Kill the shell. The reader pump observes EOF and reaps the child.
    pub fn kill(&self) {
        if let Ok(mut child) = self.child.lock() {
            let _ = child.kill();
        }
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        // Closing the master fd alone can leave the shell waiting on a
        // dead terminal; kill explicitly and let the pump reap it.
        self.kill();
    }
}
