//! Block-record audit sink.
//!
//! Opened and released block episodes are appended as JSONL to an
//! audit file, one line per event, for the downstream compliance
//! consumer. Sessions emit events over a channel; a single writer task
//! owns the file, so session paths never touch disk.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{info, warn};

use termgate_types::BlockRecord;

/// One audit line.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    BlockOpened {
        #[serde(flatten)]
        record: BlockRecord,
    },
    /// A repeat block refreshed the open record's reason/source.
    BlockUpdated {
        #[serde(flatten)]
        record: BlockRecord,
    },
    BlockReleased {
        #[serde(flatten)]
        record: BlockRecord,
    },
}

#[derive(Serialize)]
struct AuditLine<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a AuditEvent,
}

/// Cheap handle sessions hold to emit audit events.
#[derive(Debug, Clone)]
pub struct AuditSink {
    tx: Option<mpsc::UnboundedSender<AuditEvent>>,
}

impl AuditSink {
    /// A sink that drops everything (auditing not configured).
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn record(&self, event: AuditEvent) {
        if let Some(tx) = &self.tx {
            // The writer task outlives every session; a send failure
            // only happens during shutdown.
            let _ = tx.send(event);
        }
    }
}

/// The audit writer. Creates `audit-<timestamp>.jsonl` under the given
/// directory and spawns the task that drains the sink channel into it.
pub struct AuditLog;

impl AuditLog {
    pub async fn spawn(dir: &Path) -> Result<AuditSink> {
        fs::create_dir_all(dir).await?;

        let now: DateTime<Utc> = Utc::now();
        let file_path: PathBuf = dir.join(format!("audit-{}.jsonl", now.format("%Y-%m-%d-%H%M%S")));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)
            .await?;

        info!(path = %file_path.display(), "audit log opened");

        let (tx, mut rx) = mpsc::unbounded_channel::<AuditEvent>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let line = AuditLine {
                    timestamp: Utc::now(),
                    event: &event,
                };
                match serde_json::to_string(&line) {
                    Ok(mut json) => {
                        json.push('\n');
                        if let Err(e) = file.write_all(json.as_bytes()).await {
                            warn!(error = %e, "failed to append audit line");
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to serialize audit event"),
                }
            }
        });

        Ok(AuditSink { tx: Some(tx) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termgate_types::BlockSource;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_audit_lines_are_appended() {
        let dir = std::env::temp_dir().join(format!("termgate-audit-{}", Uuid::new_v4()));
        let sink = AuditLog::spawn(&dir).await.unwrap();

        let record = BlockRecord::open(Uuid::new_v4(), "maintenance", BlockSource::Admin);
        sink.record(AuditEvent::BlockOpened {
            record: record.clone(),
        });
        let mut released = record.clone();
        released.released_at = Some(Utc::now());
        sink.record(AuditEvent::BlockReleased { record: released });

        // The writer task drains asynchronously; poll for the lines.
        let mut content = String::new();
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
            if let Some(entry) = entries.next_entry().await.unwrap() {
                content = tokio::fs::read_to_string(entry.path()).await.unwrap();
                if content.lines().count() >= 2 {
                    break;
                }
            }
        }

        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("block_opened"));
        assert!(lines[0].contains("maintenance"));
        assert!(lines[1].contains("block_released"));

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[test]
    fn test_disabled_sink_drops_silently() {
        let sink = AuditSink::disabled();
        sink.record(AuditEvent::BlockOpened {
            record: BlockRecord::open(Uuid::new_v4(), "x", BlockSource::Analyzer),
        });
    }
}
