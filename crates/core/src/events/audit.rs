//! Append-only JSONL audit trail
//!
//! Every event lands here at least once; a line may repeat if the process
//! dies between write and delivery, so consumers dedup on `event_id`.
//! Writes happen on a dedicated task and publishers never wait for disk.

use std::path::Path;

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::RoomEvent;
use crate::error::Result;

/// Cheap cloneable sender side of the audit pipeline
#[derive(Clone)]
pub struct AuditLogHandle {
    tx: mpsc::UnboundedSender<RoomEvent>,
}

impl AuditLogHandle {
    /// Queue an event for the writer; never blocks
    pub fn record(&self, event: &RoomEvent) {
        if self.tx.send(event.clone()).is_err() {
            warn!(event_id = %event.event_id, "audit writer is gone, dropping event");
        }
    }
}

/// Owns the writer task appending events to the log file
pub struct AuditLog {
    handle: AuditLogHandle,
    writer: JoinHandle<()>,
}

impl AuditLog {
    /// Open or create the log file and start the writer task
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .await?;
        let (tx, mut rx) = mpsc::unbounded_channel::<RoomEvent>();

        let writer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match serde_json::to_string(&event) {
                    Ok(mut line) => {
                        line.push('\n');
                        if let Err(e) = file.write_all(line.as_bytes()).await {
                            warn!(
                                error = %e,
                                event_id = %event.event_id,
                                "failed to append audit line"
                            );
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to encode audit event"),
                }
            }
            let _ = file.flush().await;
            debug!("audit writer drained");
        });

        Ok(Self {
            handle: AuditLogHandle { tx },
            writer,
        })
    }

    pub fn handle(&self) -> AuditLogHandle {
        self.handle.clone()
    }

    /// Wait for the writer to drain and exit. The queue closes once every
    /// outstanding handle is dropped, so release those first.
    pub async fn shutdown(self) {
        drop(self.handle);
        let _ = self.writer.await;
    }
}
