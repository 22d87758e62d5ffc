//! Write-behind snapshot queue.
//!
//! The game loop never waits on disk for ordinary updates: [`SnapshotWriter::persist`]
//! enqueues and returns. Snapshots queued while a write is in flight are coalesced so
//! only the newest one reaches the store. Critical transitions (bankruptcy, auction
//! resolution, trade settlement, game start and reset) use
//! [`SnapshotWriter::persist_and_wait`], which resolves once that snapshot, or a newer
//! one, has been written.
//!
//! Write failures are logged and counted; they never stop the game.

use tokio::sync::{mpsc, oneshot};

use super::SnapshotStore;
use crate::game::snapshot::SessionSnapshot;

enum WriterCommand {
    Persist(Box<SessionSnapshot>),
    PersistAndAck(Box<SessionSnapshot>, oneshot::Sender<bool>),
    Clear(oneshot::Sender<bool>),
    Stats(oneshot::Sender<WriterStats>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriterStats {
    pub written: u64,
    pub coalesced: u64,
    pub failed: u64,
}

#[derive(Clone, Debug)]
pub struct SnapshotWriter {
    tx: mpsc::UnboundedSender<WriterCommand>,
}

impl std::fmt::Debug for WriterCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WriterCommand::Persist(_) => "Persist",
            WriterCommand::PersistAndAck(..) => "PersistAndAck",
            WriterCommand::Clear(_) => "Clear",
            WriterCommand::Stats(_) => "Stats",
            WriterCommand::Shutdown(_) => "Shutdown",
        };
        f.write_str(name)
    }
}

impl SnapshotWriter {
    /// Queue a snapshot without waiting.
    pub fn persist(&self, snapshot: SessionSnapshot) {
        if self
            .tx
            .send(WriterCommand::Persist(Box::new(snapshot)))
            .is_err()
        {
            log::warn!("snapshot writer is gone; dropping snapshot");
        }
    }

    /// Queue a snapshot and wait until it is on disk. Returns false when the write
    /// failed or the writer has stopped.
    pub async fn persist_and_wait(&self, snapshot: SessionSnapshot) -> bool {
        let (tx, rx) = oneshot::channel();
        if self
            .tx
            .send(WriterCommand::PersistAndAck(Box::new(snapshot), tx))
            .is_err()
        {
            log::warn!("snapshot writer is gone; critical snapshot not persisted");
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Flush anything queued, then remove the stored snapshot.
    pub async fn clear(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(WriterCommand::Clear(tx)).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub async fn stats(&self) -> Option<WriterStats> {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(WriterCommand::Stats(tx)).is_ok() {
            rx.await.ok()
        } else {
            None
        }
    }

    /// Flush anything queued and stop the writer task.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(WriterCommand::Shutdown(tx));
        let _ = rx.await;
    }
}

/// Spawn the writer task on the current runtime.
pub fn start_writer(store: SnapshotStore) -> SnapshotWriter {
    let (tx, mut rx) = mpsc::unbounded_channel::<WriterCommand>();
    let handle = SnapshotWriter { tx };

    tokio::spawn(async move {
        let mut stats = WriterStats::default();
        while let Some(first) = rx.recv().await {
            let mut batch = vec![first];
            while let Ok(more) = rx.try_recv() {
                batch.push(more);
            }

            let mut pending: Option<Box<SessionSnapshot>> = None;
            let mut acks: Vec<oneshot::Sender<bool>> = Vec::new();
            for cmd in batch {
                match cmd {
                    WriterCommand::Persist(snapshot) => {
                        if pending.replace(snapshot).is_some() {
                            stats.coalesced += 1;
                        }
                    }
                    WriterCommand::PersistAndAck(snapshot, ack) => {
                        if pending.replace(snapshot).is_some() {
                            stats.coalesced += 1;
                        }
                        acks.push(ack);
                    }
                    WriterCommand::Clear(done) => {
                        flush(&store, &mut pending, &mut acks, &mut stats).await;
                        let cleared = clear_store(&store).await;
                        let _ = done.send(cleared);
                    }
                    WriterCommand::Stats(resp) => {
                        let _ = resp.send(stats.clone());
                    }
                    WriterCommand::Shutdown(done) => {
                        flush(&store, &mut pending, &mut acks, &mut stats).await;
                        log::debug!("snapshot writer stopped: {:?}", stats);
                        let _ = done.send(());
                        return;
                    }
                }
            }
            flush(&store, &mut pending, &mut acks, &mut stats).await;
        }
    });

    handle
}

async fn flush(
    store: &SnapshotStore,
    pending: &mut Option<Box<SessionSnapshot>>,
    acks: &mut Vec<oneshot::Sender<bool>>,
    stats: &mut WriterStats,
) {
    let Some(snapshot) = pending.take() else {
        return;
    };
    let store = store.clone();
    let result = tokio::task::spawn_blocking(move || store.save(&snapshot)).await;
    let ok = match result {
        Ok(Ok(())) => {
            stats.written += 1;
            true
        }
        Ok(Err(e)) => {
            stats.failed += 1;
            log::warn!("snapshot write failed: {}", e);
            false
        }
        Err(e) => {
            stats.failed += 1;
            log::warn!("snapshot write task failed: {}", e);
            false
        }
    };
    for ack in acks.drain(..) {
        let _ = ack.send(ok);
    }
}

async fn clear_store(store: &SnapshotStore) -> bool {
    let store = store.clone();
    match tokio::task::spawn_blocking(move || store.clear()).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            log::warn!("snapshot clear failed: {}", e);
            false
        }
        Err(e) => {
            log::warn!("snapshot clear task failed: {}", e);
            false
        }
    }
}
