use std::io;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::model::Event;
use crate::wal::Wal;

use super::EngineError;

/// Durable, ordered event log the engine commits through.
///
/// `append` must not return `Ok` until the event would survive a restart
/// (for the durable implementation: fsynced). The engine applies an event
/// to memory only after `append` succeeds.
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append(&self, event: &Event) -> Result<(), EngineError>;

    /// Replace the log contents with `events` (a snapshot of current state).
    async fn compact(&self, events: Vec<Event>) -> Result<(), EngineError>;

    async fn appends_since_compact(&self) -> u64;
}

// ── Group-commit journal ─────────────────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// File-backed log. A background task owns the `Wal` and batches appends:
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends.
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
pub struct WalLog {
    tx: mpsc::Sender<WalCommand>,
}

impl WalLog {
    /// Open the journal and spawn its writer. Must be called inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let wal = Wal::open(path)?;
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, rx));
        Ok(Self { tx })
    }

    async fn request<T>(
        &self,
        cmd: WalCommand,
        rx: oneshot::Receiver<T>,
    ) -> Result<T, EngineError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| EngineError::StoreFailure("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StoreFailure("journal writer dropped response".into()))
    }
}

#[async_trait]
impl EventLog for WalLog {
    async fn append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        let cmd = WalCommand::Append {
            event: event.clone(),
            response: tx,
        };
        self.request(cmd, rx)
            .await?
            .map_err(|e| EngineError::StoreFailure(e.to_string()))
    }

    async fn compact(&self, events: Vec<Event>) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        let cmd = WalCommand::Compact {
            events,
            response: tx,
        };
        self.request(cmd, rx)
            .await?
            .map_err(|e| EngineError::StoreFailure(e.to_string()))
    }

    async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        let cmd = WalCommand::AppendsSinceCompact { response: tx };
        self.request(cmd, rx).await.unwrap_or(0)
    }
}

async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();

    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even after an append error, so partially buffered bytes
    // don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    let result = match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    };

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("journal flush failed for batch of {}: {e}", batch.len());
    }

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

// ── In-memory log ────────────────────────────────────────────────

/// Keeps events in memory. Used for tests and ephemeral engines.
#[derive(Default)]
pub struct MemoryLog {
    events: Mutex<Vec<Event>>,
    appends_since_compact: Mutex<u64>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EventLog for MemoryLog {
    async fn append(&self, event: &Event) -> Result<(), EngineError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| EngineError::StoreFailure("memory log poisoned".into()))?;
        events.push(event.clone());
        if let Ok(mut n) = self.appends_since_compact.lock() {
            *n += 1;
        }
        Ok(())
    }

    async fn compact(&self, snapshot: Vec<Event>) -> Result<(), EngineError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| EngineError::StoreFailure("memory log poisoned".into()))?;
        *events = snapshot;
        if let Ok(mut n) = self.appends_since_compact.lock() {
            *n = 0;
        }
        Ok(())
    }

    async fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact.lock().map(|n| *n).unwrap_or(0)
    }
}
