mod autogen;
mod conflict;
mod error;
mod mutations;
mod queries;
mod resolver;
mod sources;
mod store;
mod workflow;

pub use autogen::auto_generate;
pub use conflict::{ConflictReason, Placement, check_conflicts};
pub use error::EngineError;
pub use mutations::{ResourceSpec, SessionSpec};
pub use resolver::{Resolver, project_week};
pub use sources::{BookingSource, ClassSessionSource, EXTERNAL_BOOKING, OccupancySource, TimetableSource};
pub use store::{InMemoryStore, Snapshot};
pub use workflow::{BookingDraft, HodDecision};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot};
use ulid::Ulid;

use crate::catalog::SlotCatalog;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
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

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued behind it.
/// 3. One flush_sync for the whole batch, then answer every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
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
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush of {} events failed: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so a half-written batch does not
    // linger in the buffer and reach disk with the next one.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

/// One institution's scheduling state: resources, courses, class sessions,
/// timetables and booking requests, backed by a WAL.
pub struct Engine {
    pub(super) store: InMemoryStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Single-writer discipline: every check-then-write runs under this lock
    /// so the occupancy it checked cannot change before the event lands.
    pub(super) write_lock: Mutex<()>,
    pub(super) catalog: SlotCatalog,
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>, catalog: SlotCatalog) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = InMemoryStore::new();
        for event in &events {
            store.apply_event(event);
        }
        tracing::debug!(
            path = %wal_path.display(),
            events = events.len(),
            resources = store.resource_count(),
            bookings = store.booking_count(),
            "engine replayed"
        );

        Ok(Self {
            store,
            wal_tx,
            notify,
            write_lock: Mutex::new(()),
            catalog,
        })
    }

    pub fn catalog(&self) -> &SlotCatalog {
        &self.catalog
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append, then apply, then notify. State only changes once the
    /// event is durable.
    pub(super) async fn persist_and_apply(&self, event: Event) -> Result<(), EngineError> {
        self.wal_append(&event).await?;
        let affected = self.affected_resources(&event);
        self.store.apply_event(&event);
        for resource_id in affected {
            self.notify.send(resource_id, &event);
        }
        Ok(())
    }

    /// Resources whose weekly grid `event` can change.
    fn affected_resources(&self, event: &Event) -> Vec<Ulid> {
        if let Some(id) = event.resource_id() {
            return vec![id];
        }
        let mut ids: Vec<Ulid> = match event {
            Event::TimetablePublished { timetable, entries } => self
                .store
                .entries_of(&timetable.id)
                .iter()
                .chain(entries)
                .map(|e| e.resource_id)
                .collect(),
            Event::TimetableActivation { id, .. } => {
                self.store.entries_of(id).iter().map(|e| e.resource_id).collect()
            }
            _ => Vec::new(),
        };
        ids.sort();
        ids.dedup();
        ids
    }

    pub fn actor(&self, id: &str) -> Result<Actor, EngineError> {
        self.store
            .get_actor(id)
            .ok_or_else(|| EngineError::UnknownActor(id.to_string()))
    }

    pub fn snapshot(&self) -> Snapshot {
        self.store.snapshot()
    }
}
