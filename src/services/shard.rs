//! Shard actors: the single writer for each object key.
//!
//! ```text
//! request 1 ──┐
//! request 2 ──┤──► ShardRegistry ──► mailbox ──► ShardActor ──► ChunkStore
//! request 3 ──┘        (one actor task per active object key)
//! ```
//!
//! Every operation against a key travels through that key's bounded mailbox
//! and is executed to completion before the next one starts, including the
//! reading of a streamed request body. Different keys have different actors
//! and never wait on each other.
//!
//! An actor whose mailbox stays empty for the idle timeout stops taking new
//! messages, finishes what is already queued, releases its store and exits.
//! The next request for the key spawns a fresh actor, which first waits for
//! its predecessor to finish.

use crate::{
    models::chunk::{ChunkIndex, IndexRange, ObjectKey},
    services::{
        chunk_store::{ChunkStore, StoreError, StoreLayout},
        ingest::{self, IngestReport, body_reader},
    },
};
use axum::body::{Body, HttpBody};
use bytes::Bytes;
use std::{collections::HashMap, io, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    io::AsyncReadExt,
    sync::{Mutex, mpsc, oneshot},
    task::JoinHandle,
    time,
};
use tracing::{Instrument, debug, info, info_span, warn};

#[derive(Debug, Error)]
pub enum ShardError {
    #[error("request carries no body")]
    NeedsBody,
    #[error("range writes need a numeric content length")]
    NoContentLen,
    #[error("reading request body: {0}")]
    Body(io::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("shard for `{0}` is unavailable")]
    Unavailable(ObjectKey),
}

pub type ShardResult<T> = Result<T, ShardError>;

/// Result of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Whole body stored at one index.
    Single { bytes: u64 },
    /// Body streamed over a range of indices.
    Streamed(IngestReport),
}

/// How long an actor waits on an empty mailbox before it retires.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Tuning shared by every shard actor.
#[derive(Debug, Clone)]
pub struct ShardSettings {
    /// Bytes per streamed chunk.
    pub chunk_size: usize,
    /// Messages queued per actor before senders wait.
    pub mailbox_capacity: usize,
    /// Empty-mailbox time after which an actor releases its store and exits.
    pub idle_timeout: Duration,
}

impl Default for ShardSettings {
    fn default() -> Self {
        Self {
            chunk_size: ingest::DEFAULT_CHUNK_SIZE,
            mailbox_capacity: 64,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// Messages for a shard actor.
pub enum ShardMessage {
    Write {
        range: IndexRange,
        body: Body,
        declared_length: Option<String>,
        reply: oneshot::Sender<ShardResult<WriteOutcome>>,
    },
    Read {
        index: ChunkIndex,
        reply: oneshot::Sender<ShardResult<Option<Bytes>>>,
    },
    Reset {
        reply: oneshot::Sender<ShardResult<u64>>,
    },
}

/// Owns one key's store and processes its mailbox in order.
pub struct ShardActor<S: ChunkStore> {
    store: S,
    chunk_size: usize,
    idle_timeout: Duration,
    rx: mpsc::Receiver<ShardMessage>,
}

impl<S: ChunkStore> ShardActor<S> {
    async fn run(mut self, predecessor: Option<JoinHandle<()>>) {
        if let Some(predecessor) = predecessor {
            let _ = predecessor.await;
        }
        debug!("shard actor started");

        loop {
            match time::timeout(self.idle_timeout, self.rx.recv()).await {
                Ok(Some(msg)) => self.handle(msg).await,
                Ok(None) => break,
                Err(_) => {
                    // Refuse new senders, then drain what they already queued.
                    self.rx.close();
                    while let Some(msg) = self.rx.recv().await {
                        self.handle(msg).await;
                    }
                    debug!("shard actor idle, retiring");
                    break;
                }
            }
        }

        if let Err(err) = self.store.release().await {
            warn!("failed to release chunk store: {}", err);
        }
        debug!("shard actor stopped");
    }

    async fn handle(&mut self, msg: ShardMessage) {
        match msg {
            ShardMessage::Write {
                range,
                body,
                declared_length,
                reply,
            } => {
                let result = self.write(range, body, declared_length).await;
                let _ = reply.send(result);
            }
            ShardMessage::Read { index, reply } => {
                let result = self.store.get(index).await.map_err(ShardError::from);
                let _ = reply.send(result);
            }
            ShardMessage::Reset { reply } => {
                let result = self.reset().await;
                let _ = reply.send(result);
            }
        }
    }

    async fn write(
        &mut self,
        range: IndexRange,
        body: Body,
        declared_length: Option<String>,
    ) -> ShardResult<WriteOutcome> {
        if body.is_end_stream() {
            return Err(ShardError::NeedsBody);
        }

        if range.is_single() {
            let mut data = Vec::new();
            body_reader(body)
                .read_to_end(&mut data)
                .await
                .map_err(ShardError::Body)?;
            let bytes = data.len() as u64;
            self.store.upsert(range.start(), Bytes::from(data)).await?;
            debug!(index = range.start(), bytes, "stored chunk");
            return Ok(WriteOutcome::Single { bytes });
        }

        let declared = declared_length
            .as_deref()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .ok_or(ShardError::NoContentLen)?;

        let mut reader = body_reader(body);
        let report = ingest::ingest(&mut reader, &mut self.store, range, self.chunk_size).await?;
        if report.is_short() {
            warn!(
                %range,
                declared,
                written = report.written,
                requested = report.requested,
                "body ended before the range was filled"
            );
        } else {
            debug!(%range, declared, bytes = report.bytes, "streamed range");
        }
        Ok(WriteOutcome::Streamed(report))
    }

    /// Empty the store. Always acknowledges with `0`.
    async fn reset(&mut self) -> ShardResult<u64> {
        self.store.delete_all().await?;
        info!("freed all chunks");
        Ok(0)
    }
}

/// Start an actor for `key` on its own task. It does not touch the store
/// until `predecessor` (the key's previous actor, if any) has finished.
pub fn spawn_shard<S: ChunkStore>(
    key: &ObjectKey,
    store: S,
    location_hint: &str,
    settings: &ShardSettings,
    predecessor: Option<JoinHandle<()>>,
) -> (ShardHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(settings.mailbox_capacity.max(1));
    let actor = ShardActor {
        store,
        chunk_size: settings.chunk_size.max(1),
        idle_timeout: settings.idle_timeout,
        rx,
    };
    let span = info_span!("shard", key = %key, location = %location_hint);
    let task = tokio::spawn(actor.run(predecessor).instrument(span));
    (ShardHandle { tx }, task)
}

/// Cheap, cloneable address of a shard actor's mailbox.
#[derive(Clone)]
pub struct ShardHandle {
    tx: mpsc::Sender<ShardMessage>,
}

impl ShardHandle {
    /// True once the actor has stopped accepting messages.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue `msg`, handing it back if the actor has already retired.
    pub async fn send(&self, msg: ShardMessage) -> Result<(), ShardMessage> {
        self.tx.send(msg).await.map_err(|err| err.0)
    }
}

struct ShardEntry {
    handle: ShardHandle,
    task: JoinHandle<()>,
}

/// Maps object keys to their shard actors, spawning on demand.
#[derive(Clone)]
pub struct ShardRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    layout: StoreLayout,
    settings: ShardSettings,
    default_location_hint: String,
    shards: Mutex<HashMap<ObjectKey, ShardEntry>>,
}

impl ShardRegistry {
    pub fn new(
        layout: StoreLayout,
        settings: ShardSettings,
        default_location_hint: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                layout,
                settings,
                default_location_hint: default_location_hint.into(),
                shards: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.inner.layout
    }

    /// Store `body` at `range` of `key`. Single-index ranges take the whole
    /// body; wider ranges are streamed one chunk per index and need
    /// `declared_length`.
    pub async fn write(
        &self,
        key: &ObjectKey,
        location_hint: Option<&str>,
        range: IndexRange,
        body: Body,
        declared_length: Option<String>,
    ) -> ShardResult<WriteOutcome> {
        self.request(key, location_hint, |reply| ShardMessage::Write {
            range,
            body,
            declared_length,
            reply,
        })
        .await
    }

    /// Chunk at `index` of `key`. A key with no actor and nothing on disk is
    /// answered here without spawning one.
    pub async fn read(
        &self,
        key: &ObjectKey,
        location_hint: Option<&str>,
        index: ChunkIndex,
    ) -> ShardResult<Option<Bytes>> {
        if !self.is_stored_or_active(key).await? {
            return Ok(None);
        }
        self.request(key, location_hint, |reply| ShardMessage::Read { index, reply })
            .await
    }

    /// Free every chunk of `key`. Always acknowledges with `0`.
    pub async fn reset(&self, key: &ObjectKey, location_hint: Option<&str>) -> ShardResult<u64> {
        if !self.is_stored_or_active(key).await? {
            return Ok(0);
        }
        self.request(key, location_hint, |reply| ShardMessage::Reset { reply })
            .await
    }

    async fn is_stored_or_active(&self, key: &ObjectKey) -> ShardResult<bool> {
        let active = self
            .inner
            .shards
            .lock()
            .await
            .get(key)
            .is_some_and(|entry| !entry.handle.is_closed());
        Ok(active || self.inner.layout.has_storage(key).await?)
    }

    async fn request<T>(
        &self,
        key: &ObjectKey,
        location_hint: Option<&str>,
        message: impl FnOnce(oneshot::Sender<ShardResult<T>>) -> ShardMessage,
    ) -> ShardResult<T> {
        let (reply, response) = oneshot::channel();
        let mut message = message(reply);
        loop {
            let shard = self.shard(key, location_hint).await;
            match shard.send(message).await {
                Ok(()) => break,
                // Retired between lookup and send; the next lookup respawns.
                Err(returned) => message = returned,
            }
        }
        response
            .await
            .map_err(|_| ShardError::Unavailable(key.clone()))?
    }

    /// Handle for the actor owning `key`, spawning one if none is accepting
    /// messages.
    ///
    /// The location hint only labels a newly spawned actor; an actor that
    /// already exists keeps the hint it was created with.
    pub async fn shard(&self, key: &ObjectKey, location_hint: Option<&str>) -> ShardHandle {
        let mut shards = self.inner.shards.lock().await;
        if let Some(entry) = shards.get(key) {
            if !entry.handle.is_closed() {
                return entry.handle.clone();
            }
        }

        let predecessor = shards.remove(key).map(|entry| entry.task);
        shards.retain(|_, entry| !entry.task.is_finished());

        let hint = location_hint.unwrap_or(&self.inner.default_location_hint);
        let store = self.inner.layout.open(key);
        let (handle, task) = spawn_shard(key, store, hint, &self.inner.settings, predecessor);
        shards.insert(
            key.clone(),
            ShardEntry {
                handle: handle.clone(),
                task,
            },
        );
        handle
    }

    /// Number of actors currently accepting messages.
    pub async fn shard_count(&self) -> usize {
        self.inner
            .shards
            .lock()
            .await
            .values()
            .filter(|entry| !entry.handle.is_closed())
            .count()
    }
}
