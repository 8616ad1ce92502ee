//! Per-object chunk persistence.
//!
//! Every object key owns one [`ChunkStore`]. Two backends exist:
//!
//! - [`sql::SqlChunkStore`]: one SQLite database per key with a single
//!   `blobs(i INTEGER PRIMARY KEY, blob BLOB)` table
//! - [`kv::KvChunkStore`]: one directory per key, one `BLOCK_{index}` entry
//!   per chunk
//!
//! Both are laid out beneath `root/{backend}/{shard}/{shard}/{md5(key)}` so
//! that arbitrary keys map to safe, evenly spread paths. Stores are only ever
//! driven by their owning shard actor, so they take `&mut self` and do no
//! locking of their own.

pub mod kv;
#[cfg(test)]
pub(crate) mod memory;
pub mod sql;

use crate::models::chunk::{ChunkIndex, ObjectKey};
use bytes::Bytes;
use std::{
    future::Future,
    io,
    path::PathBuf,
};
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

use self::{kv::KvChunkStore, sql::SqlChunkStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("chunk index {0} exceeds the storable range")]
    IndexOutOfRange(ChunkIndex),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage for the chunks of a single object.
pub trait ChunkStore: Send + 'static {
    /// Insert or fully replace the chunk at `index`.
    fn upsert(
        &mut self,
        index: ChunkIndex,
        data: Bytes,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Fetch the chunk at `index`; `Ok(None)` when it was never written.
    fn get(&mut self, index: ChunkIndex)
    -> impl Future<Output = StoreResult<Option<Bytes>>> + Send;

    /// Remove every chunk and the backing structure. The next `upsert`
    /// recreates whatever it needs.
    fn delete_all(&mut self) -> impl Future<Output = StoreResult<()>> + Send;

    /// Give back any open handles. The store stays usable and reopens on the
    /// next call.
    fn release(&mut self) -> impl Future<Output = StoreResult<()>> + Send {
        async { Ok(()) }
    }
}

/// Which persistence backend new stores use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// SQLite table per object key.
    Sql,
    /// Plain key-value entries on disk.
    Kv,
}

impl Backend {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Backend::Sql => "sql",
            Backend::Kv => "kv",
        }
    }
}

/// Decides where each key's store lives and which backend it uses.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
    backend: Backend,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>, backend: Backend) -> Self {
        Self {
            root: root.into(),
            backend,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Database file or namespace directory backing `key`.
    fn location(&self, key: &ObjectKey) -> PathBuf {
        let (shard_a, shard_b, digest) = key_shards(key);
        let dir = self
            .root
            .join(self.backend.as_str())
            .join(shard_a)
            .join(shard_b);
        match self.backend {
            Backend::Sql => dir.join(format!("{digest}.sqlite")),
            Backend::Kv => dir.join(digest),
        }
    }

    fn store_at(&self, location: PathBuf) -> AnyChunkStore {
        match self.backend {
            Backend::Sql => AnyChunkStore::Sql(SqlChunkStore::new(location)),
            Backend::Kv => AnyChunkStore::Kv(KvChunkStore::new(location)),
        }
    }

    /// Build the (lazy) store for `key`. Nothing touches disk until the
    /// first operation.
    pub fn open(&self, key: &ObjectKey) -> AnyChunkStore {
        self.store_at(self.location(key))
    }

    /// Whether anything has been written for `key` and not deleted since.
    pub async fn has_storage(&self, key: &ObjectKey) -> StoreResult<bool> {
        Ok(fs::try_exists(self.location(key)).await?)
    }

    /// Write, read back and delete one chunk through a throwaway store of the
    /// active backend, placed outside the key space under `root`.
    pub async fn check_writable(&self) -> StoreResult<()> {
        if !fs::metadata(&self.root).await?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", self.root.display()),
            )
            .into());
        }

        let name = format!(".ready-{}", Uuid::new_v4());
        let location = match self.backend {
            Backend::Sql => self.root.join(format!("{name}.sqlite")),
            Backend::Kv => self.root.join(name),
        };
        let mut store = self.store_at(location);

        let outcome = write_read_back(&mut store).await;
        store.delete_all().await?;
        outcome
    }
}

async fn write_read_back(store: &mut AnyChunkStore) -> StoreResult<()> {
    let payload = Bytes::from_static(b"ready");
    store.upsert(0, payload.clone()).await?;
    match store.get(0).await? {
        Some(read) if read == payload => Ok(()),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "chunk read back does not match what was written",
        )
        .into()),
    }
}

/// Two-level shard directories plus the full hex digest for a key.
///
/// Uses MD5(key); the first two bytes name the shard directories (00–ff).
fn key_shards(key: &ObjectKey) -> (String, String, String) {
    let digest = md5::compute(key.as_str());
    (
        format!("{:02x}", digest[0]),
        format!("{:02x}", digest[1]),
        format!("{:x}", digest),
    )
}

/// A store of whichever backend the layout selected.
pub enum AnyChunkStore {
    Sql(SqlChunkStore),
    Kv(KvChunkStore),
}

impl ChunkStore for AnyChunkStore {
    async fn upsert(&mut self, index: ChunkIndex, data: Bytes) -> StoreResult<()> {
        match self {
            AnyChunkStore::Sql(store) => store.upsert(index, data).await,
            AnyChunkStore::Kv(store) => store.upsert(index, data).await,
        }
    }

    async fn get(&mut self, index: ChunkIndex) -> StoreResult<Option<Bytes>> {
        match self {
            AnyChunkStore::Sql(store) => store.get(index).await,
            AnyChunkStore::Kv(store) => store.get(index).await,
        }
    }

    async fn delete_all(&mut self) -> StoreResult<()> {
        match self {
            AnyChunkStore::Sql(store) => store.delete_all().await,
            AnyChunkStore::Kv(store) => store.delete_all().await,
        }
    }

    async fn release(&mut self) -> StoreResult<()> {
        match self {
            AnyChunkStore::Sql(store) => store.release().await,
            AnyChunkStore::Kv(store) => store.release().await,
        }
    }
}
