//! Key-value backend: each chunk is an opaque entry named `BLOCK_{index}`
//! inside a directory that belongs to one object key.

use super::{ChunkStore, StoreResult};
use crate::models::chunk::ChunkIndex;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

const ENTRY_PREFIX: &str = "BLOCK_";

/// Entry name for a chunk index.
pub fn entry_name(index: ChunkIndex) -> String {
    format!("{ENTRY_PREFIX}{index}")
}

/// Chunks stored as files in a namespace directory owned by one key.
///
/// The shard directories above the namespace are shared with other keys and
/// are never removed here.
pub struct KvChunkStore {
    dir: PathBuf,
}

impl KvChunkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry_path(&self, index: ChunkIndex) -> PathBuf {
        self.dir.join(entry_name(index))
    }

    /// Write through a temp file and rename over the entry so readers never
    /// observe a half-written chunk.
    async fn write_entry(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let tmp_path = self.dir.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        if let Err(err) = file.write_all(data).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(path).await?;
                fs::rename(&tmp_path, path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        }
        Ok(())
    }
}

impl ChunkStore for KvChunkStore {
    async fn upsert(&mut self, index: ChunkIndex, data: Bytes) -> StoreResult<()> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.entry_path(index);
        self.write_entry(&path, &data).await?;
        Ok(())
    }

    async fn get(&mut self, index: ChunkIndex) -> StoreResult<Option<Bytes>> {
        match fs::read(self.entry_path(index)).await {
            Ok(bytes) => Ok(Some(Bytes::from(bytes))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_all(&mut self) -> StoreResult<()> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let mut removed = 0usize;
        while let Some(entry) = entries.next_entry().await? {
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        debug!("removed {} entries from {}", removed, self.dir.display());

        match fs::remove_dir(&self.dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
