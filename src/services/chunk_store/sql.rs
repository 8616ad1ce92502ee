//! Relational backend: one SQLite database per object key.

use super::{ChunkStore, StoreError, StoreResult};
use crate::models::chunk::ChunkIndex;
use bytes::Bytes;
use sqlx::{
    ConnectOptions, Connection,
    sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode},
};
use std::{io::ErrorKind, path::PathBuf};
use tokio::fs;
use tracing::debug;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS blobs (i INTEGER PRIMARY KEY, blob BLOB)";
const UPSERT: &str =
    "INSERT INTO blobs (i, blob) VALUES (?, ?) ON CONFLICT (i) DO UPDATE SET blob = excluded.blob";
const SELECT: &str = "SELECT blob FROM blobs WHERE i = ?";
const DROP_TABLE: &str = "DROP TABLE IF EXISTS blobs";

/// Chunks stored as rows of the `blobs` table inside a database file owned by
/// one key. The connection is opened on first use and held until
/// [`ChunkStore::delete_all`] removes the file or [`ChunkStore::release`]
/// closes it.
pub struct SqlChunkStore {
    path: PathBuf,
    conn: Option<SqliteConnection>,
}

impl SqlChunkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: None,
        }
    }

    /// Open (creating if needed) the database and make sure `blobs` exists.
    async fn connection(&mut self) -> StoreResult<&mut SqliteConnection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.open().await?,
        };
        Ok(self.conn.insert(conn))
    }

    async fn open(&self) -> StoreResult<SqliteConnection> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut conn = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            .connect()
            .await?;
        sqlx::query(CREATE_TABLE).execute(&mut conn).await?;
        debug!("opened chunk database {}", self.path.display());
        Ok(conn)
    }

    async fn database_exists(&self) -> StoreResult<bool> {
        Ok(self.conn.is_some() || fs::try_exists(&self.path).await?)
    }

    async fn remove_files(&self) -> StoreResult<()> {
        let journal = PathBuf::from(format!("{}-journal", self.path.display()));
        for path in [&self.path, &journal] {
            match fs::remove_file(path).await {
                Ok(()) => debug!("removed {}", path.display()),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

fn row_id(index: ChunkIndex) -> StoreResult<i64> {
    i64::try_from(index).map_err(|_| StoreError::IndexOutOfRange(index))
}

impl ChunkStore for SqlChunkStore {
    async fn upsert(&mut self, index: ChunkIndex, data: Bytes) -> StoreResult<()> {
        let id = row_id(index)?;
        let conn = self.connection().await?;
        sqlx::query(UPSERT)
            .bind(id)
            .bind(&data[..])
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn get(&mut self, index: ChunkIndex) -> StoreResult<Option<Bytes>> {
        let id = row_id(index)?;
        if !self.database_exists().await? {
            return Ok(None);
        }
        let conn = self.connection().await?;
        let blob = sqlx::query_scalar::<_, Vec<u8>>(SELECT)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(blob.map(Bytes::from))
    }

    async fn delete_all(&mut self) -> StoreResult<()> {
        if let Some(mut conn) = self.conn.take() {
            sqlx::query(DROP_TABLE).execute(&mut conn).await?;
            conn.close().await?;
        }
        self.remove_files().await
    }

    async fn release(&mut self) -> StoreResult<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
            debug!("closed chunk database {}", self.path.display());
        }
        Ok(())
    }
}
