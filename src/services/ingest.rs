//! Turns a request body into consecutive chunk writes.
//!
//! Each chunk is one bounded read of `chunk_size` bytes. Only the last chunk
//! of a body may be shorter. A body that runs out before the range does is
//! not an error: the remaining indices are simply left untouched.

use crate::{
    models::chunk::IndexRange,
    services::{chunk_store::ChunkStore, shard::ShardError},
};
use axum::body::Body;
use bytes::Bytes;
use futures::TryStreamExt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;

/// Bytes targeted per streamed chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 128 * 1024;

/// What a streamed range write actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub requested: u64,
    pub written: u64,
    pub bytes: u64,
}

impl IngestReport {
    pub fn is_short(&self) -> bool {
        self.written < self.requested
    }
}

/// Adapt an HTTP body into an `AsyncRead`.
pub fn body_reader(body: Body) -> impl AsyncRead + Unpin + Send {
    StreamReader::new(body.into_data_stream().map_err(io::Error::other))
}

/// Read up to `chunk_size` bytes, returning `None` once the stream is done.
pub async fn read_chunk<R>(reader: &mut R, chunk_size: usize) -> io::Result<Option<Bytes>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(chunk_size);
    (&mut *reader)
        .take(chunk_size as u64)
        .read_to_end(&mut buf)
        .await?;
    Ok((!buf.is_empty()).then(|| Bytes::from(buf)))
}

/// Write one chunk per read into `store` across `range`, stopping early when
/// the body ends.
///
/// Chunks are written as soon as they are read; a failure part way through
/// leaves the already written prefix in place.
pub async fn ingest<R, S>(
    reader: &mut R,
    store: &mut S,
    range: IndexRange,
    chunk_size: usize,
) -> Result<IngestReport, ShardError>
where
    R: AsyncRead + Unpin,
    S: ChunkStore,
{
    let mut report = IngestReport {
        requested: range.len(),
        written: 0,
        bytes: 0,
    };

    for index in range.indices() {
        let Some(chunk) = read_chunk(reader, chunk_size)
            .await
            .map_err(ShardError::Body)?
        else {
            break;
        };
        report.bytes += chunk.len() as u64;
        store.upsert(index, chunk).await?;
        report.written += 1;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::chunk_store::memory::MemoryChunkStore;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[tokio::test]
    async fn read_chunk_fills_quantum() {
        let data = pattern(10);
        let mut reader = &data[..];

        assert_eq!(read_chunk(&mut reader, 4).await.unwrap().unwrap(), data[0..4]);
        assert_eq!(read_chunk(&mut reader, 4).await.unwrap().unwrap(), data[4..8]);
        assert_eq!(read_chunk(&mut reader, 4).await.unwrap().unwrap(), data[8..10]);
        assert!(read_chunk(&mut reader, 4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_chunk_accumulates_across_frames() {
        let frames: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"c")),
            Ok(Bytes::from_static(b"defg")),
        ];
        let mut reader = StreamReader::new(futures::stream::iter(frames));

        assert_eq!(read_chunk(&mut reader, 5).await.unwrap().unwrap(), "abcde");
        assert_eq!(read_chunk(&mut reader, 5).await.unwrap().unwrap(), "fg");
        assert!(read_chunk(&mut reader, 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn full_body_fills_every_index() {
        let data = pattern(12);
        let mut store = MemoryChunkStore::default();
        let range = IndexRange::new(3, 5).unwrap();

        let report = ingest(&mut &data[..], &mut store, range, 4).await.unwrap();

        assert_eq!(report.written, 3);
        assert_eq!(report.bytes, 12);
        assert!(!report.is_short());
        let chunks = store.snapshot();
        assert_eq!(chunks.keys().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(chunks[&5], data[8..12]);
    }

    #[tokio::test]
    async fn short_body_leaves_tail_absent() {
        let data = pattern(8);
        let mut store = MemoryChunkStore::default();
        let range = IndexRange::new(3, 5).unwrap();

        let report = ingest(&mut &data[..], &mut store, range, 4).await.unwrap();

        assert_eq!(report.requested, 3);
        assert_eq!(report.written, 2);
        assert!(report.is_short());
        let chunks = store.snapshot();
        assert_eq!(chunks.keys().copied().collect::<Vec<_>>(), vec![3, 4]);
    }

    #[tokio::test]
    async fn final_chunk_may_be_partial() {
        let data = pattern(9);
        let mut store = MemoryChunkStore::default();
        let range = IndexRange::new(0, 3).unwrap();

        let report = ingest(&mut &data[..], &mut store, range, 4).await.unwrap();

        assert_eq!(report.written, 3);
        assert_eq!(store.snapshot()[&2], data[8..9]);
    }

    #[tokio::test]
    async fn bytes_past_the_range_are_ignored() {
        let data = pattern(20);
        let mut store = MemoryChunkStore::default();
        let range = IndexRange::new(0, 1).unwrap();

        let report = ingest(&mut &data[..], &mut store, range, 4).await.unwrap();

        assert_eq!(report.written, 2);
        assert_eq!(report.bytes, 8);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn body_errors_keep_written_prefix() {
        let frames: Vec<Result<Bytes, io::Error>> = vec![
            Ok(Bytes::from_static(b"abcd")),
            Err(io::Error::other("connection reset")),
        ];
        let mut reader = StreamReader::new(futures::stream::iter(frames));
        let mut store = MemoryChunkStore::default();
        let range = IndexRange::new(0, 2).unwrap();

        let err = ingest(&mut reader, &mut store, range, 4).await.unwrap_err();

        assert!(matches!(err, ShardError::Body(_)));
        assert_eq!(store.snapshot().keys().copied().collect::<Vec<_>>(), vec![0]);
    }

    #[tokio::test]
    async fn body_reader_streams_axum_bodies() {
        let mut reader = body_reader(Body::from("hello world"));
        assert_eq!(read_chunk(&mut reader, 5).await.unwrap().unwrap(), "hello");
    }
}
