//! In-memory store used by tests that only care about actor and ingest
//! behavior.

use super::{ChunkStore, StoreResult};
use crate::models::chunk::ChunkIndex;
use bytes::Bytes;
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

/// Chunks shared with the test through an `Arc`, so assertions can inspect
/// what an actor wrote.
#[derive(Clone, Default)]
pub struct MemoryChunkStore {
    pub chunks: Arc<Mutex<BTreeMap<ChunkIndex, Bytes>>>,
}

impl MemoryChunkStore {
    pub fn snapshot(&self) -> BTreeMap<ChunkIndex, Bytes> {
        self.chunks.lock().unwrap().clone()
    }
}

impl ChunkStore for MemoryChunkStore {
    async fn upsert(&mut self, index: ChunkIndex, data: Bytes) -> StoreResult<()> {
        self.chunks.lock().unwrap().insert(index, data);
        Ok(())
    }

    async fn get(&mut self, index: ChunkIndex) -> StoreResult<Option<Bytes>> {
        Ok(self.chunks.lock().unwrap().get(&index).cloned())
    }

    async fn delete_all(&mut self) -> StoreResult<()> {
        self.chunks.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::chunk_store::tests::exercise_contract;

    #[tokio::test]
    async fn memory_store_satisfies_contract() {
        let mut store = MemoryChunkStore::default();
        exercise_contract(&mut store).await;
    }
}
