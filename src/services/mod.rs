pub mod chunk_store;
pub mod ingest;
pub mod shard;
