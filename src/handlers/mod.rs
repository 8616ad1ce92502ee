pub mod chunk_handlers;
pub mod health_handlers;
