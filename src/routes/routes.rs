//! Builds the HTTP router.
//!
//! ## Structure
//! - `GET /healthz`, `GET /readyz`: health checks (other methods fall through)
//! - everything else goes to the chunk dispatcher, which derives the object key
//!   from the first path segment and the index or range from the last:
//!   - `PUT    /{key}/{index}` or `/{key}/{start,end}`
//!   - `GET    /{key}/{index}`
//!   - `DELETE /{key}/...`

use crate::{
    handlers::{
        chunk_handlers::dispatch,
        health_handlers::{healthz, readyz},
    },
    services::shard::ShardRegistry,
};
use axum::{Router, routing::get};

/// Build the router. The shared state is the shard registry.
pub fn routes() -> Router<ShardRegistry> {
    Router::new()
        .route("/healthz", get(healthz).fallback(dispatch))
        .route("/readyz", get(readyz).fallback(dispatch))
        .fallback(dispatch)
}
