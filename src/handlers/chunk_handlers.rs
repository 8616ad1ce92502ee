//! The HTTP dispatcher: every request that is not a health check ends up
//! here and is forwarded to the shard actor owning its object key.
//!
//! - `PUT    /{key}/{index}` or `/{key}/{start,end}`: write chunks
//! - `GET    /{key}/{index}`: read one chunk
//! - `DELETE /{key}/...`: free every chunk of the key

use crate::{
    errors::AppError,
    routes::path,
    services::shard::{ShardRegistry, WriteOutcome},
};
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};

/// Optional placement label recorded on newly spawned shard actors.
pub const LOCATION_HINT_HEADER: &str = "x-location-hint";
/// Body of a `404` for a chunk that was never written or has been freed.
pub const CHUNK_NOT_FOUND: &str = "BLOCK_CHUNK_NOT_FOUND";
/// Body of a `404` for any method other than `GET`, `PUT` and `DELETE`.
pub const I_DONT_UNDERSTAND: &str = "I_DONT_UNDERSTAND";

/// Route a request by method to the owning shard actor.
pub async fn dispatch(
    State(registry): State<ShardRegistry>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    let path = uri.path();
    let key = path::object_key(path);
    let hint = headers
        .get(LOCATION_HINT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match method {
        Method::DELETE => {
            registry.reset(&key, hint).await?;
            Ok(StatusCode::OK.into_response())
        }
        Method::PUT => {
            let range = path::index_range(path)?;
            let declared_length = headers
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);

            let outcome = registry
                .write(&key, hint, range, body, declared_length)
                .await?;

            let ack = match outcome {
                WriteOutcome::Single { .. } => "ok",
                WriteOutcome::Streamed(_) => "OK",
            };
            Ok(ack.into_response())
        }
        Method::GET => {
            let index = path::chunk_index(path)?;
            match registry.read(&key, hint, index).await? {
                Some(chunk) => {
                    let mut response = Response::new(Body::from(chunk));
                    response.headers_mut().insert(
                        header::CONTENT_TYPE,
                        HeaderValue::from_static("application/octet-stream"),
                    );
                    Ok(response)
                }
                None => Ok((StatusCode::NOT_FOUND, CHUNK_NOT_FOUND).into_response()),
            }
        }
        _ => Ok((StatusCode::NOT_FOUND, I_DONT_UNDERSTAND).into_response()),
    }
}
