//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness: a chunk written, read back and deleted
//!   through the active backend

use crate::services::{chunk_store::StoreLayout, shard::ShardRegistry};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Liveness only; never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Runs one chunk through a throwaway store of the configured backend under
/// the storage root. HTTP 200 when that works, 503 otherwise.
pub async fn readyz(State(registry): State<ShardRegistry>) -> impl IntoResponse {
    let store = check_store(registry.layout()).await;
    let ready = store.ok;

    let body = ReadyResponse {
        status: if ready { "ok" } else { "error" },
        backend: registry.layout().backend().as_str(),
        shards: registry.shard_count().await,
        checks: HashMap::from([("store", store)]),
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn check_store(layout: &StoreLayout) -> CheckStatus {
    match layout.check_writable().await {
        Ok(()) => CheckStatus {
            ok: true,
            error: None,
        },
        Err(err) => CheckStatus {
            ok: false,
            error: Some(err.to_string()),
        },
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    backend: &'static str,
    shards: usize,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        chunk_store::{Backend, StoreLayout},
        shard::ShardSettings,
    };
    use axum::body::to_bytes;
    use tempfile::TempDir;

    fn registry(root: impl Into<std::path::PathBuf>, backend: Backend) -> ShardRegistry {
        ShardRegistry::new(
            StoreLayout::new(root, backend),
            ShardSettings::default(),
            "enam",
        )
    }

    async fn ready_text(registry: ShardRegistry) -> (StatusCode, String) {
        let response = readyz(State(registry)).await.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn ready_when_storage_is_writable() {
        for backend in [Backend::Sql, Backend::Kv] {
            let temp_dir = TempDir::new().unwrap();

            let (status, text) = ready_text(registry(temp_dir.path(), backend)).await;

            assert_eq!(status, StatusCode::OK);
            assert!(text.contains(r#""status":"ok""#));
            assert!(text.contains(&format!(r#""backend":"{}""#, backend.as_str())));
            assert!(text.contains(r#""store":{"ok":true"#));
            assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
        }
    }

    #[tokio::test]
    async fn not_ready_when_storage_is_missing() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("missing");

        let (status, text) = ready_text(registry(&root, Backend::Sql)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(text.contains(r#""status":"error""#));
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn not_ready_when_storage_root_is_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("occupied");
        std::fs::write(&root, b"").unwrap();

        for backend in [Backend::Sql, Backend::Kv] {
            let (status, text) = ready_text(registry(&root, backend)).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert!(text.contains(r#""store":{"ok":false"#));
        }
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let response = healthz().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
