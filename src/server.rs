//! Read-only status endpoint.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::changelog::ChangeLog;
use crate::observability;
use crate::reconcile::Reconciler;
use crate::store::StoreHandle;

pub struct ServerState {
    pub store: StoreHandle,
    pub order_log: ChangeLog,
    pub dispatch_log: ChangeLog,
    pub error_log_dir: PathBuf,
}

impl ServerState {
    pub fn from_reconciler(reconciler: &Reconciler) -> Self {
        Self {
            store: reconciler.store().clone(),
            order_log: reconciler.order_log().clone(),
            dispatch_log: reconciler.dispatch_log().clone(),
            error_log_dir: reconciler.config().files.error_log_dir.clone(),
        }
    }
}

type SharedState = Arc<ServerState>;

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    NotFound(String),
    Internal(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(format!("{:#}", e))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/line-numbers", get(line_numbers))
        .route("/api/logs/{kind}", get(list_logs))
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}

async fn line_numbers(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let numbers = state.store.call(|db| db.line_numbers()).await?;
    Ok(Json(numbers))
}

async fn list_logs(
    State(state): State<SharedState>,
    Path(kind): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let names = match kind.as_str() {
        "order" => state.order_log.list()?,
        "dispatch" => state.dispatch_log.list()?,
        "error" => observability::error_log_files(&state.error_log_dir)?,
        other => return Err(ApiError::NotFound(format!("Unknown log kind: {}", other))),
    };
    Ok(Json(names))
}

/// Serve on `127.0.0.1:port` until `shutdown` resolves.
pub async fn serve<F>(state: ServerState, port: u16, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!(addr = %listener.local_addr()?, "Status endpoint listening");

    axum::serve(listener, build_router(Arc::new(state)))
        .with_graceful_shutdown(shutdown)
        .await
        .context("Server error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::store::LineNumbers;

    async fn test_app() -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreHandle::in_memory().unwrap();
        store
            .call(|db| db.ensure_line_numbers(&LineNumbers::starting_at(3)))
            .await
            .unwrap();
        let order_log = ChangeLog::new(dir.path().join("order"), "ORDER");
        order_log.append(4, "changed").unwrap();
        let state = ServerState {
            store,
            order_log,
            dispatch_log: ChangeLog::new(dir.path().join("dispatch"), "DISPATCH"),
            error_log_dir: dir.path().join("error"),
        };
        (build_router(Arc::new(state)), dir)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let res = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _dir) = test_app().await;
        let res = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn test_line_numbers() {
        let (app, _dir) = test_app().await;
        let (status, body) = get_json(app, "/api/line-numbers").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["order"], 3);
        assert_eq!(body["dispatch_log"], 3);
    }

    #[tokio::test]
    async fn test_list_logs() {
        let (app, _dir) = test_app().await;
        let (status, body) = get_json(app.clone(), "/api/logs/order").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!(["ORDER_4.log"]));

        let (_, body) = get_json(app, "/api/logs/dispatch").await;
        assert_eq!(body, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_list_error_logs() {
        let (app, dir) = test_app().await;
        let (status, body) = get_json(app.clone(), "/api/logs/error").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!([]));

        std::fs::create_dir_all(dir.path().join("error")).unwrap();
        std::fs::write(dir.path().join("error/error.log.2024-05-13"), "boom").unwrap();
        let (_, body) = get_json(app, "/api/logs/error").await;
        assert_eq!(body, serde_json::json!(["error.log.2024-05-13"]));
    }

    #[tokio::test]
    async fn test_unknown_log_kind_is_404() {
        let (app, _dir) = test_app().await;
        let (status, body) = get_json(app, "/api/logs/payments").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Unknown log kind: payments");
    }
}
