use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::{json, Value};

use super::AppState;
use crate::error::AppError;

/// Liveness probe
/// Returns 200 OK while the process is serving
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({ "is_service_online": true })))
}

/// Database probe
/// Returns 503 if the database does not answer `SELECT 1`
pub async fn db_health_check(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    state.db.ping().await.map_err(|e| {
        tracing::error!(error = %e, "Database health check failed");
        AppError::from(e)
    })?;
    Ok(Json(json!({ "is_db_online": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::server::create_router;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_json(state: AppState, uri: &str) -> (StatusCode, Value) {
        let response = create_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_check_returns_ok() {
        let response = health_check().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_route() {
        let state = AppState {
            db: Database::in_memory().await.unwrap(),
        };
        let (status, body) = get_json(state, "/health/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "is_service_online": true }));
    }

    #[tokio::test]
    async fn test_db_health_online() {
        let state = AppState {
            db: Database::in_memory().await.unwrap(),
        };
        let (status, body) = get_json(state, "/health/db/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_db_online"], true);
    }

    #[tokio::test]
    async fn test_db_health_offline() {
        let db = Database::in_memory().await.unwrap();
        db.close().await;

        let (status, body) = get_json(AppState { db }, "/health/db/").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["is_db_online"], false);
        assert_eq!(body["error"]["type"], "database_error");
    }
}
