pub mod backups;
pub mod restore;

use crate::state::AppState;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Any origin may call; preflights get an empty acknowledging response.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api/backups", backups::router(state.clone()))
        .nest("/api/restore", restore::router(state.clone()))
        .route("/api/health", get(health))
        .route("/ws", get(crate::events::ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "success": true, "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_util::{seed_store, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_then_list_through_the_router() {
        let (_dir, state) = test_state();
        seed_store(&state);
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/backups")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"tables":["users","clients"],"name":"Nightly"}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["success"], true);
        assert_eq!(created["backup"]["status"], "completed");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/backups")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let listed = body_json(response).await;
        assert_eq!(listed["backups"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_body_still_gets_the_error_envelope() {
        let (_dir, state) = test_state();
        let app = create_router(state);

        // Missing required `name`; must come back as the structured envelope,
        // not the extractor's plain-text rejection
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/backups")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"tables":["users"]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["kind"], "invalid_input");
        assert!(body["error"].as_str().unwrap().contains("name"));

        // Unparseable JSON takes the same shape
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/restore")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["kind"], "invalid_input");
    }

    #[tokio::test]
    async fn restore_error_envelope_is_uniform() {
        let (_dir, state) = test_state();
        seed_store(&state);
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/restore")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"sqlContent":"DROP DATABASE prod;"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["kind"], "validation_rejected");
        assert!(body["error"].as_str().unwrap().len() > 0);
    }

    #[tokio::test]
    async fn unknown_backup_download_is_not_found() {
        let (_dir, state) = test_state();
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/backups/nope/download")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["kind"], "not_found");
    }
}
