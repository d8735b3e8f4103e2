use crate::types::PositionSample;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

/// Single-slot store: holds only the most recently written sample.
#[derive(Clone, Default)]
pub struct LatestSlot {
    inner: Arc<RwLock<Option<PositionSample>>>,
}

impl LatestSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever is stored.
    pub async fn store(&self, sample: PositionSample) {
        *self.inner.write().await = Some(sample);
    }

    pub async fn load(&self) -> Option<PositionSample> {
        self.inner.read().await.clone()
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }
}

/// Broker HTTP surface
///
/// - `POST /location`: store a sample, stamped with `receivedAt`
/// - `GET /location`: latest sample, 404 when nothing has been stored
/// - `DELETE /location`: empty the slot
///
/// CORS is wide open so browser senders on other origins can post.
pub fn router(slot: LatestSlot) -> Router {
    Router::new()
        .route(
            "/location",
            get(get_location).post(post_location).delete(delete_location),
        )
        .layer(CorsLayer::permissive())
        .with_state(slot)
}

/// Bind and serve the broker until the listener fails.
pub async fn serve(listener: TcpListener, slot: LatestSlot) -> std::io::Result<()> {
    axum::serve(listener, router(slot)).await
}

async fn post_location(
    State(slot): State<LatestSlot>,
    Json(sample): Json<PositionSample>,
) -> impl IntoResponse {
    let received_at = Utc::now().timestamp_millis();
    log::debug!(
        "Stored fix t={} ({:.6}, {:.6})",
        sample.timestamp(),
        sample.latitude(),
        sample.longitude()
    );
    slot.store(sample.with_received_at(received_at)).await;
    Json(json!({ "status": "ok", "receivedAt": received_at }))
}

async fn get_location(State(slot): State<LatestSlot>) -> impl IntoResponse {
    match slot.load().await {
        Some(sample) => (StatusCode::OK, Json(json!(sample))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "No location data available" })),
        ),
    }
}

async fn delete_location(State(slot): State<LatestSlot>) -> StatusCode {
    slot.clear().await;
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use tower::ServiceExt;

    fn post(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/location")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_req() -> Request<Body> {
        Request::builder()
            .uri("/location")
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_empty_slot_is_not_found() {
        let response = router(LatestSlot::new()).oneshot(get_req()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_post_then_get_stamps_received_at() {
        let slot = LatestSlot::new();
        let app = router(slot.clone());

        let response = app
            .clone()
            .oneshot(post(r#"{"latitude":40.0,"longitude":-75.0,"speed":null,"timestamp":1000}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");

        let response = app.oneshot(get_req()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["timestamp"], 1000);
        assert!(json["receivedAt"].as_i64().unwrap() > 0);

        assert_eq!(slot.load().await.unwrap().timestamp(), 1000);
    }

    #[tokio::test]
    async fn test_slot_keeps_only_latest() {
        let app = router(LatestSlot::new());

        for t in [1000, 2000, 3000] {
            let body = format!(r#"{{"latitude":1.0,"longitude":2.0,"timestamp":{}}}"#, t);
            let response = app.clone().oneshot(post(&body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let json = body_json(app.oneshot(get_req()).await.unwrap()).await;
        assert_eq!(json["timestamp"], 3000);
    }

    #[tokio::test]
    async fn test_invalid_sample_rejected() {
        let slot = LatestSlot::new();
        let response = router(slot.clone())
            .oneshot(post(r#"{"latitude":95.0,"longitude":0.0,"timestamp":1}"#))
            .await
            .unwrap();

        assert!(response.status().is_client_error());
        assert!(slot.load().await.is_none());
    }

    #[tokio::test]
    async fn test_delete_clears_slot() {
        let slot = LatestSlot::new();
        slot.store(PositionSample::new(1.0, 1.0, 1, None).unwrap()).await;

        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/location")
            .body(Body::empty())
            .unwrap();
        let response = router(slot.clone()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(slot.load().await.is_none());
    }
}
