use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::sync::ReceiverReport;

type Reports = watch::Receiver<ReceiverReport>;

/// `GET /status` answers the latest report, `GET /ws` pushes every report
/// as a JSON text frame.
pub fn router(reports: Reports) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/ws", get(ws_handler))
        .with_state(reports)
}

pub async fn start_dashboard(reports: Reports, port: u16) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    log::info!("Dashboard at http://{}", addr);
    axum::serve(listener, router(reports)).await
}

async fn status_handler(State(reports): State<Reports>) -> Json<ReceiverReport> {
    Json(reports.borrow().clone())
}

async fn ws_handler(ws: WebSocketUpgrade, State(reports): State<Reports>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, reports))
}

async fn handle_socket(mut socket: WebSocket, mut reports: Reports) {
    loop {
        let json = match serde_json::to_string(&*reports.borrow_and_update()) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("Unencodable report: {}", e);
                break;
            }
        };

        if socket.send(Message::Text(json)).await.is_err() {
            // Client disconnected
            break;
        }

        if reports.changed().await.is_err() {
            let _ = socket.send(Message::Close(None)).await;
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::sync::Phase;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn get_status(app: Router) -> serde_json::Value {
        let request = Request::builder().uri("/status").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_status_follows_latest_report() {
        let (tx, rx) = watch::channel(ReceiverReport::default());
        let app = router(rx);

        let json = get_status(app.clone()).await;
        assert_eq!(json["phase"], "idle");
        assert_eq!(json["error"], serde_json::Value::Null);

        tx.send_replace(ReceiverReport {
            phase: Phase::Active,
            polls: 2,
            error: Some(SyncError::TransportFailure("down".into())),
            ..ReceiverReport::default()
        });

        let json = get_status(app).await;
        assert_eq!(json["phase"], "active");
        assert_eq!(json["polls"], 2);
        assert_eq!(json["error"]["kind"], "TransportFailure");
    }

    #[tokio::test]
    async fn test_ws_requires_upgrade() {
        let (_tx, rx) = watch::channel(ReceiverReport::default());
        let request = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let response = router(rx).oneshot(request).await.unwrap();
        assert!(response.status().is_client_error());
    }
}
