//! Browser preview of the processed stream: the latest frame with the
//! detected hand state overlaid, plus a shutdown button.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use hand_relay_common::shutdown::Shutdown;
use hand_relay_common::state::HandState;
use serde::Serialize;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Snapshot feed
// ---------------------------------------------------------------------------

/// What the preview shows. Replaced wholesale for every processed frame.
#[derive(Debug, Clone, Default)]
pub struct PreviewSnapshot {
    pub jpeg: Option<Bytes>,
    pub observed: Option<HandState>,
    pub confirmed: Option<HandState>,
    /// Outcome of the last actuator notification check.
    pub delivery: Option<&'static str>,
    pub seq: Option<u64>,
    pub captured_at_ms: Option<i64>,
    pub frames_processed: u64,
    pub frames_dropped: u64,
}

/// Write side, held by the processing loop.
#[derive(Debug)]
pub struct PreviewPublisher {
    tx: watch::Sender<PreviewSnapshot>,
}

/// Read side, held by the HTTP server.
#[derive(Debug, Clone)]
pub struct PreviewFeed {
    rx: watch::Receiver<PreviewSnapshot>,
}

pub fn channel() -> (PreviewPublisher, PreviewFeed) {
    let (tx, rx) = watch::channel(PreviewSnapshot::default());
    (PreviewPublisher { tx }, PreviewFeed { rx })
}

impl PreviewPublisher {
    /// Never blocks; readers always see the latest snapshot.
    pub fn publish(&self, snapshot: PreviewSnapshot) {
        self.tx.send_replace(snapshot);
    }
}

impl PreviewFeed {
    pub fn latest(&self) -> PreviewSnapshot {
        self.rx.borrow().clone()
    }
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

struct AppState {
    feed: PreviewFeed,
    shutdown: Shutdown,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct StatusBody {
    observed: Option<&'static str>,
    confirmed: Option<&'static str>,
    delivery: Option<&'static str>,
    seq: Option<u64>,
    captured_at_ms: Option<i64>,
    frames_processed: u64,
    frames_dropped: u64,
}

impl From<&PreviewSnapshot> for StatusBody {
    fn from(s: &PreviewSnapshot) -> Self {
        Self {
            observed: s.observed.map(|h| h.label()),
            confirmed: s.confirmed.map(|h| h.label()),
            delivery: s.delivery,
            seq: s.seq,
            captured_at_ms: s.captured_at_ms,
            frames_processed: s.frames_processed,
            frames_dropped: s.frames_dropped,
        }
    }
}

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>Hand Tracking Client</title>
<style>
  body { margin: 0; background: #111; color: #eee; font-family: sans-serif; }
  #view { position: relative; display: inline-block; }
  #frame { display: block; max-width: 100vw; }
  #label { position: absolute; left: 20px; top: 14px; font-size: 2.2em;
           font-weight: bold; color: #00ff00; text-shadow: 2px 2px 3px #000; }
  #confirmed { padding: 6px 20px; }
</style>
</head>
<body>
<div id="view"><img id="frame" alt="waiting for first frame"><div id="label">...</div></div>
<div id="confirmed"></div>
<button id="quit" style="margin: 0 20px">Quit</button>
<script>
  const img = document.getElementById('frame');
  async function refresh() {
    try {
      const s = await (await fetch('/status')).json();
      document.getElementById('label').textContent = s.observed ?? '...';
      document.getElementById('confirmed').textContent =
        'actuator: ' + (s.confirmed ?? 'not yet confirmed') +
        ' (' + (s.delivery ?? '-') + ') | frame #' + (s.seq ?? '-');
      if (s.seq !== null) img.src = '/frame.jpg?seq=' + s.seq;
    } catch (e) {}
    setTimeout(refresh, 100);
  }
  document.getElementById('quit').onclick = () => fetch('/shutdown', { method: 'POST' });
  refresh();
</script>
</body>
</html>
"#;

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /: frame with the state label overlaid
async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /frame.jpg: latest processed frame
async fn latest_frame(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.feed.latest();
    match snapshot.jpeg {
        Some(jpeg) => {
            let label = snapshot.observed.map(|h| h.label()).unwrap_or("");
            (
                [
                    (header::CONTENT_TYPE, "image/jpeg"),
                    (header::CACHE_CONTROL, "no-store"),
                ],
                [("x-hand-state", label)],
                jpeg,
            )
                .into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// GET /status
async fn status(State(state): State<Arc<AppState>>) -> Json<StatusBody> {
    Json(StatusBody::from(&state.feed.latest()))
}

/// POST /shutdown: same effect as pressing `q` in the terminal
async fn request_shutdown(State(state): State<Arc<AppState>>) -> StatusCode {
    if state.shutdown.trigger() {
        info!("shutdown requested from preview");
    }
    StatusCode::ACCEPTED
}

pub fn router(feed: PreviewFeed, shutdown: Shutdown) -> Router {
    let state = Arc::new(AppState { feed, shutdown });

    Router::new()
        .route("/", get(index))
        .route("/frame.jpg", get(latest_frame))
        .route("/status", get(status))
        .route("/shutdown", post(request_shutdown))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("failed to bind preview server to {0}: {1}")]
    Bind(String, std::io::Error),
    #[error("preview server error: {0}")]
    Serve(std::io::Error),
}

/// Serve the preview on `bind` until shutdown is requested.
pub async fn serve(bind: &str, feed: PreviewFeed, shutdown: Shutdown) -> Result<(), PreviewError> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| PreviewError::Bind(bind.to_string(), e))?;
    serve_on(listener, feed, shutdown).await
}

pub async fn serve_on(
    listener: tokio::net::TcpListener,
    feed: PreviewFeed,
    shutdown: Shutdown,
) -> Result<(), PreviewError> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "preview server listening");
    }

    let mut stop = shutdown.subscribe();
    let app = router(feed, shutdown);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { stop.wait().await })
        .await
        .map_err(|e| {
            warn!(error = %e, "preview server stopped with error");
            PreviewError::Serve(e)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn start() -> (String, PreviewPublisher, Shutdown, tokio::task::JoinHandle<()>) {
        let (publisher, feed) = channel();
        let shutdown = Shutdown::new();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let server_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move {
            serve_on(listener, feed, server_shutdown).await.unwrap();
        });
        (base, publisher, shutdown, handle)
    }

    #[tokio::test]
    async fn frame_missing_until_published() {
        let (base, publisher, _shutdown, _handle) = start().await;

        let resp = reqwest::get(format!("{base}/frame.jpg")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

        publisher.publish(PreviewSnapshot {
            jpeg: Some(Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9])),
            observed: Some(HandState::LeftHand),
            seq: Some(3),
            ..Default::default()
        });

        let resp = reqwest::get(format!("{base}/frame.jpg")).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.headers()["x-hand-state"], "Left Hand");
        assert_eq!(resp.bytes().await.unwrap().as_ref(), &[0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[tokio::test]
    async fn status_reports_labels() {
        let (base, publisher, _shutdown, _handle) = start().await;
        publisher.publish(PreviewSnapshot {
            observed: Some(HandState::BothHands),
            confirmed: Some(HandState::NoHand),
            delivery: Some("failed"),
            frames_processed: 12,
            frames_dropped: 4,
            ..Default::default()
        });

        let body: serde_json::Value = reqwest::get(format!("{base}/status"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["observed"], "Both Hands");
        assert_eq!(body["confirmed"], "No Hand");
        assert_eq!(body["delivery"], "failed");
        assert_eq!(body["frames_processed"], 12);
        assert_eq!(body["frames_dropped"], 4);
        assert!(body["seq"].is_null());
    }

    #[tokio::test]
    async fn index_serves_overlay_page() {
        let (base, _publisher, _shutdown, _handle) = start().await;
        let html = reqwest::get(format!("{base}/")).await.unwrap().text().await.unwrap();
        assert!(html.contains("id=\"label\""));
        assert!(html.contains("/frame.jpg"));
    }

    #[tokio::test]
    async fn shutdown_endpoint_triggers_and_stops_server() {
        let (base, _publisher, shutdown, handle) = start().await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/shutdown"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
        assert!(shutdown.is_triggered());
        drop(resp);

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("server should stop after shutdown")
            .unwrap();
    }
}
