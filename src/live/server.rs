//! Live preview server: the static viewer bundle plus a WebSocket feed.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::http::{header, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tower_http::trace::TraceLayer;

use crate::error::{RungError, RungResult};

use super::hub::{ViewerEvent, ViewerHub};

/// A file of the embedded viewer bundle.
#[derive(Debug, PartialEq, Eq)]
pub struct Asset {
    pub path: &'static str,
    pub content_type: &'static str,
    pub body: &'static str,
}

const ASSETS: &[Asset] = &[
    Asset {
        path: "/index.html",
        content_type: "text/html; charset=utf-8",
        body: include_str!("../../resources/live/index.html"),
    },
    Asset {
        path: "/app.js",
        content_type: "application/javascript; charset=utf-8",
        body: include_str!("../../resources/live/app.js"),
    },
    Asset {
        path: "/style.css",
        content_type: "text/css; charset=utf-8",
        body: include_str!("../../resources/live/style.css"),
    },
];

/// Look up a bundle file; unknown paths get the index document.
pub fn asset(path: &str) -> &'static Asset {
    ASSETS
        .iter()
        .find(|asset| asset.path == path)
        .unwrap_or(&ASSETS[0])
}

pub fn router(hub: Arc<ViewerHub>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .fallback(static_asset)
        .layer(TraceLayer::new_for_http())
        .with_state(hub)
}

/// Bind the preview port on localhost.
pub async fn bind(port: u16) -> RungResult<TcpListener> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpListener::bind(addr)
        .await
        .map_err(|e| RungError::Server(format!("Failed to bind {}: {}", addr, e)))
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, hub: Arc<ViewerHub>, shutdown: F) -> RungResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Live preview listening on {}", addr);
    }

    axum::serve(
        listener,
        router(hub).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| RungError::Server(e.to_string()))
}

async fn static_asset(uri: Uri) -> Response {
    let asset = asset(uri.path());
    ([(header::CONTENT_TYPE, asset.content_type)], asset.body).into_response()
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(hub): State<Arc<ViewerHub>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| viewer_session(socket, addr, hub))
}

async fn viewer_session(mut socket: WebSocket, addr: SocketAddr, hub: Arc<ViewerHub>) {
    let mut rx = hub.subscribe();
    tracing::info!(%addr, "viewer connected");

    let snapshot = hub.snapshot().await;
    if socket.send(Message::Text(snapshot.to_json())).await.is_ok() {
        loop {
            tokio::select! {
                event = next_event(&mut rx, &hub) => {
                    let Some(event) = event else { break };
                    if let Err(e) = socket.send(Message::Text(event.to_json())).await {
                        tracing::debug!(%addr, "send failed: {}", e);
                        break;
                    }
                }
                incoming = socket.recv() => match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    tracing::info!(%addr, "viewer disconnected");
}

/// Next event for one viewer. A viewer that fell behind skips what it
/// missed and gets the current set instead.
async fn next_event(
    rx: &mut broadcast::Receiver<ViewerEvent>,
    hub: &ViewerHub,
) -> Option<ViewerEvent> {
    match rx.recv().await {
        Ok(event) => Some(event),
        Err(RecvError::Lagged(skipped)) => {
            tracing::debug!(skipped, "viewer lagged, resynchronizing");
            *rx = rx.resubscribe();
            Some(hub.snapshot().await)
        }
        Err(RecvError::Closed) => None,
    }
}
