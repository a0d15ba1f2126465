//! Live-reload dev server.
//!
//! Serves the destination tree over HTTP, pushes reload signals to browsers
//! over server-sent events and injects the small client script that listens
//! for them into every HTML page. The server runs on its own tokio runtime
//! thread; the scheduler reaches it through a broadcast channel.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::services::ServeDir;

use crate::reload::{ReloadEvent, ReloadNotifier, StyleSheet};

/// SSE endpoint path
pub const EVENTS_PATH: &str = "/__sitepipe/events";
/// Client script path
pub const CLIENT_PATH: &str = "/__sitepipe/client.js";

/// Largest HTML page the script injector buffers.
const MAX_INJECT_BYTES: usize = 16 * 1024 * 1024;

const CLIENT_JS: &str = r#"(function () {
  var source = new EventSource("/__sitepipe/events");
  source.addEventListener("reload", function () {
    window.location.reload();
  });
  source.addEventListener("inject", function (e) {
    var sheets = JSON.parse(e.data);
    var links = document.querySelectorAll('link[rel="stylesheet"]');
    var stamp = Date.now();
    sheets.forEach(function (url) {
      links.forEach(function (link) {
        var href = new URL(link.href, window.location.href);
        if (href.pathname.replace(/^\//, "") === url) {
          href.searchParams.set("sitepipe", stamp);
          link.href = href.toString();
        }
      });
    });
  });
})();
"#;

/// Dev server failures. Watch mode logs these and continues without the
/// server.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Failed to bind dev server to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Failed to start dev server runtime: {0}")]
    Runtime(#[source] io::Error),

    #[error("Dev server thread exited during startup")]
    Startup,
}

/// Sends reload signals to every connected browser.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<ReloadEvent>,
}

impl BroadcastNotifier {
    pub fn new(tx: broadcast::Sender<ReloadEvent>) -> Self {
        Self { tx }
    }

    /// Number of connected browsers.
    pub fn clients(&self) -> usize {
        self.tx.receiver_count()
    }

    fn send(&self, event: ReloadEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("no browsers connected");
        }
    }
}

impl ReloadNotifier for BroadcastNotifier {
    fn notify_full_reload(&self) {
        self.send(ReloadEvent::FullReload);
    }

    fn notify_style_inject(&self, sheets: &[StyleSheet]) {
        self.send(ReloadEvent::StyleInject(sheets.to_vec()));
    }
}

#[derive(Clone)]
struct AppState {
    tx: broadcast::Sender<ReloadEvent>,
}

/// Build the router: static files from `dest_root`, the event stream and
/// the client script.
pub fn router(dest_root: PathBuf, tx: broadcast::Sender<ReloadEvent>) -> Router {
    Router::new()
        .route(EVENTS_PATH, get(events))
        .route(CLIENT_PATH, get(client_script))
        .fallback_service(ServeDir::new(dest_root))
        .layer(middleware::from_fn(inject_client))
        .with_state(AppState { tx })
}

fn sse_event(event: &ReloadEvent) -> Event {
    match event {
        ReloadEvent::FullReload => Event::default().event("reload").data("{}"),
        ReloadEvent::StyleInject(sheets) => {
            let urls: Vec<&str> = sheets.iter().map(|s| s.url.as_str()).collect();
            let payload = serde_json::to_string(&urls).unwrap_or_else(|_| "[]".to_string());
            Event::default().event("inject").data(payload)
        }
    }
}

async fn events(
    State(state): State<AppState>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.tx.subscribe()).filter_map(|received| match received {
        Ok(event) => Some(Ok(sse_event(&event))),
        Err(lagged) => {
            tracing::warn!("reload subscriber lagged: {}", lagged);
            None
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keepalive"))
}

async fn client_script() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript; charset=utf-8")], CLIENT_JS)
}

/// Insert the client `<script>` before `</body>`, or append it when the
/// page has no body close tag.
pub fn inject_script(html: &str) -> String {
    let tag = format!("<script src=\"{}\"></script>", CLIENT_PATH);
    match html.rfind("</body>") {
        Some(pos) => format!("{}{}{}", &html[..pos], tag, &html[pos..]),
        None => format!("{}{}", html, tag),
    }
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"))
}

/// Add the client script to full HTML page bodies. HEAD replies, partial
/// content and errors pass through untouched.
async fn inject_client(request: Request, next: Next) -> Response {
    let head = request.method() == Method::HEAD;
    let response = next.run(request).await;
    if head || response.status() != StatusCode::OK || !is_html(&response) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_INJECT_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("cannot buffer page for script injection: {}", e);
            return Response::from_parts(parts, Body::empty());
        }
    };
    let html = inject_script(&String::from_utf8_lossy(&bytes));
    // Validators describe the file on disk, not the rewritten page
    parts.headers.remove(header::ETAG);
    parts.headers.remove(header::LAST_MODIFIED);
    parts.headers.remove(header::CONTENT_LENGTH);
    if let Ok(len) = HeaderValue::from_str(&html.len().to_string()) {
        parts.headers.insert(header::CONTENT_LENGTH, len);
    }
    Response::from_parts(parts, Body::from(html))
}

/// Start the dev server on `127.0.0.1:port` in a background thread.
///
/// Returns once the listener is bound, so bind failures surface here.
pub fn start(dest_root: PathBuf, port: u16) -> Result<BroadcastNotifier, ServeError> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let (tx, _) = broadcast::channel(16);
    let notifier = BroadcastNotifier::new(tx.clone());
    let (ready_tx, ready_rx) = mpsc::channel::<Result<(), ServeError>>();

    thread::Builder::new()
        .name("sitepipe-serve".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    let _ = ready_tx.send(Err(ServeError::Runtime(e)));
                    return;
                }
            };

            runtime.block_on(async move {
                let listener = match tokio::net::TcpListener::bind(addr).await {
                    Ok(listener) => listener,
                    Err(source) => {
                        let _ = ready_tx.send(Err(ServeError::Bind { addr, source }));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                tracing::info!("dev server listening on http://{}", addr);

                if let Err(e) = axum::serve(listener, router(dest_root, tx)).await {
                    tracing::error!("dev server stopped: {}", e);
                }
            });
        })
        .map_err(ServeError::Runtime)?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(notifier),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(ServeError::Startup),
    }
}
