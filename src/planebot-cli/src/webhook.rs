//! Webhook receiver.
//!
//! `POST /webhook` appends the raw request body, plus a newline, to a log
//! file and always answers `200 OK`.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Path the receiver listens on.
pub const WEBHOOK_PATH: &str = "/webhook";

struct WebhookState {
    log_path: PathBuf,
    write_lock: Mutex<()>,
}

impl WebhookState {
    async fn append(&self, body: &[u8]) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;
        let mut record = Vec::with_capacity(body.len() + 1);
        record.extend_from_slice(body);
        record.push(b'\n');
        file.write_all(&record).await?;
        file.flush().await
    }
}

/// Router serving the webhook endpoint.
pub fn router(log_path: impl AsRef<Path>) -> Router {
    let state = Arc::new(WebhookState {
        log_path: log_path.as_ref().to_path_buf(),
        write_lock: Mutex::new(()),
    });

    Router::new()
        .route(WEBHOOK_PATH, post(receive_webhook))
        .with_state(state)
}

async fn receive_webhook(State(state): State<Arc<WebhookState>>, body: Bytes) -> StatusCode {
    debug!(bytes = body.len(), "Received webhook");
    if let Err(e) = state.append(&body).await {
        error!(
            path = %state.log_path.display(),
            error = %e,
            "Failed to append webhook body"
        );
    }
    StatusCode::OK
}

/// Serve the webhook receiver on `addr` until `shutdown` resolves.
pub async fn serve<F>(addr: SocketAddr, log_path: PathBuf, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!("Webhook receiver listening on {}{}", addr, WEBHOOK_PATH);

    axum::serve(listener, router(&log_path))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Webhook receiver stopped");
    Ok(())
}
