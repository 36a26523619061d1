//! Embeddable server.
//!
//! [`start`] binds a listener and serves the API on a background task; the
//! returned [`ServerHandle`] stops it gracefully. Tests bind `127.0.0.1:0`
//! and read the chosen port from [`ServerHandle::addr`].

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::api;
use crate::state::AppState;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// A running control plane.
#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<std::io::Result<()>>,
}

/// Bind `listen_addr` and serve the API until the handle is stopped.
pub async fn start(listen_addr: SocketAddr, state: AppState) -> std::io::Result<ServerHandle> {
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    let addr = listener.local_addr()?;
    let app = api::create_router(state);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    info!(addr = %addr, "Listening for connections");

    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    Ok(ServerHandle {
        addr,
        shutdown_tx,
        task,
    })
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL for clients, e.g. `http://127.0.0.1:41234`.
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// True once the server task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn stop(self) -> std::io::Result<()> {
        let _ = self.shutdown_tx.send(true);

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.task).await {
            Ok(Ok(result)) => {
                if let Err(e) = &result {
                    error!(error = %e, "Server error");
                }
                result
            }
            Ok(Err(e)) => {
                error!(error = %e, "Server task panicked");
                Err(std::io::Error::other(e))
            }
            Err(_) => {
                warn!(addr = %self.addr, "Server did not shut down in time");
                Err(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "control plane did not shut down in time",
                ))
            }
        }
    }
}
