//! Admin HTTP server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::bootstrap::ShutdownState;

use super::handlers::{health_handler, live_handler, ready_handler, stats_handler};

/// Shared counters and health flags reported by the admin endpoint.
pub struct AdminState {
    start_time: Instant,
    healthy: AtomicBool,
    ready: AtomicBool,
    active_connections: AtomicU64,
    total_connections: AtomicU64,
    calls_total: AtomicU64,
    calls_denied: AtomicU64,
    collections: RwLock<Vec<String>>,
}

impl Default for AdminState {
    fn default() -> Self {
        Self::new()
    }
}

impl AdminState {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            healthy: AtomicBool::new(true),
            ready: AtomicBool::new(false),
            active_connections: AtomicU64::new(0),
            total_connections: AtomicU64::new(0),
            calls_total: AtomicU64::new(0),
            calls_denied: AtomicU64::new(0),
            collections: RwLock::new(Vec::new()),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Record a dispatched call and whether it was denied.
    pub fn record_call(&self, denied: bool) {
        self.calls_total.fetch_add(1, Ordering::Relaxed);
        if denied {
            self.calls_denied.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn calls_total(&self) -> u64 {
        self.calls_total.load(Ordering::Relaxed)
    }

    pub fn calls_denied(&self) -> u64 {
        self.calls_denied.load(Ordering::Relaxed)
    }

    pub fn set_collections(&self, names: Vec<String>) {
        *self.collections.write().unwrap() = names;
    }

    pub fn collections(&self) -> Vec<String> {
        self.collections.read().unwrap().clone()
    }
}

/// Serve the admin endpoint until shutdown.
pub async fn serve(
    address: SocketAddr,
    state: Arc<AdminState>,
    mut shutdown_rx: watch::Receiver<ShutdownState>,
) -> Result<()> {
    let app = Router::new()
        .route("/healthz", get(health_handler))
        .route("/livez", get(live_handler))
        .route("/readyz", get(ready_handler))
        .route("/stats", get(stats_handler))
        .with_state(state);

    let listener = TcpListener::bind(address).await?;
    info!(address = %address, "admin server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while *shutdown_rx.borrow() == ShutdownState::Running {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;

    info!("admin server stopped");
    Ok(())
}
