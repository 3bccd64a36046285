//! Server wiring.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

use crate::admin::{self, AdminState};
use crate::collection::Collection;
use crate::config::{Config, StorageBackend};
use crate::dispatch::Dispatcher;
use crate::identity::{SharedProvider, StaticTokenProvider};
use crate::listener::Listener;
use crate::store::{MemoryStore, SharedStore};

use super::shutdown::{ShutdownManager, ShutdownState};

/// Main fieldgated server.
///
/// Components:
/// - Listener: accepts connections, one session task per client
/// - Dispatcher: routes calls through the masking engine
/// - Admin server: health and counters
/// - Shutdown manager: graceful drain with configurable timeout
pub struct Server {
    config: Arc<Config>,
    dispatcher: Dispatcher,
    provider: SharedProvider,
    store: SharedStore,
    shutdown: Arc<ShutdownManager>,
    admin_state: Arc<AdminState>,
}

impl Server {
    /// Create a server from config. Config-declared collections are
    /// compiled here; collections with method/static handlers are
    /// registered afterwards via [`Server::register`].
    pub fn new(config: Config) -> Result<Self> {
        let store: SharedStore = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        };

        let provider: SharedProvider =
            Arc::new(StaticTokenProvider::from_config(&config.identity));

        let mut dispatcher = Dispatcher::new(store.clone());
        for collection_config in &config.collections {
            let collection = Collection::from_config(collection_config).with_context(|| {
                format!("invalid collection config: {}", collection_config.name)
            })?;
            dispatcher.register(collection);
        }

        Ok(Self {
            config: Arc::new(config),
            dispatcher,
            provider,
            store,
            shutdown: ShutdownManager::new(),
            admin_state: Arc::new(AdminState::new()),
        })
    }

    /// Register a code-defined collection (closure rules, handlers).
    pub fn register(&mut self, collection: Collection) {
        self.dispatcher.register(collection);
    }

    /// The shared document store, e.g. for seeding fixtures.
    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn shutdown_manager(&self) -> Arc<ShutdownManager> {
        self.shutdown.clone()
    }

    /// Run the server until shutdown.
    pub async fn run(self) -> Result<()> {
        let collections = self.dispatcher.collection_names();
        info!(
            address = %self.config.server.address,
            collections = collections.len(),
            tokens = self.config.identity.tokens.len(),
            "starting fieldgated server"
        );

        for name in &collections {
            info!(collection = %name, "collection exposed");
        }
        if collections.is_empty() {
            warn!("no collections registered, nothing is exposed");
        }

        self.admin_state.set_collections(collections);

        // Admin server
        let admin_handle = if self.config.admin.enabled {
            let address = self.config.admin.address;
            let state = self.admin_state.clone();
            let shutdown_rx = self.shutdown.subscribe();
            Some(tokio::spawn(async move {
                if let Err(e) = admin::serve(address, state, shutdown_rx).await {
                    error!(error = %e, "admin server failed");
                }
            }))
        } else {
            None
        };

        // RPC listener
        let listener = Arc::new(Listener::new(
            &self.config.server,
            Arc::new(self.dispatcher),
            self.provider.clone(),
            self.admin_state.clone(),
            self.shutdown.clone(),
        ));

        let listener_handle = tokio::spawn({
            let listener = listener.clone();
            async move {
                if let Err(e) = listener.run().await {
                    error!(error = %e, "listener failed");
                }
            }
        });

        self.admin_state.set_ready(true);
        info!(
            admin = self.config.admin.enabled,
            drain_timeout_secs = self.config.server.shutdown.drain_timeout.as_secs(),
            "fieldgated server started"
        );

        // Wait for shutdown signal
        wait_for_signal().await;

        info!("shutdown signal received, starting graceful shutdown");
        self.admin_state.set_ready(false);
        self.shutdown.start_drain();

        // Wait for drain or timeout
        let drain_timeout = self.config.server.shutdown.drain_timeout;
        let drain_result = tokio::time::timeout(drain_timeout, async {
            let mut rx = self.shutdown.subscribe();
            while *rx.borrow() != ShutdownState::Terminated {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;

        if drain_result.is_err() {
            warn!(
                active_connections = self.shutdown.active_connections(),
                "drain timeout reached, forcing shutdown"
            );
        }

        self.shutdown.terminate();

        listener_handle.abort();
        if let Some(handle) = admin_handle {
            let _ = handle.await;
        }

        info!("fieldgated server stopped");
        Ok(())
    }
}

/// Wait for SIGINT or SIGTERM.
async fn wait_for_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("received SIGTERM");
        }
    }
}
