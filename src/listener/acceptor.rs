//! TCP acceptor for incoming RPC connections.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, span, warn, Instrument, Level};

use crate::admin::AdminState;
use crate::bootstrap::ShutdownManager;
use crate::config::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::identity::SharedProvider;

use super::session::RpcSession;

/// Listener for accepting incoming RPC connections.
pub struct Listener {
    /// Bind address
    address: SocketAddr,

    /// Connection semaphore (limits max connections)
    connection_limit: Arc<Semaphore>,

    /// Connection ID generator
    next_connection_id: AtomicU64,

    /// Idle timeout applied per session
    idle_timeout: Duration,

    dispatcher: Arc<Dispatcher>,
    provider: SharedProvider,
    admin: Arc<AdminState>,
    shutdown: Arc<ShutdownManager>,
}

impl Listener {
    pub fn new(
        config: &ServerConfig,
        dispatcher: Arc<Dispatcher>,
        provider: SharedProvider,
        admin: Arc<AdminState>,
        shutdown: Arc<ShutdownManager>,
    ) -> Self {
        Self {
            address: config.address,
            connection_limit: Arc::new(Semaphore::new(config.limits.max_connections)),
            next_connection_id: AtomicU64::new(1),
            idle_timeout: config.limits.idle_timeout,
            dispatcher,
            provider,
            admin,
            shutdown,
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Run the accept loop until shutdown starts draining.
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        let listener = TcpListener::bind(self.address).await?;

        info!(
            address = %self.address,
            max_connections = self.connection_limit.available_permits(),
            "listener started"
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                biased;

                _ = shutdown_rx.changed() => {
                    if !self.shutdown.is_accepting() {
                        info!("listener shutting down");
                        break;
                    }
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            self.handle_accept(stream, peer_addr);
                        }
                        Err(e) => {
                            error!(error = %e, "accept error");
                        }
                    }
                }
            }
        }

        info!("listener stopped");
        Ok(())
    }

    /// Handle an accepted connection.
    fn handle_accept(self: &Arc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
        let permit = match self.connection_limit.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(peer = %peer_addr, "connection limit reached, rejecting");
                return;
            }
        };

        if !self.shutdown.connection_opened() {
            debug!(peer = %peer_addr, "draining, rejecting connection");
            return;
        }

        let conn_id = self.next_connection_id.fetch_add(1, Ordering::SeqCst);
        let span = span!(Level::INFO, "conn", id = conn_id, peer = %peer_addr);

        if let Err(e) = stream.set_nodelay(true) {
            debug!(parent: &span, error = %e, "failed to set nodelay");
        }

        debug!(parent: &span, "connection accepted");
        self.admin.connection_opened();

        let listener = self.clone();
        tokio::spawn(
            async move {
                let mut session = RpcSession::new(
                    listener.dispatcher.clone(),
                    listener.provider.clone(),
                    listener.admin.clone(),
                    listener.idle_timeout,
                );

                if let Err(e) = session.run(stream).await {
                    debug!(error = %e, "session ended with error");
                }

                listener.admin.connection_closed();
                listener.shutdown.connection_closed();
                drop(permit);
            }
            .instrument(span),
        );
    }
}
