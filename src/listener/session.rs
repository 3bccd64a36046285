//! Per-connection RPC session.
//!
//! Reads newline-delimited JSON requests, dispatches each on its own task
//! (calls from one connection proceed concurrently), and writes responses
//! back through a single writer. If the connection drops, in-flight
//! results are discarded rather than sent.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use crate::admin::AdminState;
use crate::dispatch::Dispatcher;
use crate::error::CallError;
use crate::identity::{Identity, SharedProvider};
use crate::rpc::{Request, Response, Target, MAX_FRAME_LEN};

/// Session error types.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] LinesCodecError),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One connected client.
pub struct RpcSession {
    identity: Arc<Identity>,
    dispatcher: Arc<Dispatcher>,
    provider: SharedProvider,
    admin: Arc<AdminState>,
    idle_timeout: Duration,
}

impl RpcSession {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        provider: SharedProvider,
        admin: Arc<AdminState>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            identity: Arc::new(Identity::anonymous()),
            dispatcher,
            provider,
            admin,
            idle_timeout,
        }
    }

    /// Run the session until the peer disconnects or idles out.
    pub async fn run(&mut self, stream: TcpStream) -> Result<(), SessionError> {
        let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_FRAME_LEN));

        // Responses from spawned call tasks funnel through this channel so
        // the socket has a single writer. Dropping the receiver on exit
        // discards any late results.
        let (response_tx, mut response_rx) = mpsc::channel::<Response>(64);

        loop {
            tokio::select! {
                Some(response) = response_rx.recv() => {
                    let line = serde_json::to_string(&response)?;
                    framed.send(line).await?;
                }

                result = timeout(self.idle_timeout, framed.next()) => {
                    match result {
                        Ok(Some(Ok(line))) => {
                            if let Some(response) = self.handle_line(&line, &response_tx).await {
                                let line = serde_json::to_string(&response)?;
                                framed.send(line).await?;
                            }
                        }
                        Ok(Some(Err(e))) => {
                            warn!(error = %e, "frame decode error");
                            break;
                        }
                        Ok(None) => {
                            debug!("connection closed by peer");
                            break;
                        }
                        Err(_) => {
                            debug!("session idle timeout");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Handle one request line. Returns a response to write immediately,
    /// or `None` when the call was handed to a task.
    async fn handle_line(
        &mut self,
        line: &str,
        response_tx: &mpsc::Sender<Response>,
    ) -> Option<Response> {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(error) => {
                debug!(error = %error, "malformed request");
                return Some(Response::error(0, "bad_request", error.to_string()));
            }
        };

        let target = match Target::parse(&request.target) {
            Ok(target) => target,
            Err(error) => {
                return Some(Response::error(request.id, "bad_request", error.to_string()));
            }
        };

        match target {
            // Auth swaps the session identity, so it runs inline; calls
            // already in flight keep the identity they snapshotted.
            Target::Auth => Some(self.authenticate(&request).await),

            Target::Call {
                collection,
                operation,
            } => {
                let identity = self.identity.clone();
                let dispatcher = self.dispatcher.clone();
                let admin = self.admin.clone();
                let response_tx = response_tx.clone();

                tokio::spawn(async move {
                    let result = dispatcher
                        .call(&identity, &collection, &operation, request.args)
                        .await;

                    admin.record_call(matches!(
                        result,
                        Err(CallError::PermissionDenied(_))
                    ));

                    // A failed send means the connection is gone; the
                    // result is discarded, never delivered late.
                    let _ = response_tx
                        .send(Response::from_result(request.id, result))
                        .await;
                });

                None
            }
        }
    }

    async fn authenticate(&mut self, request: &Request) -> Response {
        match request.args.first() {
            None | Some(Value::Null) => {
                self.identity = Arc::new(Identity::anonymous());
                debug!("session deauthenticated");
                Response::ok(request.id, json!({"authenticated": false}))
            }
            Some(Value::String(token)) => match self.provider.authenticate(token).await {
                Ok(identity) => {
                    info!(subject = ?identity.subject(), "session authenticated");
                    self.identity = Arc::new(identity);
                    Response::ok(request.id, json!({"authenticated": true}))
                }
                Err(error) => {
                    debug!(error = %error, "authentication failed");
                    Response::error(request.id, "permission_denied", error.to_string())
                }
            },
            Some(_) => Response::error(request.id, "bad_request", "auth token must be a string"),
        }
    }
}
