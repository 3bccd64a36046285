//! RPC transport: TCP acceptor and per-connection sessions.
//!
//! Framing is newline-delimited JSON. Each connection carries a session
//! identity (anonymous until `auth.token`); every call snapshots that
//! identity, so rules always see the identity that was bound when the call
//! arrived.

mod acceptor;
mod session;

pub use acceptor::Listener;
pub use session::{RpcSession, SessionError};
