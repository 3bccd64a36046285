//! Admin HTTP endpoint.

mod handlers;
mod server;

pub use server::{serve, AdminState};
