//! AuthBridge HTTP server.
//!
//! Bridges a GitHub identity to an Entra ID access token for a chat
//! extension: two chained authorization-code flows with state-bound
//! cookies, a webhook endpoint guarded by detached-signature verification,
//! and a token-exchange endpoint backed by the token store.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;
pub mod state;

pub use observability::{init_tracing, init_tracing_with_level};
pub use server::{AuthBridgeServer, ServerBuilder, build_app};
pub use state::AppState;
