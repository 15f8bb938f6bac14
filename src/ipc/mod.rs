//! Line-delimited JSON IPC: request types, per-family handlers and the router.

mod handlers;
mod helpers;
mod router;
mod types;
mod wire;

pub use router::handle_request;
pub use types::{AppState, Request};
pub use wire::bad_json;
