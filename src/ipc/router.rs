use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::wire::err;
use tracing::debug;

type Handler = fn(&mut AppState, &Request) -> Option<serde_json::Value>;

const HANDLERS: &[Handler] = &[
    handlers::core::try_handle,
    handlers::setup::try_handle,
    handlers::programs::try_handle,
    handlers::students::try_handle,
    handlers::courses::try_handle,
    handlers::enrollments::try_handle,
    handlers::marks::try_handle,
    handlers::reports::try_handle,
    handlers::activity::try_handle,
    handlers::backup::try_handle,
];

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    debug!(id = %req.id, method = %req.method, "request");
    for handler in HANDLERS {
        if let Some(resp) = handler(state, &req) {
            return resp;
        }
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
