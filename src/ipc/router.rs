use super::handlers;
use super::types::{AppState, Request};
use crate::backend::RegistryBackend;
use crate::ipc::error::err;

pub fn handle_request<B: RegistryBackend>(
    state: &mut AppState<B>,
    req: Request,
) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::enrollment::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::incident::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
