//! Router assembly for the proxy engine.

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::introspect::{audit_handler, status_handler};
use crate::proxy::proxy_handler;
use crate::state::AppState;

/// Build the gateway router: the two introspection routes, then the
/// catch-all pipeline. `__`-prefixed paths that match no route fall
/// into the pipeline, which refuses to treat them as services.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.settings.max_body_bytes;
    Router::new()
        .route("/__status", get(status_handler))
        .route("/__audit", get(audit_handler))
        .fallback(proxy_handler)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
