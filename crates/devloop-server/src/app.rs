//! Router construction.
//!
//! Builds the axum router with all routes and middleware.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::live_reload;
use crate::middleware::headers;
use crate::state::AppState;
use crate::static_files;

/// Route of the control channel.
pub(crate) const WS_PATH: &str = "/__devloop/ws";

/// Create the application router.
///
/// # Arguments
///
/// * `state` - Shared application state
pub(crate) fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(WS_PATH, get(live_reload::ws_handler))
        .route(static_files::CLIENT_PATH, get(static_files::client_script))
        .fallback(static_files::serve_file)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(headers::no_store_layer())
                .layer(headers::content_type_options_layer()),
        )
        .with_state(state)
}
