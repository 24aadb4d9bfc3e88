//! HTTP surface
//!
//! Three routes on one axum router:
//!
//! - `GET /offers`: validate the address, stream `{"query":…}` and
//!   `{"offer":…}` NDJSON lines as the pipeline produces them
//! - `POST /offers/shared/{queryHash}`: create an immutable share
//!   snapshot from the caller's cached view
//! - `GET /offers/shared/{shareId}`: replay a shared snapshot
//!
//! Every response allows any origin; preflight requests are answered by
//! the CORS layer.

mod error;
mod filter;
mod routes;
mod state;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ErrorResponse};
pub use filter::FilterParams;
pub use state::AppState;

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/offers", get(routes::fetch_offers))
        .route(
            "/offers/shared/{id}",
            get(routes::fetch_shared_offers).post(routes::share_offers),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

/// Allow any origin, mirroring the public comparison frontend setup.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
