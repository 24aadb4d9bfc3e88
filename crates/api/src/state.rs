//! Shared API state

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use offerd_pipeline::OfferStreamer;
use offerd_store::{QueryCache, ShareRepository};

/// Everything the route handlers need.
///
/// Stores are trait objects so tests run against in-memory
/// implementations.
pub struct AppState {
    /// The aggregation/streaming pipeline.
    pub streamer: Arc<OfferStreamer>,
    /// Per-session snapshots, read by the share flow.
    pub user_cache: Arc<dyn QueryCache>,
    /// Durable shared snapshots.
    pub shares: Arc<dyn ShareRepository>,
    /// Server shutdown token; every request stream runs under a child of
    /// it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        streamer: Arc<OfferStreamer>,
        user_cache: Arc<dyn QueryCache>,
        shares: Arc<dyn ShareRepository>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            streamer,
            user_cache,
            shares,
            shutdown,
        }
    }
}
