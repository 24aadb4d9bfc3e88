//! Provider fleet coordinator
//!
//! Launches every adapter concurrently under a shared deadline and merges
//! their output into one bus. The deadline is a ceiling for the whole
//! fleet, not a per-offer bound; adapters that finish earlier simply
//! return. Client disconnects propagate through the parent token into
//! the per-fleet child token.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use offerd_domain::Address;

use crate::error::ProviderError;
use crate::{OfferBus, ProviderAdapter};

/// Capacity of the fleet error channel. Errors are drained continuously
/// by the pipeline; the buffer only smooths bursts.
const ERROR_CHANNEL_CAPACITY: usize = 16;

/// The set of provider adapters queried for every request.
pub struct ProviderFleet {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    api_timeout: Duration,
}

impl ProviderFleet {
    /// Create a fleet over the given adapters with a whole-fleet
    /// deadline.
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>, api_timeout: Duration) -> Self {
        Self {
            adapters,
            api_timeout,
        }
    }

    /// Number of adapters in the fleet.
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Start all adapters for `address`.
    ///
    /// Returns the shared offer bus and the error stream. The bus is
    /// closed and the error stream ends once every adapter has returned,
    /// whether normally, through the deadline, or through cancellation
    /// of `cancel`.
    pub fn fetch_offers_stream(
        &self,
        cancel: &CancellationToken,
        address: &Address,
    ) -> (Arc<OfferBus>, mpsc::Receiver<ProviderError>) {
        let bus = Arc::new(OfferBus::new());
        let (err_tx, err_rx) = mpsc::channel(ERROR_CHANNEL_CAPACITY);

        // Child token: cancelled by the deadline below, by the parent
        // (client disconnect), or explicitly once the fleet is done.
        let deadline = cancel.child_token();
        let timer = {
            let deadline = deadline.clone();
            let timeout = self.api_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                debug!(timeout_secs = timeout.as_secs(), "fleet deadline reached");
                deadline.cancel();
            })
        };

        let mut tasks = JoinSet::new();
        for adapter in &self.adapters {
            let adapter = Arc::clone(adapter);
            let bus = Arc::clone(&bus);
            let err_tx = err_tx.clone();
            let address = address.clone();
            let deadline = deadline.clone();

            tasks.spawn(async move {
                debug!(provider = adapter.name(), "adapter starting");
                adapter
                    .stream_offers(&deadline, &address, &bus, &err_tx)
                    .await;
                debug!(provider = adapter.name(), "adapter finished");
            });
        }
        // The error stream ends once all adapter-held senders are gone.
        drop(err_tx);

        let bus_handle = Arc::clone(&bus);
        tokio::spawn(async move {
            while tasks.join_next().await.is_some() {}
            bus_handle.close().await;
            timer.abort();
        });

        (bus, err_rx)
    }
}
