//! Streaming merge of cached and live offers
//!
//! One [`OfferStreamer::stream`] call serves one `/offers` request. The
//! NDJSON protocol is a `{"query": …}` header line followed by one
//! `{"offer": …}` line per surviving offer. Cached offers replay first
//! (flagged preliminary when a live fetch is running); live offers merge
//! in as they arrive and supersede preliminary entries by hash.
//!
//! Two cache writers observe the traffic: the address cache writer
//! subscribes to the raw live stream (filter-agnostic, shared across
//! users), the user cache writer sits on the combined stream and records
//! exactly what this session saw, preliminary flags included, so share
//! links reproduce the user's view.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use offerd_domain::{Address, Offer, Query};
use offerd_providers::{OfferBus, ProviderFleet};
use offerd_store::QueryCache;

use crate::spool::spool_offers;

/// Pipeline dependencies for serving offer streams.
pub struct OfferStreamer {
    fleet: Arc<ProviderFleet>,
    address_cache: Arc<dyn QueryCache>,
    user_cache: Arc<dyn QueryCache>,
    freshness_window: Duration,
}

impl OfferStreamer {
    pub fn new(
        fleet: Arc<ProviderFleet>,
        address_cache: Arc<dyn QueryCache>,
        user_cache: Arc<dyn QueryCache>,
        freshness_window: Duration,
    ) -> Self {
        Self {
            fleet,
            address_cache,
            user_cache,
            freshness_window,
        }
    }

    /// Serve one request, writing NDJSON lines into `lines`.
    ///
    /// Returns once the stream is complete and both cache writers have
    /// finished. A dropped `lines` receiver (client disconnect) cancels
    /// `cancel` and unwinds every task.
    pub async fn stream(
        &self,
        cancel: CancellationToken,
        address: Address,
        session_id: String,
        lines: mpsc::Sender<Bytes>,
    ) {
        let now = chrono::Utc::now().timestamp();
        let user_query = Query::new(address.clone(), now, session_id);
        let address_query = Query::new(address, now, "");

        if !send_query_header(&lines, &user_query).await {
            cancel.cancel();
            return;
        }

        let cached = match self.address_cache.get(&address_query.address_hash).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(error = %e, "address cache read failed, treating as miss");
                None
            }
        };

        let should_fetch = cached
            .as_ref()
            .map_or(true, |query| {
                now - query.timestamp > self.freshness_window.as_secs() as i64
            });

        debug!(
            cache_hit = cached.is_some(),
            should_fetch, "resolved address cache state"
        );

        let (combined_tx, combined_rx) = mpsc::channel::<Offer>(1);

        // replay cached offers into the combined stream; they are
        // preliminary exactly when a live fetch may supersede them
        let cached_replay = tokio::spawn({
            let cancel = cancel.clone();
            let combined = combined_tx.clone();
            let offers: Vec<Offer> = cached
                .map(|query| query.offers.into_values().collect())
                .unwrap_or_default();
            async move {
                for mut offer in offers {
                    offer.is_preliminary = should_fetch;
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        sent = combined.send(offer) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        let mut live_forward: Option<JoinHandle<()>> = None;
        let mut address_writer: Option<JoinHandle<()>> = None;

        if should_fetch {
            let (bus, mut errors) =
                self.fleet.fetch_offers_stream(&cancel, &address_query.address);

            // a provider failure never aborts the request; it is logged
            // and the other providers keep streaming
            tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            err = errors.recv() => match err {
                                Some(e) => warn!(error = %e, "error while fetching offers"),
                                None => return,
                            }
                        }
                    }
                }
            });

            // address cache writer on its own subscription; its forwarded
            // stream has no further consumer and is drained to the void
            let address_key = address_query.address_hash.clone();
            let (dump, writer) = spool_offers(
                cancel.clone(),
                address_query,
                address_key,
                subscribe_or_closed(&bus).await,
                Arc::clone(&self.address_cache),
            );
            drain(dump);
            address_writer = Some(writer);

            // live offers join the combined stream
            live_forward = Some(tokio::spawn({
                let cancel = cancel.clone();
                let combined = combined_tx.clone();
                let mut live = subscribe_or_closed(&bus).await;
                async move {
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            next = live.recv() => {
                                let offer = match next {
                                    Some(offer) => offer,
                                    None => return,
                                };
                                tokio::select! {
                                    _ = cancel.cancelled() => return,
                                    sent = combined.send(offer) => {
                                        if sent.is_err() {
                                            return;
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }));
        }

        // the user cache writer dedupes the combined stream and feeds
        // the client writer
        let user_key = user_query.user_cache_key();
        let (client_stream, user_writer) = spool_offers(
            cancel.clone(),
            user_query,
            user_key,
            combined_rx,
            Arc::clone(&self.user_cache),
        );

        let client_writer = tokio::spawn({
            let cancel = cancel.clone();
            let mut client_stream = client_stream;
            async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        next = client_stream.recv() => {
                            let offer = match next {
                                Some(offer) => offer,
                                None => return,
                            };
                            match serde_json::to_string(&offer) {
                                Ok(json) => {
                                    let line = Bytes::from(format!("{{\"offer\": {json}}}\n"));
                                    if lines.send(line).await.is_err() {
                                        debug!("client stream closed, cancelling request");
                                        cancel.cancel();
                                        return;
                                    }
                                }
                                Err(e) => warn!(error = %e, "failed to marshal offer"),
                            }
                        }
                    }
                }
            }
        });

        // termination order: wait until both producers put everything
        // into the combined stream, close it, then wait for the writers
        let _ = cached_replay.await;
        if let Some(task) = live_forward {
            let _ = task.await;
        }
        drop(combined_tx);

        let _ = user_writer.await;
        let _ = client_writer.await;
        if let Some(task) = address_writer {
            let _ = task.await;
        }

        debug!("offer stream complete");
    }
}

/// Subscribe to the bus; a bus that already closed yields an immediately
/// exhausted stream.
async fn subscribe_or_closed(bus: &OfferBus) -> mpsc::Receiver<Offer> {
    match bus.subscribe().await {
        Some(rx) => rx,
        None => {
            let (_, rx) = mpsc::channel(1);
            rx
        }
    }
}

/// Forward a stream into the void, keeping its producer unblocked.
fn drain(mut rx: mpsc::Receiver<Offer>) {
    tokio::spawn(async move { while rx.recv().await.is_some() {} });
}

/// Write the `{"query": …}` header line. Returns false when the client
/// is gone.
async fn send_query_header(lines: &mpsc::Sender<Bytes>, query: &Query) -> bool {
    match serde_json::to_string(query) {
        Ok(json) => lines
            .send(Bytes::from(format!("{{\"query\": {json}}}\n")))
            .await
            .is_ok(),
        Err(e) => {
            warn!(error = %e, "failed to marshal query header");
            true
        }
    }
}
