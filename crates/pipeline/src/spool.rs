//! Cache-writer spool
//!
//! Consumes an offer stream, deduplicates by content hash, forwards the
//! surviving offers downstream and accumulates them into a [`Query`]
//! that is written to a cache when the stream ends. A live offer
//! supersedes a preliminary entry with the same hash; an identical live
//! duplicate is dropped.
//!
//! On cancellation the spool exits without writing the cache, so an
//! aborted fetch never persists a truncated snapshot.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use offerd_domain::{Offer, Query};
use offerd_store::QueryCache;

/// Run a cache-writer spool over `offers`.
///
/// Returns the forwarded stream and the spool's join handle. The
/// forwarded stream closes after the cache write, so downstream
/// completion implies the cache is current.
pub fn spool_offers(
    cancel: CancellationToken,
    mut query: Query,
    cache_key: String,
    mut offers: mpsc::Receiver<Offer>,
    cache: Arc<dyn QueryCache>,
) -> (mpsc::Receiver<Offer>, JoinHandle<()>) {
    let (forward_tx, forward_rx) = mpsc::channel(1);

    let handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(key = %cache_key, "cancelled, stopping offer spool");
                    return;
                }
                next = offers.recv() => {
                    let mut offer = match next {
                        Some(offer) => offer,
                        None => {
                            debug!(key = %cache_key, offers = query.offers.len(), "caching query");
                            if let Err(e) = cache.put(&cache_key, &query).await {
                                error!(key = %cache_key, error = %e, "failed to cache query");
                            }
                            return;
                        }
                    };

                    if offer.offer_hash.is_empty() {
                        offer.seal();
                    }

                    let supersedes = match query.offers.get(&offer.offer_hash) {
                        None => true,
                        Some(existing) => existing.is_preliminary,
                    };
                    if !supersedes {
                        continue;
                    }

                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        sent = forward_tx.send(offer.clone()) => {
                            if sent.is_err() {
                                return;
                            }
                        }
                    }
                    query.offers.insert(offer.offer_hash.clone(), offer);
                }
            }
        }
    });

    (forward_rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use offerd_domain::Address;
    use offerd_store::MemoryQueryCache;

    fn offer(name: &str, preliminary: bool) -> Offer {
        let mut offer = Offer {
            provider: "ByteMe".into(),
            product_name: name.into(),
            speed: 100,
            monthly_cost_in_cent: 2000,
            is_preliminary: preliminary,
            ..Offer::default()
        };
        offer.seal();
        offer
    }

    fn empty_query() -> Query {
        Query::new(Address::new("Teststr", "1", "Berlin", "10115"), 1_700_000_000, "s1")
    }

    #[tokio::test]
    async fn forwards_new_offers_and_caches_on_close() {
        let cache = Arc::new(MemoryQueryCache::new());
        let (tx, rx) = mpsc::channel(4);
        let (mut forwarded, handle) = spool_offers(
            CancellationToken::new(),
            empty_query(),
            "key".into(),
            rx,
            Arc::clone(&cache) as Arc<dyn QueryCache>,
        );

        tx.send(offer("A", false)).await.unwrap();
        tx.send(offer("B", false)).await.unwrap();
        drop(tx);

        assert_eq!(forwarded.recv().await.unwrap().product_name, "A");
        assert_eq!(forwarded.recv().await.unwrap().product_name, "B");
        assert!(forwarded.recv().await.is_none());
        handle.await.unwrap();

        let cached = cache.get("key").await.unwrap().unwrap();
        assert_eq!(cached.offers.len(), 2);
    }

    #[tokio::test]
    async fn live_offer_supersedes_preliminary_with_same_hash() {
        let cache = Arc::new(MemoryQueryCache::new());
        let (tx, rx) = mpsc::channel(4);
        let (mut forwarded, handle) = spool_offers(
            CancellationToken::new(),
            empty_query(),
            "key".into(),
            rx,
            Arc::clone(&cache) as Arc<dyn QueryCache>,
        );

        tx.send(offer("A", true)).await.unwrap();
        tx.send(offer("A", false)).await.unwrap();
        drop(tx);

        let first = forwarded.recv().await.unwrap();
        assert!(first.is_preliminary);
        let second = forwarded.recv().await.unwrap();
        assert!(!second.is_preliminary);
        assert_eq!(first.offer_hash, second.offer_hash);
        assert!(forwarded.recv().await.is_none());
        handle.await.unwrap();

        // the final snapshot holds exactly one entry per hash, the live one
        let cached = cache.get("key").await.unwrap().unwrap();
        assert_eq!(cached.offers.len(), 1);
        assert!(!cached.offers.values().next().unwrap().is_preliminary);
    }

    #[tokio::test]
    async fn identical_live_duplicates_are_dropped() {
        let cache = Arc::new(MemoryQueryCache::new());
        let (tx, rx) = mpsc::channel(4);
        let (mut forwarded, handle) = spool_offers(
            CancellationToken::new(),
            empty_query(),
            "key".into(),
            rx,
            Arc::clone(&cache) as Arc<dyn QueryCache>,
        );

        tx.send(offer("A", false)).await.unwrap();
        tx.send(offer("A", false)).await.unwrap();
        drop(tx);

        assert_eq!(forwarded.recv().await.unwrap().product_name, "A");
        assert!(forwarded.recv().await.is_none());
        handle.await.unwrap();

        let cached = cache.get("key").await.unwrap().unwrap();
        assert_eq!(cached.offers.len(), 1);
    }

    #[tokio::test]
    async fn computes_missing_hashes_before_dedup() {
        let cache = Arc::new(MemoryQueryCache::new());
        let (tx, rx) = mpsc::channel(4);
        let (mut forwarded, handle) = spool_offers(
            CancellationToken::new(),
            empty_query(),
            "key".into(),
            rx,
            Arc::clone(&cache) as Arc<dyn QueryCache>,
        );

        let mut unhashed = offer("A", false);
        unhashed.offer_hash = String::new();
        tx.send(unhashed.clone()).await.unwrap();
        tx.send(unhashed).await.unwrap();
        drop(tx);

        let first = forwarded.recv().await.unwrap();
        assert!(!first.offer_hash.is_empty());
        // the second copy deduplicates against the recomputed hash
        assert!(forwarded.recv().await.is_none());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn cancellation_skips_the_cache_write() {
        let cache = Arc::new(MemoryQueryCache::new());
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(4);
        let (mut forwarded, handle) = spool_offers(
            cancel.clone(),
            empty_query(),
            "key".into(),
            rx,
            Arc::clone(&cache) as Arc<dyn QueryCache>,
        );

        tx.send(offer("A", false)).await.unwrap();
        assert_eq!(forwarded.recv().await.unwrap().product_name, "A");

        cancel.cancel();
        handle.await.unwrap();
        assert!(cache.is_empty());
    }
}
