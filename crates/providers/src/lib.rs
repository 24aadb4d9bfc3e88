//! Provider adapters
//!
//! One adapter per upstream provider API. Each adapter translates the
//! normalized address into its provider-specific request (CSV over GET,
//! HMAC-signed JSON, two-phase Basic-auth JSON, paginated German prose,
//! SOAP/XML), parses the response and publishes normalized offers onto a
//! shared [`PubSub`] bus. Errors go to a separate channel and never abort
//! the fleet; partial results beat failure.
//!
//! Every network call is wrapped in the shared [`retry`] schedule, and
//! every await point races against the request's cancellation token so a
//! client disconnect or the fleet deadline unwinds an adapter within one
//! select iteration.

mod bus;
mod byteme;
mod error;
mod fleet;
mod pingperfect;
mod retry;
mod servusspeed;
mod verbyndich;
mod webwunder;

use std::future::Future;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use offerd_domain::{Address, Offer};

pub use bus::PubSub;
pub use byteme::ByteMeAdapter;
pub use error::ProviderError;
pub use fleet::ProviderFleet;
pub use pingperfect::PingPerfectAdapter;
pub use retry::{retry, RetrySchedule};
pub use servusspeed::ServusSpeedAdapter;
pub use verbyndich::VerbynDichAdapter;
pub use webwunder::WebWunderAdapter;

/// The offer stream adapters publish into.
pub type OfferBus = PubSub<Offer>;

/// Channel for upstream errors; drained and logged by the pipeline.
pub type ErrorSink = mpsc::Sender<ProviderError>;

/// A provider adapter that streams normalized offers for an address.
///
/// Implementations stamp their provider name on every offer and compute
/// the offer hash before publishing. They must honor `cancel` at every
/// I/O and publish point and must never block past cancellation.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name stamped on emitted offers (e.g. "ByteMe").
    fn name(&self) -> &'static str;

    /// Fetch offers for `address`, publishing them onto `offers` as they
    /// arrive. Per-item failures are reported on `errors` and do not
    /// abort the adapter.
    async fn stream_offers(
        &self,
        cancel: &CancellationToken,
        address: &Address,
        offers: &OfferBus,
        errors: &ErrorSink,
    );
}

/// Await a future unless the token is cancelled first.
pub(crate) async fn race_cancel<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, ProviderError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        value = fut => Ok(value),
    }
}

/// Publish an offer, giving up on cancellation.
pub(crate) async fn publish_offer(cancel: &CancellationToken, offers: &OfferBus, offer: Offer) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = offers.publish(offer) => {}
    }
}

/// Report an upstream error, giving up on cancellation.
pub(crate) async fn report_error(cancel: &CancellationToken, errors: &ErrorSink, err: ProviderError) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = errors.send(err) => {}
    }
}

/// Providers report absent numeric fields as zero; map those to `None`
/// so they are omitted from the normalized offer.
pub(crate) fn non_zero(value: i64) -> Option<i64> {
    (value != 0).then_some(value)
}

/// Empty provider strings mean "not present".
pub(crate) fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
