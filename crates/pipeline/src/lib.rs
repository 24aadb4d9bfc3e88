//! Aggregation and streaming pipeline
//!
//! Orchestrates one `/offers` request: consult the address cache, replay
//! cached offers as preliminary when a live fetch is warranted, run the
//! provider fleet, merge both streams, dedupe by offer hash with
//! live-supersedes-preliminary semantics, stream NDJSON lines to the
//! client, and write both caches on the way out.

mod spool;
mod stream;


pub use spool::spool_offers;
pub use stream::OfferStreamer;
