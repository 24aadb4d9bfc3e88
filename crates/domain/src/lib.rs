//! Domain model for the offer aggregator
//!
//! Normalized offer schema shared by the provider adapters, the streaming
//! pipeline, the caches and the share store. All content addressing
//! (offer hashes, address hashes, share ids) lives here so that every
//! component derives identical ids from identical data.

mod address;
pub mod hash;
mod offer;
mod query;

pub use address::Address;
pub use offer::{ConnectionType, Offer, VoucherDetails, VoucherKind};
pub use query::Query;
