//! Route handlers

mod offers;
mod share;

pub use offers::fetch_offers;
pub use share::{fetch_shared_offers, share_offers};
