//! GET /offers, the streaming search endpoint
//!
//! Validates the address parameters, then hands the request to the
//! pipeline, which writes NDJSON lines into a channel that backs the
//! response body. Dropping the response (client disconnect) drops the
//! channel receiver, which the pipeline notices and unwinds on.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;

use offerd_domain::Address;

use crate::error::{ApiError, Result};
use crate::state::AppState;

/// Buffered NDJSON lines between pipeline and HTTP body.
const LINE_BUFFER: usize = 16;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OfferParams {
    street: String,
    house_number: String,
    city: String,
    plz: String,
    session_id: String,
}

impl OfferParams {
    /// All parameters are required and must be non-empty.
    fn validate(self) -> Result<(Address, String)> {
        if self.street.is_empty() {
            return Err(ApiError::missing_param("street"));
        }
        if self.house_number.is_empty() {
            return Err(ApiError::missing_param("houseNumber"));
        }
        if self.city.is_empty() {
            return Err(ApiError::missing_param("city"));
        }
        if self.plz.is_empty() {
            return Err(ApiError::missing_param("plz"));
        }
        if self.session_id.is_empty() {
            return Err(ApiError::missing_param("sessionId"));
        }

        let address = Address::new(self.street, self.house_number, self.city, self.plz);
        Ok((address, self.session_id))
    }
}

/// GET /offers - stream offers for an address as NDJSON
pub async fn fetch_offers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<OfferParams>,
) -> Result<Response> {
    let (address, session_id) = params.validate()?;

    let cancel = state.shutdown.child_token();
    let (lines_tx, lines_rx) = mpsc::channel::<Bytes>(LINE_BUFFER);

    let streamer = Arc::clone(&state.streamer);
    tokio::spawn(async move {
        streamer.stream(cancel, address, session_id, lines_tx).await;
    });

    let body = Body::from_stream(ReceiverStream::new(lines_rx).map(Ok::<_, Infallible>));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "close")
        .body(body)
        .map_err(|e| ApiError::Internal(e.to_string()))
}
