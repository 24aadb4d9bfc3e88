//! Share endpoints
//!
//! `POST /offers/shared/{queryHash}` filters the caller's cached
//! snapshot server-side and persists it under a deterministic share id;
//! `GET /offers/shared/{shareId}` replays a persisted snapshot as
//! NDJSON. The share id is a content hash over the query hash, the
//! filter digest and the filtered offer set (hash plus preliminary flag,
//! in key order), so sharing the same view twice yields the same id and
//! at most one stored snapshot.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query as QueryParams, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use offerd_domain::{hash, Offer};
use offerd_store::QueryEntity;

use crate::error::{ApiError, Result};
use crate::filter::FilterParams;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionParams {
    session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    #[serde(rename = "shareId")]
    pub share_id: String,
}

/// POST /offers/shared/{queryHash} - create an immutable share snapshot
pub async fn share_offers(
    State(state): State<Arc<AppState>>,
    Path(query_hash): Path<String>,
    QueryParams(session): QueryParams<SessionParams>,
    QueryParams(filter): QueryParams<FilterParams>,
) -> Result<Json<ShareResponse>> {
    if query_hash.is_empty() {
        return Err(ApiError::missing_param("queryHash"));
    }
    if session.session_id.is_empty() {
        return Err(ApiError::missing_param("sessionId"));
    }

    let cache_key = format!("{}:{}", query_hash, session.session_id);
    let mut query = state
        .user_cache
        .get(&cache_key)
        .await?
        .ok_or_else(|| ApiError::NotFound("no cached query for this session".into()))?;

    let filtered = apply_filter(&filter, &query.offers);
    if filtered.is_empty() {
        return Err(ApiError::NotFound("cannot share an empty query".into()));
    }

    let share_id = compute_share_id(&query_hash, &filter, &filtered);
    query.offers = filtered;

    if state.shares.exists(&share_id).await? {
        info!(share_id = %share_id, "query already shared");
        return Ok(Json(ShareResponse { share_id }));
    }

    state.shares.insert(&QueryEntity {
        share_id: share_id.clone(),
        query,
    })
    .await?;

    info!(share_id = %share_id, "query shared");
    Ok(Json(ShareResponse { share_id }))
}

/// GET /offers/shared/{shareId} - replay a shared snapshot as NDJSON
pub async fn fetch_shared_offers(
    State(state): State<Arc<AppState>>,
    Path(share_id): Path<String>,
) -> Result<Response> {
    if share_id.is_empty() {
        return Err(ApiError::missing_param("shareId"));
    }

    let mut query = state
        .shares
        .get(&share_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("no query found for the provided share id".into()))?;

    // the header line carries the query without its offers
    let offers = std::mem::take(&mut query.offers);

    let mut body = String::new();
    if let Ok(json) = serde_json::to_string(&query) {
        body.push_str(&format!("{{\"query\": {json}}}\n"));
    }
    for offer in offers.values() {
        if let Ok(json) = serde_json::to_string(offer) {
            body.push_str(&format!("{{\"offer\": {json}}}\n"));
        }
    }

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "close")
        .body(body.into())
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Apply the filter, keeping the per-hash map shape.
fn apply_filter(filter: &FilterParams, offers: &BTreeMap<String, Offer>) -> BTreeMap<String, Offer> {
    let keep_all = filter.is_empty();
    offers
        .iter()
        .filter(|(_, offer)| keep_all || filter.matches(offer))
        .map(|(hash, offer)| (hash.clone(), offer.clone()))
        .collect()
}

/// Deterministic share id over the exact set being shared.
///
/// The offer aggregation iterates in key order; the preliminary flag is
/// part of the id on purpose, so the freshness state at share time is
/// captured.
fn compute_share_id(
    query_hash: &str,
    filter: &FilterParams,
    offers: &BTreeMap<String, Offer>,
) -> String {
    let mut agg = Vec::new();
    agg.extend_from_slice(query_hash.as_bytes());
    agg.extend_from_slice(&filter.digest());
    for (offer_hash, offer) in offers {
        agg.extend_from_slice(offer_hash.as_bytes());
        agg.extend_from_slice(if offer.is_preliminary {
            b"true".as_slice()
        } else {
            b"false".as_slice()
        });
    }
    hash::hash_url_encoded(&agg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use offerd_domain::ConnectionType;

    fn offer(name: &str, speed: i64, preliminary: bool) -> Offer {
        let mut offer = Offer {
            provider: "Mock".into(),
            product_name: name.into(),
            speed,
            connection_type: ConnectionType::from_provider("DSL"),
            monthly_cost_in_cent: 2999,
            is_preliminary: preliminary,
            ..Offer::default()
        };
        offer.seal();
        offer
    }

    fn offer_map(offers: Vec<Offer>) -> BTreeMap<String, Offer> {
        offers
            .into_iter()
            .map(|o| (o.offer_hash.clone(), o))
            .collect()
    }

    #[test]
    fn share_id_is_deterministic() {
        let offers = offer_map(vec![offer("A", 100, false), offer("B", 250, false)]);
        let filter = FilterParams {
            speed_min: Some(100),
            ..FilterParams::default()
        };

        let first = compute_share_id("qh", &filter, &offers);
        let second = compute_share_id("qh", &filter, &offers);
        assert_eq!(first, second);
    }

    #[test]
    fn share_id_depends_on_filter_and_set() {
        let offers = offer_map(vec![offer("A", 100, false)]);
        let base = compute_share_id("qh", &FilterParams::default(), &offers);

        let filtered = FilterParams {
            speed_min: Some(50),
            ..FilterParams::default()
        };
        assert_ne!(base, compute_share_id("qh", &filtered, &offers));

        let more = offer_map(vec![offer("A", 100, false), offer("B", 250, false)]);
        assert_ne!(base, compute_share_id("qh", &FilterParams::default(), &more));

        assert_ne!(base, compute_share_id("other", &FilterParams::default(), &offers));
    }

    #[test]
    fn preliminary_state_leaks_into_the_share_id() {
        let live = offer_map(vec![offer("A", 100, false)]);
        let preliminary = offer_map(vec![offer("A", 100, true)]);
        assert_ne!(
            compute_share_id("qh", &FilterParams::default(), &live),
            compute_share_id("qh", &FilterParams::default(), &preliminary)
        );
    }

    #[test]
    fn apply_filter_keeps_matching_offers_only() {
        let offers = offer_map(vec![offer("slow", 50, false), offer("fast", 500, false)]);
        let filter = FilterParams {
            speed_min: Some(100),
            ..FilterParams::default()
        };

        let filtered = apply_filter(&filter, &offers);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.values().next().unwrap().product_name, "fast");
    }

    #[test]
    fn empty_filter_keeps_everything() {
        let offers = offer_map(vec![offer("A", 50, false), offer("B", 500, true)]);
        let filtered = apply_filter(&FilterParams::default(), &offers);
        assert_eq!(filtered.len(), 2);
    }
}
