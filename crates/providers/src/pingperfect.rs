//! PingPerfect adapter
//!
//! PingPerfect wants a JSON POST signed with HMAC-SHA256: the signature
//! covers `timestamp:body`, hex-encoded, and travels in `X-Signature`
//! next to `X-Client-Id` and `X-Timestamp`. The timestamp is regenerated
//! per attempt so retried requests carry a fresh signature.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio_util::sync::CancellationToken;

use offerd_config::PingPerfectCredentials;
use offerd_domain::{Address, ConnectionType, Offer};

use crate::error::ProviderError;
use crate::retry::{retry, RetrySchedule};
use crate::{
    non_empty, non_zero, publish_offer, race_cancel, report_error, ErrorSink, OfferBus,
    ProviderAdapter,
};

const PROVIDER: &str = "PingPerfect";
const DEFAULT_URL: &str = "https://pingperfect.gendev7.check24.fun/internet/angebote/data";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

type HmacSha256 = Hmac<Sha256>;

/// Adapter for the HMAC-signed PingPerfect JSON API.
pub struct PingPerfectAdapter {
    client: reqwest::Client,
    client_id: String,
    signature_secret: String,
    base_url: String,
    retry: RetrySchedule,
}

/// Request payload; field names are part of the wire contract.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PingPerfectRequest<'a> {
    street: &'a str,
    plz: &'a str,
    house_number: &'a str,
    city: &'a str,
    wants_fiber: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PingPerfectProduct {
    provider_name: String,
    product_info: PingPerfectProductInfo,
    pricing_details: PingPerfectPricing,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PingPerfectProductInfo {
    speed: i64,
    contract_duration_in_months: i64,
    connection_type: String,
    tv: Option<String>,
    limit_from: i64,
    max_age: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct PingPerfectPricing {
    monthly_cost_in_cent: i64,
    installation_service: Option<String>,
}

impl PingPerfectAdapter {
    pub fn new(credentials: &PingPerfectCredentials, retry: RetrySchedule) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            client_id: credentials.client_id.clone(),
            signature_secret: credentials.signature_secret.clone(),
            base_url: DEFAULT_URL.to_string(),
            retry,
        }
    }

    /// Point the adapter at a different endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_products(
        &self,
        cancel: &CancellationToken,
        body: &[u8],
    ) -> Result<Vec<PingPerfectProduct>, ProviderError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_request(&self.signature_secret, &timestamp, body);

        let request = self
            .client
            .post(&self.base_url)
            .header("Content-Type", "application/json")
            .header("X-Client-Id", &self.client_id)
            .header("X-Timestamp", &timestamp)
            .header("X-Signature", signature)
            .body(body.to_vec());

        let response = race_cancel(cancel, request.send())
            .await?
            .map_err(|e| ProviderError::http(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = race_cancel(cancel, response.text()).await?.unwrap_or_default();
            return Err(ProviderError::status(PROVIDER, status.as_u16(), body));
        }

        race_cancel(cancel, response.json())
            .await?
            .map_err(|e| ProviderError::decode(PROVIDER, e))
    }
}

#[async_trait]
impl ProviderAdapter for PingPerfectAdapter {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn stream_offers(
        &self,
        cancel: &CancellationToken,
        address: &Address,
        offers: &OfferBus,
        errors: &ErrorSink,
    ) {
        let request = PingPerfectRequest {
            street: &address.street,
            plz: &address.zip_code,
            house_number: &address.house_number,
            city: &address.city,
            wants_fiber: false,
        };
        let body = match serde_json::to_vec(&request) {
            Ok(body) => body,
            Err(e) => {
                report_error(cancel, errors, ProviderError::decode(PROVIDER, e)).await;
                return;
            }
        };

        let products = match retry(cancel, &self.retry, "pingperfect offers", || {
            self.fetch_products(cancel, &body)
        })
        .await
        {
            Ok(products) => products,
            Err(ProviderError::Cancelled) => return,
            Err(e) => {
                report_error(cancel, errors, e).await;
                return;
            }
        };

        for product in products {
            let mut offer = product_to_offer(product);
            offer.provider = PROVIDER.to_string();
            offer.seal();
            publish_offer(cancel, offers, offer).await;
        }
    }
}

/// Hex HMAC-SHA256 over `timestamp:body`.
fn sign_request(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any size");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn product_to_offer(product: PingPerfectProduct) -> Offer {
    Offer {
        product_name: product.provider_name,
        speed: product.product_info.speed,
        contract_duration_in_months: product.product_info.contract_duration_in_months,
        connection_type: ConnectionType::from_provider(&product.product_info.connection_type),
        tv: product.product_info.tv.and_then(non_empty),
        limit_in_gb: non_zero(product.product_info.limit_from),
        max_age_person: non_zero(product.product_info.max_age),
        monthly_cost_in_cent: product.pricing_details.monthly_cost_in_cent,
        installation_service: product.pricing_details.installation_service.as_deref() == Some("yes"),
        ..Offer::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_known_vector() {
        // Recomputable with any HMAC-SHA256 implementation:
        // key "secret", message "1700000000:{}"
        let signature = sign_request("secret", "1700000000", b"{}");
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        // lowercase hex, stable across runs
        assert_eq!(signature, sign_request("secret", "1700000000", b"{}"));
        assert_ne!(signature, sign_request("other", "1700000000", b"{}"));
        assert_ne!(signature, sign_request("secret", "1700000001", b"{}"));
    }

    #[test]
    fn request_serializes_with_wire_names() {
        let request = PingPerfectRequest {
            street: "Teststr",
            plz: "10115",
            house_number: "1",
            city: "Berlin",
            wants_fiber: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["street"], "Teststr");
        assert_eq!(json["plz"], "10115");
        assert_eq!(json["houseNumber"], "1");
        assert_eq!(json["wantsFiber"], false);
    }

    #[test]
    fn products_map_onto_offers() {
        let payload = r#"[{
            "providerName": "PingPerfect Fast 250",
            "productInfo": {
                "speed": 250,
                "contractDurationInMonths": 24,
                "connectionType": "cable",
                "tv": "PingTV",
                "limitFrom": 0,
                "maxAge": 0
            },
            "pricingDetails": {
                "monthlyCostInCent": 3499,
                "installationService": "yes"
            }
        }]"#;

        let products: Vec<PingPerfectProduct> = serde_json::from_str(payload).unwrap();
        let offer = product_to_offer(products.into_iter().next().unwrap());

        assert_eq!(offer.product_name, "PingPerfect Fast 250");
        assert_eq!(offer.speed, 250);
        assert_eq!(offer.connection_type.as_str(), "CABLE");
        assert_eq!(offer.tv.as_deref(), Some("PingTV"));
        assert_eq!(offer.limit_in_gb, None);
        assert_eq!(offer.monthly_cost_in_cent, 3499);
        assert!(offer.installation_service);
    }

    #[test]
    fn installation_service_defaults_to_false() {
        let payload = r#"[{
            "providerName": "PingPerfect Eco",
            "productInfo": {
                "speed": 50,
                "contractDurationInMonths": 12,
                "connectionType": "DSL"
            },
            "pricingDetails": {
                "monthlyCostInCent": 1999
            }
        }]"#;

        let products: Vec<PingPerfectProduct> = serde_json::from_str(payload).unwrap();
        let offer = product_to_offer(products.into_iter().next().unwrap());
        assert!(!offer.installation_service);
        assert_eq!(offer.tv, None);
    }
}
