//! ServusSpeed adapter
//!
//! Two-phase protocol behind HTTP Basic auth: one call lists the
//! available product ids for an address, then one call per id fetches the
//! details. Detail requests run in parallel without a concurrency bound;
//! a failing product is logged and reported but never aborts the adapter.
//! The advertised discount is already folded into the monthly cost.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use offerd_config::ServusSpeedCredentials;
use offerd_domain::{Address, ConnectionType, Offer};

use crate::error::ProviderError;
use crate::retry::{retry, RetrySchedule};
use crate::{
    non_empty, non_zero, publish_offer, race_cancel, report_error, ErrorSink, OfferBus,
    ProviderAdapter,
};

const PROVIDER: &str = "ServusSpeed";
const DEFAULT_URL: &str = "https://servus-speed.gendev7.check24.fun";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Adapter for the two-phase ServusSpeed JSON API.
pub struct ServusSpeedAdapter {
    client: reqwest::Client,
    username: String,
    password: String,
    base_url: String,
    retry: RetrySchedule,
}

/// Request body shared by both phases. Only German addresses are
/// supported upstream, hence the fixed country.
#[derive(Debug, Serialize)]
struct ServusSpeedRequest<'a> {
    address: ServusSpeedAddress<'a>,
}

#[derive(Debug, Serialize)]
struct ServusSpeedAddress<'a> {
    strasse: &'a str,
    hausnummer: &'a str,
    postleitzahl: &'a str,
    stadt: &'a str,
    land: &'static str,
}

impl<'a> ServusSpeedRequest<'a> {
    fn for_address(address: &'a Address) -> Self {
        Self {
            address: ServusSpeedAddress {
                strasse: &address.street,
                hausnummer: &address.house_number,
                postleitzahl: &address.zip_code,
                stadt: &address.city,
                land: "DE",
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AvailableProductsResponse {
    available_products: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ProductDetailsResponse {
    servus_speed_product: ServusSpeedProduct,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ServusSpeedProduct {
    provider_name: String,
    product_info: ServusSpeedProductInfo,
    pricing_details: ServusSpeedPricing,
    discount: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ServusSpeedProductInfo {
    speed: i64,
    contract_duration_in_months: i64,
    connection_type: String,
    tv: Option<String>,
    limit_from: i64,
    max_age: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ServusSpeedPricing {
    monthly_cost_in_cent: i64,
    installation_service: bool,
}

impl ServusSpeedAdapter {
    pub fn new(credentials: &ServusSpeedCredentials, retry: RetrySchedule) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            username: credentials.username.clone(),
            password: credentials.password.clone(),
            base_url: DEFAULT_URL.to_string(),
            retry,
        }
    }

    /// Point the adapter at a different endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        url: &str,
        address: &Address,
    ) -> Result<T, ProviderError> {
        let request = self
            .client
            .post(url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Content-Type", "application/json")
            .json(&ServusSpeedRequest::for_address(address));

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

    async fn available_products(
        &self,
        cancel: &CancellationToken,
        address: &Address,
    ) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/api/external/available-products", self.base_url);
        let response: AvailableProductsResponse = self.post_json(cancel, &url, address).await?;
        Ok(response.available_products)
    }

    async fn product_details(
        &self,
        cancel: &CancellationToken,
        address: &Address,
        product_id: &str,
    ) -> Result<ProductDetailsResponse, ProviderError> {
        let url = format!("{}/api/external/product-details/{}", self.base_url, product_id);
        self.post_json(cancel, &url, address).await
    }

    /// Fetch one product's details and publish the resulting offer.
    async fn stream_product(
        &self,
        cancel: &CancellationToken,
        address: &Address,
        product_id: String,
        offers: &OfferBus,
        errors: &ErrorSink,
    ) {
        let details = match retry(cancel, &self.retry, "servusspeed product-details", || {
            self.product_details(cancel, address, &product_id)
        })
        .await
        {
            Ok(details) => details,
            Err(ProviderError::Cancelled) => return,
            Err(e) => {
                warn!(
                    provider = PROVIDER,
                    product_id = %product_id,
                    error = %e,
                    "failed to get product details"
                );
                report_error(cancel, errors, e).await;
                return;
            }
        };

        let mut offer = product_to_offer(details.servus_speed_product);
        offer.provider = PROVIDER.to_string();
        offer.seal();
        publish_offer(cancel, offers, offer).await;
    }
}

#[async_trait]
impl ProviderAdapter for ServusSpeedAdapter {
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
        let product_ids = match retry(cancel, &self.retry, "servusspeed available-products", || {
            self.available_products(cancel, address)
        })
        .await
        {
            Ok(ids) => ids,
            Err(ProviderError::Cancelled) => return,
            Err(e) => {
                report_error(cancel, errors, e).await;
                return;
            }
        };

        // one in-flight detail request per product id
        futures::future::join_all(product_ids.into_iter().map(|product_id| {
            self.stream_product(cancel, address, product_id, offers, errors)
        }))
        .await;
    }
}

fn product_to_offer(product: ServusSpeedProduct) -> Offer {
    Offer {
        product_name: product.provider_name,
        speed: product.product_info.speed,
        contract_duration_in_months: product.product_info.contract_duration_in_months,
        connection_type: ConnectionType::from_provider(&product.product_info.connection_type),
        tv: product.product_info.tv.and_then(non_empty),
        limit_in_gb: non_zero(product.product_info.limit_from),
        max_age_person: non_zero(product.product_info.max_age),
        // the discount applies to the monthly price directly
        monthly_cost_in_cent: product.pricing_details.monthly_cost_in_cent - product.discount,
        installation_service: product.pricing_details.installation_service,
        ..Offer::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_uses_german_field_names() {
        let address = Address::new("Teststr", "1", "Berlin", "10115");
        let json = serde_json::to_value(ServusSpeedRequest::for_address(&address)).unwrap();
        assert_eq!(json["address"]["strasse"], "Teststr");
        assert_eq!(json["address"]["hausnummer"], "1");
        assert_eq!(json["address"]["postleitzahl"], "10115");
        assert_eq!(json["address"]["stadt"], "Berlin");
        assert_eq!(json["address"]["land"], "DE");
    }

    #[test]
    fn discount_is_subtracted_from_monthly_cost() {
        let payload = r#"{
            "servusSpeedProduct": {
                "providerName": "Servus Fiber 500",
                "productInfo": {
                    "speed": 500,
                    "contractDurationInMonths": 24,
                    "connectionType": "FIBER"
                },
                "pricingDetails": {
                    "monthlyCostInCent": 4999,
                    "installationService": true
                },
                "discount": 500
            }
        }"#;

        let response: ProductDetailsResponse = serde_json::from_str(payload).unwrap();
        let offer = product_to_offer(response.servus_speed_product);
        assert_eq!(offer.monthly_cost_in_cent, 4499);
        assert!(offer.installation_service);
        assert_eq!(offer.connection_type.as_str(), "FIBER");
    }

    #[test]
    fn available_products_parses_id_list() {
        let payload = r#"{"availableProducts": ["sp-1", "sp-2", "sp-3"]}"#;
        let response: AvailableProductsResponse = serde_json::from_str(payload).unwrap();
        assert_eq!(response.available_products, vec!["sp-1", "sp-2", "sp-3"]);
    }
}
