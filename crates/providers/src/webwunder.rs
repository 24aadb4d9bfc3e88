//! WebWunder adapter
//!
//! WebWunder speaks SOAP 1.1 and only answers for one (connection type,
//! installation) pair per call, so every request fans out into 8 SOAP
//! POSTs (4 connection types × installation yes/no). The envelope is
//! emitted with the `<?xml version="1.0" encoding="UTF-8"?>` declaration
//! and the `soapenv`/`gs` namespaces; responses are parsed by local
//! element name so the upstream's namespace prefixes do not matter.

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use tokio_util::sync::CancellationToken;

use offerd_config::WebWunderCredentials;
use offerd_domain::{Address, ConnectionType, Offer, VoucherDetails, VoucherKind};

use crate::error::ProviderError;
use crate::retry::{retry, RetrySchedule};
use crate::{
    non_zero, publish_offer, race_cancel, report_error, ErrorSink, OfferBus, ProviderAdapter,
};

const PROVIDER: &str = "WebWunder";
const DEFAULT_URL: &str = "https://webwunder.gendev7.check24.fun:443/endpunkte/soap/ws";
const SOAP_ACTION: &str = "legacyGetInternetOffers";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Adapter for the WebWunder SOAP API.
pub struct WebWunderAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    retry: RetrySchedule,
}

/// One product extracted from the SOAP response.
#[derive(Debug, Default, PartialEq)]
struct SoapProduct {
    product_id: i64,
    provider_name: String,
    has_info: bool,
    speed: i64,
    monthly_cost_in_cent: i64,
    monthly_cost_from_25th_month: i64,
    contract_duration_in_months: i64,
    connection_type: String,
    percentage_voucher: Option<PercentageVoucher>,
    absolute_voucher: Option<AbsoluteVoucher>,
}

#[derive(Debug, Default, PartialEq)]
struct PercentageVoucher {
    percentage: i64,
    max_discount_in_cent: i64,
}

#[derive(Debug, Default, PartialEq)]
struct AbsoluteVoucher {
    discount_in_cent: i64,
    min_order_value_in_cent: i64,
}

impl WebWunderAdapter {
    pub fn new(credentials: &WebWunderCredentials, retry: RetrySchedule) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: credentials.api_key.clone(),
            base_url: DEFAULT_URL.to_string(),
            retry,
        }
    }

    /// Point the adapter at a different endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_combination(
        &self,
        cancel: &CancellationToken,
        envelope: &str,
    ) -> Result<String, ProviderError> {
        let request = self
            .client
            .post(&self.base_url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .header("X-Api-Key", &self.api_key)
            .header("SOAPAction", SOAP_ACTION)
            .body(envelope.to_string());

        let response = race_cancel(cancel, request.send())
            .await?
            .map_err(|e| ProviderError::http(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = race_cancel(cancel, response.text()).await?.unwrap_or_default();
            return Err(ProviderError::status(PROVIDER, status.as_u16(), body));
        }

        race_cancel(cancel, response.text())
            .await?
            .map_err(|e| ProviderError::http(PROVIDER, e))
    }

    /// Run one (connection type, installation) request and publish its
    /// products.
    async fn stream_combination(
        &self,
        cancel: &CancellationToken,
        address: &Address,
        connection_type: &'static str,
        installation: bool,
        offers: &OfferBus,
        errors: &ErrorSink,
    ) {
        let envelope = soap_envelope(address, connection_type, installation);

        let body = match retry(cancel, &self.retry, "webwunder offers", || {
            self.fetch_combination(cancel, &envelope)
        })
        .await
        {
            Ok(body) => body,
            Err(ProviderError::Cancelled) => return,
            Err(e) => {
                report_error(cancel, errors, e).await;
                return;
            }
        };

        let products = match parse_products(&body) {
            Ok(products) => products,
            Err(e) => {
                report_error(cancel, errors, e).await;
                return;
            }
        };

        for product in products {
            let mut offer = product_to_offer(product);
            offer.provider = PROVIDER.to_string();
            offer.installation_service = installation;
            offer.seal();
            publish_offer(cancel, offers, offer).await;
        }
    }
}

#[async_trait]
impl ProviderAdapter for WebWunderAdapter {
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
        let mut combinations = Vec::with_capacity(ConnectionType::ALL.len() * 2);
        for connection_type in ConnectionType::ALL {
            for installation in [true, false] {
                combinations.push((connection_type, installation));
            }
        }

        futures::future::join_all(combinations.into_iter().map(
            |(connection_type, installation)| {
                self.stream_combination(
                    cancel,
                    address,
                    connection_type,
                    installation,
                    offers,
                    errors,
                )
            },
        ))
        .await;
    }
}

/// Build the SOAP 1.1 request envelope.
fn soap_envelope(address: &Address, connection_type: &str, installation: bool) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" "#,
            r#"xmlns:gs="http://webwunder.gendev7.check24.fun/offerservice">"#,
            "<soapenv:Header/>",
            "<soapenv:Body>",
            "<gs:legacyGetInternetOffers>",
            "<gs:input>",
            "<gs:installation>{installation}</gs:installation>",
            "<gs:connectionEnum>{connection}</gs:connectionEnum>",
            "<gs:address>",
            "<gs:street>{street}</gs:street>",
            "<gs:houseNumber>{house_number}</gs:houseNumber>",
            "<gs:city>{city}</gs:city>",
            "<gs:plz>{plz}</gs:plz>",
            "<gs:countryCode>DE</gs:countryCode>",
            "</gs:address>",
            "</gs:input>",
            "</gs:legacyGetInternetOffers>",
            "</soapenv:Body>",
            "</soapenv:Envelope>",
        ),
        installation = installation,
        connection = connection_type,
        street = escape(address.street.as_str()),
        house_number = escape(address.house_number.as_str()),
        city = escape(address.city.as_str()),
        plz = escape(address.zip_code.as_str()),
    )
}

/// Parse all `products` elements out of the SOAP response envelope.
///
/// The walker keys on local names only, tolerating whatever namespace
/// prefixes the upstream emits.
fn parse_products(xml: &str) -> Result<Vec<SoapProduct>, ProviderError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut path: Vec<String> = Vec::new();
    let mut products = Vec::new();
    let mut current: Option<SoapProduct> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let name = String::from_utf8_lossy(start.local_name().as_ref()).to_string();
                if name == "products" {
                    current = Some(SoapProduct::default());
                } else if name == "productInfo" {
                    if let Some(product) = current.as_mut() {
                        product.has_info = true;
                    }
                } else if name == "percentageVoucher" {
                    if let Some(product) = current.as_mut() {
                        product.percentage_voucher = Some(PercentageVoucher::default());
                    }
                } else if name == "absoluteVoucher" {
                    if let Some(product) = current.as_mut() {
                        product.absolute_voucher = Some(AbsoluteVoucher::default());
                    }
                }
                path.push(name);
            }
            Ok(Event::End(_)) => {
                if path.pop().as_deref() == Some("products") {
                    if let Some(product) = current.take() {
                        products.push(product);
                    }
                }
            }
            Ok(Event::Text(text)) => {
                let value = text
                    .unescape()
                    .map_err(|e| ProviderError::decode(PROVIDER, e))?;
                let value = value.trim();
                if value.is_empty() {
                    continue;
                }
                if let (Some(product), Some(element)) = (current.as_mut(), path.last()) {
                    assign_field(product, element, value);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(ProviderError::decode(PROVIDER, e)),
        }
    }

    Ok(products)
}

fn assign_field(product: &mut SoapProduct, element: &str, value: &str) {
    let as_int = || value.parse::<i64>().unwrap_or(0);
    match element {
        "productId" => product.product_id = as_int(),
        "providerName" => product.provider_name = value.to_string(),
        "speed" => product.speed = as_int(),
        "monthlyCostInCent" => product.monthly_cost_in_cent = as_int(),
        "monthlyCostInCentFrom25thMonth" => product.monthly_cost_from_25th_month = as_int(),
        "contractDurationInMonths" => product.contract_duration_in_months = as_int(),
        "connectionType" => product.connection_type = value.to_string(),
        "percentage" => {
            if let Some(voucher) = product.percentage_voucher.as_mut() {
                voucher.percentage = as_int();
            }
        }
        "maxDiscountInCent" => {
            if let Some(voucher) = product.percentage_voucher.as_mut() {
                voucher.max_discount_in_cent = as_int();
            }
        }
        "discountInCent" => {
            if let Some(voucher) = product.absolute_voucher.as_mut() {
                voucher.discount_in_cent = as_int();
            }
        }
        "minOrderValueInCent" => {
            if let Some(voucher) = product.absolute_voucher.as_mut() {
                voucher.min_order_value_in_cent = as_int();
            }
        }
        _ => {}
    }
}

fn product_to_offer(product: SoapProduct) -> Offer {
    let mut offer = Offer {
        product_id: non_zero(product.product_id),
        product_name: product.provider_name,
        ..Offer::default()
    };

    if !product.has_info {
        return offer;
    }

    offer.speed = product.speed;
    offer.contract_duration_in_months = product.contract_duration_in_months;
    offer.connection_type = ConnectionType::from_provider(&product.connection_type);
    offer.monthly_cost_in_cent = product.monthly_cost_in_cent;
    offer.after_two_years_monthly_cost = non_zero(product.monthly_cost_from_25th_month);

    if let Some(voucher) = product.percentage_voucher {
        offer.voucher_details = Some(VoucherDetails {
            kind: VoucherKind::Percentage,
            value: voucher.percentage,
            description: format!("Maximum Discount: {} Cent", voucher.max_discount_in_cent),
        });
        if offer.contract_duration_in_months > 0 {
            let total_discount = (offer.monthly_cost_in_cent
                * offer.contract_duration_in_months
                * voucher.percentage
                / 100)
                .min(voucher.max_discount_in_cent);
            offer.monthly_cost_in_cent_with_voucher = Some(
                offer.monthly_cost_in_cent - total_discount / offer.contract_duration_in_months,
            );
        }
    } else if let Some(voucher) = product.absolute_voucher {
        offer.voucher_details = Some(VoucherDetails {
            kind: VoucherKind::Absolute,
            value: voucher.discount_in_cent,
            description: format!("Minimal Order Value: {} Cent", voucher.min_order_value_in_cent),
        });
        let price_over_contract = offer.monthly_cost_in_cent * offer.contract_duration_in_months;
        if price_over_contract > voucher.min_order_value_in_cent
            && offer.contract_duration_in_months > 0
        {
            offer.monthly_cost_in_cent_with_voucher = Some(
                offer.monthly_cost_in_cent
                    - voucher.discount_in_cent / offer.contract_duration_in_months,
            );
        }
    }

    offer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_declaration_namespaces_and_input() {
        let address = Address::new("Teststr", "1", "Berlin", "10115");
        let envelope = soap_envelope(&address, "DSL", true);

        assert!(envelope.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(envelope.contains(r#"xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/""#));
        assert!(envelope
            .contains(r#"xmlns:gs="http://webwunder.gendev7.check24.fun/offerservice""#));
        assert!(envelope.contains("<gs:installation>true</gs:installation>"));
        assert!(envelope.contains("<gs:connectionEnum>DSL</gs:connectionEnum>"));
        assert!(envelope.contains("<gs:plz>10115</gs:plz>"));
        assert!(envelope.contains("<gs:countryCode>DE</gs:countryCode>"));
    }

    #[test]
    fn envelope_escapes_reserved_characters() {
        let address = Address::new("Müller & Schmidt <Allee>", "2a", "Köln", "50667");
        let envelope = soap_envelope(&address, "CABLE", false);
        assert!(envelope.contains("Müller &amp; Schmidt &lt;Allee&gt;"));
    }

    const RESPONSE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<SOAP-ENV:Envelope xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/">
  <SOAP-ENV:Header/>
  <SOAP-ENV:Body>
    <ns2:Output xmlns:ns2="http://webwunder.gendev7.check24.fun/offerservice">
      <ns2:products>
        <ns2:productId>101</ns2:productId>
        <ns2:providerName>WebWunder Home 100</ns2:providerName>
        <ns2:productInfo>
          <ns2:speed>100</ns2:speed>
          <ns2:monthlyCostInCent>2999</ns2:monthlyCostInCent>
          <ns2:monthlyCostInCentFrom25thMonth>3499</ns2:monthlyCostInCentFrom25thMonth>
          <ns2:voucher>
            <ns2:percentageVoucher>
              <ns2:percentage>10</ns2:percentage>
              <ns2:maxDiscountInCent>5000</ns2:maxDiscountInCent>
            </ns2:percentageVoucher>
          </ns2:voucher>
          <ns2:contractDurationInMonths>24</ns2:contractDurationInMonths>
          <ns2:connectionType>DSL</ns2:connectionType>
        </ns2:productInfo>
      </ns2:products>
      <ns2:products>
        <ns2:productId>102</ns2:productId>
        <ns2:providerName>WebWunder Flex</ns2:providerName>
        <ns2:productInfo>
          <ns2:speed>50</ns2:speed>
          <ns2:monthlyCostInCent>1999</ns2:monthlyCostInCent>
          <ns2:monthlyCostInCentFrom25thMonth>1999</ns2:monthlyCostInCentFrom25thMonth>
          <ns2:voucher>
            <ns2:absoluteVoucher>
              <ns2:discountInCent>2400</ns2:discountInCent>
              <ns2:minOrderValueInCent>10000</ns2:minOrderValueInCent>
            </ns2:absoluteVoucher>
          </ns2:voucher>
          <ns2:contractDurationInMonths>12</ns2:contractDurationInMonths>
          <ns2:connectionType>CABLE</ns2:connectionType>
        </ns2:productInfo>
      </ns2:products>
    </ns2:Output>
  </SOAP-ENV:Body>
</SOAP-ENV:Envelope>"#;

    #[test]
    fn parses_products_regardless_of_namespace_prefix() {
        let products = parse_products(RESPONSE).unwrap();
        assert_eq!(products.len(), 2);

        let first = &products[0];
        assert_eq!(first.product_id, 101);
        assert_eq!(first.provider_name, "WebWunder Home 100");
        assert_eq!(first.speed, 100);
        assert_eq!(first.monthly_cost_in_cent, 2999);
        assert_eq!(
            first.percentage_voucher,
            Some(PercentageVoucher {
                percentage: 10,
                max_discount_in_cent: 5000
            })
        );
        assert!(first.absolute_voucher.is_none());
    }

    #[test]
    fn percentage_voucher_is_capped() {
        let products = parse_products(RESPONSE).unwrap();
        let offer = product_to_offer(products.into_iter().next().unwrap());

        // 2999 * 24 * 10% = 7197, capped at 5000; 5000 / 24 = 208
        assert_eq!(offer.monthly_cost_in_cent_with_voucher, Some(2999 - 208));
        let voucher = offer.voucher_details.unwrap();
        assert_eq!(voucher.kind, VoucherKind::Percentage);
        assert_eq!(voucher.value, 10);
    }

    #[test]
    fn absolute_voucher_requires_min_order_value() {
        let products = parse_products(RESPONSE).unwrap();
        let offer = product_to_offer(products.into_iter().nth(1).unwrap());

        // 1999 * 12 = 23988 > 10000, so the discount applies:
        // 2400 / 12 = 200 per month
        assert_eq!(offer.monthly_cost_in_cent_with_voucher, Some(1999 - 200));
        let voucher = offer.voucher_details.unwrap();
        assert_eq!(voucher.kind, VoucherKind::Absolute);
        assert_eq!(voucher.value, 2400);
    }

    #[test]
    fn absolute_voucher_below_min_order_value_leaves_cost_unchanged() {
        let xml = RESPONSE.replace(
            "<ns2:minOrderValueInCent>10000</ns2:minOrderValueInCent>",
            "<ns2:minOrderValueInCent>99999</ns2:minOrderValueInCent>",
        );
        let products = parse_products(&xml).unwrap();
        let offer = product_to_offer(products.into_iter().nth(1).unwrap());
        assert_eq!(offer.monthly_cost_in_cent_with_voucher, None);
        // the voucher itself is still recorded
        assert!(offer.voucher_details.is_some());
    }

    #[test]
    fn product_without_info_keeps_only_identity() {
        let xml = r#"<Envelope><Body><Output>
            <products>
                <productId>7</productId>
                <providerName>WebWunder Stub</providerName>
            </products>
        </Output></Body></Envelope>"#;
        let products = parse_products(xml).unwrap();
        let offer = product_to_offer(products.into_iter().next().unwrap());
        assert_eq!(offer.product_id, Some(7));
        assert_eq!(offer.product_name, "WebWunder Stub");
        assert_eq!(offer.speed, 0);
        assert_eq!(offer.monthly_cost_in_cent, 0);
    }

    #[test]
    fn mismatched_tags_are_a_decode_error() {
        let err = parse_products("<products><speed>1</wrong></products>").unwrap_err();
        assert!(err.to_string().contains("WebWunder"));
    }
}
