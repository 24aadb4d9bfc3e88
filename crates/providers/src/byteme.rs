//! ByteMe adapter
//!
//! ByteMe answers a plain GET with a CSV document. Cells are typed by
//! inference (int, float, bool, string fallback) before being projected
//! onto the normalized offer; columns the projection does not know land
//! in `extra_properties`. The feed may contain duplicate rows; dedup by
//! content hash happens downstream.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use offerd_config::ByteMeCredentials;
use offerd_domain::{Address, ConnectionType, Offer, VoucherDetails, VoucherKind};

use crate::error::ProviderError;
use crate::retry::{retry, RetrySchedule};
use crate::{
    non_empty, non_zero, publish_offer, race_cancel, report_error, ErrorSink, OfferBus,
    ProviderAdapter,
};

const PROVIDER: &str = "ByteMe";
const DEFAULT_URL: &str = "https://byteme.gendev7.check24.fun/app/api/products/data";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Adapter for the ByteMe CSV API.
pub struct ByteMeAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    retry: RetrySchedule,
}

impl ByteMeAdapter {
    pub fn new(credentials: &ByteMeCredentials, retry: RetrySchedule) -> Self {
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

    async fn fetch_rows(
        &self,
        cancel: &CancellationToken,
        address: &Address,
    ) -> Result<Vec<BTreeMap<String, CsvCell>>, ProviderError> {
        let request = self
            .client
            .get(&self.base_url)
            .query(&[
                ("street", address.street.as_str()),
                ("houseNumber", address.house_number.as_str()),
                ("city", address.city.as_str()),
                ("plz", address.zip_code.as_str()),
            ])
            .header("X-Api-Key", &self.api_key);

        let response = race_cancel(cancel, request.send())
            .await?
            .map_err(|e| ProviderError::http(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = race_cancel(cancel, response.text()).await?.unwrap_or_default();
            return Err(ProviderError::status(PROVIDER, status.as_u16(), body));
        }

        let body = race_cancel(cancel, response.text())
            .await?
            .map_err(|e| ProviderError::http(PROVIDER, e))?;

        parse_csv(&body)
    }
}

#[async_trait]
impl ProviderAdapter for ByteMeAdapter {
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
        let rows = match retry(cancel, &self.retry, "byteme products", || {
            self.fetch_rows(cancel, address)
        })
        .await
        {
            Ok(rows) => rows,
            Err(ProviderError::Cancelled) => return,
            Err(e) => {
                report_error(cancel, errors, e).await;
                return;
            }
        };

        for row in rows {
            let mut offer = row_to_offer(row);
            offer.provider = PROVIDER.to_string();
            offer.seal();
            publish_offer(cancel, offers, offer).await;
        }
    }
}

/// A single typed CSV cell.
#[derive(Debug, Clone, PartialEq)]
enum CsvCell {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl CsvCell {
    /// Infer the cell type: int first, then float, then the boolean
    /// words, finally string. "1"/"0" therefore stay numeric.
    fn infer(raw: &str) -> Self {
        if let Ok(int) = raw.parse::<i64>() {
            return Self::Int(int);
        }
        if let Ok(float) = raw.parse::<f64>() {
            return Self::Float(float);
        }
        match raw.to_lowercase().as_str() {
            "true" | "yes" => Self::Bool(true),
            "false" | "no" => Self::Bool(false),
            _ => Self::Text(raw.to_string()),
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Float(v) => v.to_string(),
            Self::Bool(v) => v.to_string(),
            Self::Text(v) => v.clone(),
        }
    }
}

/// Parse the CSV payload into one typed map per row, keyed by the header
/// row.
fn parse_csv(body: &str) -> Result<Vec<BTreeMap<String, CsvCell>>, ProviderError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ProviderError::Csv {
            provider: PROVIDER,
            source: e,
        })?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ProviderError::Csv {
            provider: PROVIDER,
            source: e,
        })?;

        let mut row = BTreeMap::new();
        for (index, value) in record.iter().enumerate() {
            if let Some(header) = headers.get(index) {
                row.insert(header.to_string(), CsvCell::infer(value));
            }
        }
        rows.push(row);
    }

    Ok(rows)
}

/// Columns the projection consumes; everything else is an extra property.
const KNOWN_COLUMNS: [&str; 13] = [
    "productId",
    "providerName",
    "speed",
    "durationInMonths",
    "limitFrom",
    "maxAge",
    "connectionType",
    "tv",
    "monthlyCostInCent",
    "afterTwoYearsMonthlyCost",
    "installationService",
    "voucherType",
    "voucherValue",
];

/// Project a typed CSV row onto the normalized offer.
fn row_to_offer(row: BTreeMap<String, CsvCell>) -> Offer {
    let mut offer = Offer::default();

    let int = |name: &str| row.get(name).and_then(CsvCell::as_i64);
    let text = |name: &str| row.get(name).and_then(CsvCell::as_text);

    offer.product_id = int("productId");
    // the CSV column is named providerName but carries the product name
    offer.product_name = text("providerName").unwrap_or_default().to_string();
    offer.speed = int("speed").unwrap_or(0);
    offer.contract_duration_in_months = int("durationInMonths").unwrap_or(0);
    offer.limit_in_gb = int("limitFrom").and_then(non_zero);
    offer.max_age_person = int("maxAge").and_then(non_zero);
    offer.connection_type = ConnectionType::from_provider(text("connectionType").unwrap_or(""));
    offer.tv = non_empty(text("tv").unwrap_or_default().to_string());
    offer.monthly_cost_in_cent = int("monthlyCostInCent").unwrap_or(0);
    offer.after_two_years_monthly_cost = int("afterTwoYearsMonthlyCost").and_then(non_zero);
    offer.installation_service = row
        .get("installationService")
        .and_then(CsvCell::as_bool)
        .unwrap_or(false);

    if let (Some(kind), Some(value)) = (
        text("voucherType").and_then(VoucherKind::parse),
        int("voucherValue"),
    ) {
        offer.voucher_details = Some(VoucherDetails {
            kind,
            value,
            description: String::new(),
        });
    }

    for (column, cell) in &row {
        if !KNOWN_COLUMNS.contains(&column.as_str()) {
            offer.extra_properties.insert(column.clone(), cell.render());
        }
    }

    offer
}
