//! VerbynDich adapter
//!
//! VerbynDich has no structured payload at all: the request body is the
//! raw address line `street;houseNumber;city;zipCode`, responses are
//! paginated, and each page carries a German prose description that is
//! mined with a regex suite. The core pattern (price, connection type,
//! speed, contract duration, price after month 24) is required: a page
//! that does not match is skipped, never an error. Four more patterns
//! extract optional fields.
//!
//! Pages are fetched by a small worker pool fed by a dispatcher that
//! emits increasing page numbers until any worker sees `last=true`.
//! Workers may already hold later page numbers at that point; those are
//! fetched and processed normally, page order is irrelevant downstream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use offerd_config::VerbynDichCredentials;
use offerd_domain::{Address, ConnectionType, Offer, VoucherDetails, VoucherKind};

use crate::error::ProviderError;
use crate::retry::{retry, RetrySchedule};
use crate::{publish_offer, race_cancel, report_error, ErrorSink, OfferBus, ProviderAdapter};

const PROVIDER: &str = "VerbynDich";
const DEFAULT_URL: &str = "https://verbyndich.gendev7.check24.fun/check24/data";
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Page-fetch parallelism per request.
const NUM_WORKERS: usize = 5;

/// Adapter for the paginated VerbynDich text API.
pub struct VerbynDichAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    retry: RetrySchedule,
    patterns: DescriptionPatterns,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VerbynDichResponse {
    product: String,
    description: String,
    last: bool,
    valid: bool,
}

/// The compiled regex suite for the German offer descriptions.
///
/// The phrasing is brittle by nature; patterns are compiled once at
/// startup and any change upstream degrades to skipped pages rather than
/// failed requests.
struct DescriptionPatterns {
    core: Regex,
    tv: Regex,
    limit: Regex,
    max_age: Regex,
    voucher: Regex,
}

impl DescriptionPatterns {
    fn compile() -> Self {
        let core = [
            r"(?s)",
            r".*?",
            r"nur\s+(?P<price>\d+)€\s+im\s+Monat",
            r".*?",
            r"(?P<kind>DSL|Cable|Fiber)\-Verbindung",
            r".*?",
            r"Geschwindigkeit\s+von\s+(?P<speed>\d+)\s+Mbit\/s",
            r".*?",
            r"Mindestvertragslaufzeit\s+(?P<duration>\d+)\s*Monate",
            r".*?",
            r"Ab\s+dem\s+24\.\s+Monat\s+beträgt\s+der\s+monatliche\s+Preis\s+(?P<late_price>\d+)€",
            r".*",
        ]
        .concat();

        Self {
            core: Regex::new(&core).expect("core description pattern"),
            tv: Regex::new(r"(?s).*?Fernsehsender\s+enthalten\s+([^.]+).*")
                .expect("tv pattern"),
            limit: Regex::new(
                r"(?s).*?Ab\s+(\d+)GB\s+pro\s+Monat\s+wird\s+die\s+Geschwindigkeit\s+gedrosselt.*",
            )
            .expect("limit pattern"),
            max_age: Regex::new(r"(?s).*?nur\s+für\s+Personen\s+unter\s+(\d+)\s+Jahren.*")
                .expect("max age pattern"),
            voucher: Regex::new(
                r"(?s).*?(Rabatt\s+von\s+(\d+)%.*?maximale\s+Rabatt\s+beträgt\s+?(\d+)€).*",
            )
            .expect("voucher pattern"),
        }
    }

    /// Extract an offer from a page description.
    ///
    /// Returns `None` when the required core pattern does not match; the
    /// optional patterns only enrich the offer.
    fn parse(&self, product: &str, description: &str) -> Option<Offer> {
        let core = self.core.captures(description)?;

        let mut offer = Offer {
            product_name: product.to_string(),
            monthly_cost_in_cent: parse_capture(&core, "price")? * 100,
            connection_type: ConnectionType::from_provider(core.name("kind")?.as_str()),
            speed: parse_capture(&core, "speed")?,
            contract_duration_in_months: parse_capture(&core, "duration")?,
            after_two_years_monthly_cost: Some(parse_capture(&core, "late_price")? * 100),
            ..Offer::default()
        };

        if let Some(tv) = self.tv.captures(description) {
            offer.tv = Some(tv[1].to_string());
        }
        if let Some(limit) = self.limit.captures(description) {
            offer.limit_in_gb = limit[1].parse().ok();
        }
        if let Some(age) = self.max_age.captures(description) {
            offer.max_age_person = age[1].parse().ok();
        }
        if let Some(voucher) = self.voucher.captures(description) {
            let percentage: i64 = voucher[2].parse().ok()?;
            let max_euro: i64 = voucher[3].parse().ok()?;
            offer.voucher_details = Some(VoucherDetails {
                kind: VoucherKind::Percentage,
                value: percentage,
                description: voucher[1].to_string(),
            });
            if offer.contract_duration_in_months > 0 {
                let total_discount = (offer.monthly_cost_in_cent
                    * offer.contract_duration_in_months
                    * percentage
                    / 100)
                    .min(max_euro * 100);
                offer.monthly_cost_in_cent_with_voucher = Some(
                    offer.monthly_cost_in_cent
                        - total_discount / offer.contract_duration_in_months,
                );
            }
        }

        Some(offer)
    }
}

fn parse_capture(captures: &regex::Captures<'_>, name: &str) -> Option<i64> {
    captures.name(name)?.as_str().parse().ok()
}

impl VerbynDichAdapter {
    pub fn new(credentials: &VerbynDichCredentials, retry: RetrySchedule) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: credentials.api_key.clone(),
            base_url: DEFAULT_URL.to_string(),
            retry,
            patterns: DescriptionPatterns::compile(),
        }
    }

    /// Point the adapter at a different endpoint (tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch_page(
        &self,
        cancel: &CancellationToken,
        address_line: &str,
        page: u32,
    ) -> Result<VerbynDichResponse, ProviderError> {
        let request = self
            .client
            .post(&self.base_url)
            .query(&[("apiKey", self.api_key.as_str()), ("page", &page.to_string())])
            .body(address_line.to_string());

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

    async fn worker(
        &self,
        cancel: &CancellationToken,
        address_line: &str,
        pages: &Mutex<mpsc::Receiver<u32>>,
        last_page_found: &AtomicBool,
        offers: &OfferBus,
        errors: &ErrorSink,
    ) {
        loop {
            let page = {
                let mut queue = pages.lock().await;
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    next = queue.recv() => match next {
                        Some(page) => page,
                        None => return,
                    },
                }
            };

            let response = match retry(cancel, &self.retry, "verbyndich page", || {
                self.fetch_page(cancel, address_line, page)
            })
            .await
            {
                Ok(response) => response,
                Err(ProviderError::Cancelled) => return,
                Err(e) => {
                    report_error(cancel, errors, e).await;
                    continue;
                }
            };

            if response.last {
                last_page_found.store(true, Ordering::Relaxed);
            }

            if response.valid {
                if let Some(mut offer) =
                    self.patterns.parse(&response.product, &response.description)
                {
                    offer.provider = PROVIDER.to_string();
                    offer.seal();
                    publish_offer(cancel, offers, offer).await;
                }
            }
        }
    }
}

#[async_trait]
impl ProviderAdapter for VerbynDichAdapter {
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
        let address_line = format!(
            "{};{};{};{}",
            address.street, address.house_number, address.city, address.zip_code
        );

        let (page_tx, page_rx) = mpsc::channel::<u32>(NUM_WORKERS * 2);
        let page_rx = Arc::new(Mutex::new(page_rx));
        let last_page_found = Arc::new(AtomicBool::new(false));

        let dispatcher = tokio::spawn({
            let cancel = cancel.clone();
            let last_page_found = Arc::clone(&last_page_found);
            async move {
                let mut page = 0u32;
                loop {
                    if last_page_found.load(Ordering::Relaxed) {
                        return;
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        sent = page_tx.send(page) => {
                            if sent.is_err() {
                                return;
                            }
                            page += 1;
                        }
                    }
                }
            }
        });

        futures::future::join_all((0..NUM_WORKERS).map(|_| {
            self.worker(
                cancel,
                &address_line,
                &page_rx,
                &last_page_found,
                offers,
                errors,
            )
        }))
        .await;

        // all workers returned; the receiver drops with them and the
        // dispatcher unblocks on its next send
        drop(page_rx);
        let _ = dispatcher.await;
    }
}
