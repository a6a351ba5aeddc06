use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use popwatch_core::{Currency, FetchError, Fetcher, ItemRecord, PageType};
use reqwest::{Client, Url};

use crate::error::ScraperError;
use crate::parse::{parse_listing, ListingContext};
use crate::rate_limit::{
    retry_with_backoff, RequestPacer, RetryPolicy, MIN_REQUEST_INTERVAL, TRANSIENT_RETRY_DELAY,
};
use crate::region::{currency_for_region, listing_url, STOREFRONT_BASE_URL};

pub(crate) const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Settings for [`StorefrontClient`].
#[derive(Debug, Clone)]
pub struct StorefrontOptions {
    pub base_url: String,
    /// Region code such as `pl` or `gb`; empty for the US store.
    pub region: String,
    pub timeout_secs: u64,
    /// Random pre-request delay bounds, in seconds.
    pub delay_min_secs: f64,
    pub delay_max_secs: f64,
    pub min_request_interval: Duration,
    pub transient_retry_delay: Duration,
    /// Attempts per page, including the first.
    pub max_attempts: u32,
}

impl Default for StorefrontOptions {
    fn default() -> Self {
        Self {
            base_url: STOREFRONT_BASE_URL.to_string(),
            region: "pl".to_string(),
            timeout_secs: 30,
            delay_min_secs: 2.0,
            delay_max_secs: 5.0,
            min_request_interval: MIN_REQUEST_INTERVAL,
            transient_retry_delay: TRANSIENT_RETRY_DELAY,
            max_attempts: 2,
        }
    }
}

/// HTML client for storefront listing pages.
///
/// Requests are paced (see [`RequestPacer`]) and retried once by default.
/// A 403 is reported as [`ScraperError::Blocked`] and retried after a longer
/// wait; any other non-2xx status is treated as transient.
pub struct StorefrontClient {
    client: Client,
    base_url: String,
    region: String,
    currency: Currency,
    pacer: RequestPacer,
    retry: RetryPolicy,
}

impl StorefrontClient {
    /// # Errors
    ///
    /// Returns [`ScraperError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ScraperError::InvalidUrl`] if
    /// `options.base_url` is not a valid URL.
    pub fn new(options: &StorefrontOptions) -> Result<Self, ScraperError> {
        Url::parse(&options.base_url).map_err(|e| ScraperError::InvalidUrl {
            url: options.base_url.clone(),
            reason: e.to_string(),
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(BROWSER_USER_AGENT)
            .build()?;

        let currency = currency_for_region(&options.region);
        let region_label = if options.region.trim().is_empty() {
            "us"
        } else {
            options.region.as_str()
        };
        tracing::info!(
            region = region_label,
            currency = %currency,
            delay_min_secs = options.delay_min_secs,
            delay_max_secs = options.delay_max_secs,
            "storefront client initialized"
        );

        Ok(Self {
            client,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            region: options.region.trim().to_lowercase(),
            currency,
            pacer: RequestPacer::new(
                options.min_request_interval,
                options.delay_min_secs,
                options.delay_max_secs,
            ),
            retry: RetryPolicy {
                max_attempts: options.max_attempts.max(1),
                transient_delay: options.transient_retry_delay,
                delay_max_secs: options.delay_max_secs,
            },
        })
    }

    #[must_use]
    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    /// Listing URL for a page identifier.
    #[must_use]
    pub fn page_url(&self, page: &str) -> String {
        listing_url(&self.base_url, &self.region, page)
    }

    /// Fetches the raw HTML of one listing page, pacing and retrying.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::Blocked`]: HTTP 403 on the final attempt.
    /// - [`ScraperError::UnexpectedStatus`]: any other non-2xx status on the final attempt.
    /// - [`ScraperError::Http`]: network or TLS failure on the final attempt.
    pub async fn fetch_listing_html(&self, page: &str) -> Result<String, ScraperError> {
        let url = self.page_url(page);
        let max_attempts = self.retry.max_attempts;

        retry_with_backoff(&self.retry, |attempt| {
            let url = url.clone();
            async move {
                self.pacer.wait().await;
                tracing::info!(url = %url, attempt, max_attempts, "fetching listing page");

                let response = self
                    .client
                    .get(&url)
                    .header(
                        reqwest::header::ACCEPT,
                        "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                    )
                    .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
                    .header(reqwest::header::CACHE_CONTROL, "no-cache")
                    .send()
                    .await?;
                let status = response.status();

                if status == reqwest::StatusCode::FORBIDDEN {
                    return Err(ScraperError::Blocked { url });
                }

                if !status.is_success() {
                    return Err(ScraperError::UnexpectedStatus {
                        status: status.as_u16(),
                        url,
                    });
                }

                let body = response.text().await?;
                tracing::debug!(chars = body.len(), "received listing page");
                Ok(body)
            }
        })
        .await
    }
}

#[async_trait]
impl Fetcher for StorefrontClient {
    async fn fetch(&self, page: &str) -> Result<Vec<ItemRecord>, FetchError> {
        let url = self.page_url(page);
        let html = self.fetch_listing_html(page).await?;

        let base_url = Url::parse(&url).map_err(|e| FetchError::Malformed(e.to_string()))?;
        let ctx = ListingContext {
            page_type: PageType::from_slug(page),
            currency: self.currency.clone(),
            observed_at: Utc::now(),
            base_url,
        };
        Ok(parse_listing(&html, &ctx))
    }
}
