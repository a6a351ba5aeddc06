//! Storefront regions: currency lookup and listing URLs.

use popwatch_core::Currency;

pub const STOREFRONT_BASE_URL: &str = "https://funko.com";

/// EU storefronts priced in euros.
const EUR_REGIONS: &[&str] = &[
    "at", "be", "bg", "hr", "cy", "cz", "dk", "ee", "fi", "fr", "de", "gr", "hu", "ie", "it",
    "lv", "lt", "lu", "mt", "nl", "pl", "pt", "ro", "sk", "si", "es", "se",
];

/// Currency of a storefront region. Unknown regions fall back to EUR.
#[must_use]
pub fn currency_for_region(region: &str) -> Currency {
    let region = region.trim().to_lowercase();
    match region.as_str() {
        "" | "us" => Currency::Usd,
        "gb" | "uk" => Currency::Gbp,
        r => {
            if !EUR_REGIONS.contains(&r) {
                tracing::debug!(region = r, "unknown storefront region, assuming EUR");
            }
            Currency::Eur
        }
    }
}

/// Listing URL for `page` in `region`, e.g.
/// `https://funko.com/pl/new-featured/sale/`. Only an empty region (the
/// default US store) omits the region segment; `us` is kept as given.
#[must_use]
pub fn listing_url(base_url: &str, region: &str, page: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let region = region.trim();
    let page = page.trim().trim_matches('/');
    if region.is_empty() {
        format!("{base}/new-featured/{page}/")
    } else {
        format!("{base}/{region}/new-featured/{page}/")
    }
}
