use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Category tag used when a listing carries no license.
pub const OTHER_CATEGORY: &str = "Other";

/// Number of hex characters kept from the SHA-256 digest for an item id.
const ID_HEX_LEN: usize = 16;

/// Derives the stable item identifier from a product name and URL.
///
/// The id is the first 16 hex characters of `SHA-256("{name}_{url}")`, so the
/// same listing yields the same id across pages and across process runs.
#[must_use]
pub fn item_id(name: &str, product_url: &str) -> String {
    let digest = Sha256::digest(format!("{name}_{product_url}").as_bytes());
    let mut hex = format!("{digest:x}");
    hex.truncate(ID_HEX_LEN);
    hex
}

/// Computes the discount between the strike-through and the current price.
///
/// Returns `0.0` when there is no original price or the item is not cheaper
/// than it was. Rounded to cents.
#[must_use]
pub fn price_drop(original_price: f64, price: f64) -> f64 {
    if original_price > 0.0 && price < original_price {
        ((original_price - price) * 100.0).round() / 100.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    #[serde(rename = "In Stock")]
    InStock,
    #[serde(rename = "Coming Soon")]
    ComingSoon,
}

/// Storefront listing page an item was scraped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageType {
    Sale,
    NewReleases,
    Exclusives,
    BackInStock,
    BestSelling,
    Other,
}

impl PageType {
    /// Maps a page identifier (the URL slug) to its page type. Unknown slugs
    /// map to [`PageType::Other`].
    #[must_use]
    pub fn from_slug(slug: &str) -> Self {
        match slug.trim().to_lowercase().as_str() {
            "sale" => Self::Sale,
            "new-releases" => Self::NewReleases,
            "exclusives" => Self::Exclusives,
            "back-in-stock" => Self::BackInStock,
            "best-selling" => Self::BestSelling,
            _ => Self::Other,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sale => "sale",
            Self::NewReleases => "new-releases",
            Self::Exclusives => "exclusives",
            Self::BackInStock => "back-in-stock",
            Self::BestSelling => "best-selling",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store currency. Codes outside the known set are carried verbatim so they
/// can still be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Currency {
    Eur,
    Usd,
    Gbp,
    Other(String),
}

impl Currency {
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Eur => "EUR",
            Self::Usd => "USD",
            Self::Gbp => "GBP",
            Self::Other(code) => code,
        }
    }

    /// Display symbol; unknown currencies render their code.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Self::Eur => "€",
            Self::Usd => "$",
            Self::Gbp => "£",
            Self::Other(code) => code,
        }
    }
}

impl From<String> for Currency {
    fn from(code: String) -> Self {
        match code.to_uppercase().as_str() {
            "EUR" => Self::Eur,
            "USD" => Self::Usd,
            "GBP" => Self::Gbp,
            _ => Self::Other(code),
        }
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.code().to_string()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A product tile scraped from a storefront listing page, normalized for
/// dedup, filtering and post formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// See [`item_id`].
    pub id: String,
    pub name: String,
    /// Current (sale) price; `0.0` when the tile showed none.
    pub price: f64,
    /// Strike-through price; `0.0` when the item is not discounted.
    pub original_price: f64,
    /// Derived by [`price_drop`], never negative.
    pub price_drop: f64,
    pub image_url: String,
    /// Secondary (usually in-box) image.
    pub image_url_alt: Option<String>,
    /// Fandom the item is grouped under: the license name, or
    /// [`OTHER_CATEGORY`] when the listing carries none.
    pub category_tag: String,
    pub license_name: String,
    pub badge: Option<String>,
    pub product_url: String,
    pub availability: Availability,
    /// Free-form drop date text, e.g. `"16/02 at 05:30 PM GMT"`.
    pub drop_date: Option<String>,
    pub page_type: PageType,
    pub source: String,
    pub currency: Currency,
    pub observed_at: DateTime<Utc>,
}

impl ItemRecord {
    /// Builds a record with the derived fields (`id`, `price_drop`,
    /// `category_tag`) filled in. Optional fields start empty.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        product_url: &str,
        price: f64,
        original_price: f64,
        license_name: &str,
        page_type: PageType,
        currency: Currency,
        observed_at: DateTime<Utc>,
    ) -> Self {
        let category_tag = if license_name.is_empty() {
            OTHER_CATEGORY.to_string()
        } else {
            license_name.to_string()
        };
        Self {
            id: item_id(name, product_url),
            name: name.to_string(),
            price,
            original_price,
            price_drop: price_drop(original_price, price),
            image_url: String::new(),
            image_url_alt: None,
            category_tag,
            license_name: license_name.to_string(),
            badge: None,
            product_url: product_url.to_string(),
            availability: Availability::InStock,
            drop_date: None,
            page_type,
            source: "funko.com".to_string(),
            currency,
            observed_at,
        }
    }

    /// `true` for pre-order items: flagged coming soon or carrying a drop date.
    #[must_use]
    pub fn is_coming_soon(&self) -> bool {
        self.availability == Availability::ComingSoon || self.drop_date.is_some()
    }

    /// `true` when the item is discounted against a known original price.
    #[must_use]
    pub fn is_on_sale(&self) -> bool {
        self.price_drop > 0.0 && self.original_price > 0.0
    }
}
