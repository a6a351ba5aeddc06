//! Product tile parsing for storefront listing pages.
//!
//! A listing page is a grid of `div.product-tile` elements. Each tile
//! carries the product name (as the main image's alt text), image URLs, a
//! link, prices as machine-readable `content` attributes, the license, an
//! optional badge and an availability line for pre-orders.

use chrono::{DateTime, Utc};
use popwatch_core::{Availability, Currency, ItemRecord, PageType};
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};

/// Thumbnail size parameters used on listing pages.
const THUMBNAIL_PARAMS: &str = "sw=346&sh=346";
/// Larger rendition requested instead; better suited to social posts.
const FULL_SIZE_PARAMS: &str = "sw=800&sh=800";
/// Suffix the storefront appends to the main image's alt text.
const IMAGE_ALT_SUFFIX: &str = ", Image 1";

/// Everything about a listing page that is not in its HTML.
#[derive(Debug, Clone)]
pub struct ListingContext {
    pub page_type: PageType,
    pub currency: Currency,
    pub observed_at: DateTime<Utc>,
    /// Base for resolving relative product and image links.
    pub base_url: Url,
}

struct TileSelectors {
    tile: Selector,
    main_image: Selector,
    alt_image: Selector,
    link: Selector,
    sale_price: Selector,
    original_price: Selector,
    license: Selector,
    badge: Selector,
    availability: Selector,
}

impl TileSelectors {
    fn new() -> Self {
        let sel = |s: &str| Selector::parse(s).expect("valid selector");
        Self {
            tile: sel("div.product-tile"),
            main_image: sel("img.tile-main-image"),
            alt_image: sel("img.tile-alt-hover-image"),
            link: sel("a.image-link"),
            sale_price: sel("span.sales span.value"),
            original_price: sel("span.strike-through span.value"),
            license: sel("div.product-license"),
            badge: sel("div.product-flag"),
            availability: sel("div.product-availability"),
        }
    }
}

/// Parses every product tile on a listing page.
///
/// Tiles without a product name are skipped; the rest of the page still
/// parses. A page without tiles yields an empty list.
#[must_use]
pub fn parse_listing(html: &str, ctx: &ListingContext) -> Vec<ItemRecord> {
    let document = Html::parse_document(html);
    let selectors = TileSelectors::new();

    let tiles: Vec<ElementRef<'_>> = document.select(&selectors.tile).collect();
    tracing::info!(
        tiles = tiles.len(),
        page_type = %ctx.page_type,
        "found product tiles"
    );

    let items: Vec<ItemRecord> = tiles
        .iter()
        .filter_map(|tile| parse_tile(tile, &selectors, ctx))
        .collect();

    if items.len() < tiles.len() {
        tracing::debug!(
            skipped = tiles.len() - items.len(),
            "skipped tiles without a product name"
        );
    }
    items
}

fn parse_tile(
    tile: &ElementRef<'_>,
    sel: &TileSelectors,
    ctx: &ListingContext,
) -> Option<ItemRecord> {
    let main_image = tile.select(&sel.main_image).next()?;
    let name = main_image
        .value()
        .attr("alt")
        .unwrap_or_default()
        .replace(IMAGE_ALT_SUFFIX, "")
        .trim()
        .to_string();
    if name.is_empty() {
        return None;
    }

    let image_url = main_image
        .value()
        .attr("src")
        .map(|src| full_size_image(&resolve_url(&ctx.base_url, src)))
        .unwrap_or_default();

    let image_url_alt = tile
        .select(&sel.alt_image)
        .next()
        .and_then(|img| img.value().attr("src"))
        .filter(|src| !src.trim().is_empty())
        .map(|src| full_size_image(&resolve_url(&ctx.base_url, src)));

    let product_url = tile
        .select(&sel.link)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(|href| resolve_url(&ctx.base_url, href))
        .unwrap_or_default();

    let price = price_content(tile, &sel.sale_price);
    let original_price = price_content(tile, &sel.original_price);

    let license_name = tile
        .select(&sel.license)
        .next()
        .map(|el| element_text(&el))
        .unwrap_or_default();

    let mut item = ItemRecord::new(
        &name,
        &product_url,
        price,
        original_price,
        &license_name,
        ctx.page_type,
        ctx.currency.clone(),
        ctx.observed_at,
    );
    item.image_url = image_url;
    item.image_url_alt = image_url_alt;
    item.badge = tile
        .select(&sel.badge)
        .next()
        .and_then(|el| normalize_badge(&element_text(&el)));

    if let Some(availability) = tile.select(&sel.availability).next() {
        let (status, drop_date) = parse_availability(&element_text(&availability));
        item.availability = status;
        item.drop_date = drop_date;
    }

    Some(item)
}

/// Whitespace-normalized text content of an element.
fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reads a price from the `content` attribute; missing or malformed prices are `0.0`.
fn price_content(tile: &ElementRef<'_>, selector: &Selector) -> f64 {
    tile.select(selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .and_then(|raw| raw.trim().parse::<f64>().ok())
        .filter(|p| p.is_finite() && *p >= 0.0)
        .unwrap_or(0.0)
}

fn resolve_url(base: &Url, raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    base.join(raw).map_or_else(|_| raw.to_string(), |u| u.to_string())
}

/// Requests the larger image rendition instead of the listing thumbnail.
pub(crate) fn full_size_image(url: &str) -> String {
    url.replace(THUMBNAIL_PARAMS, FULL_SIZE_PARAMS)
}

/// Title-cases a badge; `null`/`none`/empty badges are dropped.
pub(crate) fn normalize_badge(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("null") || raw.eq_ignore_ascii_case("none") {
        return None;
    }
    Some(title_case(raw))
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_is_letter = false;
    for c in s.chars() {
        if prev_is_letter {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_is_letter = c.is_alphabetic();
    }
    out
}

/// Availability status and drop date from a tile's availability line,
/// e.g. `"Coming Soon - Drops 16/02 at 05:30 PM GMT"`.
pub(crate) fn parse_availability(text: &str) -> (Availability, Option<String>) {
    let lower = text.to_lowercase();
    if !(lower.contains("coming soon") || lower.contains("pre-order")) {
        return (Availability::InStock, None);
    }

    let date_re = Regex::new(r"(\d{1,2}/\d{1,2}(?:/\d{2,4})?)").expect("valid regex");
    let time_re =
        Regex::new(r"(?i)(\d{1,2}:\d{2}\s*(?:AM|PM)?(?:\s*GMT)?)").expect("valid regex");

    let drop_date = date_re.captures(text).map(|cap| {
        let date = cap[1].to_string();
        match time_re.captures(text) {
            Some(time) => format!("{date} at {}", time[1].trim()),
            None => date,
        }
    });

    (Availability::ComingSoon, drop_date)
}

#[cfg(test)]
#[path = "parse_test.rs"]
mod tests;
