//! Post text and alt text rendering for scraped items.
//!
//! Everything here is pure: the same [`ItemRecord`] and [`HashtagTable`]
//! always render the same text. Length limits are enforced later, at the
//! publish boundary (see [`crate::PostDraft`]).

use crate::hashtags::HashtagTable;
use crate::item::{ItemRecord, PageType, OTHER_CATEGORY};

/// Hashtags appended after the series tag on every post.
const FIXED_HASHTAGS: &str = "#Funko #FunkoPop";

/// Series tag used when nothing usable survives cleaning.
const FALLBACK_HASHTAG: &str = "FunkoPop";

const POP_MARKER: &str = "Pop!";

/// Post category, resolved in priority order by [`PostKind::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostKind {
    ComingSoon,
    Sale,
    NewRelease,
    BackInStock,
    Exclusive,
    BestSeller,
    Default,
}

impl PostKind {
    /// First match wins: coming soon, then sale, then the listing page type.
    #[must_use]
    pub fn resolve(item: &ItemRecord) -> Self {
        if item.is_coming_soon() {
            return Self::ComingSoon;
        }
        if item.is_on_sale() {
            return Self::Sale;
        }
        match item.page_type {
            PageType::NewReleases => Self::NewRelease,
            PageType::BackInStock => Self::BackInStock,
            PageType::Exclusives => Self::Exclusive,
            PageType::BestSelling => Self::BestSeller,
            PageType::Sale | PageType::Other => Self::Default,
        }
    }

    fn icon(self) -> &'static str {
        match self {
            Self::ComingSoon => "\u{1F51C}",
            Self::Sale | Self::Default => "\u{1F3F7}\u{FE0F}",
            Self::NewRelease => "\u{1F195}",
            Self::BackInStock => "\u{1F504}",
            Self::Exclusive => "\u{2B50}",
            Self::BestSeller => "\u{1F525}",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::ComingSoon => "COMING SOON",
            Self::Sale => "SALE",
            Self::NewRelease => "NEW RELEASE",
            Self::BackInStock => "BACK IN STOCK",
            Self::Exclusive => "EXCLUSIVE",
            Self::BestSeller => "BEST SELLER",
            Self::Default => "Funko Pop",
        }
    }
}

/// Renders the post text for `item`.
#[must_use]
pub fn format_post(item: &ItemRecord, hashtags: &HashtagTable) -> String {
    let kind = PostKind::resolve(item);
    let sym = item.currency.symbol();
    let tag = category_label(item);

    let mut text = String::new();

    // The generic template leads with the category, the others with the status.
    if kind == PostKind::Default {
        text.push_str(&format!("{} {tag} {}\n", kind.icon(), kind.label()));
    } else {
        text.push_str(&format!("{} {} {tag}\n", kind.icon(), kind.label()));
    }

    text.push_str(&headline(item));

    if kind == PostKind::ComingSoon {
        if let Some(drop_date) = &item.drop_date {
            text.push_str(&format!("Drops {drop_date}\n"));
        }
    }

    if kind == PostKind::Sale {
        text.push_str(&format!(
            "Was: {sym}{:.2} \u{2192} Now: {sym}{:.2}\n",
            item.original_price, item.price
        ));
    } else if item.price > 0.0 {
        text.push_str(&format!("Price: {sym}{:.2}\n", item.price));
    }

    let series = series_hashtag(&item.license_name, &item.name, hashtags);
    text.push_str(&format!(
        "\n\u{1F517} {}\n\n#{series} {FIXED_HASHTAGS}",
        item.product_url
    ));
    text
}

/// Descriptive alt text for an item's main image.
#[must_use]
pub fn alt_text(item: &ItemRecord) -> String {
    let prefix = if shows_category(item) {
        format!("{} ", item.category_tag)
    } else {
        String::new()
    };
    if item.price > 0.0 {
        format!(
            "{prefix}Funko Pop figure: {}, priced at {}{:.2}",
            item.name,
            item.currency.symbol(),
            item.price
        )
    } else {
        format!("{prefix}Funko Pop figure: {}", item.name)
    }
}

/// Alt text for secondary (in-box) images.
#[must_use]
pub fn packaging_alt_text(item: &ItemRecord) -> String {
    let name = if item.name.is_empty() {
        "Funko Pop"
    } else {
        item.name.as_str()
    };
    format!("{name} in original packaging")
}

/// Derives the series hashtag (without `#`) from the license and product name.
///
/// Generic licenses like "Marvel", and a missing license, are replaced by a
/// known character found in the name or by the name's first word. The result
/// is `PascalCase` with only alphanumerics; `FunkoPop` when nothing remains.
#[must_use]
pub fn series_hashtag(license_name: &str, name: &str, table: &HashtagTable) -> String {
    let license_name = license_name.trim();
    let mut source = if license_name.is_empty() {
        name.to_string()
    } else {
        license_name.to_string()
    };

    let needs_specific = license_name.is_empty() || table.is_generic(license_name);
    if needs_specific && !name.is_empty() {
        let cleaned = name.replace(POP_MARKER, "").replace("Plus", "");
        let cleaned = cleaned.trim();
        if let Some(character) = table.find_character(cleaned) {
            source = character.to_string();
        } else if let Some(first) = cleaned.split_whitespace().next() {
            source = first.to_string();
        }
    }

    let source = source.replace(POP_MARKER, "");
    let hashtag: String = source
        .split_whitespace()
        .flat_map(|word| word.split(['-', '_', '/']))
        .map(capitalize)
        .collect::<String>()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();

    if hashtag.is_empty() {
        FALLBACK_HASHTAG.to_string()
    } else {
        hashtag
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

fn shows_category(item: &ItemRecord) -> bool {
    !item.category_tag.is_empty() && item.category_tag != OTHER_CATEGORY
}

fn category_label(item: &ItemRecord) -> String {
    if shows_category(item) {
        format!("[{}]", item.category_tag)
    } else {
        String::new()
    }
}

fn headline(item: &ItemRecord) -> String {
    match item
        .badge
        .as_deref()
        .filter(|b| !b.is_empty() && !b.eq_ignore_ascii_case("null"))
    {
        Some(badge) => format!("\u{2728} {badge} {}\n", item.name),
        None => format!("\u{2728} {}\n", item.name),
    }
}

#[cfg(test)]
#[path = "format_test.rs"]
mod tests;
