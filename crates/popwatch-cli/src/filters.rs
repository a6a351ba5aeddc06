//! Candidate filters applied before posting.

use popwatch_core::ItemRecord;

/// Terms that exclude an item when found in its category or license,
/// case-insensitively, as substrings.
pub(crate) const EXCLUDED_TERMS: &[&str] = &[
    "mlb",
    "mls",
    "nfl",
    "nba",
    "nhl",
    "disney",
    "baseball",
    "basketball",
    "hockey",
];

/// Allow-list entry that disables fandom filtering.
const ALL_FANDOMS: &str = "All";

/// `true` when the item belongs to an excluded league or brand.
pub(crate) fn is_excluded(item: &ItemRecord) -> bool {
    let category = item.category_tag.to_lowercase();
    let license = item.license_name.to_lowercase();
    EXCLUDED_TERMS
        .iter()
        .any(|term| category.contains(term) || license.contains(term))
}

/// `true` when the item's category is on the allow-list. An empty list, or
/// one containing exactly `All`, allows everything. Other entries compare
/// case-insensitively.
pub(crate) fn matches_fandoms(item: &ItemRecord, fandoms: &[String]) -> bool {
    if fandoms.is_empty() || fandoms.iter().any(|f| f == ALL_FANDOMS) {
        return true;
    }
    fandoms
        .iter()
        .any(|f| f.to_lowercase() == item.category_tag.to_lowercase())
}
