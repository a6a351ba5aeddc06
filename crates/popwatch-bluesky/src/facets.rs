//! Link and hashtag detection for post text.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{ByteSlice, Facet, FacetFeature};

static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#\w+").expect("valid regex"));

/// Builds link and tag facets for `text`, with UTF-8 byte offsets.
///
/// Links come first, then tags, each in order of appearance. Tag features
/// carry the tag without its leading `#`; a `#` inside a link (a URL
/// fragment) is not a tag.
#[must_use]
pub fn detect_facets(text: &str) -> Vec<Facet> {
    let links: Vec<Facet> = LINK_RE
        .find_iter(text)
        .map(|m| Facet {
            index: ByteSlice {
                byte_start: m.start(),
                byte_end: m.end(),
            },
            features: vec![FacetFeature::Link {
                uri: m.as_str().to_string(),
            }],
        })
        .collect();

    let inside_link = |pos: usize| {
        links
            .iter()
            .any(|l| l.index.byte_start <= pos && pos < l.index.byte_end)
    };

    let tags: Vec<Facet> = TAG_RE
        .find_iter(text)
        .filter(|m| !inside_link(m.start()))
        .map(|m| Facet {
            index: ByteSlice {
                byte_start: m.start(),
                byte_end: m.end(),
            },
            features: vec![FacetFeature::Tag {
                tag: m.as_str()[1..].to_string(),
            }],
        })
        .collect();

    links.into_iter().chain(tags).collect()
}
