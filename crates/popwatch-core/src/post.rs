use std::path::PathBuf;

/// Longest post text Bluesky accepts, in characters.
pub const MAX_POST_CHARS: usize = 300;

/// Most images a single post may carry.
pub const MAX_POST_IMAGES: usize = 4;

const ELLIPSIS: &str = "...";

/// An image prepared on disk for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    pub path: PathBuf,
    pub alt_text: String,
}

/// Text and images for one post, bounded to what the network accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub text: String,
    pub images: Vec<PreparedImage>,
}

impl PostDraft {
    /// Builds a draft, truncating `text` to [`MAX_POST_CHARS`] (ending in
    /// `...`) and keeping at most [`MAX_POST_IMAGES`] images.
    #[must_use]
    pub fn new(text: &str, mut images: Vec<PreparedImage>) -> Self {
        if images.len() > MAX_POST_IMAGES {
            tracing::debug!(
                dropped = images.len() - MAX_POST_IMAGES,
                "post has too many images, keeping the first {MAX_POST_IMAGES}"
            );
            images.truncate(MAX_POST_IMAGES);
        }
        Self {
            text: truncate_text(text),
            images,
        }
    }
}

/// Counts Unicode scalar values, so multi-byte emoji count once.
fn truncate_text(text: &str) -> String {
    if text.chars().count() <= MAX_POST_CHARS {
        return text.to_string();
    }
    tracing::warn!(
        chars = text.chars().count(),
        "post text too long, truncating to {MAX_POST_CHARS}"
    );
    let mut truncated: String = text.chars().take(MAX_POST_CHARS - ELLIPSIS.len()).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}
