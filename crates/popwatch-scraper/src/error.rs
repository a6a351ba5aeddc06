use popwatch_core::FetchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("blocked by storefront (HTTP 403) at {url}")]
    Blocked { url: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("invalid storefront URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("image decode/encode error for {context}: {source}")]
    Image {
        context: String,
        #[source]
        source: image::ImageError,
    },

    #[error("image store I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<ScraperError> for FetchError {
    fn from(err: ScraperError) -> Self {
        match err {
            ScraperError::Blocked { .. } => FetchError::Blocked(err.to_string()),
            ScraperError::Http(_) | ScraperError::UnexpectedStatus { .. } => {
                FetchError::Transient(err.to_string())
            }
            ScraperError::InvalidUrl { .. }
            | ScraperError::Image { .. }
            | ScraperError::Io { .. } => FetchError::Malformed(err.to_string()),
        }
    }
}
