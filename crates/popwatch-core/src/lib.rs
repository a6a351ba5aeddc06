pub mod app_config;
pub mod config;
pub mod format;
pub mod hashtags;
pub mod item;
pub mod ledger;
pub mod post;
pub mod traits;

pub use app_config::{AppConfig, Credentials};
pub use config::{load_app_config, load_app_config_from_env};
pub use format::{alt_text, format_post, packaging_alt_text, series_hashtag, PostKind};
pub use hashtags::{load_hashtags, HashtagTable};
pub use item::{
    item_id, price_drop, Availability, Currency, ItemRecord, PageType, OTHER_CATEGORY,
};
pub use ledger::{Ledger, LedgerEntry, LedgerError, LedgerStore};
pub use post::{PostDraft, PreparedImage, MAX_POST_CHARS, MAX_POST_IMAGES};
pub use traits::{FetchError, Fetcher, ImagePreparer, PublishError, Publisher};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read hashtag table at {path}: {source}")]
    HashtagsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse hashtag table: {0}")]
    HashtagsFileParse(#[from] serde_yaml::Error),

    #[error("hashtag table validation failed: {0}")]
    HashtagsValidation(String),
}
