pub mod client;
pub mod error;
pub mod images;
pub mod parse;
mod rate_limit;
pub mod region;

pub use client::{StorefrontClient, StorefrontOptions};
pub use error::ScraperError;
pub use images::ImageStore;
pub use parse::{parse_listing, ListingContext};
pub use region::{currency_for_region, listing_url};
