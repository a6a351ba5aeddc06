use std::path::PathBuf;
use std::time::Duration;

/// Ledger entries older than this are pruned at the end of each cycle.
pub const LEDGER_RETENTION_DAYS: i64 = 90;

/// Prepared images older than this are deleted at the end of each cycle.
pub const IMAGE_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// A Bluesky handle and app password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub handle: String,
    pub app_password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("handle", &self.handle)
            .field("app_password", &"[redacted]")
            .finish()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub bluesky: Credentials,
    /// Alternate account used with `--test-mode`; only set when both the
    /// test handle and test password are present.
    pub bluesky_test: Option<Credentials>,
    pub bluesky_service_url: String,
    pub check_interval_minutes: u64,
    /// Category allow-list. Empty, or containing `All`, disables filtering.
    pub fandoms: Vec<String>,
    /// Listing page identifiers, e.g. `sale` or `new-releases`.
    pub scrape_pages: Vec<String>,
    pub funko_region: String,
    /// `0` means unlimited.
    pub max_posts_per_check: usize,
    pub post_delay_seconds: u64,
    pub scrape_delay_min_secs: f64,
    pub scrape_delay_max_secs: f64,
    pub dry_run: bool,
    pub test_mode: bool,
    pub log_level: String,
    pub data_dir: PathBuf,
    pub hashtags_path: Option<PathBuf>,
    pub request_timeout_secs: u64,
}

impl AppConfig {
    /// Account to authenticate as: the test account in test mode when one
    /// is configured, otherwise the main account.
    #[must_use]
    pub fn active_credentials(&self) -> &Credentials {
        match (&self.bluesky_test, self.test_mode) {
            (Some(test), true) => test,
            _ => &self.bluesky,
        }
    }

    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_minutes * 60)
    }

    #[must_use]
    pub fn post_delay(&self) -> Duration {
        Duration::from_secs(self.post_delay_seconds)
    }

    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("posted_products.json")
    }

    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bluesky", &self.bluesky)
            .field("bluesky_test", &self.bluesky_test)
            .field("bluesky_service_url", &self.bluesky_service_url)
            .field("check_interval_minutes", &self.check_interval_minutes)
            .field("fandoms", &self.fandoms)
            .field("scrape_pages", &self.scrape_pages)
            .field("funko_region", &self.funko_region)
            .field("max_posts_per_check", &self.max_posts_per_check)
            .field("post_delay_seconds", &self.post_delay_seconds)
            .field("scrape_delay_min_secs", &self.scrape_delay_min_secs)
            .field("scrape_delay_max_secs", &self.scrape_delay_max_secs)
            .field("dry_run", &self.dry_run)
            .field("test_mode", &self.test_mode)
            .field("log_level", &self.log_level)
            .field("data_dir", &self.data_dir)
            .field("hashtags_path", &self.hashtags_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}
