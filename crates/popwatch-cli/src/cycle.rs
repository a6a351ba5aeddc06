//! One check cycle: fetch listing pages, pick items not yet posted, publish
//! them, then persist the ledger and clean up images.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use popwatch_core::app_config::{IMAGE_RETENTION, LEDGER_RETENTION_DAYS};
use popwatch_core::{
    format_post, packaging_alt_text, AppConfig, Fetcher, HashtagTable, ImagePreparer, ItemRecord,
    LedgerStore, PostDraft, Publisher,
};
use rand::seq::SliceRandom;

use crate::filters::{is_excluded, matches_fandoms};
use crate::scheduler::panic_message;

/// Cycle tunables, taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub pages: Vec<String>,
    pub fandoms: Vec<String>,
    /// `0` means unlimited.
    pub max_posts: usize,
    pub post_delay: Duration,
    pub dry_run: bool,
    pub ledger_retention_days: i64,
    pub image_retention: Duration,
}

impl CycleSettings {
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            pages: config.scrape_pages.clone(),
            fandoms: config.fandoms.clone(),
            max_posts: config.max_posts_per_check,
            post_delay: config.post_delay(),
            dry_run: config.dry_run,
            ledger_retention_days: LEDGER_RETENTION_DAYS,
            image_retention: IMAGE_RETENTION,
        }
    }
}

/// Counts from one [`CheckCycle::run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Items returned by all pages, duplicates included.
    pub fetched: usize,
    pub unique: usize,
    /// Items that passed every filter and are not in the ledger.
    pub candidates: usize,
    /// Candidates left for a later cycle by the per-cycle post limit.
    pub deferred: usize,
    pub posted: usize,
    pub failed: usize,
    /// Candidates not published for a non-error reason: no usable image,
    /// or a dry run.
    pub skipped: usize,
}

enum ItemOutcome {
    Posted,
    Failed,
    Skipped,
}

pub struct CheckCycle {
    fetcher: Arc<dyn Fetcher>,
    images: Arc<dyn ImagePreparer>,
    publisher: Arc<dyn Publisher>,
    ledger_store: LedgerStore,
    hashtags: HashtagTable,
    settings: CycleSettings,
}

impl CheckCycle {
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        images: Arc<dyn ImagePreparer>,
        publisher: Arc<dyn Publisher>,
        ledger_store: LedgerStore,
        hashtags: HashtagTable,
        settings: CycleSettings,
    ) -> Self {
        Self {
            fetcher,
            images,
            publisher,
            ledger_store,
            hashtags,
            settings,
        }
    }

    /// Runs one cycle with `now` as the single clock reading for ledger
    /// timestamps and pruning. Per-page and per-item failures are logged and
    /// counted, never returned. A panic while posting one item counts as a
    /// failure for that item; the ledger is still saved and images cleaned.
    pub async fn run(&self, now: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();
        let mut ledger = self.ledger_store.load();

        let fetched = self.fetch_all().await;
        report.fetched = fetched.len();

        let mut items = dedupe(fetched);
        report.unique = items.len();
        items.shuffle(&mut rand::rng());

        let before_filters = items.len();
        let mut candidates: Vec<ItemRecord> = items
            .into_iter()
            .filter(|item| !is_excluded(item))
            .filter(|item| matches_fandoms(item, &self.settings.fandoms))
            .collect();
        let filtered_out = before_filters - candidates.len();

        candidates.retain(|item| !ledger.contains(&item.id));
        report.candidates = candidates.len();
        tracing::info!(
            fetched = report.fetched,
            unique = report.unique,
            filtered_out,
            candidates = report.candidates,
            "selected new items"
        );

        let max_posts = self.settings.max_posts;
        if max_posts > 0 && candidates.len() > max_posts {
            report.deferred = candidates.len() - max_posts;
            candidates.truncate(max_posts);
            tracing::info!(
                max_posts,
                deferred = report.deferred,
                "post limit reached, deferring the rest to a later check"
            );
        }

        for item in &candidates {
            if self.settings.dry_run {
                tracing::info!(
                    item_id = %item.id,
                    name = %item.name,
                    text = %format_post(item, &self.hashtags),
                    "dry run: would post"
                );
                report.skipped += 1;
                continue;
            }

            if report.posted > 0 && !self.settings.post_delay.is_zero() {
                tracing::debug!(delay_secs = self.settings.post_delay.as_secs(), "waiting before next post");
                tokio::time::sleep(self.settings.post_delay).await;
            }

            let outcome = match AssertUnwindSafe(self.post_item(item)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => {
                    tracing::error!(
                        item_id = %item.id,
                        name = %item.name,
                        panic = %panic_message(panic.as_ref()),
                        "posting item panicked"
                    );
                    ItemOutcome::Failed
                }
            };
            match outcome {
                ItemOutcome::Posted => {
                    ledger.record(&item.id, &item.name, item.price, now);
                    report.posted += 1;
                }
                ItemOutcome::Failed => report.failed += 1,
                ItemOutcome::Skipped => report.skipped += 1,
            }
        }

        if let Err(e) = self.ledger_store.prune_and_save(
            &mut ledger,
            now,
            self.settings.ledger_retention_days,
        ) {
            tracing::warn!(path = %self.ledger_store.path().display(), error = %e, "failed to save ledger");
        }

        self.images.cleanup(self.settings.image_retention).await;

        tracing::info!(
            posted = report.posted,
            failed = report.failed,
            skipped = report.skipped,
            deferred = report.deferred,
            "check cycle complete"
        );
        report
    }

    /// Prepares images for `item` and publishes it. The first attached image
    /// gets the descriptive alt text, any later one the packaging text.
    async fn post_item(&self, item: &ItemRecord) -> ItemOutcome {
        let mut images = self.images.prepare(item).await;
        if images.is_empty() {
            tracing::error!(item_id = %item.id, name = %item.name, "no images prepared, skipping item");
            return ItemOutcome::Skipped;
        }
        for (i, image) in images.iter_mut().enumerate() {
            image.alt_text = if i == 0 {
                self.images.alt_text(item)
            } else {
                packaging_alt_text(item)
            };
        }

        let draft = PostDraft::new(&format_post(item, &self.hashtags), images);
        match self.publisher.publish(&draft).await {
            Ok(()) => {
                tracing::info!(item_id = %item.id, name = %item.name, "posted item");
                ItemOutcome::Posted
            }
            Err(e) => {
                tracing::error!(item_id = %item.id, name = %item.name, error = %e, "failed to post item");
                ItemOutcome::Failed
            }
        }
    }

    async fn fetch_all(&self) -> Vec<ItemRecord> {
        let mut all = Vec::new();
        for page in &self.settings.pages {
            match self.fetcher.fetch(page).await {
                Ok(items) if items.is_empty() => {
                    tracing::warn!(page = %page, "listing page returned no items");
                }
                Ok(items) => {
                    tracing::info!(page = %page, count = items.len(), "fetched listing page");
                    all.extend(items);
                }
                Err(e) => {
                    tracing::error!(page = %page, error = %e, "failed to fetch listing page");
                }
            }
        }
        all
    }
}

/// Drops repeated ids, keeping the first occurrence.
fn dedupe(items: Vec<ItemRecord>) -> Vec<ItemRecord> {
    let mut seen = HashSet::with_capacity(items.len());
    items
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .collect()
}

#[cfg(test)]
#[path = "cycle_test.rs"]
mod tests;
