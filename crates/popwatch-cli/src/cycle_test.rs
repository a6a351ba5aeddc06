use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::TimeZone;
use popwatch_core::{Currency, FetchError, PageType, PreparedImage, PublishError};

use super::*;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeFetcher {
    pages: HashMap<String, Result<Vec<ItemRecord>, FetchError>>,
    calls: AtomicUsize,
}

impl FakeFetcher {
    fn with_page(mut self, page: &str, items: Vec<ItemRecord>) -> Self {
        self.pages.insert(page.to_string(), Ok(items));
        self
    }

    fn with_error(mut self, page: &str, err: FetchError) -> Self {
        self.pages.insert(page.to_string(), Err(err));
        self
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, page: &str) -> Result<Vec<ItemRecord>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages.get(page).cloned().unwrap_or_else(|| Ok(Vec::new()))
    }
}

#[derive(Default)]
struct FakeImages {
    no_images_for: HashSet<String>,
    extra_images: usize,
    cleanups: AtomicUsize,
}

#[async_trait]
impl ImagePreparer for FakeImages {
    async fn prepare(&self, item: &ItemRecord) -> Vec<PreparedImage> {
        if self.no_images_for.contains(&item.name) {
            return Vec::new();
        }
        (0..=self.extra_images)
            .map(|i| PreparedImage {
                path: PathBuf::from(format!("/tmp/{}_{i}.jpg", item.id)),
                alt_text: String::new(),
            })
            .collect()
    }

    fn alt_text(&self, item: &ItemRecord) -> String {
        popwatch_core::alt_text(item)
    }

    async fn cleanup(&self, _max_age: Duration) -> usize {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        0
    }
}

#[derive(Default)]
struct FakePublisher {
    posts: Mutex<Vec<PostDraft>>,
    attempts_at: Mutex<Vec<tokio::time::Instant>>,
    reject_containing: Option<String>,
    panic_containing: Option<String>,
}

impl FakePublisher {
    fn posted_texts(&self) -> Vec<String> {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .map(|d| d.text.clone())
            .collect()
    }

    fn drafts(&self) -> Vec<PostDraft> {
        self.posts.lock().unwrap().clone()
    }

    fn attempt_times(&self) -> Vec<tokio::time::Instant> {
        self.attempts_at.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(&self, draft: &PostDraft) -> Result<(), PublishError> {
        self.attempts_at
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        if let Some(needle) = &self.panic_containing {
            assert!(!draft.text.contains(needle.as_str()), "publisher blew up");
        }
        if let Some(needle) = &self.reject_containing {
            if draft.text.contains(needle.as_str()) {
                return Err(PublishError::Rejected("rejected by fake".to_string()));
            }
        }
        self.posts.lock().unwrap().push(draft.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 16, 12, 0, 0).unwrap()
}

fn item(name: &str, license: &str) -> ItemRecord {
    let slug = name.to_lowercase().replace(' ', "-");
    ItemRecord::new(
        name,
        &format!("https://funko.com/pl/{slug}/1.html"),
        14.99,
        0.0,
        license,
        PageType::NewReleases,
        Currency::Eur,
        now(),
    )
}

fn settings(pages: &[&str]) -> CycleSettings {
    CycleSettings {
        pages: pages.iter().map(ToString::to_string).collect(),
        fandoms: vec!["All".to_string()],
        max_posts: 0,
        post_delay: Duration::ZERO,
        dry_run: false,
        ledger_retention_days: 90,
        image_retention: Duration::from_secs(24 * 60 * 60),
    }
}

struct Harness {
    cycle: CheckCycle,
    fetcher: Arc<FakeFetcher>,
    images: Arc<FakeImages>,
    publisher: Arc<FakePublisher>,
    ledger_path: PathBuf,
    _dir: tempfile::TempDir,
}

fn harness(
    fetcher: FakeFetcher,
    images: FakeImages,
    publisher: FakePublisher,
    settings: CycleSettings,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("posted_products.json");
    let fetcher = Arc::new(fetcher);
    let images = Arc::new(images);
    let publisher = Arc::new(publisher);
    let cycle = CheckCycle::new(
        fetcher.clone(),
        images.clone(),
        publisher.clone(),
        LedgerStore::new(&ledger_path),
        HashtagTable::bundled(),
        settings,
    );
    Harness {
        cycle,
        fetcher,
        images,
        publisher,
        ledger_path,
        _dir: dir,
    }
}

fn saved_ledger(path: &std::path::Path) -> serde_json::Map<String, serde_json::Value> {
    let raw = std::fs::read_to_string(path).unwrap();
    serde_json::from_str(&raw).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn overlapping_pages_post_each_item_once() {
    let a = item("Pop! Groot", "Marvel");
    let b = item("Pop! Grogu", "Star Wars");
    let c = item("Pop! Pochita", "Chainsaw Man");
    let fetcher = FakeFetcher::default()
        .with_page("sale", vec![a.clone(), b.clone()])
        .with_page("new-releases", vec![b.clone(), c.clone()]);
    let h = harness(
        fetcher,
        FakeImages::default(),
        FakePublisher::default(),
        settings(&["sale", "new-releases"]),
    );

    let report = h.cycle.run(now()).await;

    assert_eq!(report.fetched, 4);
    assert_eq!(report.unique, 3);
    assert_eq!(report.candidates, 3);
    assert_eq!(report.posted, 3);
    assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 2);

    let ledger = saved_ledger(&h.ledger_path);
    assert_eq!(ledger.len(), 3);
    for id in [&a.id, &b.id, &c.id] {
        assert!(ledger.contains_key(id.as_str()));
    }
    assert_eq!(ledger[&a.id]["name"], "Pop! Groot");
}

#[tokio::test]
async fn second_cycle_does_not_repost() {
    let fetcher = FakeFetcher::default().with_page(
        "sale",
        vec![item("Pop! Groot", "Marvel"), item("Pop! Grogu", "Star Wars")],
    );
    let h = harness(
        fetcher,
        FakeImages::default(),
        FakePublisher::default(),
        settings(&["sale"]),
    );

    let first = h.cycle.run(now()).await;
    let second = h.cycle.run(now() + chrono::Duration::minutes(15)).await;

    assert_eq!(first.posted, 2);
    assert_eq!(second.candidates, 0);
    assert_eq!(second.posted, 0);
    assert_eq!(h.publisher.posted_texts().len(), 2);
}

#[tokio::test]
async fn dry_run_publishes_nothing_and_records_nothing() {
    let fetcher = FakeFetcher::default().with_page("sale", vec![item("Pop! Groot", "Marvel")]);
    let mut s = settings(&["sale"]);
    s.dry_run = true;
    let h = harness(fetcher, FakeImages::default(), FakePublisher::default(), s);

    let report = h.cycle.run(now()).await;

    assert_eq!(report.candidates, 1);
    assert_eq!(report.posted, 0);
    assert_eq!(report.skipped, 1);
    assert!(h.publisher.posted_texts().is_empty());
    assert!(saved_ledger(&h.ledger_path).is_empty());
}

#[tokio::test]
async fn item_without_images_is_skipped_and_retried_later() {
    let fetcher = FakeFetcher::default().with_page(
        "sale",
        vec![item("Pop! Groot", "Marvel"), item("Pop! Grogu", "Star Wars")],
    );
    let images = FakeImages {
        no_images_for: HashSet::from(["Pop! Groot".to_string()]),
        ..FakeImages::default()
    };
    let h = harness(fetcher, images, FakePublisher::default(), settings(&["sale"]));

    let report = h.cycle.run(now()).await;

    assert_eq!(report.posted, 1);
    assert_eq!(report.skipped, 1);
    let ledger = saved_ledger(&h.ledger_path);
    assert_eq!(ledger.len(), 1);
    assert!(!ledger.contains_key(item("Pop! Groot", "Marvel").id.as_str()));
}

#[tokio::test]
async fn publish_failure_is_counted_and_not_recorded() {
    let fetcher = FakeFetcher::default().with_page(
        "sale",
        vec![item("Pop! Groot", "Marvel"), item("Pop! Grogu", "Star Wars")],
    );
    let publisher = FakePublisher {
        reject_containing: Some("Grogu".to_string()),
        ..FakePublisher::default()
    };
    let h = harness(fetcher, FakeImages::default(), publisher, settings(&["sale"]));

    let report = h.cycle.run(now()).await;

    assert_eq!(report.posted, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(saved_ledger(&h.ledger_path).len(), 1);
}

#[tokio::test]
async fn post_limit_defers_the_rest() {
    let items = (1..=5)
        .map(|n| item(&format!("Pop! Figure {n}"), "Marvel"))
        .collect();
    let fetcher = FakeFetcher::default().with_page("sale", items);
    let mut s = settings(&["sale"]);
    s.max_posts = 2;
    let h = harness(fetcher, FakeImages::default(), FakePublisher::default(), s);

    let report = h.cycle.run(now()).await;

    assert_eq!(report.candidates, 5);
    assert_eq!(report.deferred, 3);
    assert_eq!(report.posted, 2);

    let next = h.cycle.run(now()).await;
    assert_eq!(next.candidates, 3);
    assert_eq!(next.posted, 2);
}

#[tokio::test]
async fn excluded_and_unlisted_fandoms_are_filtered() {
    let fetcher = FakeFetcher::default().with_page(
        "sale",
        vec![
            item("Pop! Quarterback", "NFL"),
            item("Pop! Groot", "Marvel"),
            item("Pop! Pikachu", "Pokémon"),
        ],
    );
    let mut s = settings(&["sale"]);
    s.fandoms = vec!["marvel".to_string()];
    let h = harness(fetcher, FakeImages::default(), FakePublisher::default(), s);

    let report = h.cycle.run(now()).await;

    assert_eq!(report.unique, 3);
    assert_eq!(report.candidates, 1);
    let texts = h.publisher.posted_texts();
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("Pop! Groot"));
}

#[tokio::test]
async fn all_fandoms_still_excludes_leagues() {
    let fetcher = FakeFetcher::default().with_page(
        "sale",
        vec![item("Pop! Quarterback", "NFL"), item("Pop! Pikachu", "Pokémon")],
    );
    let h = harness(
        fetcher,
        FakeImages::default(),
        FakePublisher::default(),
        settings(&["sale"]),
    );

    let report = h.cycle.run(now()).await;

    assert_eq!(report.candidates, 1);
    assert_eq!(report.posted, 1);
}

#[tokio::test]
async fn page_errors_do_not_stop_other_pages() {
    let fetcher = FakeFetcher::default()
        .with_error("sale", FetchError::Blocked("403".to_string()))
        .with_page("exclusives", vec![item("Pop! Groot", "Marvel")]);
    let h = harness(
        fetcher,
        FakeImages::default(),
        FakePublisher::default(),
        settings(&["sale", "exclusives"]),
    );

    let report = h.cycle.run(now()).await;

    assert_eq!(report.fetched, 1);
    assert_eq!(report.posted, 1);
    assert_eq!(h.images.cleanups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn old_ledger_entries_are_pruned_at_cycle_end() {
    let h = harness(
        FakeFetcher::default(),
        FakeImages::default(),
        FakePublisher::default(),
        settings(&["sale"]),
    );
    std::fs::write(
        &h.ledger_path,
        r#"{
          "old": {"name": "Old", "posted_at": "2025-11-01T00:00:00+00:00", "price": 1.0},
          "recent": {"name": "Recent", "posted_at": "2026-02-01T00:00:00+00:00", "price": 2.0}
        }"#,
    )
    .unwrap();

    let report = h.cycle.run(now()).await;

    assert_eq!(report.fetched, 0);
    let ledger = saved_ledger(&h.ledger_path);
    assert!(!ledger.contains_key("old"));
    assert!(ledger.contains_key("recent"));
    assert_eq!(h.images.cleanups.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn delay_separates_successful_posts() {
    let fetcher = FakeFetcher::default().with_page(
        "sale",
        vec![item("Pop! Groot", "Marvel"), item("Pop! Grogu", "Star Wars")],
    );
    let mut s = settings(&["sale"]);
    s.post_delay = Duration::from_secs(30);
    let h = harness(fetcher, FakeImages::default(), FakePublisher::default(), s);

    let start = tokio::time::Instant::now();
    let report = h.cycle.run(now()).await;

    assert_eq!(report.posted, 2);
    let attempts = h.publisher.attempt_times();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0] - start, Duration::ZERO, "no delay before the first post");
    assert_eq!(attempts[1] - attempts[0], Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn no_delay_follows_a_failed_post() {
    let fetcher = FakeFetcher::default().with_page(
        "sale",
        vec![item("Pop! Groot", "Marvel"), item("Pop! Grogu", "Star Wars")],
    );
    let mut s = settings(&["sale"]);
    s.post_delay = Duration::from_secs(30);
    let publisher = FakePublisher {
        reject_containing: Some("Pop!".to_string()),
        ..FakePublisher::default()
    };
    let h = harness(fetcher, FakeImages::default(), publisher, s);

    let start = tokio::time::Instant::now();
    let report = h.cycle.run(now()).await;

    assert_eq!(report.failed, 2);
    let attempts = h.publisher.attempt_times();
    assert_eq!(attempts.len(), 2);
    assert!(attempts.iter().all(|at| *at == start));
}

#[tokio::test]
async fn first_image_gets_descriptive_alt_text_and_rest_packaging() {
    let groot = item("Pop! Groot", "Marvel");
    let fetcher = FakeFetcher::default().with_page("sale", vec![groot.clone()]);
    let images = FakeImages {
        extra_images: 1,
        ..FakeImages::default()
    };
    let h = harness(fetcher, images, FakePublisher::default(), settings(&["sale"]));

    let report = h.cycle.run(now()).await;

    assert_eq!(report.posted, 1);
    let drafts = h.publisher.drafts();
    let attached = &drafts[0].images;
    assert_eq!(attached.len(), 2);
    assert_eq!(attached[0].alt_text, popwatch_core::alt_text(&groot));
    assert_eq!(attached[1].alt_text, packaging_alt_text(&groot));
}

#[tokio::test]
async fn ledger_save_failure_still_cleans_images() {
    let fetcher = FakeFetcher::default().with_page("sale", vec![item("Pop! Groot", "Marvel")]);
    let h = harness(
        fetcher,
        FakeImages::default(),
        FakePublisher::default(),
        settings(&["sale"]),
    );
    std::fs::create_dir(&h.ledger_path).unwrap();

    let report = h.cycle.run(now()).await;

    assert_eq!(report.posted, 1);
    assert!(h.ledger_path.is_dir(), "ledger was never written");
    assert_eq!(h.images.cleanups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn panicking_item_does_not_abort_the_cycle() {
    let fetcher = FakeFetcher::default().with_page(
        "sale",
        vec![item("Pop! Groot", "Marvel"), item("Pop! Grogu", "Star Wars")],
    );
    let publisher = FakePublisher {
        panic_containing: Some("Grogu".to_string()),
        ..FakePublisher::default()
    };
    let h = harness(fetcher, FakeImages::default(), publisher, settings(&["sale"]));

    let report = h.cycle.run(now()).await;

    assert_eq!(report.posted, 1);
    assert_eq!(report.failed, 1);
    let ledger = saved_ledger(&h.ledger_path);
    assert_eq!(ledger.len(), 1);
    assert!(ledger.contains_key(item("Pop! Groot", "Marvel").id.as_str()));
    assert_eq!(h.images.cleanups.load(Ordering::SeqCst), 1);
}

#[test]
fn dedupe_keeps_first_occurrence() {
    let mut first = item("Pop! Groot", "Marvel");
    first.price = 10.0;
    let mut second = item("Pop! Groot", "Marvel");
    second.price = 20.0;

    let out = dedupe(vec![first, second, item("Pop! Grogu", "Star Wars")]);
    assert_eq!(out.len(), 2);
    assert!((out[0].price - 10.0).abs() < f64::EPSILON);
}
