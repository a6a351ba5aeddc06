//! Dedup ledger of items that have already been posted.
//!
//! The ledger is a JSON object keyed by item id, rewritten in full on every
//! save:
//!
//! ```json
//! {
//!   "3f2a9c01d4e5b6a7": {
//!     "name": "Pop! Spider-Man",
//!     "posted_at": "2026-03-01T12:00:00+00:00",
//!     "price": 15.0
//!   }
//! }
//! ```
//!
//! Entries are pruned once their `posted_at` is older than the retention
//! window. Entries whose timestamp cannot be parsed are kept.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize ledger: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub name: String,
    /// ISO-8601 timestamp of the successful post.
    pub posted_at: String,
    pub price: f64,
}

impl LedgerEntry {
    /// Parses `posted_at` as RFC 3339, or as a naive ISO-8601 timestamp
    /// interpreted as UTC.
    #[must_use]
    pub fn posted_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.posted_at)
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// In-memory view of posted items, keyed by item id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    entries: BTreeMap<String, LedgerEntry>,
}

impl Ledger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful post. Re-recording an id overwrites it.
    pub fn record(&mut self, id: &str, name: &str, price: f64, now: DateTime<Utc>) {
        self.entries.insert(
            id.to_string(),
            LedgerEntry {
                name: name.to_string(),
                posted_at: now.to_rfc3339(),
                price,
            },
        );
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&LedgerEntry> {
        self.entries.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops entries posted more than `retention_days` before `now`.
    /// Returns the number of entries removed.
    pub fn prune(&mut self, now: DateTime<Utc>, retention_days: i64) -> usize {
        let cutoff = now - Duration::days(retention_days);
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.posted_at().is_none_or(|ts| ts > cutoff));
        before - self.entries.len()
    }
}

/// File-backed persistence for the [`Ledger`].
#[derive(Debug, Clone)]
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the ledger from disk.
    ///
    /// A missing file yields an empty ledger. So does an unreadable or
    /// corrupt one, with a warning, so a damaged file never stops the bot.
    #[must_use]
    pub fn load(&self) -> Ledger {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no ledger file found, starting fresh");
                return Ledger::new();
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read ledger, starting fresh");
                return Ledger::new();
            }
        };

        match serde_json::from_slice::<Ledger>(&bytes) {
            Ok(ledger) => {
                tracing::info!(entries = ledger.len(), "loaded ledger");
                ledger
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "corrupt ledger file, starting fresh");
                Ledger::new()
            }
        }
    }

    /// Prunes `ledger` and writes it to disk atomically.
    ///
    /// The JSON is written to a sibling `.tmp` file, flushed, then renamed
    /// over the target, so readers never observe a partial file. The parent
    /// directory is created if needed. Returns the number of pruned entries.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if serialization or any filesystem step fails.
    pub fn prune_and_save(
        &self,
        ledger: &mut Ledger,
        now: DateTime<Utc>,
        retention_days: i64,
    ) -> Result<usize, LedgerError> {
        let removed = ledger.prune(now, retention_days);
        if removed > 0 {
            tracing::info!(removed, "pruned old ledger entries");
        }

        let bytes = serde_json::to_vec_pretty(ledger)?;
        self.write_atomic(&bytes)?;

        tracing::debug!(entries = ledger.len(), "saved ledger");
        Ok(removed)
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let mut file = std::fs::File::create(&tmp).map_err(io_err(&tmp))?;
        file.write_all(bytes).map_err(io_err(&tmp))?;
        file.flush().map_err(io_err(&tmp))?;
        file.sync_all().map_err(io_err(&tmp))?;
        drop(file);

        std::fs::rename(&tmp, &self.path).map_err(io_err(&self.path))
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> LedgerError {
    let path = path.display().to_string();
    move |source| LedgerError::Io { path, source }
}

#[cfg(test)]
#[path = "ledger_test.rs"]
mod tests;
