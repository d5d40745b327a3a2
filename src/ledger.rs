//! Usage Ledger
//!
//! Durable per-day, per-key usage counters so quota survives restarts.
//!
//! The document maps an ISO day to a map of key id to count:
//!
//! ```json
//! {
//!   "2026-10-18": { "9f2c": 41, "a1b2": 7 }
//! }
//! ```
//!
//! Every update is a read-modify-write of the whole document, serialized by
//! a process-wide lock and written through a temporary file.

use crate::error::{KeywardError, Result};
use crate::registry::Credential;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Day -> key id -> count
pub type UsageDocument = BTreeMap<String, BTreeMap<String, u32>>;

/// Persistent usage counters
#[derive(Debug)]
pub struct UsageLedger {
    path: PathBuf,

    /// Serializes read-modify-write cycles
    lock: Mutex<()>,

    write_failures: AtomicU64,
}

impl UsageLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
            write_failures: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of failed `record` calls since start
    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    /// Read the whole document. A missing file is an empty document.
    pub async fn read_document(&self) -> Result<UsageDocument> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(UsageDocument::new()),
            Err(e) => {
                return Err(KeywardError::LedgerIo(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(UsageDocument::new());
        }

        serde_json::from_slice(&data).map_err(|e| {
            KeywardError::LedgerCorrupt(format!("{}: {}", self.path.display(), e))
        })
    }

    /// Count stored for `key_id` on `day`
    pub async fn usage_on(&self, day: NaiveDate, key_id: &str) -> Result<u32> {
        let document = self.read_document().await?;
        Ok(lookup(&document, day, key_id))
    }

    /// Populate each credential's usage for `today` from the document.
    ///
    /// An unreadable ledger counts as no prior usage.
    pub async fn sync_today(&self, credentials: &[Arc<Credential>], today: NaiveDate) {
        let document = {
            let _guard = self.lock.lock().await;
            match self.read_document().await {
                Ok(document) => document,
                Err(e) => {
                    warn!(error = %e, "usage ledger unreadable, assuming no usage today");
                    UsageDocument::new()
                }
            }
        };

        for credential in credentials {
            credential.restore_usage(today, lookup(&document, today, credential.key_id()));
        }
        debug!(day = %today, keys = credentials.len(), "usage synced from ledger");
    }

    /// Persist `count` as the usage of `key_id` on `day`.
    ///
    /// Counts only grow within a day: a lower value than the stored one is
    /// ignored, so concurrent records landing out of order keep the maximum.
    pub async fn record(&self, key_id: &str, day: NaiveDate, count: u32) -> Result<()> {
        let result = self.record_inner(key_id, day, count).await;
        if result.is_err() {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn record_inner(&self, key_id: &str, day: NaiveDate, count: u32) -> Result<()> {
        let _guard = self.lock.lock().await;

        let mut document = self.read_document().await?;
        let slot = document
            .entry(day.to_string())
            .or_default()
            .entry(key_id.to_string())
            .or_insert(0);
        if *slot >= count {
            return Ok(());
        }
        *slot = count;

        self.write_document(&document).await
    }

    async fn write_document(&self, document: &UsageDocument) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                KeywardError::LedgerIo(format!("failed to create {}: {}", dir.display(), e))
            })?;
        }

        let data = serde_json::to_vec_pretty(document)
            .map_err(|e| KeywardError::Internal(format!("failed to encode usage ledger: {}", e)))?;

        let tmp = temp_path(&self.path);
        tokio::fs::write(&tmp, data).await.map_err(|e| {
            KeywardError::LedgerIo(format!("failed to write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            KeywardError::LedgerIo(format!("failed to replace {}: {}", self.path.display(), e))
        })
    }
}

fn lookup(document: &UsageDocument, day: NaiveDate, key_id: &str) -> u32 {
    document
        .get(&day.to_string())
        .and_then(|keys| keys.get(key_id))
        .copied()
        .unwrap_or(0)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "usage".into());
    name.push(".tmp");
    path.with_file_name(name)
}
