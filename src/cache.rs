use crate::debug::DebugLogger;
use crate::error::StampaError;
use crate::finalize::extract_pages;
use crate::pdfinspect::inspect_pdf_bytes;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Key -> cache file name store with per-entry expiry.
pub trait CacheIndex: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, file_name: &str, ttl: Duration);
    fn remove(&self, key: &str);
}

#[derive(Default)]
pub struct MemoryCacheIndex {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCacheIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheIndex for MemoryCacheIndex {
    fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().ok()?;
        let expired = match entries.get(key) {
            Some((file_name, expires)) if Instant::now() < *expires => {
                return Some(file_name.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        None
    }

    fn put(&self, key: &str, file_name: &str, ttl: Duration) {
        if let Ok(mut entries) = self.entries.lock() {
            let now = Instant::now();
            // Keys that are never read again would otherwise stay forever.
            entries.retain(|_, (_, expires)| now < *expires);
            entries.insert(
                key.to_string(),
                (file_name.to_string(), now + ttl),
            );
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}

/// Which pages of a generated document belong to which record, in generation
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPageMap {
    entries: Vec<(String, Range<usize>)>,
}

impl RecordPageMap {
    /// Record `i` produced page `i`.
    pub fn one_page_per_record(record_ids: &[String]) -> Self {
        Self {
            entries: record_ids
                .iter()
                .enumerate()
                .map(|(idx, id)| (id.clone(), idx..idx + 1))
                .collect(),
        }
    }

    pub fn from_ranges(record_ids: &[String], ranges: &[Range<usize>]) -> Result<Self, StampaError> {
        if record_ids.len() != ranges.len() {
            return Err(StampaError::InvalidConfiguration(format!(
                "record page map needs one range per record: {} ids, {} ranges",
                record_ids.len(),
                ranges.len()
            )));
        }
        Ok(Self {
            entries: record_ids.iter().cloned().zip(ranges.iter().cloned()).collect(),
        })
    }

    /// Sorted, deduplicated page indices of the requested records. Unknown
    /// ids contribute nothing.
    pub fn pages_for(&self, record_ids: &[String]) -> Vec<usize> {
        let wanted: BTreeSet<&str> = record_ids.iter().map(String::as_str).collect();
        let pages: BTreeSet<usize> = self
            .entries
            .iter()
            .filter(|(id, _)| wanted.contains(id.as_str()))
            .flat_map(|(_, range)| range.clone())
            .collect();
        pages.into_iter().collect()
    }
}

/// A previously generated document plus what is needed to find each record's
/// pages in it.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionSource<'a> {
    pub identity: &'a str,
    pub bytes: &'a [u8],
    pub record_ids: &'a [String],
    /// `None` means one page per record.
    pub record_pages: Option<&'a [Range<usize>]>,
}

impl ExtractionSource<'_> {
    pub fn page_map(&self) -> Result<RecordPageMap, StampaError> {
        match self.record_pages {
            Some(ranges) => RecordPageMap::from_ranges(self.record_ids, ranges),
            None => Ok(RecordPageMap::one_page_per_record(self.record_ids)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub record_ids: BTreeSet<String>,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub bytes: Vec<u8>,
    pub entry: CacheEntry,
    pub hit: bool,
}

/// SHA-256 hex over the canonical JSON form of
/// `[source, requester, sorted unique record ids]`.
pub fn cache_key(source_identity: &str, requester: &str, record_ids: &[String]) -> String {
    let ids: BTreeSet<&str> = record_ids.iter().map(String::as_str).collect();
    let canonical = json!([source_identity, requester, ids]).to_string();
    sha256_hex(canonical.as_bytes())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub struct ExtractionCacheBuilder {
    dir: PathBuf,
    ttl: Duration,
    index: Option<Arc<dyn CacheIndex>>,
    debug_path: Option<PathBuf>,
}

impl ExtractionCacheBuilder {
    // Lifetime of an index entry; the file itself is reused only through the index.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn index(mut self, index: Arc<dyn CacheIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<ExtractionCache, StampaError> {
        if self.ttl.is_zero() {
            return Err(StampaError::InvalidConfiguration(
                "cache ttl must be greater than zero".to_string(),
            ));
        }
        fs::create_dir_all(&self.dir)?;
        let debug = match self.debug_path {
            Some(path) => Some(Arc::new(DebugLogger::new(path)?)),
            None => None,
        };
        Ok(ExtractionCache {
            dir: self.dir,
            ttl: self.ttl,
            index: self
                .index
                .unwrap_or_else(|| Arc::new(MemoryCacheIndex::new())),
            debug,
            counter: AtomicU64::new(0),
        })
    }
}

/// Per-recipient page subsets of generated documents, stored as `<key>.pdf`
/// under one directory.
pub struct ExtractionCache {
    dir: PathBuf,
    ttl: Duration,
    index: Arc<dyn CacheIndex>,
    debug: Option<Arc<DebugLogger>>,
    counter: AtomicU64,
}

impl ExtractionCache {
    pub fn builder(dir: impl Into<PathBuf>) -> ExtractionCacheBuilder {
        ExtractionCacheBuilder {
            dir: dir.into(),
            ttl: DEFAULT_TTL,
            index: None,
            debug_path: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn extract(
        &self,
        source: &ExtractionSource<'_>,
        requester: &str,
        record_ids: &[String],
    ) -> Result<Extraction, StampaError> {
        let key = cache_key(source.identity, requester, record_ids);
        let file_name = format!("{key}.pdf");
        let entry = CacheEntry {
            key: key.clone(),
            record_ids: record_ids.iter().cloned().collect(),
            path: self.dir.join(&file_name),
        };

        if let Some(indexed) = self.index.get(&key) {
            let path = self.dir.join(&indexed);
            match read_valid_pdf(&path) {
                Ok(bytes) => {
                    self.log("stampa.cache_hit", json!({"key": key, "file": indexed}));
                    return Ok(Extraction {
                        bytes,
                        entry: CacheEntry { path, ..entry },
                        hit: true,
                    });
                }
                Err(reason) => {
                    self.log(
                        "stampa.cache_corrupt",
                        json!({"key": key, "file": indexed, "error": reason}),
                    );
                    self.index.remove(&key);
                }
            }
        }

        let pages = source.page_map()?.pages_for(record_ids);
        if pages.is_empty() {
            return Err(StampaError::NoPagesSelected);
        }
        let bytes = extract_pages(source.bytes, &pages)?;
        self.persist(&file_name, &bytes)?;
        self.index.put(&key, &file_name, self.ttl);
        self.log(
            "stampa.cache_miss",
            json!({"key": key, "file": file_name, "pages": pages}),
        );
        Ok(Extraction {
            bytes,
            entry,
            hit: false,
        })
    }

    // Readers only ever see a complete file: write aside, then rename over.
    fn persist(&self, file_name: &str, bytes: &[u8]) -> Result<(), StampaError> {
        let id = self.counter.fetch_add(1, Ordering::Relaxed);
        let tmp_path = self
            .dir
            .join(format!(".{}.{}.{}.tmp", file_name, std::process::id(), id));
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);
        if let Err(err) = fs::rename(&tmp_path, self.dir.join(file_name)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err.into());
        }
        Ok(())
    }

    fn log(&self, event: &str, fields: serde_json::Value) {
        if let Some(debug) = self.debug.as_deref() {
            debug.increment(event, 1);
            debug.event(event, fields);
        }
    }
}

impl Drop for ExtractionCache {
    fn drop(&mut self) {
        if let Some(debug) = self.debug.as_deref() {
            debug.emit_summary("cache");
            debug.flush();
        }
    }
}

fn read_valid_pdf(path: &Path) -> Result<Vec<u8>, String> {
    let bytes = fs::read(path).map_err(|err| err.to_string())?;
    inspect_pdf_bytes(&bytes).map_err(|err| err.to_string())?;
    Ok(bytes)
}
