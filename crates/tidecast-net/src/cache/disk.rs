//! Persistent tier.
//!
//! Each entry is one JSON record `<key>.json` in the cache directory, holding
//! the base64 payload, creation and expiration times as epoch seconds, the
//! validator tag and the payload size. Records are written to a temporary
//! file and renamed into place, so a crash never leaves a torn record behind.
//!
//! The index of what is on disk is built lazily from the directory on first
//! use. Every failure here is logged and absorbed: the disk tier is
//! best-effort and never fails the request path.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;

use super::CacheEntry;
use crate::logger::targets;

const RECORD_EXT: &str = "json";
const TEMP_EXT: &str = "tmp";

/// Fraction of the budget eviction brings usage down to.
const EVICTION_TARGET: f64 = 0.75;

#[derive(Serialize, Deserialize)]
struct DiskRecord {
    payload: String,
    created_at: f64,
    expires_at: f64,
    etag: Option<String>,
    size: u64,
}

impl DiskRecord {
    fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            payload: STANDARD.encode(&entry.payload),
            created_at: epoch_secs(entry.created_at),
            expires_at: epoch_secs(entry.expires_at),
            etag: entry.etag.clone(),
            size: entry.size,
        }
    }

    fn into_entry(self) -> Option<CacheEntry> {
        let payload = Bytes::from(STANDARD.decode(self.payload.as_bytes()).ok()?);
        let created_at = from_epoch_secs(self.created_at)?;
        let expires_at = from_epoch_secs(self.expires_at)?;
        if expires_at <= created_at || payload.len() as u64 != self.size {
            return None;
        }
        Some(CacheEntry {
            payload,
            created_at,
            expires_at,
            etag: self.etag,
            size: self.size,
        })
    }
}

fn epoch_secs(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn from_epoch_secs(secs: f64) -> Option<SystemTime> {
    Duration::try_from_secs_f64(secs)
        .ok()
        .and_then(|d| UNIX_EPOCH.checked_add(d))
}

#[derive(Clone, Copy, Debug)]
struct RecordMeta {
    /// Bytes the record occupies on disk.
    file_size: u64,
    created_at: SystemTime,
    expires_at: SystemTime,
}

#[derive(Default)]
struct DiskState {
    loaded: bool,
    index: HashMap<String, RecordMeta>,
    total_bytes: u64,
}

impl DiskState {
    fn forget(&mut self, key: &str) -> Option<RecordMeta> {
        let meta = self.index.remove(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(meta.file_size);
        Some(meta)
    }
}

/// Directory-backed tier with a byte budget.
///
/// All operations serialize on one async lock, which doubles as the queue
/// for disk I/O. Operations that touch several files run as detached tasks:
/// dropping the caller's future must not leave files the index does not
/// account for.
#[derive(Clone)]
pub(crate) struct DiskTier {
    dir: PathBuf,
    max_bytes: u64,
    state: Arc<Mutex<DiskState>>,
}

impl DiskTier {
    pub(crate) fn new(dir: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            max_bytes,
            state: Arc::new(Mutex::new(DiskState::default())),
        }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn record_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{RECORD_EXT}"))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{TEMP_EXT}"))
    }

    /// Run `work` on a task of its own and wait for it. The task finishes
    /// even if the caller stops waiting.
    async fn detached<T, F>(&self, op: &'static str, work: impl FnOnce(DiskTier) -> F) -> Option<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::spawn(work(self.clone())).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(target: targets::CACHE, op, error = %e, "disk cache task failed");
                None
            }
        }
    }

    /// Build the index from the directory if it has not been built yet.
    async fn ensure_loaded(&self, state: &mut DiskState) {
        if state.loaded {
            return;
        }
        if let Err(e) = fs::create_dir_all(&self.dir).await {
            tracing::warn!(target: targets::CACHE, dir = ?self.dir, error = %e, "cannot create cache directory");
            return;
        }
        match self.scan(state).await {
            Ok(()) => {
                state.loaded = true;
                tracing::debug!(
                    target: targets::CACHE,
                    entries = state.index.len(),
                    bytes = state.total_bytes,
                    "disk cache index loaded"
                );
            }
            Err(e) => {
                tracing::warn!(target: targets::CACHE, dir = ?self.dir, error = %e, "cannot scan cache directory");
            }
        }
    }

    async fn scan(&self, state: &mut DiskState) -> io::Result<()> {
        state.index.clear();
        state.total_bytes = 0;

        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(dir_entry) = entries.next_entry().await? {
            let path = dir_entry.path();
            let ext = path.extension().and_then(|e| e.to_str());
            if ext == Some(TEMP_EXT) {
                // leftover from an interrupted write
                let _ = fs::remove_file(&path).await;
                continue;
            }
            if ext != Some(RECORD_EXT) {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };

            match read_record(&path).await {
                Some((entry, file_size)) => {
                    state.total_bytes += file_size;
                    state.index.insert(
                        key,
                        RecordMeta {
                            file_size,
                            created_at: entry.created_at,
                            expires_at: entry.expires_at,
                        },
                    );
                }
                None => {
                    tracing::debug!(target: targets::CACHE, path = ?path, "dropping unreadable cache record");
                    let _ = fs::remove_file(&path).await;
                }
            }
        }
        Ok(())
    }

    /// Persist an entry, then enforce the budget.
    pub(crate) async fn store(&self, key: &str, entry: &CacheEntry) -> bool {
        let encoded = match serde_json::to_vec(&DiskRecord::from_entry(entry)) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(target: targets::CACHE, error = %e, "cannot encode cache record");
                return false;
            }
        };
        let meta = RecordMeta {
            file_size: encoded.len() as u64,
            created_at: entry.created_at,
            expires_at: entry.expires_at,
        };
        let key = key.to_string();
        self.detached("store", move |tier| async move { tier.persist(&key, &encoded, meta).await })
            .await
            .unwrap_or(false)
    }

    /// Write a record and account for it in the index, then enforce the budget.
    async fn persist(&self, key: &str, encoded: &[u8], meta: RecordMeta) -> bool {
        let file_size = meta.file_size;
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await;
        if !state.loaded {
            return false;
        }
        if file_size > self.max_bytes {
            tracing::debug!(target: targets::CACHE, key, bytes = file_size, "entry exceeds disk budget");
            return false;
        }

        let temp = self.temp_path(key);
        let target = self.record_path(key);
        let written = async {
            fs::write(&temp, encoded).await?;
            fs::rename(&temp, &target).await
        }
        .await;
        if let Err(e) = written {
            tracing::warn!(target: targets::CACHE, key, error = %e, "cannot write cache record");
            let _ = fs::remove_file(&temp).await;
            return false;
        }

        state.forget(key);
        state.total_bytes += file_size;
        state.index.insert(key.to_string(), meta);

        if state.total_bytes > self.max_bytes {
            self.evict(&mut state).await;
        }
        true
    }

    /// Remove oldest-created records until usage is at most 75% of budget.
    async fn evict(&self, state: &mut DiskState) {
        let target = (self.max_bytes as f64 * EVICTION_TARGET) as u64;
        let mut by_age: Vec<(String, SystemTime)> = state
            .index
            .iter()
            .map(|(key, meta)| (key.clone(), meta.created_at))
            .collect();
        by_age.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let before = state.total_bytes;
        let mut evicted = 0usize;
        for (key, _) in by_age {
            if state.total_bytes <= target {
                break;
            }
            state.forget(&key);
            let _ = fs::remove_file(self.record_path(&key)).await;
            evicted += 1;
        }
        tracing::debug!(
            target: targets::CACHE,
            evicted,
            before,
            after = state.total_bytes,
            "disk cache over budget"
        );
    }

    /// Load a live entry. Expired or unreadable records are deleted.
    pub(crate) async fn load(&self, key: &str) -> Option<CacheEntry> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await;

        let meta = *state.index.get(key)?;
        let path = self.record_path(key);
        if meta.expires_at < SystemTime::now() {
            state.forget(key);
            let _ = fs::remove_file(&path).await;
            return None;
        }

        match read_record(&path).await {
            Some((entry, _)) if !entry.is_expired() => Some(entry),
            _ => {
                state.forget(key);
                let _ = fs::remove_file(&path).await;
                None
            }
        }
    }

    pub(crate) async fn remove(&self, key: &str) -> bool {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await;
        let known = state.forget(key).is_some();
        let _ = fs::remove_file(self.record_path(key)).await;
        known
    }

    /// Delete every record and reset the byte counter.
    pub(crate) async fn clear(&self) {
        self.detached("clear", |tier| async move { tier.clear_files().await }).await;
    }

    async fn clear_files(&self) {
        let mut state = self.state.lock().await;
        state.index.clear();
        state.total_bytes = 0;

        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                state.loaded = false;
                return;
            }
            Err(e) => {
                tracing::warn!(target: targets::CACHE, error = %e, "cannot clear cache directory");
                state.loaded = false;
                return;
            }
        };
        while let Ok(Some(dir_entry)) = entries.next_entry().await {
            let path = dir_entry.path();
            let ext = path.extension().and_then(|e| e.to_str());
            if matches!(ext, Some(RECORD_EXT) | Some(TEMP_EXT)) {
                let _ = fs::remove_file(&path).await;
            }
        }
        state.loaded = true;
    }

    /// Delete records expired at `now`; returns how many were deleted.
    pub(crate) async fn clear_expired(&self, now: SystemTime) -> usize {
        self.detached("clear_expired", move |tier| async move {
            tier.remove_expired(now).await
        })
        .await
        .unwrap_or(0)
    }

    async fn remove_expired(&self, now: SystemTime) -> usize {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await;

        let expired: Vec<String> = state
            .index
            .iter()
            .filter(|(_, meta)| now > meta.expires_at)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.forget(key);
            let _ = fs::remove_file(self.record_path(key)).await;
        }
        expired.len()
    }

    /// Bytes currently tracked on disk.
    pub(crate) async fn usage(&self) -> u64 {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await;
        state.total_bytes
    }

    pub(crate) async fn len(&self) -> usize {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await;
        state.index.len()
    }
}

async fn read_record(path: &Path) -> Option<(CacheEntry, u64)> {
    let raw = fs::read(path).await.ok()?;
    let record: DiskRecord = serde_json::from_slice(&raw).ok()?;
    Some((record.into_entry()?, raw.len() as u64))
}
