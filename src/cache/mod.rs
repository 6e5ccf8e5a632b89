//! Persisted, content-addressed result cache.
//!
//! One JSON document with three partitions (`abstracts`, `answers`,
//! `translations`). State is loaded once and kept in memory; every mutation
//! rewrites the whole file through a temp-file rename while holding the state
//! lock, so concurrent writers are serialized.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// Default per-partition entry bound.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache file {} is not valid JSON: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("cache I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Abstracts,
    Answers,
    Translations,
}

impl Partition {
    pub fn as_str(self) -> &'static str {
        match self {
            Partition::Abstracts => "abstracts",
            Partition::Answers => "answers",
            Partition::Translations => "translations",
        }
    }
}

/// One partition. Iteration order is insertion order, which is also the
/// eviction order and the key order in the file.
type Entries = IndexMap<String, String>;

/// Drops oldest entries until at most `max` remain. `max == 0` is unbounded.
fn evict_oldest(entries: &mut Entries, max: usize) -> usize {
    if max == 0 {
        return 0;
    }
    let excess = entries.len().saturating_sub(max);
    for _ in 0..excess {
        entries.shift_remove_index(0);
    }
    excess
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheState {
    #[serde(default)]
    abstracts: Entries,
    #[serde(default)]
    answers: Entries,
    #[serde(default)]
    translations: Entries,
}

impl CacheState {
    fn entries(&self, partition: Partition) -> &Entries {
        match partition {
            Partition::Abstracts => &self.abstracts,
            Partition::Answers => &self.answers,
            Partition::Translations => &self.translations,
        }
    }

    fn entries_mut(&mut self, partition: Partition) -> &mut Entries {
        match partition {
            Partition::Abstracts => &mut self.abstracts,
            Partition::Answers => &mut self.answers,
            Partition::Translations => &mut self.translations,
        }
    }
}

type InFlight = HashMap<(Partition, String), Arc<Mutex<()>>>;

pub struct Cache {
    path: Option<PathBuf>,
    max_entries: usize,
    state: Mutex<CacheState>,
    in_flight: std::sync::Mutex<InFlight>,
}

impl Cache {
    /// Loads the cache file at `path`. A missing or empty file yields an empty
    /// cache; an unparseable one is an error rather than being discarded.
    pub async fn open(path: impl Into<PathBuf>, max_entries: usize) -> Result<Self, CacheError> {
        let path = path.into();
        let mut state = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => CacheState::default(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| CacheError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no cache file yet, starting empty");
                CacheState::default()
            }
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        for partition in [Partition::Abstracts, Partition::Answers, Partition::Translations] {
            evict_oldest(state.entries_mut(partition), max_entries);
        }

        debug!(
            path = %path.display(),
            abstracts = state.abstracts.len(),
            answers = state.answers.len(),
            translations = state.translations.len(),
            "cache loaded"
        );

        Ok(Self::with_state(Some(path), max_entries, state))
    }

    /// Cache that never touches the filesystem.
    pub fn in_memory(max_entries: usize) -> Self {
        Self::with_state(None, max_entries, CacheState::default())
    }

    fn with_state(path: Option<PathBuf>, max_entries: usize, state: CacheState) -> Self {
        Self {
            path,
            max_entries,
            state: Mutex::new(state),
            in_flight: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub async fn get(&self, partition: Partition, key: &str) -> Option<String> {
        let state = self.state.lock().await;
        state.entries(partition).get(key).cloned()
    }

    pub async fn len(&self, partition: Partition) -> usize {
        self.state.lock().await.entries(partition).len()
    }

    /// Stores `value` under `key` and persists immediately.
    ///
    /// Entries are content-addressed: if `key` already holds a different
    /// value the existing one is kept.
    pub async fn put(
        &self,
        partition: Partition,
        key: &str,
        value: String,
    ) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        let entries = state.entries_mut(partition);

        if let Some(existing) = entries.get(key) {
            if *existing != value {
                warn!(
                    partition = partition.as_str(),
                    key, "conflicting value for existing cache key, keeping first"
                );
            }
            return Ok(());
        }
        entries.insert(key.to_string(), value);

        let evicted = evict_oldest(entries, self.max_entries);
        if evicted > 0 {
            debug!(partition = partition.as_str(), evicted, "evicted oldest cache entries");
        }

        self.persist(&state).await
    }

    /// Serializes work on one key: at most one holder per (partition, key).
    ///
    /// Callers re-check [`Cache::get`] after acquiring, so a waiter sees the
    /// value the previous holder stored instead of recomputing it.
    pub async fn lock_key(&self, partition: Partition, key: &str) -> KeyGuard<'_> {
        let id = (partition, key.to_string());
        let lock = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.clone())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;
        KeyGuard {
            cache: self,
            id,
            _guard: guard,
        }
    }

    async fn persist(&self, state: &CacheState) -> Result<(), CacheError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| CacheError::Io {
            path: path.clone(),
            source,
        };

        let json = serde_json::to_vec_pretty(state)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let tmp = tmp_path(path);
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
        Ok(())
    }
}

pub struct KeyGuard<'a> {
    cache: &'a Cache,
    id: (Partition, String),
    _guard: OwnedMutexGuard<()>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self
            .cache
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // The map and our own guard hold one reference each; anything more is a waiter.
        if in_flight
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) <= 2)
        {
            in_flight.remove(&self.id);
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Hex SHA-256 over the concatenation of `parts`.
pub fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
