//! In-process key-value store
//!
//! The single source of truth for every service: price-indexed sorted
//! sets for the books, string hashes for orders and accounts, append-only
//! lists for transaction and trade logs, and pub/sub channels for the
//! event bus. The surface mirrors the ordered-set/hash/list/channel
//! operations an external store would provide, so the backend can be
//! swapped without touching callers.
//!
//! Atomicity: `with_hash` runs a closure under the hash entry's lock,
//! which is sufficient to express "decrement remaining by Q iff
//! remaining ≥ Q" as one logical step. Cross-key invariants are the
//! callers' responsibility (the book and engine hold per-symbol locks).

pub mod pubsub;
pub mod score;
pub mod snapshot;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use thiserror::Error;
use types::errors::OesError;

pub use score::Score;
pub use snapshot::{SnapshotError, StoreSnapshot};

/// Store-level failure
///
/// The in-memory backend never produces `Unavailable`; the variant exists
/// so callers handle the outage path an external backend would have.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for OesError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(detail) => OesError::Unavailable(detail),
        }
    }
}

/// One member of a sorted set with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ZEntry {
    pub member: String,
    pub score: Score,
}

#[derive(Debug, Default)]
pub(crate) struct ZSet {
    pub(crate) ordered: BTreeMap<Score, String>,
    pub(crate) index: HashMap<String, Score>,
}

/// In-process store instance
///
/// Cheap to construct; tests build independent instances. All maps are
/// sharded concurrent maps, so reads never block unrelated writers.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub(crate) hashes: DashMap<String, HashMap<String, String>>,
    pub(crate) lists: DashMap<String, VecDeque<String>>,
    pub(crate) zsets: DashMap<String, ZSet>,
    channels: pubsub::ChannelRegistry,
    pub(crate) sequence: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next monotonic insertion sequence, used as the score tiebreaker.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    // ── Sorted sets ─────────────────────────────────────────────────

    /// Add a member with the given score. Re-adding an existing member
    /// moves it to the new score.
    pub fn zadd(&self, key: &str, score: Score, member: &str) -> Result<(), StoreError> {
        let mut zset = self.zsets.entry(key.to_string()).or_default();
        if let Some(old) = zset.index.insert(member.to_string(), score) {
            zset.ordered.remove(&old);
        }
        zset.ordered.insert(score, member.to_string());
        Ok(())
    }

    /// Remove a member. Returns whether it was present.
    pub fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let removed = if let Some(mut zset) = self.zsets.get_mut(key) {
            match zset.index.remove(member) {
                Some(score) => {
                    zset.ordered.remove(&score);
                    true
                }
                None => false,
            }
        } else {
            false
        };
        if removed {
            self.drop_if_empty_zset(key);
        }
        Ok(removed)
    }

    /// Range scan by rank. Indices follow list-range conventions: `stop`
    /// is inclusive and `-1` means the last element. `rev` scans from the
    /// highest score down.
    pub fn zrange(&self, key: &str, start: isize, stop: isize, rev: bool) -> Result<Vec<ZEntry>, StoreError> {
        let Some(zset) = self.zsets.get(key) else {
            return Ok(Vec::new());
        };
        let len = zset.ordered.len() as isize;
        let norm = |i: isize| -> isize {
            if i < 0 {
                (len + i).max(0)
            } else {
                i
            }
        };
        let start = norm(start);
        let stop = norm(stop).min(len - 1);
        if len == 0 || start > stop {
            return Ok(Vec::new());
        }

        let take = (stop - start + 1) as usize;
        let entries: Vec<ZEntry> = if rev {
            zset.ordered
                .iter()
                .rev()
                .skip(start as usize)
                .take(take)
                .map(|(score, member)| ZEntry { member: member.clone(), score: *score })
                .collect()
        } else {
            zset.ordered
                .iter()
                .skip(start as usize)
                .take(take)
                .map(|(score, member)| ZEntry { member: member.clone(), score: *score })
                .collect()
        };
        Ok(entries)
    }

    /// Number of members in a sorted set.
    pub fn zcard(&self, key: &str) -> Result<usize, StoreError> {
        Ok(self.zsets.get(key).map(|z| z.ordered.len()).unwrap_or(0))
    }

    /// The current score of a member, if present.
    pub fn zscore(&self, key: &str, member: &str) -> Result<Option<Score>, StoreError> {
        Ok(self
            .zsets
            .get(key)
            .and_then(|z| z.index.get(member).copied()))
    }

    fn drop_if_empty_zset(&self, key: &str) {
        self.zsets.remove_if(key, |_, z| z.ordered.is_empty());
    }

    // ── Hashes ──────────────────────────────────────────────────────

    /// Set multiple fields on a hash, creating it if absent.
    pub fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError> {
        let mut hash = self.hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.clone(), value.clone());
        }
        Ok(())
    }

    pub fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self.hashes.get(key).and_then(|h| h.get(field).cloned()))
    }

    /// Full field map of a hash; empty map when the key is absent.
    pub fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        Ok(self.hashes.get(key).map(|h| h.clone()).unwrap_or_default())
    }

    pub fn hdel(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        Ok(self
            .hashes
            .get_mut(key)
            .map(|mut h| h.remove(field).is_some())
            .unwrap_or(false))
    }

    /// Run a closure over a hash's field map under its entry lock.
    ///
    /// This is the store's atomic primitive: the closure observes and
    /// mutates the hash as one step, with no interleaved writers. The
    /// entry is created empty if absent and removed again if the closure
    /// leaves it empty.
    pub fn with_hash<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, String>) -> T,
    ) -> Result<T, StoreError> {
        let mut entry = self.hashes.entry(key.to_string()).or_default();
        let result = f(&mut entry);
        let empty = entry.is_empty();
        drop(entry);
        if empty {
            self.hashes.remove_if(key, |_, h| h.is_empty());
        }
        Ok(result)
    }

    /// Delete a whole key (hash, list, or sorted set).
    pub fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut removed = self.hashes.remove(key).is_some();
        removed |= self.lists.remove(key).is_some();
        removed |= self.zsets.remove(key).is_some();
        Ok(removed)
    }

    // ── Lists ───────────────────────────────────────────────────────

    /// Push a value to the head of a list (newest first).
    pub fn lpush(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let mut list = self.lists.entry(key.to_string()).or_default();
        list.push_front(value.to_string());
        Ok(list.len())
    }

    /// Read a range from the head. `stop` is inclusive; `-1` means end.
    pub fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError> {
        let Some(list) = self.lists.get(key) else {
            return Ok(Vec::new());
        };
        let len = list.len() as isize;
        let norm = |i: isize| if i < 0 { (len + i).max(0) } else { i };
        let start = norm(start);
        let stop = norm(stop).min(len - 1);
        if len == 0 || start > stop {
            return Ok(Vec::new());
        }
        Ok(list
            .iter()
            .skip(start as usize)
            .take((stop - start + 1) as usize)
            .cloned()
            .collect())
    }

    /// Trim a list to the inclusive range, dropping everything else.
    pub fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError> {
        let kept = self.lrange(key, start, stop)?;
        if let Some(mut list) = self.lists.get_mut(key) {
            *list = kept.into();
        }
        Ok(())
    }

    pub fn llen(&self, key: &str) -> Result<usize, StoreError> {
        Ok(self.lists.get(key).map(|l| l.len()).unwrap_or(0))
    }

    // ── Pub/sub ─────────────────────────────────────────────────────

    /// Publish a payload to a channel. Returns the subscriber count.
    pub fn publish(&self, channel: &str, payload: &str) -> Result<usize, StoreError> {
        Ok(self.channels.publish(channel, payload))
    }

    /// Subscribe to a channel, creating it if needed.
    pub fn subscribe(&self, channel: &str) -> tokio::sync::broadcast::Receiver<String> {
        self.channels.subscribe(channel)
    }

    // ── Administration ──────────────────────────────────────────────

    /// Keys matching a glob pattern (`*` wildcard, prefix/suffix/exact).
    pub fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let matches = |key: &str| glob_match(pattern, key);
        let mut found: Vec<String> = self
            .hashes
            .iter()
            .map(|e| e.key().clone())
            .chain(self.lists.iter().map(|e| e.key().clone()))
            .chain(self.zsets.iter().map(|e| e.key().clone()))
            .filter(|k| matches(k))
            .collect();
        found.sort();
        found.dedup();
        Ok(found)
    }

    /// Delete every key matching the pattern. Returns how many went away.
    pub fn clear(&self, pattern: &str) -> Result<usize, StoreError> {
        let keys = self.keys(pattern)?;
        let mut removed = 0;
        for key in &keys {
            if self.del(key)? {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(pattern, removed, "Cleared store keys");
        }
        Ok(removed)
    }

    /// Round-trip latency of a trivial store operation.
    pub fn ping(&self) -> Result<Duration, StoreError> {
        let started = Instant::now();
        let _ = self.hashes.contains_key("__ping__");
        Ok(started.elapsed())
    }
}

/// Minimal glob matcher: `*` alone, `prefix*`, `*suffix`, or exact.
fn glob_match(pattern: &str, key: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return key.starts_with(prefix);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return key.ends_with(suffix);
    }
    pattern == key
}
