// Shared LRU response cache. A single parking_lot::Mutex-guarded hash map
// from URL to Arc<CacheEntry>. Arc sharing replaces a hand-rolled
// refcount-and-spin-wait: the index holds one strong reference, a reader
// clones it before releasing the lock, and the entry drops the instant the
// last clone goes out of scope, whether that's the index (eviction) or a
// reader (after the body write).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

// Aggregate byte budget across all resident entries.
pub const MAX_CACHE_SIZE: usize = 1_048_576;
// Largest single response eligible for caching.
pub const MAX_OBJECT_SIZE: usize = 102_400;

// Immutable body + metadata bundle, held jointly by the index and any
// in-flight reader. Only `stamp` is mutated after construction.
pub struct CacheEntry {
    url: Box<str>,
    body: Box<[u8]>,
    stamp: AtomicU64,
}

impl CacheEntry {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn size(&self) -> usize {
        self.body.len()
    }

    fn stamp(&self) -> u64 {
        self.stamp.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("url", &self.url)
            .field("size", &self.body.len())
            .field("stamp", &self.stamp())
            .finish()
    }
}

struct Inner {
    entries: FxHashMap<Box<str>, Arc<CacheEntry>>,
    total_bytes: usize,
    clock: u64,
}

impl Inner {
    // Evicts least-recently-stamped entries until `need` more bytes fit.
    // Ties go to min_by_key's first-encountered entry, so eviction order
    // is deterministic.
    fn evict_until(&mut self, need: usize) {
        while self.total_bytes + need > MAX_CACHE_SIZE {
            let victim = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.stamp())
                .map(|(key, _)| key.clone());

            let Some(key) = victim else {
                // Empty index but budget still exceeded: need itself
                // exceeds MAX_CACHE_SIZE. admit() must refuse before this.
                break;
            };

            if let Some(entry) = self.entries.remove(&key) {
                self.total_bytes -= entry.size();
                debug!(url = %entry.url(), size = entry.size(), "evicted cache entry");
                // entry's Arc clone drops here; destroyed now unless a
                // reader still holds a clone, in which case it's detached.
            }
        }
    }
}

// Byte-budgeted LRU directory mapping URL to entry. Constructed once by
// the caller and shared explicitly via Arc<Cache> with every connection
// task, never a process-wide global.
pub struct Cache {
    inner: Mutex<Inner>,
}

impl Cache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: FxHashMap::default(),
                total_bytes: 0,
                clock: 0,
            }),
        }
    }

    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    // Looks up `url` and, on a hit, writes the entry's body to `sink`. The
    // lock is held only long enough to find the entry, bump its stamp, and
    // clone its Arc; the body write happens after the lock is released, so
    // a slow client can never stall another cache user.
    pub async fn lookup_and_serve<W>(&self, url: &str, sink: &mut W) -> bool
    where
        W: AsyncWrite + Unpin,
    {
        let entry = {
            let mut inner = self.inner.lock();
            inner.clock += 1;
            let clock = inner.clock;
            inner.entries.get(url).map(|entry| {
                entry.stamp.store(clock, Ordering::Relaxed);
                Arc::clone(entry)
            })
        };

        match entry {
            Some(entry) => {
                if let Err(err) = sink.write_all(entry.body()).await {
                    warn!(url, error = %err, "failed writing cached response to client");
                }
                true
            }
            None => false,
        }
        // entry's Arc clone (if any) drops here, releasing the reader's hold.
    }

    // Inserts a new entry for `url`, evicting LRU entries first if needed.
    // Returns false without modifying the index on a duplicate key (checked
    // under the same lock acquisition as the insert) or a bad size.
    pub fn admit(&self, url: &str, body: &[u8]) -> bool {
        if body.is_empty() || body.len() > MAX_OBJECT_SIZE {
            return false;
        }

        let mut inner = self.inner.lock();
        if inner.entries.contains_key(url) {
            return false;
        }

        let need = body.len();
        if inner.total_bytes + need > MAX_CACHE_SIZE {
            inner.evict_until(need);
        }

        inner.clock += 1;
        let entry = Arc::new(CacheEntry {
            url: url.into(),
            body: body.into(),
            stamp: AtomicU64::new(inner.clock),
        });
        inner.total_bytes += need;
        inner.entries.insert(entry.url.clone(), entry);
        true
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}
