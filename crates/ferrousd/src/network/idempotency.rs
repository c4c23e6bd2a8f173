//! Idempotency store for replaying repeated command deliveries
//!
//! A client may resend a command with the same `Idempotency-Key` header
//! (flaky Wi-Fi, double taps). The first delivery runs; later deliveries
//! inside the TTL get the first delivery's stored response.
//!
//! A fresh key is held by a [`Reservation`]. If the request that owns it is
//! dropped before completing (client disconnect, handler cancelled), the
//! reservation releases the key so a retry can run.

use ferrous_shared::CommandResult;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Response recorded for a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredOutcome {
    pub status: u16,
    pub result: CommandResult,
}

#[derive(Debug, Clone)]
enum EntryState {
    /// Owned by the reservation carrying this token
    InFlight(u64),
    Done(StoredOutcome),
}

#[derive(Debug, Clone)]
struct IdempotencyEntry {
    state: EntryState,
    inserted_at: Instant,
}

/// What to do with a delivery
#[derive(Debug)]
pub enum Lookup {
    /// First time this key is seen; dispatch and `complete` the reservation
    Fresh(Reservation),
    /// Same key is still being dispatched
    InFlight,
    /// Same key already finished; answer with this
    Replay(StoredOutcome),
}

/// LRU-based idempotency store with TTL
#[derive(Clone)]
pub struct IdempotencyStore {
    cache: Arc<Mutex<LruCache<String, IdempotencyEntry>>>,
    next_token: Arc<AtomicU64>,
    ttl: Duration,
}

impl IdempotencyStore {
    /// Create new idempotency store
    ///
    /// * `capacity` - Maximum number of keys to track
    /// * `ttl` - How long a key is remembered
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
            next_token: Arc::new(AtomicU64::new(1)),
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, IdempotencyEntry>> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Look a key up, reserving it when it is new or expired
    pub fn begin(&self, key: &str) -> Lookup {
        let mut cache = self.lock();
        let now = Instant::now();

        if let Some(entry) = cache.get(key) {
            if now.duration_since(entry.inserted_at) < self.ttl {
                return match &entry.state {
                    EntryState::InFlight(_) => Lookup::InFlight,
                    EntryState::Done(outcome) => Lookup::Replay(outcome.clone()),
                };
            }
            cache.pop(key);
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        cache.put(
            key.to_string(),
            IdempotencyEntry {
                state: EntryState::InFlight(token),
                inserted_at: now,
            },
        );
        Lookup::Fresh(Reservation {
            store: self.clone(),
            key: key.to_string(),
            token,
            completed: false,
        })
    }

    /// Prune expired entries (called periodically)
    pub fn prune_expired(&self) {
        let mut cache = self.lock();
        let now = Instant::now();

        let expired_keys: Vec<String> = cache
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.inserted_at) >= self.ttl)
            .map(|(key, _)| key.clone())
            .collect();

        for key in expired_keys {
            cache.pop(&key);
        }
    }

    /// Get current cache size
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop `key` only while it is still the in-flight entry for `token`.
    fn release(&self, key: &str, token: u64) {
        let mut cache = self.lock();
        let owned = matches!(
            cache.peek(key),
            Some(IdempotencyEntry { state: EntryState::InFlight(t), .. }) if *t == token
        );
        if owned {
            cache.pop(key);
        }
    }
}

impl Default for IdempotencyStore {
    fn default() -> Self {
        Self::new(256, Duration::from_secs(60))
    }
}

/// Claim on a fresh key until its response is recorded
pub struct Reservation {
    store: IdempotencyStore,
    key: String,
    token: u64,
    completed: bool,
}

impl Reservation {
    /// Record the response so later deliveries replay it
    pub fn complete(mut self, outcome: StoredOutcome) {
        let mut cache = self.store.lock();
        let owned = matches!(
            cache.peek(&self.key),
            Some(IdempotencyEntry { state: EntryState::InFlight(t), .. }) if *t == self.token
        );
        // An expired reservation may have been replaced by a newer delivery.
        if owned {
            cache.put(
                self.key.clone(),
                IdempotencyEntry {
                    state: EntryState::Done(outcome),
                    inserted_at: Instant::now(),
                },
            );
        }
        drop(cache);
        self.completed = true;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.completed {
            self.store.release(&self.key, self.token);
        }
    }
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("key", &self.key)
            .field("completed", &self.completed)
            .finish()
    }
}
