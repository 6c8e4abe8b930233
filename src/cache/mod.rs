//! Generation Cache
//!
//! Two generations of string-keyed values: `previous` is the snapshot loaded
//! from the last build and never changes, `current` is filled during this
//! build. A key is *hot* when present in `current` and *cold* when present
//! only in `previous`. Only the current generation is serialized, so any
//! cold entry that is not propagated during a build is dropped by the next
//! snapshot.

pub mod persistent;

use crate::error::CacheError;
use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

pub use persistent::PersistentCache;

type PendingValue<V> = Shared<BoxFuture<'static, Result<V, CacheError>>>;

enum Slot<V> {
    Ready(V),
    Pending(PendingValue<V>),
}

/// Persisted form of a cache: the configuration identity plus the current generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot<V> {
    pub hash: String,
    pub data: BTreeMap<String, V>,
}

enum Plan<V> {
    Hot(V),
    Wait(PendingValue<V>),
    Cold(V),
    Produce(PendingValue<V>, oneshot::Sender<Result<V, CacheError>>),
}

/// Two-generation key/value cache with at-most-once production per key.
pub struct Cache<V> {
    hash: String,
    previous: HashMap<String, V>,
    current: Mutex<HashMap<String, Slot<V>>>,
}

impl<V> Cache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Empty cache for the given configuration identity.
    pub fn new(hash: impl Into<String>) -> Self {
        Self::with_previous(hash, HashMap::new())
    }

    /// Cache whose cold generation is `previous`.
    pub fn with_previous(hash: impl Into<String>, previous: HashMap<String, V>) -> Self {
        Cache {
            hash: hash.into(),
            previous,
            current: Mutex::new(HashMap::new()),
        }
    }

    /// Configuration identity written with every snapshot.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Present in the previous generation.
    pub fn had(&self, key: &str) -> bool {
        self.previous.contains_key(key)
    }

    /// Present in the current generation, including in-flight productions.
    pub fn has(&self, key: &str) -> bool {
        self.current.lock().contains_key(key)
    }

    /// Current value wins over previous. An in-flight production reads as
    /// `None` here while `has` is already `true`; use [`Cache::get_or_wait`]
    /// to observe its value.
    pub fn get(&self, key: &str) -> Option<V> {
        match self.current.lock().get(key) {
            Some(Slot::Ready(value)) => Some(value.clone()),
            Some(Slot::Pending(_)) => None,
            None => self.previous.get(key).cloned(),
        }
    }

    /// Write to the current generation.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.current.lock().insert(key.into(), Slot::Ready(value));
    }

    /// Carry a cold value into the current generation.
    ///
    /// Returns `true` if a value was carried; hot or unknown keys are left alone.
    pub fn propagate(&self, key: &str) -> bool {
        let mut current = self.current.lock();
        if current.contains_key(key) {
            return false;
        }
        match self.previous.get(key) {
            Some(value) => {
                current.insert(key.to_string(), Slot::Ready(value.clone()));
                true
            }
            None => false,
        }
    }

    /// Carry every cold value forward. Returns the number of keys carried.
    pub fn propagate_all(&self) -> usize {
        let mut current = self.current.lock();
        let mut carried = 0;
        for (key, value) in &self.previous {
            if !current.contains_key(key) {
                current.insert(key.clone(), Slot::Ready(value.clone()));
                carried += 1;
            }
        }
        carried
    }

    /// Keys of the current generation, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.current.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.current.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.lock().is_empty()
    }

    /// Memoize without a hit callback.
    pub async fn memoize<P, Fut>(&self, key: &str, producer: P) -> Result<V, CacheError>
    where
        P: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        self.memoize_with(key, producer, || {}).await
    }

    /// Return the value for `key`, running `producer` only if neither generation has it.
    ///
    /// A pending slot is registered in the current generation before the
    /// producer runs, so concurrent callers with the same key wait on it
    /// instead of producing again. The producer itself is called with no lock
    /// held and may read the cache. `otherwise` runs whenever the value was
    /// already hot (finished or in flight) or cold. A failing producer rejects
    /// every waiter on that key and leaves the key unset.
    pub async fn memoize_with<P, Fut, O>(
        &self,
        key: &str,
        producer: P,
        otherwise: O,
    ) -> Result<V, CacheError>
    where
        P: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
        O: FnOnce(),
    {
        let plan = {
            let mut current = self.current.lock();
            match current.get(key) {
                Some(Slot::Ready(value)) => Plan::Hot(value.clone()),
                Some(Slot::Pending(pending)) => Plan::Wait(pending.clone()),
                None => match self.previous.get(key) {
                    Some(value) => {
                        current.insert(key.to_string(), Slot::Ready(value.clone()));
                        Plan::Cold(value.clone())
                    }
                    None => {
                        let (tx, rx) = oneshot::channel();
                        let owned_key = key.to_string();
                        let pending = async move {
                            match rx.await {
                                Ok(result) => result,
                                Err(_) => Err(CacheError::Producer {
                                    key: owned_key,
                                    reason: Arc::new(anyhow::anyhow!("producer was dropped")),
                                }),
                            }
                        }
                        .boxed()
                        .shared();
                        current.insert(key.to_string(), Slot::Pending(pending.clone()));
                        Plan::Produce(pending, tx)
                    }
                },
            }
        };

        match plan {
            Plan::Hot(value) => {
                debug!(key, "Cache hit (hot)");
                otherwise();
                Ok(value)
            }
            Plan::Cold(value) => {
                debug!(key, "Cache hit (cold), propagated");
                otherwise();
                Ok(value)
            }
            Plan::Wait(pending) => {
                debug!(key, "Cache hit (in flight)");
                otherwise();
                let result = pending.clone().await;
                self.settle(key, &pending, &result);
                result
            }
            Plan::Produce(pending, tx) => {
                debug!(key, "Cache miss, producing");
                let result = producer().await.map_err(|e| CacheError::Producer {
                    key: key.to_string(),
                    reason: Arc::new(e),
                });
                // Waiters may all be gone; the slot is settled below either way.
                let _ = tx.send(result.clone());
                self.settle(key, &pending, &result);
                result
            }
        }
    }

    /// Wait for `key` if it is in flight; otherwise behave like [`Cache::get`].
    ///
    /// `None` when neither generation has the key.
    pub async fn get_or_wait(&self, key: &str) -> Option<Result<V, CacheError>> {
        let pending = match self.current.lock().get(key) {
            Some(Slot::Ready(value)) => return Some(Ok(value.clone())),
            Some(Slot::Pending(pending)) => pending.clone(),
            None => return self.previous.get(key).cloned().map(Ok),
        };
        Some(pending.await)
    }

    /// Replace a finished pending slot with its value, or drop it on failure.
    fn settle(&self, key: &str, pending: &PendingValue<V>, result: &Result<V, CacheError>) {
        let mut current = self.current.lock();
        let still_pending = matches!(
            current.get(key),
            Some(Slot::Pending(slot)) if slot.ptr_eq(pending)
        );
        if !still_pending {
            return;
        }
        match result {
            Ok(value) => {
                current.insert(key.to_string(), Slot::Ready(value.clone()));
            }
            Err(e) => {
                warn!(key, error = %e, "Producer failed, key left unset");
                current.remove(key);
            }
        }
    }

    /// Finished values of the current generation, sorted by key.
    pub fn snapshot(&self) -> CacheSnapshot<V> {
        let current = self.current.lock();
        let mut data = BTreeMap::new();
        for (key, slot) in current.iter() {
            match slot {
                Slot::Ready(value) => {
                    data.insert(key.clone(), value.clone());
                }
                Slot::Pending(_) => {
                    debug!(key = %key, "Skipping in-flight entry in snapshot");
                }
            }
        }
        CacheSnapshot {
            hash: self.hash.clone(),
            data,
        }
    }
}

impl<V> Cache<V>
where
    V: Clone + Send + Sync + Serialize + DeserializeOwned + 'static,
{
    /// Serialize the current generation as `{ "hash": ..., "data": { ... } }`.
    pub fn serialize(&self) -> Result<String, CacheError> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    /// Rebuild a cache whose previous generation is the serialized snapshot.
    ///
    /// When `hash` is given and differs from the snapshot's, the snapshot is
    /// discarded and the cache starts cold.
    pub fn unserialize(content: &str, hash: Option<&str>) -> Result<Self, CacheError> {
        let snapshot: CacheSnapshot<V> = serde_json::from_str(content)?;
        match hash {
            Some(expected) if expected != snapshot.hash => {
                debug!(
                    expected,
                    found = %snapshot.hash,
                    "Cache identity changed, discarding previous generation"
                );
                Ok(Cache::new(expected))
            }
            _ => {
                let identity = hash.map(str::to_string).unwrap_or(snapshot.hash);
                Ok(Cache::with_previous(
                    identity,
                    snapshot.data.into_iter().collect(),
                ))
            }
        }
    }
}
