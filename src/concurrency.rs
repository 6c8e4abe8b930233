//! Keyed at-most-once initialization
//!
//! Provides per-key once-cells so concurrent tasks asking for the same key
//! share a single computation, while different keys proceed independently.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Map from key to a lazily-initialized, shared value.
///
/// The map lock is only held to look up or insert the cell; the
/// initialization future runs outside of it.
pub struct KeyedOnce<K, V> {
    cells: RwLock<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> KeyedOnce<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
        }
    }

    fn cell(&self, key: &K) -> Arc<OnceCell<V>> {
        {
            let map = self.cells.read();
            if let Some(cell) = map.get(key) {
                return Arc::clone(cell);
            }
        }

        // Double-check after taking the write lock, another task may have inserted it.
        let mut map = self.cells.write();
        Arc::clone(
            map.entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    /// Return the value for `key`, running `init` if no task has produced it yet.
    ///
    /// A failed `init` leaves the cell empty; the next caller retries.
    pub async fn get_or_try_init<F, Fut, E>(&self, key: &K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = self.cell(key);
        cell.get_or_try_init(init).await.cloned()
    }

    /// Value for `key` if it has been initialized.
    pub fn get(&self, key: &K) -> Option<V> {
        self.cells.read().get(key).and_then(|cell| cell.get().cloned())
    }

    /// Number of keys that hold an initialized value.
    pub fn len(&self) -> usize {
        self.cells
            .read()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for KeyedOnce<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
