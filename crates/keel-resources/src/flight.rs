use std::collections::HashMap;
use std::future::Future;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

/// Single-flight map: at most one in-progress computation per key.
///
/// The first caller for a key inserts a shared future *before* any await
/// point; later callers for the same key attach to that future instead of
/// starting duplicate work. Completed entries stay in the map and act as a
/// memo until [`SingleFlight::remove`] or [`SingleFlight::clear`].
pub struct SingleFlight<V: Clone> {
    inflight: Mutex<HashMap<String, Shared<BoxFuture<'static, V>>>>,
}

impl<V: Clone> Default for SingleFlight<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> SingleFlight<V> {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    pub fn remove(&self, key: &str) {
        self.inflight.lock().remove(key);
    }

    pub fn clear(&self) {
        self.inflight.lock().clear();
    }
}

impl<V: Clone + Send + Sync + 'static> SingleFlight<V> {
    /// Return the handle for `key`, spawning `make()` only if no handle
    /// exists yet. The lock is never held across an await: `make()` runs
    /// synchronously up to its first suspension point inside the shared
    /// future.
    pub fn get_or_spawn<F>(
        &self,
        key: &str,
        make: impl FnOnce() -> F,
    ) -> Shared<BoxFuture<'static, V>>
    where
        F: Future<Output = V> + Send + 'static,
    {
        let mut inflight = self.inflight.lock();
        if let Some(existing) = inflight.get(key) {
            return existing.clone();
        }
        let handle = make().boxed().shared();
        inflight.insert(key.to_string(), handle.clone());
        handle
    }
}
