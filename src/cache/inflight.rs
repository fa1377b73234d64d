//! In-flight request coalescing.
//!
//! Concurrent calls for the same key share a single underlying future:
//! the first caller starts it, later callers await its output. The entry
//! is dropped as soon as the shared future resolves, so a call made after
//! completion starts a new operation.
//!
//! The map only holds weak handles. When every caller has gone away before
//! completion the operation is dropped with them, and the next caller
//! starts over.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;

use futures::future::{BoxFuture, FutureExt, WeakShared};
use tokio::sync::Mutex;
use tracing::debug;

pub struct InFlight<K, V>
where
    V: Clone,
{
    pending: Mutex<HashMap<K, WeakShared<BoxFuture<'static, V>>>>,
}

impl<K, V> Default for InFlight<K, V>
where
    V: Clone,
{
    fn default() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash + Clone + Display,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `start()` for `key` unless an equivalent call is already pending,
    /// in which case join it.
    pub async fn run<F>(&self, key: K, start: F) -> V
    where
        F: FnOnce() -> BoxFuture<'static, V>,
    {
        let shared = {
            let mut pending = self.pending.lock().await;
            match pending.get(&key).and_then(|weak| weak.upgrade()) {
                Some(existing) => {
                    debug!("Joining in-flight operation for {}", key);
                    existing
                }
                None => {
                    // Sweep operations abandoned by all of their callers.
                    pending.retain(|_, weak| weak.upgrade().is_some());
                    let fut = start().shared();
                    if let Some(weak) = fut.downgrade() {
                        pending.insert(key.clone(), weak);
                    }
                    fut
                }
            }
        };

        let value = shared.clone().await;

        // Any participant may clear the entry; ptr_eq guards against
        // removing a newer operation started under the same key.
        let mut pending = self.pending.lock().await;
        let finished = match pending.get(&key).and_then(|weak| weak.upgrade()) {
            Some(current) => current.ptr_eq(&shared),
            None => true,
        };
        if finished {
            pending.remove(&key);
        }

        value
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }
}
