//! Bounded in-process caches shared by the request handlers.
//!
//! Both caches in the service (crop biology memo and daily market snapshots) are
//! explicit `moka` caches with an entry cap and an optional time-to-live instead of
//! process-global maps. With de-duplication enabled, concurrent misses for one key
//! run a single initializer and every waiter receives its result.

use std::future::Future;
use std::time::Duration;

use moka::future::Cache;

/// A cached value and whether this call produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Lookup<V> {
    pub value: V,
    pub fresh: bool,
}

#[derive(Clone)]
pub struct BoundedCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    inner: Cache<String, V>,
    max_entries: usize,
}

impl<V> BoundedCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// A cache holding at most `max_entries` values, each expiring after `ttl` if given.
    pub fn new(max_entries: usize, ttl: Option<Duration>) -> Self {
        let max_entries = max_entries.max(1);
        let builder = Cache::builder().max_capacity(max_entries as u64);
        let inner = match ttl {
            Some(ttl) => builder.time_to_live(ttl).build(),
            None => builder.build(),
        };
        Self { inner, max_entries }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        self.inner.get(key).await
    }

    pub async fn insert(&self, key: impl Into<String>, value: V) {
        self.inner.insert(key.into(), value).await;
    }

    /// Returns the cached value for `key` or stores the result of `init`.
    ///
    /// Errors are returned to the caller and never cached. With `dedupe_in_flight`,
    /// concurrent callers for one key share a single `init`; otherwise each miss runs
    /// its own and the last insert wins.
    pub async fn get_or_try_insert<F, E>(
        &self,
        key: &str,
        dedupe_in_flight: bool,
        init: F,
    ) -> Result<Lookup<V>, E>
    where
        F: Future<Output = Result<V, E>>,
        E: Clone + Send + Sync + 'static,
    {
        if dedupe_in_flight {
            let entry = self
                .inner
                .entry_by_ref(key)
                .or_try_insert_with(init)
                .await
                .map_err(|error| (*error).clone())?;
            let fresh = entry.is_fresh();
            return Ok(Lookup { value: entry.into_value(), fresh });
        }

        if let Some(value) = self.get(key).await {
            return Ok(Lookup { value, fresh: false });
        }
        let value = init.await?;
        self.insert(key, value.clone()).await;
        Ok(Lookup { value, fresh: true })
    }

    /// Live entries after pending evictions and expirations have been applied.
    pub async fn len(&self) -> usize {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count() as usize
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }
}
