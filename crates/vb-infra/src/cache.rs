use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::Instant;
use vb_core::Result;

/// Catalogs change on the order of weeks.
pub const CATALOG_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct Cached<T> {
    items: Arc<Vec<T>>,
    fetched_at: Instant,
}

/// Time-bounded cache of vendor catalogs, keyed by catalog name.
///
/// Two callers missing the same key at once may both run the loader; the last
/// one to finish wins. Failed loads are never stored.
pub struct CatalogCache<T> {
    entries: RwLock<HashMap<String, Cached<T>>>,
}

impl<T> Default for CatalogCache<T> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Send + Sync> CatalogCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_load<F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<Arc<Vec<T>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        if let Some(items) = self.fresh(key, ttl) {
            return Ok(items);
        }

        let items = Arc::new(loader().await?);
        self.entries.write().insert(
            key.to_string(),
            Cached {
                items: items.clone(),
                fetched_at: Instant::now(),
            },
        );
        tracing::debug!(catalog = key, entries = items.len(), "catalog refreshed");

        Ok(items)
    }

    fn fresh(&self, key: &str, ttl: Duration) -> Option<Arc<Vec<T>>> {
        let entries = self.entries.read();
        entries
            .get(key)
            .filter(|cached| cached.fetched_at.elapsed() < ttl)
            .map(|cached| cached.items.clone())
    }
}
