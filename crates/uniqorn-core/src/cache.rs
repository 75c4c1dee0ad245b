// TTL cache of loaded aggregate tables.
//
// Entries are whole tables. A stale or missing entry is reloaded from the
// store in one piece and swapped in; failed loads are not cached.

use crate::aggregate::{AggregateTable, Scope};
use crate::store::{ensure_current, ArtifactStore, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Default entry lifetime: five minutes.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CachedTable {
    table: Arc<AggregateTable>,
    loaded_at: Instant,
}

pub struct TableCache {
    store: Arc<dyn ArtifactStore>,
    ttl: Duration,
    entries: RwLock<HashMap<Scope, CachedTable>>,
}

impl TableCache {
    pub fn new(store: Arc<dyn ArtifactStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The table for `scope`, loading it on a miss or after expiry.
    ///
    /// Tables built with other breakpoints are refused.
    pub async fn get(&self, scope: Scope) -> Result<Arc<AggregateTable>, StoreError> {
        {
            let entries = self.entries.read().await;
            if let Some(cached) = entries.get(&scope) {
                if cached.loaded_at.elapsed() < self.ttl {
                    debug!("table cache hit for {}", scope);
                    return Ok(Arc::clone(&cached.table));
                }
            }
        }

        debug!("table cache miss for {}", scope);
        let table = Arc::new(ensure_current(self.store.load_table(scope).await?)?);
        self.entries.write().await.insert(
            scope,
            CachedTable {
                table: Arc::clone(&table),
                loaded_at: Instant::now(),
            },
        );
        Ok(table)
    }

    pub async fn invalidate(&self, scope: Scope) {
        self.entries.write().await.remove(&scope);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
