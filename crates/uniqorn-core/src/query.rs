// Read side: bucket lookups and rarest-bucket listings against persisted
// tables, served through the table cache.

use crate::aggregate::{AggregateTable, Scope};
use crate::bucket::BucketShape;
use crate::cache::TableCache;
use crate::game::GameStatline;
use crate::key;
use crate::store::StoreError;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Buckets at or below this count are listed by [`QueryService::rarest`].
pub const RARE_MAX_COUNT: u32 = 5;
/// Sample games shown per rare bucket.
pub const RARE_SAMPLE_LIMIT: usize = 3;

#[derive(Debug, Error)]
pub enum QueryError {
    /// No usable table for the scope. Never reported as a zero count.
    #[error("{scope} table unavailable: {source}")]
    Unavailable { scope: Scope, source: StoreError },
}

/// Result of a bucket lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketLookup {
    pub scope: Scope,
    pub shape: BucketShape,
    pub key: String,
    pub description: String,
    pub count: u32,
    pub samples: Vec<GameStatline>,
}

pub struct QueryService {
    cache: Arc<TableCache>,
}

impl QueryService {
    pub fn new(cache: Arc<TableCache>) -> Self {
        Self { cache }
    }

    async fn table(&self, scope: Scope) -> Result<Arc<AggregateTable>, QueryError> {
        self.cache.get(scope).await.map_err(|source| {
            warn!("{} table unavailable: {}", scope, source);
            QueryError::Unavailable { scope, source }
        })
    }

    /// Count and samples for the bucket at `indices`. Out-of-range indices
    /// are clamped; an empty bucket is a zero-count result.
    pub async fn lookup(&self, indices: [i64; 5], scope: Scope) -> Result<BucketLookup, QueryError> {
        let table = self.table(scope).await?;
        let shape = BucketShape::clamped(indices);
        let agg = table.get(&shape);
        Ok(BucketLookup {
            scope,
            shape,
            key: key::encode(&shape),
            description: shape.describe(),
            count: agg.count,
            samples: agg.samples.clone(),
        })
    }

    /// Occupied buckets with count <= 5, rarest first (ties by key), each
    /// with up to three samples.
    pub async fn rarest(&self, scope: Scope, limit: usize) -> Result<Vec<BucketLookup>, QueryError> {
        let table = self.table(scope).await?;
        let mut rare: Vec<BucketLookup> = table
            .occupied()
            .filter(|(_, agg)| agg.count <= RARE_MAX_COUNT)
            .map(|(shape, agg)| BucketLookup {
                scope,
                shape,
                key: key::encode(&shape),
                description: shape.describe(),
                count: agg.count,
                samples: agg.samples.iter().take(RARE_SAMPLE_LIMIT).cloned().collect(),
            })
            .collect();
        rare.sort_by(|a, b| a.count.cmp(&b.count).then_with(|| a.key.cmp(&b.key)));
        rare.truncate(limit);
        Ok(rare)
    }
}
