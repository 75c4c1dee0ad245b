// Library root for the uniqueness-index core: bucketing, aggregation,
// scoring, rarity classification, persistence and lookups.

pub mod aggregate;
pub mod bucket;
pub mod cache;
pub mod game;
pub mod ingest;
pub mod key;
pub mod query;
pub mod rarity;
pub mod score;
pub mod season;
pub mod store;
