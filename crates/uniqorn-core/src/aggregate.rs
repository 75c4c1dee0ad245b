// Frequency aggregation: bucket shape -> {count, per-player count, samples}.
//
// Tables are rebuilt wholesale from the full game collection on every run.
// Storage is a dense vector indexed by `BucketShape::ordinal`, pre-populated
// with all 8,100 shapes.

use crate::bucket::{BucketShape, BREAKPOINT_VERSION, SHAPE_COUNT};
use crate::game::GameStatline;
use crate::key::{self, KeyError};
use crate::season::{Season, SeasonError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::warn;

/// Maximum number of sample games retained per bucket (first seen wins).
pub const SAMPLE_CAP: usize = 10;

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Which slice of history a table covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Scope {
    AllTime,
    Season(Season),
}

impl Scope {
    pub const ALL_TIME_LABEL: &'static str = "all-time";

    pub fn parse(value: &str) -> Result<Self, SeasonError> {
        if value.trim() == Self::ALL_TIME_LABEL {
            Ok(Scope::AllTime)
        } else {
            Season::parse(value).map(Scope::Season)
        }
    }

    /// Whether a game belongs in a table of this scope.
    pub fn admits(&self, game: &GameStatline) -> bool {
        match self {
            Scope::AllTime => true,
            Scope::Season(season) => game.season == *season,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::AllTime => f.write_str(Self::ALL_TIME_LABEL),
            Scope::Season(season) => write!(f, "{season}"),
        }
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.to_string()
    }
}

impl TryFrom<String> for Scope {
    type Error = SeasonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Scope::parse(&value)
    }
}

// ---------------------------------------------------------------------------
// Bucket aggregate
// ---------------------------------------------------------------------------

/// Everything known about one bucket within one scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketAggregate {
    pub count: u32,
    #[serde(default)]
    pub per_player: BTreeMap<String, u32>,
    #[serde(default)]
    pub samples: Vec<GameStatline>,
}

impl BucketAggregate {
    fn record(&mut self, game: &GameStatline) {
        self.count += 1;
        *self.per_player.entry(game.player()).or_insert(0) += 1;
        if self.samples.len() < SAMPLE_CAP {
            self.samples.push(game.clone());
        }
    }

    /// How many of this bucket's occurrences belong to `player`.
    pub fn player_count(&self, player: &str) -> u32 {
        self.per_player.get(player).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

// ---------------------------------------------------------------------------
// Aggregate table
// ---------------------------------------------------------------------------

/// First and last game dates covered by a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl DateRange {
    fn widen(range: Option<DateRange>, date: NaiveDate) -> DateRange {
        match range {
            None => DateRange {
                first: date,
                last: date,
            },
            Some(r) => DateRange {
                first: r.first.min(date),
                last: r.last.max(date),
            },
        }
    }
}

/// All 8,100 bucket aggregates for one scope. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateTable {
    scope: Scope,
    breakpoint_version: String,
    generated_at: DateTime<Utc>,
    date_range: Option<DateRange>,
    buckets: Vec<BucketAggregate>,
}

impl AggregateTable {
    /// An empty, fully pre-populated table.
    pub fn empty(scope: Scope) -> Self {
        Self {
            scope,
            breakpoint_version: BREAKPOINT_VERSION.to_string(),
            generated_at: Utc::now(),
            date_range: None,
            buckets: vec![BucketAggregate::default(); SHAPE_COUNT],
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn breakpoint_version(&self) -> &str {
        &self.breakpoint_version
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn date_range(&self) -> Option<DateRange> {
        self.date_range
    }

    /// True when the table was built with the breakpoints compiled into this
    /// binary.
    pub fn is_current_version(&self) -> bool {
        self.breakpoint_version == BREAKPOINT_VERSION
    }

    /// Number of entries. Always `SHAPE_COUNT`.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn get(&self, shape: &BucketShape) -> &BucketAggregate {
        &self.buckets[shape.ordinal()]
    }

    /// Every (shape, aggregate) pair in ordinal order, empty buckets included.
    pub fn iter(&self) -> impl Iterator<Item = (BucketShape, &BucketAggregate)> {
        BucketShape::all().zip(self.buckets.iter())
    }

    /// Buckets with at least one game.
    pub fn occupied(&self) -> impl Iterator<Item = (BucketShape, &BucketAggregate)> {
        self.iter().filter(|(_, agg)| !agg.is_empty())
    }

    /// Sum of all bucket counts.
    pub fn total_games(&self) -> u64 {
        self.buckets.iter().map(|agg| agg.count as u64).sum()
    }

    fn record(&mut self, game: &GameStatline) {
        self.buckets[game.shape().ordinal()].record(game);
        self.date_range = Some(DateRange::widen(self.date_range, game.date));
    }

    pub fn summary(&self) -> AggregateSummary {
        let mut summary = AggregateSummary {
            scope: self.scope,
            breakpoint_version: self.breakpoint_version.clone(),
            total_games: 0,
            total_buckets: 0,
            uniqorn_count: 0,
            two_occurrence_count: 0,
            date_range: self.date_range,
            distribution: CountDistribution::default(),
        };
        for (_, agg) in self.occupied() {
            summary.total_games += agg.count as u64;
            summary.total_buckets += 1;
            match agg.count {
                1 => {
                    summary.uniqorn_count += 1;
                    summary.distribution.one += 1;
                }
                2 => {
                    summary.two_occurrence_count += 1;
                    summary.distribution.two += 1;
                }
                3..=5 => summary.distribution.three_to_five += 1,
                6..=10 => summary.distribution.six_to_ten += 1,
                _ => summary.distribution.eleven_plus += 1,
            }
        }
        summary
    }

    // ---- Persisted form ----

    /// Convert to the on-disk layout, keyed by canonical bucket key.
    pub fn to_file(&self) -> AggregateFile {
        AggregateFile {
            breakpoint_version: self.breakpoint_version.clone(),
            scope: self.scope,
            generated_at: self.generated_at,
            date_range: self.date_range,
            buckets: self
                .iter()
                .map(|(shape, agg)| (key::encode(&shape), agg.clone()))
                .collect(),
        }
    }

    /// Rebuild a table from its on-disk layout. Every one of the 8,100 keys
    /// must be present exactly once; a partial table is corrupt, not sparse.
    pub fn from_file(file: AggregateFile) -> Result<Self, TableFormatError> {
        let mut buckets: Vec<Option<BucketAggregate>> = vec![None; SHAPE_COUNT];
        for (raw_key, agg) in file.buckets {
            let shape = key::decode(&raw_key).map_err(|source| TableFormatError::BadKey { source })?;
            let slot = &mut buckets[shape.ordinal()];
            if slot.is_some() {
                return Err(TableFormatError::DuplicateBucket { key: raw_key });
            }
            let samples = agg.samples.len();
            if samples > agg.count as usize || (agg.count > 0 && samples == 0) {
                return Err(TableFormatError::InconsistentSamples {
                    key: raw_key,
                    count: agg.count,
                    samples,
                });
            }
            *slot = Some(agg);
        }
        let found = buckets.iter().filter(|b| b.is_some()).count();
        if found != SHAPE_COUNT {
            return Err(TableFormatError::MissingBuckets {
                expected: SHAPE_COUNT,
                found,
            });
        }
        Ok(Self {
            scope: file.scope,
            breakpoint_version: file.breakpoint_version,
            generated_at: file.generated_at,
            date_range: file.date_range,
            buckets: buckets.into_iter().flatten().collect(),
        })
    }
}

/// On-disk layout of an aggregate table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateFile {
    pub breakpoint_version: String,
    pub scope: Scope,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
    pub buckets: BTreeMap<String, BucketAggregate>,
}

#[derive(Debug, Error)]
pub enum TableFormatError {
    #[error("invalid bucket key: {source}")]
    BadKey { source: KeyError },

    #[error("bucket {key} appears more than once")]
    DuplicateBucket { key: String },

    #[error("table has {found} of {expected} buckets")]
    MissingBuckets { expected: usize, found: usize },

    #[error("bucket {key} has count {count} but {samples} samples")]
    InconsistentSamples {
        key: String,
        count: u32,
        samples: usize,
    },
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// How occupied buckets are spread across count ranges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountDistribution {
    #[serde(rename = "1")]
    pub one: usize,
    #[serde(rename = "2")]
    pub two: usize,
    #[serde(rename = "3-5")]
    pub three_to_five: usize,
    #[serde(rename = "6-10")]
    pub six_to_ten: usize,
    #[serde(rename = "11+")]
    pub eleven_plus: usize,
}

/// Headline numbers for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub scope: Scope,
    pub breakpoint_version: String,
    pub total_games: u64,
    /// Occupied buckets.
    pub total_buckets: usize,
    pub uniqorn_count: usize,
    pub two_occurrence_count: usize,
    pub date_range: Option<DateRange>,
    pub distribution: CountDistribution,
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Build the table for `scope` from `games`.
///
/// Every game is counted, duplicates included. For a season scope, games
/// from other seasons belong to another table and are skipped.
pub fn aggregate(games: &[GameStatline], scope: Scope) -> AggregateTable {
    let mut table = AggregateTable::empty(scope);
    let mut foreign = 0usize;
    for game in games {
        if !scope.admits(game) {
            foreign += 1;
            continue;
        }
        table.record(game);
    }
    if foreign > 0 {
        warn!(
            "{} table: skipped {} games from other seasons",
            scope, foreign
        );
    }
    table
}

/// Group games by season, preserving input order within each season.
pub fn partition_by_season(games: &[GameStatline]) -> BTreeMap<Season, Vec<GameStatline>> {
    let mut by_season: BTreeMap<Season, Vec<GameStatline>> = BTreeMap::new();
    for game in games {
        by_season.entry(game.season).or_default().push(game.clone());
    }
    by_season
}

/// One independently built table per season present in `games`.
pub fn aggregate_by_season(games: &[GameStatline]) -> BTreeMap<Season, AggregateTable> {
    partition_by_season(games)
        .into_iter()
        .map(|(season, season_games)| (season, aggregate(&season_games, Scope::Season(season))))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
