// Rarity classification: Ultimate Uniqorns (all-time count == 1), season
// Uniqorns, and run-over-run transitions of the Ultimate set.

use crate::aggregate::{AggregateTable, BucketAggregate};
use crate::bucket::{BucketShape, BREAKPOINT_VERSION};
use crate::game::{GameIdentity, GameStatline};
use crate::season::Season;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

/// A game that is the only occupant of its bucket within some table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uniqorn {
    pub shape: BucketShape,
    pub description: String,
    pub game: GameStatline,
}

impl Uniqorn {
    fn from_bucket(shape: BucketShape, agg: &BucketAggregate) -> Option<Self> {
        if agg.count != 1 {
            return None;
        }
        agg.samples.first().map(|game| Self {
            shape,
            description: shape.describe(),
            game: game.clone(),
        })
    }

    pub fn identity(&self) -> GameIdentity {
        self.game.identity()
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Every game whose bucket has count exactly 1 in `table`, in bucket order.
///
/// Against the all-time table these are the Ultimate Uniqorns.
pub fn classify(table: &AggregateTable) -> Vec<Uniqorn> {
    table
        .occupied()
        .filter_map(|(shape, agg)| Uniqorn::from_bucket(shape, agg))
        .collect()
}

/// Games that are alone in their bucket within their own season, most
/// recent first.
pub fn season_uniqorns<'a>(tables: impl IntoIterator<Item = &'a AggregateTable>) -> Vec<Uniqorn> {
    let mut all: Vec<Uniqorn> = tables.into_iter().flat_map(classify).collect();
    all.sort_by(|a, b| {
        b.game
            .date
            .cmp(&a.game.date)
            .then_with(|| a.game.player().cmp(&b.game.player()))
    });
    all
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// What the current run was compared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Baseline {
    /// No previous all-time table; every current Ultimate is new.
    None,
    /// The previous table used other breakpoints; nothing was compared.
    VersionMismatch,
    /// Compared against the previous run's table.
    Previous,
}

/// One game entering or leaving the Ultimate set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub identity: GameIdentity,
    pub game: GameStatline,
    pub previous_count: u32,
    pub current_count: u32,
}

impl Transition {
    fn new(game: &GameStatline, previous_count: u32, current_count: u32) -> Self {
        Self {
            identity: game.identity(),
            game: game.clone(),
            previous_count,
            current_count,
        }
    }
}

/// A bucket whose count went down between runs. Not a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountDecrease {
    pub shape: BucketShape,
    pub previous_count: u32,
    pub current_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionLog {
    pub new: Vec<Transition>,
    pub broken: Vec<Transition>,
    pub decreased: Vec<CountDecrease>,
}

/// Compare two all-time tables.
///
/// - new: count is 1 now and was not 1 before, including a drop from a
///   higher count (recorded with the current occupant)
/// - broken: count was 1 and is not 1 now, including a drop to 0 (recorded
///   with the previous occupant)
/// - a count-1 bucket whose occupant changed identity is both
/// - every bucket whose count decreased is also listed in `decreased`
pub fn transitions(
    previous: Option<&AggregateTable>,
    current: &AggregateTable,
) -> (Baseline, TransitionLog) {
    let mut log = TransitionLog::default();

    let Some(previous) = previous else {
        log.new = current
            .occupied()
            .filter(|(_, agg)| agg.count == 1)
            .filter_map(|(_, agg)| agg.samples.first())
            .map(|game| Transition::new(game, 0, 1))
            .collect();
        return (Baseline::None, log);
    };

    if previous.breakpoint_version() != current.breakpoint_version() {
        warn!(
            "previous table uses breakpoints {} but current uses {}; skipping transitions",
            previous.breakpoint_version(),
            current.breakpoint_version()
        );
        return (Baseline::VersionMismatch, log);
    }

    for ((shape, prev), (_, cur)) in previous.iter().zip(current.iter()) {
        let (p, c) = (prev.count, cur.count);
        if c < p {
            warn!("bucket {} count decreased from {} to {}", shape, p, c);
            log.decreased.push(CountDecrease {
                shape,
                previous_count: p,
                current_count: c,
            });
        }
        let prev_occupant = prev.samples.first().filter(|_| p == 1);
        let cur_occupant = cur.samples.first().filter(|_| c == 1);
        match (prev_occupant, cur_occupant) {
            (None, Some(now)) => log.new.push(Transition::new(now, p, c)),
            (Some(before), None) => log.broken.push(Transition::new(before, p, c)),
            (Some(before), Some(now)) if before.identity() != now.identity() => {
                log.broken.push(Transition::new(before, p, c));
                log.new.push(Transition::new(now, p, c));
            }
            _ => {}
        }
    }

    info!(
        "transitions: {} new, {} broken, {} decreased",
        log.new.len(),
        log.broken.len(),
        log.decreased.len()
    );
    (Baseline::Previous, log)
}

// ---------------------------------------------------------------------------
// Leaderboard and log artifact
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player: String,
    pub count: usize,
}

/// Ultimate Uniqorn counts per player, descending, ties by name.
pub fn ultimate_leaderboard(ultimates: &[Uniqorn]) -> Vec<LeaderboardEntry> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for u in ultimates {
        *counts.entry(u.game.player()).or_insert(0) += 1;
    }
    let mut board: Vec<LeaderboardEntry> = counts
        .into_iter()
        .map(|(player, count)| LeaderboardEntry { player, count })
        .collect();
    board.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.player.cmp(&b.player)));
    board
}

/// Persisted Ultimate Uniqorn set plus transition log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UltimateLog {
    pub breakpoint_version: String,
    pub generated_at: DateTime<Utc>,
    pub baseline: Baseline,
    pub ultimates: Vec<Uniqorn>,
    pub transitions: TransitionLog,
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Season Uniqorns keyed by season, most recent game first.
    #[serde(default)]
    pub season_uniqorns: BTreeMap<Season, Vec<Uniqorn>>,
}

impl UltimateLog {
    pub fn build(
        current: &AggregateTable,
        previous: Option<&AggregateTable>,
        season_tables: &BTreeMap<Season, AggregateTable>,
    ) -> Self {
        let ultimates = classify(current);
        let (baseline, transitions) = transitions(previous, current);
        let leaderboard = ultimate_leaderboard(&ultimates);
        let season_uniqorns = season_tables
            .iter()
            .map(|(season, table)| (*season, season_uniqorns([table])))
            .collect();
        Self {
            breakpoint_version: BREAKPOINT_VERSION.to_string(),
            generated_at: Utc::now(),
            baseline,
            ultimates,
            transitions,
            leaderboard,
            season_uniqorns,
        }
    }

    pub fn contains(&self, identity: &GameIdentity) -> bool {
        self.ultimates.iter().any(|u| &u.identity() == identity)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
