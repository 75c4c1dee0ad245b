// Uniqueness scoring: exponential decay over a bucket's occurrence count,
// excluding the player's own games, plus per-season and career indices.

use crate::aggregate::{AggregateTable, Scope};
use crate::bucket::{BucketShape, BREAKPOINT_VERSION};
use crate::game::GameStatline;
use crate::season::Season;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use thiserror::Error;

/// Decay rate of the uniqueness score per effective occurrence.
pub const ALPHA: f64 = 0.10;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("game from {season} scored against the {table} table")]
    ScopeMismatch { season: Season, table: Scope },

    #[error("{player} on {date} is not recorded in bucket {shape} of the {table} table")]
    NotInTable {
        player: String,
        date: NaiveDate,
        shape: BucketShape,
        table: Scope,
    },
}

// ---------------------------------------------------------------------------
// Core formula
// ---------------------------------------------------------------------------

/// Occurrences of a bucket that belong to other players, floored at 1.
pub fn effective_count(total: u32, own: u32) -> u32 {
    total.saturating_sub(own).max(1)
}

/// `exp(-ALPHA * effective_count)`. In `(0, exp(-ALPHA)]` for any
/// effective count >= 1, strictly decreasing.
pub fn uniqueness_score(effective_count: u32) -> f64 {
    (-ALPHA * effective_count as f64).exp()
}

/// The highest attainable score.
pub fn max_score() -> f64 {
    uniqueness_score(1)
}

/// Score for one game, with the inputs that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameScore {
    pub player: String,
    pub season: Season,
    pub date: NaiveDate,
    pub shape: BucketShape,
    pub total_count: u32,
    pub player_count: u32,
    pub effective_count: u32,
    pub score: f64,
}

/// Score `game` against its own season's table.
pub fn score_game(game: &GameStatline, table: &AggregateTable) -> Result<GameScore, ScoreError> {
    if table.scope() != Scope::Season(game.season) {
        return Err(ScoreError::ScopeMismatch {
            season: game.season,
            table: table.scope(),
        });
    }
    let player = game.player();
    let shape = game.shape();
    let agg = table.get(&shape);
    let own = agg.player_count(&player);
    if agg.count == 0 || own == 0 {
        return Err(ScoreError::NotInTable {
            player,
            date: game.date,
            shape,
            table: table.scope(),
        });
    }
    let effective = effective_count(agg.count, own);
    Ok(GameScore {
        player,
        season: game.season,
        date: game.date,
        shape,
        total_count: agg.count,
        player_count: own,
        effective_count: effective,
        score: uniqueness_score(effective),
    })
}

/// Score every game of one season against that season's table.
pub fn score_season(
    games: &[GameStatline],
    table: &AggregateTable,
) -> Result<Vec<GameScore>, ScoreError> {
    games.iter().map(|g| score_game(g, table)).collect()
}

// ---------------------------------------------------------------------------
// Player indices
// ---------------------------------------------------------------------------

/// Mean uniqueness score of one player's games in one season.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSeasonIndex {
    pub player: String,
    pub season: Season,
    pub games: usize,
    pub index: f64,
    /// Whether the season meets the minimum games for leaderboards and
    /// career averaging.
    pub eligible: bool,
}

/// Mean of a player's eligible season indices. Not games-weighted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CareerIndex {
    pub player: String,
    pub seasons: usize,
    pub games: usize,
    pub index: f64,
}

/// Group game scores by player and season and average them. Every row is
/// marked eligible; filtering is applied by [`PlayerIndexTable::build`].
pub fn season_indices(scores: &[GameScore]) -> Vec<PlayerSeasonIndex> {
    let mut sums: BTreeMap<(Season, &str), (f64, usize)> = BTreeMap::new();
    for s in scores {
        let entry = sums.entry((s.season, s.player.as_str())).or_insert((0.0, 0));
        entry.0 += s.score;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|((season, player), (sum, games))| PlayerSeasonIndex {
            player: player.to_string(),
            season,
            games,
            index: sum / games as f64,
            eligible: true,
        })
        .collect()
}

/// Average each player's season indices, ignoring ineligible seasons.
pub fn career_indices(seasons: &[PlayerSeasonIndex]) -> Vec<CareerIndex> {
    let mut sums: BTreeMap<&str, (f64, usize, usize)> = BTreeMap::new();
    for row in seasons.iter().filter(|r| r.eligible) {
        let entry = sums.entry(row.player.as_str()).or_insert((0.0, 0, 0));
        entry.0 += row.index;
        entry.1 += 1;
        entry.2 += row.games;
    }
    sums.into_iter()
        .map(|(player, (sum, n, games))| CareerIndex {
            player: player.to_string(),
            seasons: n,
            games,
            index: sum / n as f64,
        })
        .collect()
}

/// Leaderboard eligibility and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOptions {
    /// Minimum games in a season; 0 disables the filter.
    pub min_games: usize,
    pub career_leaderboard_size: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            min_games: 16,
            career_leaderboard_size: 50,
        }
    }
}

/// Every player-season index plus every player's career index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerIndexTable {
    pub breakpoint_version: String,
    pub generated_at: DateTime<Utc>,
    pub min_games: usize,
    pub career_leaderboard_size: usize,
    /// All player-seasons, by season then index descending.
    pub seasons: Vec<PlayerSeasonIndex>,
    /// Career index for every player with an eligible season, index
    /// descending.
    pub career: Vec<CareerIndex>,
}

fn by_index_then_name(a: (f64, &str), b: (f64, &str)) -> std::cmp::Ordering {
    b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1))
}

impl PlayerIndexTable {
    pub fn build(scores: &[GameScore], options: IndexOptions) -> Self {
        let mut seasons = season_indices(scores);
        for row in &mut seasons {
            row.eligible = row.games >= options.min_games;
        }
        seasons.sort_by(|a, b| {
            a.season
                .cmp(&b.season)
                .then_with(|| by_index_then_name((a.index, &a.player), (b.index, &b.player)))
        });

        let mut career = career_indices(&seasons);
        career.sort_by(|a, b| by_index_then_name((a.index, &a.player), (b.index, &b.player)));

        Self {
            breakpoint_version: BREAKPOINT_VERSION.to_string(),
            generated_at: Utc::now(),
            min_games: options.min_games,
            career_leaderboard_size: options.career_leaderboard_size,
            seasons,
            career,
        }
    }

    /// Eligible rows for one season, best first.
    pub fn season_leaderboard(&self, season: Season) -> Vec<&PlayerSeasonIndex> {
        self.seasons
            .iter()
            .filter(|r| r.season == season && r.eligible)
            .collect()
    }

    /// The top `career_leaderboard_size` careers.
    pub fn career_leaderboard(&self) -> &[CareerIndex] {
        let n = self.career_leaderboard_size.min(self.career.len());
        &self.career[..n]
    }

    pub fn career_for(&self, player: &str) -> Option<&CareerIndex> {
        self.career.iter().find(|c| c.player == player)
    }

    /// Tabular export: one row per player-season, index rounded to 4 places.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        for row in &self.seasons {
            wtr.serialize(CsvRow {
                season: row.season.to_string(),
                player: &row.player,
                games: row.games,
                index: round4(row.index),
                eligible: row.eligible,
            })?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    season: String,
    player: &'a str,
    games: usize,
    index: f64,
    eligible: bool,
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
