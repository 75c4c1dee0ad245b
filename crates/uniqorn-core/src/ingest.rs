// Ingestion boundary: historical box-score CSV -> typed `GameStatline`s.
//
// Rows arrive loosely typed. Every stat is coerced here, once, so nothing
// downstream re-parses raw rows.

use crate::game::{GameStatline, StatLine};
use crate::season::Season;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Filters applied while loading.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Rows dated before this are dropped.
    pub min_date: Option<NaiveDate>,
    /// Drop repeated (player, date, team, stats) rows, keeping the first.
    pub dedupe: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            min_date: NaiveDate::from_ymd_opt(1973, 10, 1),
            dedupe: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Raw CSV row (private)
// ---------------------------------------------------------------------------

/// Historical box-score row. Stats are kept as strings so blanks, `NaN` and
/// other junk can be coerced instead of failing the row. Unknown columns are
/// ignored.
#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct RawBoxScore {
    #[serde(default)]
    firstName: Option<String>,
    #[serde(default)]
    lastName: Option<String>,
    #[serde(default, alias = "gameDate")]
    gameDateTimeEst: Option<String>,
    #[serde(default)]
    season: Option<String>,
    #[serde(default)]
    points: Option<String>,
    #[serde(default)]
    assists: Option<String>,
    #[serde(default)]
    reboundsTotal: Option<String>,
    #[serde(default)]
    rebounds: Option<String>,
    #[serde(default)]
    blocks: Option<String>,
    #[serde(default)]
    steals: Option<String>,
    #[serde(default)]
    playerteamName: Option<String>,
    #[serde(default)]
    opponentteamName: Option<String>,
}

// ---------------------------------------------------------------------------
// Coercion helpers
// ---------------------------------------------------------------------------

/// Coerce a raw stat cell into a non-negative integer.
///
/// Missing, empty, non-numeric, non-finite and negative values all become 0.
/// Fractional values truncate toward zero.
pub fn coerce_stat(raw: Option<&str>) -> u32 {
    let Some(text) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return 0;
    };
    match text.parse::<f64>() {
        Ok(v) if v.is_finite() && v > 0.0 => v.trunc().min(u32::MAX as f64) as u32,
        _ => 0,
    }
}

/// Parse the date portion of a `gameDateTimeEst` cell
/// (`"2024-01-05 19:30:00"`, `"2024-01-05T19:30:00"` or `"2024-01-05"`).
fn parse_game_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn non_empty(raw: Option<&String>) -> Option<&str> {
    raw.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Convert one raw row. Returns `None` (after logging) for rows that cannot
/// be repaired: no player name, no parseable date, or no season.
fn convert_row(raw: RawBoxScore, options: &IngestOptions) -> Option<GameStatline> {
    let first_name = raw.firstName.as_deref().unwrap_or("").trim().to_string();
    let last_name = raw.lastName.as_deref().unwrap_or("").trim().to_string();
    if first_name.is_empty() && last_name.is_empty() {
        warn!("skipping box-score row with no player name");
        return None;
    }

    let Some(date) = raw.gameDateTimeEst.as_deref().and_then(parse_game_date) else {
        warn!(
            "skipping row for '{} {}': unparseable game date {:?}",
            first_name, last_name, raw.gameDateTimeEst
        );
        return None;
    };

    if options.min_date.is_some_and(|min| date < min) {
        return None;
    }

    let season = match non_empty(raw.season.as_ref()).map(Season::parse) {
        Some(Ok(season)) => season,
        Some(Err(e)) => {
            debug!("ignoring season column for '{} {}': {}", first_name, last_name, e);
            Season::for_date(date)?
        }
        None => match Season::for_date(date) {
            Some(season) => season,
            None => {
                debug!(
                    "dropping '{} {}' on {}: outside every regular season",
                    first_name, last_name, date
                );
                return None;
            }
        },
    };

    let rebounds = non_empty(raw.reboundsTotal.as_ref()).or(non_empty(raw.rebounds.as_ref()));

    Some(GameStatline {
        first_name,
        last_name,
        season,
        date,
        stats: StatLine::new(
            coerce_stat(raw.points.as_deref()),
            coerce_stat(raw.assists.as_deref()),
            coerce_stat(rebounds),
            coerce_stat(raw.blocks.as_deref()),
            coerce_stat(raw.steals.as_deref()),
        ),
        team: raw.playerteamName.unwrap_or_default().trim().to_string(),
        opponent: raw.opponentteamName.unwrap_or_default().trim().to_string(),
    })
}

/// Remove repeated rows keyed on player, date, team and the five stats.
/// The first occurrence wins.
pub fn dedupe_games(games: Vec<GameStatline>) -> Vec<GameStatline> {
    let before = games.len();
    let mut seen = HashSet::with_capacity(before);
    let kept: Vec<GameStatline> = games
        .into_iter()
        .filter(|g| seen.insert((g.player(), g.date, g.team.clone(), g.stats)))
        .collect();
    if kept.len() < before {
        info!(
            "deduplication: {} -> {} rows (removed {} duplicates)",
            before,
            kept.len(),
            before - kept.len()
        );
    }
    kept
}

// ---------------------------------------------------------------------------
// Loaders
// ---------------------------------------------------------------------------

fn load_games_from_reader<R: Read>(
    rdr: R,
    options: &IngestOptions,
) -> Result<Vec<GameStatline>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(rdr);
    // An unreadable header means the whole file is unusable.
    reader.headers()?;
    let mut games = Vec::new();
    for result in reader.deserialize::<RawBoxScore>() {
        match result {
            Ok(raw) => {
                if let Some(game) = convert_row(raw, options) {
                    games.push(game);
                }
            }
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => return Err(e),
            Err(e) => {
                warn!("skipping malformed box-score row: {}", e);
            }
        }
    }
    if options.dedupe {
        games = dedupe_games(games);
    }
    Ok(games)
}

/// Load every regular-season game from a box-score CSV file.
pub fn load_games(path: &Path, options: &IngestOptions) -> Result<Vec<GameStatline>, IngestError> {
    let file = std::fs::File::open(path).map_err(|e| IngestError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let games = load_games_from_reader(file, options).map_err(|e| IngestError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;
    info!("loaded {} games from {}", games.len(), path.display());
    Ok(games)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
