// Typed box-score model: one player's counting stats for one game.

use crate::bucket::{bucketize, BucketShape};
use crate::season::Season;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The five counting stats that feed the bucketizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StatLine {
    pub points: u32,
    pub assists: u32,
    pub rebounds: u32,
    pub blocks: u32,
    pub steals: u32,
}

impl StatLine {
    pub fn new(points: u32, assists: u32, rebounds: u32, blocks: u32, steals: u32) -> Self {
        Self {
            points,
            assists,
            rebounds,
            blocks,
            steals,
        }
    }

    pub fn shape(&self) -> BucketShape {
        bucketize(
            self.points,
            self.assists,
            self.rebounds,
            self.blocks,
            self.steals,
        )
    }
}

impl fmt::Display for StatLine {
    /// `P/A/R/B/S`, e.g. `27/3/18/6/4`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}",
            self.points, self.assists, self.rebounds, self.blocks, self.steals
        )
    }
}

/// One player's box score for one game. Read-only once ingested.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GameStatline {
    pub first_name: String,
    pub last_name: String,
    pub season: Season,
    pub date: NaiveDate,
    pub stats: StatLine,
    #[serde(default)]
    pub team: String,
    #[serde(default)]
    pub opponent: String,
}

impl GameStatline {
    /// Player identity used as the join key: `"First Last"`, trimmed.
    pub fn player(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    pub fn shape(&self) -> BucketShape {
        self.stats.shape()
    }

    /// Identity of this game for transition tracking: player, date and
    /// bucket shape.
    pub fn identity(&self) -> GameIdentity {
        GameIdentity {
            player: self.player(),
            date: self.date,
            shape: self.shape(),
        }
    }
}

/// Identifies one game performance across runs, independent of display
/// labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GameIdentity {
    pub player: String,
    pub date: NaiveDate,
    pub shape: BucketShape,
}

impl fmt::Display for GameIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.player, self.date, self.shape)
    }
}
