// Bucketizer: fixed breakpoint tables that map box-score counting stats to
// discrete bucket indices.
//
// This is the only copy of the breakpoints in the workspace. Aggregation,
// scoring, descriptions and the query layer all go through it.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Breakpoint tables
// ---------------------------------------------------------------------------

/// Version tag of the breakpoint tables below. Every persisted artifact is
/// stamped with it; bump it whenever any boundary changes.
pub const BREAKPOINT_VERSION: &str = "pts9-ast6-reb6-blk5-stl5.v1";

// Inclusive upper bounds of every bin except the last, which is unbounded.
const POINTS_UPPER: [u32; 8] = [5, 10, 15, 20, 25, 30, 40, 50];
const ASSISTS_UPPER: [u32; 5] = [2, 5, 8, 12, 20];
const REBOUNDS_UPPER: [u32; 5] = [2, 5, 10, 15, 20];
const BLOCKS_UPPER: [u32; 4] = [1, 3, 5, 7];
const STEALS_UPPER: [u32; 4] = [1, 3, 5, 7];

/// Number of distinct bucket shapes: 9 × 6 × 6 × 5 × 5.
pub const SHAPE_COUNT: usize = (POINTS_UPPER.len() + 1)
    * (ASSISTS_UPPER.len() + 1)
    * (REBOUNDS_UPPER.len() + 1)
    * (BLOCKS_UPPER.len() + 1)
    * (STEALS_UPPER.len() + 1);

// ---------------------------------------------------------------------------
// Stat dimension
// ---------------------------------------------------------------------------

/// One of the five counting stats that make up a bucket shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stat {
    Points,
    Assists,
    Rebounds,
    Blocks,
    Steals,
}

impl Stat {
    /// All dimensions in bucket-key order.
    pub const ALL: [Stat; 5] = [
        Stat::Points,
        Stat::Assists,
        Stat::Rebounds,
        Stat::Blocks,
        Stat::Steals,
    ];

    fn upper_bounds(self) -> &'static [u32] {
        match self {
            Stat::Points => &POINTS_UPPER,
            Stat::Assists => &ASSISTS_UPPER,
            Stat::Rebounds => &REBOUNDS_UPPER,
            Stat::Blocks => &BLOCKS_UPPER,
            Stat::Steals => &STEALS_UPPER,
        }
    }

    /// Number of bins for this stat (the last one is the overflow bin).
    pub fn bin_count(self) -> u8 {
        (self.upper_bounds().len() + 1) as u8
    }

    /// Index of the highest (overflow) bin.
    pub fn max_bin(self) -> u8 {
        self.bin_count() - 1
    }

    /// Bin index for a raw stat value. Total: values past the last bound land
    /// in the overflow bin.
    pub fn bin_for(self, value: u32) -> u8 {
        self.upper_bounds()
            .iter()
            .take_while(|&&upper| value > upper)
            .count() as u8
    }

    /// Clamp an arbitrary index into `0..=max_bin`.
    pub fn clamp_bin(self, index: i64) -> u8 {
        index.clamp(0, self.max_bin() as i64) as u8
    }

    /// Human-readable range for a bin, e.g. `"21-25"` or `"51+"`.
    /// Out-of-range bins are clamped first.
    pub fn range_label(self, bin: u8) -> String {
        let bounds = self.upper_bounds();
        let bin = bin.min(self.max_bin()) as usize;
        let lower = if bin == 0 { 0 } else { bounds[bin - 1] + 1 };
        match bounds.get(bin) {
            Some(upper) => format!("{lower}-{upper}"),
            None => format!("{lower}+"),
        }
    }

    pub fn abbreviation(self) -> &'static str {
        match self {
            Stat::Points => "PTS",
            Stat::Assists => "AST",
            Stat::Rebounds => "REB",
            Stat::Blocks => "BLK",
            Stat::Steals => "STL",
        }
    }
}

// ---------------------------------------------------------------------------
// Bucket shape
// ---------------------------------------------------------------------------

/// The 5-tuple of bucket indices for one statline:
/// `(points, assists, rebounds, blocks, steals)`.
///
/// Always within the valid index space; construct it with [`bucketize`],
/// [`BucketShape::new`] or [`BucketShape::clamped`]. Serialized as its
/// canonical key string (see `key.rs`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct BucketShape {
    bins: [u8; 5],
}

impl BucketShape {
    /// Build a shape from explicit indices. Returns `None` if any index is
    /// outside its dimension's range.
    pub fn new(points: u8, assists: u8, rebounds: u8, blocks: u8, steals: u8) -> Option<Self> {
        let bins = [points, assists, rebounds, blocks, steals];
        let valid = Stat::ALL
            .iter()
            .zip(bins.iter())
            .all(|(stat, &bin)| bin <= stat.max_bin());
        valid.then_some(Self { bins })
    }

    /// Build a shape from arbitrary indices, clamping each one to the nearest
    /// valid bin. Used wherever callers may hand us indices from outside the
    /// 8,100-key space.
    pub fn clamped(indices: [i64; 5]) -> Self {
        let mut bins = [0u8; 5];
        for (slot, (stat, index)) in bins.iter_mut().zip(Stat::ALL.iter().zip(indices)) {
            *slot = stat.clamp_bin(index);
        }
        Self { bins }
    }

    pub fn points(&self) -> u8 {
        self.bins[0]
    }

    pub fn assists(&self) -> u8 {
        self.bins[1]
    }

    pub fn rebounds(&self) -> u8 {
        self.bins[2]
    }

    pub fn blocks(&self) -> u8 {
        self.bins[3]
    }

    pub fn steals(&self) -> u8 {
        self.bins[4]
    }

    /// Bin index for one dimension.
    pub fn bin(&self, stat: Stat) -> u8 {
        match stat {
            Stat::Points => self.bins[0],
            Stat::Assists => self.bins[1],
            Stat::Rebounds => self.bins[2],
            Stat::Blocks => self.bins[3],
            Stat::Steals => self.bins[4],
        }
    }

    /// All five indices in key order.
    pub fn bins(&self) -> [u8; 5] {
        self.bins
    }

    /// Dense row-major position in `0..SHAPE_COUNT`.
    pub fn ordinal(&self) -> usize {
        Stat::ALL
            .iter()
            .zip(self.bins.iter())
            .fold(0usize, |acc, (stat, &bin)| {
                acc * stat.bin_count() as usize + bin as usize
            })
    }

    /// Inverse of [`BucketShape::ordinal`].
    pub fn from_ordinal(ordinal: usize) -> Option<Self> {
        if ordinal >= SHAPE_COUNT {
            return None;
        }
        let mut rest = ordinal;
        let mut bins = [0u8; 5];
        for (slot, stat) in bins.iter_mut().zip(Stat::ALL.iter()).rev() {
            let n = stat.bin_count() as usize;
            *slot = (rest % n) as u8;
            rest /= n;
        }
        Some(Self { bins })
    }

    /// Every valid shape in ordinal order.
    pub fn all() -> impl Iterator<Item = BucketShape> {
        (0..SHAPE_COUNT).filter_map(BucketShape::from_ordinal)
    }

    /// Readable description, e.g.
    /// `"PTS 21-25 | AST 3-5 | REB 16-20 | BLK 4-5 | STL 2-3"`.
    pub fn describe(&self) -> String {
        Stat::ALL
            .iter()
            .map(|stat| format!("{} {}", stat.abbreviation(), stat.range_label(self.bin(*stat))))
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl fmt::Display for BucketShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [p, a, r, b, s] = self.bins;
        write!(f, "({p}, {a}, {r}, {b}, {s})")
    }
}

/// Map five raw counting stats to their bucket shape.
///
/// Pure and total: every combination of non-negative integers maps to exactly
/// one valid shape, with values past the last breakpoint in the overflow bin.
pub fn bucketize(points: u32, assists: u32, rebounds: u32, blocks: u32, steals: u32) -> BucketShape {
    BucketShape {
        bins: [
            Stat::Points.bin_for(points),
            Stat::Assists.bin_for(assists),
            Stat::Rebounds.bin_for(rebounds),
            Stat::Blocks.bin_for(blocks),
            Stat::Steals.bin_for(steals),
        ],
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
