// Season identifiers and the regular-season calendar.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeasonError {
    #[error("season must look like YYYY-YY, got {0:?}")]
    Malformed(String),

    #[error("season {value:?} does not span consecutive years")]
    NotConsecutive { value: String },
}

/// One NBA season, identified as `"YYYY-YY"` (e.g. `"2024-25"`).
///
/// Ordered chronologically by starting year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Season {
    start_year: u16,
}

impl Season {
    /// The season that starts in the autumn of `start_year`.
    pub fn starting(start_year: u16) -> Self {
        Self { start_year }
    }

    pub fn start_year(&self) -> u16 {
        self.start_year
    }

    /// Parse a `"YYYY-YY"` identifier. The suffix must be the year after
    /// `YYYY`, modulo 100 (so `"1999-00"` is valid).
    pub fn parse(value: &str) -> Result<Self, SeasonError> {
        let trimmed = value.trim();
        let (start, end) = trimmed
            .split_once('-')
            .ok_or_else(|| SeasonError::Malformed(value.to_string()))?;
        if start.len() != 4 || end.len() != 2 {
            return Err(SeasonError::Malformed(value.to_string()));
        }
        let start_year: u16 = start
            .parse()
            .map_err(|_| SeasonError::Malformed(value.to_string()))?;
        let end_suffix: u16 = end
            .parse()
            .map_err(|_| SeasonError::Malformed(value.to_string()))?;
        if (start_year + 1) % 100 != end_suffix {
            return Err(SeasonError::NotConsecutive {
                value: value.to_string(),
            });
        }
        Ok(Self { start_year })
    }

    /// The regular season whose window contains `date`, if any. Preseason,
    /// playoff and offseason dates return `None`.
    pub fn for_date(date: NaiveDate) -> Option<Self> {
        REGULAR_SEASONS
            .iter()
            .find(|window| window.contains(date))
            .map(|window| Season::starting(window.start_year))
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.start_year, (self.start_year + 1) % 100)
    }
}

impl From<Season> for String {
    fn from(season: Season) -> Self {
        season.to_string()
    }
}

impl TryFrom<String> for Season {
    type Error = SeasonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Season::parse(&value)
    }
}

// ---------------------------------------------------------------------------
// Regular-season calendar
// ---------------------------------------------------------------------------

/// Opening night and final regular-season day for one season.
#[derive(Debug, Clone, Copy)]
struct SeasonWindow {
    start_year: u16,
    opens: (i32, u32, u32),
    closes: (i32, u32, u32),
}

impl SeasonWindow {
    fn contains(&self, date: NaiveDate) -> bool {
        let (oy, om, od) = self.opens;
        let (cy, cm, cd) = self.closes;
        match (
            NaiveDate::from_ymd_opt(oy, om, od),
            NaiveDate::from_ymd_opt(cy, cm, cd),
        ) {
            (Some(opens), Some(closes)) => opens <= date && date <= closes,
            _ => false,
        }
    }
}

const fn window(start_year: u16, opens: (i32, u32, u32), closes: (i32, u32, u32)) -> SeasonWindow {
    SeasonWindow {
        start_year,
        opens,
        closes,
    }
}

/// Regular-season windows since blocks and steals became official stats.
const REGULAR_SEASONS: [SeasonWindow; 53] = [
    window(1973, (1973, 10, 9), (1974, 3, 27)),
    window(1974, (1974, 10, 17), (1975, 4, 6)),
    window(1975, (1975, 10, 23), (1976, 4, 11)),
    window(1976, (1976, 10, 21), (1977, 4, 10)),
    window(1977, (1977, 10, 18), (1978, 4, 9)),
    window(1978, (1978, 10, 12), (1979, 4, 7)),
    window(1979, (1979, 10, 12), (1980, 4, 6)),
    window(1980, (1980, 10, 10), (1981, 4, 5)),
    window(1981, (1981, 10, 9), (1982, 4, 3)),
    window(1982, (1982, 10, 8), (1983, 4, 6)),
    window(1983, (1983, 10, 11), (1984, 4, 8)),
    window(1984, (1984, 10, 12), (1985, 4, 7)),
    window(1985, (1985, 10, 25), (1986, 4, 6)),
    window(1986, (1986, 10, 31), (1987, 4, 4)),
    window(1987, (1987, 11, 6), (1988, 4, 9)),
    window(1988, (1988, 11, 4), (1989, 4, 23)),
    window(1989, (1989, 11, 3), (1990, 4, 22)),
    window(1990, (1990, 11, 2), (1991, 4, 21)),
    window(1991, (1991, 11, 1), (1992, 4, 19)),
    window(1992, (1992, 11, 6), (1993, 4, 25)),
    window(1993, (1993, 11, 5), (1994, 4, 24)),
    window(1994, (1994, 11, 4), (1995, 4, 23)),
    window(1995, (1995, 11, 3), (1996, 4, 21)),
    window(1996, (1996, 11, 1), (1997, 4, 20)),
    window(1997, (1997, 10, 31), (1998, 4, 19)),
    window(1998, (1998, 10, 30), (1999, 4, 18)),
    window(1999, (1999, 11, 2), (2000, 4, 16)),
    window(2000, (2000, 10, 31), (2001, 4, 15)),
    window(2001, (2001, 10, 30), (2002, 4, 14)),
    window(2002, (2002, 10, 29), (2003, 4, 16)),
    window(2003, (2003, 10, 28), (2004, 4, 14)),
    window(2004, (2004, 11, 2), (2005, 4, 20)),
    window(2005, (2005, 11, 1), (2006, 4, 19)),
    window(2006, (2006, 10, 31), (2007, 4, 18)),
    window(2007, (2007, 10, 30), (2008, 4, 16)),
    window(2008, (2008, 10, 28), (2009, 4, 15)),
    window(2009, (2009, 10, 27), (2010, 4, 14)),
    window(2010, (2010, 10, 26), (2011, 4, 13)),
    window(2011, (2011, 12, 25), (2012, 4, 26)),
    window(2012, (2012, 10, 30), (2013, 4, 17)),
    window(2013, (2013, 10, 29), (2014, 4, 16)),
    window(2014, (2014, 10, 28), (2015, 4, 15)),
    window(2015, (2015, 10, 27), (2016, 4, 13)),
    window(2016, (2016, 10, 25), (2017, 4, 12)),
    window(2017, (2017, 10, 17), (2018, 4, 11)),
    window(2018, (2018, 10, 16), (2019, 4, 10)),
    window(2019, (2019, 10, 22), (2020, 3, 11)),
    window(2020, (2020, 12, 22), (2021, 5, 16)),
    window(2021, (2021, 10, 19), (2022, 4, 10)),
    window(2022, (2022, 10, 18), (2023, 4, 9)),
    window(2023, (2023, 10, 24), (2024, 4, 14)),
    window(2024, (2024, 10, 22), (2025, 4, 13)),
    window(2025, (2025, 10, 21), (2026, 4, 12)),
];
