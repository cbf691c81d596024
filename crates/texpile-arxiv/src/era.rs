//! Packaging era of a shard period

use chrono::NaiveDate;

use crate::error::IngestError;

/// Last month packaged with subject-prefixed member names (inclusive).
pub const LEGACY_CUTOFF: (i32, u32, u32) = (2007, 3, 1);

/// Two-digit years above this are 19YY.
const CENTURY_PIVOT: i32 = 50;

/// Shard packaging convention.
///
/// `Legacy` members are named after the subject class (`math0601001.gz`);
/// `Modern` members are bare record ids (`0704.0001.gz`) and need the
/// metadata index to tell which belong to the target class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Era {
    Legacy,
    Modern,
}

impl std::fmt::Display for Era {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Legacy => "legacy",
            Self::Modern => "modern",
        })
    }
}

/// First day of the month named by a `YYMM` period.
pub fn period_date(period: &str) -> Result<NaiveDate, IngestError> {
    let invalid = || IngestError::InvalidPeriod(period.to_string());
    if period.len() != 4 || !period.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let yy: i32 = period[..2].parse().map_err(|_| invalid())?;
    let mm: u32 = period[2..].parse().map_err(|_| invalid())?;
    let year = if yy > CENTURY_PIVOT { 1900 + yy } else { 2000 + yy };
    NaiveDate::from_ymd_opt(year, mm, 1).ok_or_else(invalid)
}

/// Classify a period against the legacy cutoff.
pub fn classify_era(period: &str) -> Result<Era, IngestError> {
    let date = period_date(period)?;
    let (y, m, d) = LEGACY_CUTOFF;
    let legacy = NaiveDate::from_ymd_opt(y, m, d).is_some_and(|cutoff| date <= cutoff);
    Ok(if legacy { Era::Legacy } else { Era::Modern })
}
