use hifitime::{Epoch, TimeScale};
use std::str::FromStr;

use crate::{constants::MJD, xtipipe_errors::XtiPipeError};

/// Calendar year and zero-padded month used to build archive paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveMonth {
    pub year: String,
    pub month: String,
}

impl ArchiveMonth {
    /// Build an [`ArchiveMonth`] from numeric parts, padding the month to two digits.
    pub fn new(year: i32, month: u8) -> Self {
        ArchiveMonth {
            year: format!("{year:04}"),
            month: format!("{month:02}"),
        }
    }

    /// Archive folder name, e.g. `2013_01`.
    pub fn folder(&self) -> String {
        format!("{}_{}", self.year, self.month)
    }
}

impl From<&Epoch> for ArchiveMonth {
    fn from(epoch: &Epoch) -> Self {
        let (year, month, ..) = epoch.to_gregorian_utc();
        ArchiveMonth::new(year, month)
    }
}

/// Transformation from modified julian date (MJD, UTC) to an [`Epoch`]
///
/// Argument
/// --------
/// * `mjd`: a date in modified julian date in the UTC frame
///
/// Return
/// ------
/// * the corresponding [`Epoch`]
pub fn mjd_to_epoch(mjd: MJD) -> Epoch {
    Epoch::from_mjd_utc(mjd)
}

/// Parse a calendar timestamp such as `2017-06-20 17:35:00` or `2017-06-20T17:35:00`.
///
/// A missing time scale is read as UTC. A date without a time of day is
/// read as midnight.
///
/// Argument
/// --------
/// * `date`: the textual timestamp
///
/// Return
/// ------
/// * the parsed [`Epoch`] or a [`XtiPipeError::TimeError`]
pub fn parse_calendar(date: &str) -> Result<Epoch, XtiPipeError> {
    let trimmed = date.trim();
    let mut normalized = if trimmed.len() == 10 {
        format!("{trimmed}T00:00:00")
    } else if trimmed.as_bytes().get(10) == Some(&b' ') {
        format!("{}T{}", &trimmed[..10], &trimmed[11..])
    } else {
        trimmed.to_string()
    };
    let has_scale = normalized
        .rsplit_once(' ')
        .is_some_and(|(_, scale)| TimeScale::from_str(scale).is_ok());
    if !has_scale {
        normalized.push_str(" UTC");
    }
    Epoch::from_str(&normalized).map_err(|e| XtiPipeError::TimeError(format!("{date}: {e}")))
}

/// Parse a catalog time column value, either an MJD number or a calendar timestamp.
pub fn parse_catalog_time(value: &str) -> Result<Epoch, XtiPipeError> {
    match value.trim().parse::<f64>() {
        Ok(mjd) => Ok(mjd_to_epoch(mjd)),
        Err(_) => parse_calendar(value),
    }
}

/// Current UTC time rendered as ISO 8601, used for manifest rows.
pub fn now_iso() -> Result<String, XtiPipeError> {
    let now = Epoch::now().map_err(|e| XtiPipeError::TimeError(e.to_string()))?;
    Ok(now.to_string())
}
