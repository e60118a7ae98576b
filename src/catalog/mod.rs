//! # Observation catalog
//!
//! A [`Catalog`] is the table of observation records returned when a target is
//! resolved against the NICER master catalog. It is immutable once fetched and
//! lives for the whole session.
//!
//! ## Epoch keys
//!
//! Identifiers are fixed-width numbers whose leading digit(s) name the
//! operational campaign ("cycle"): `1013010112` belongs to cycle `1`,
//! `3013010102` to cycle `3`. [`epoch_key`] computes that key and
//! [`Catalog::cycle`] lazily yields every record of one cycle, which the
//! `cycle <n>` command uses for bulk selection.
//!
//! ## See also
//! ------------
//! * [`resolver`] – Turning a target name or sky position into a [`Catalog`].
//! * [`crate::queue::ObservationQueue`] – Selection built from catalog records.
pub mod resolver;

use hifitime::Epoch;

use crate::{
    constants::{Degree, ObsId, EPOCH_DIVISOR},
    time::ArchiveMonth,
};

/// One row of the master catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    pub obsid: ObsId,
    pub time: Epoch,
    pub ra: Degree,
    pub dec: Degree,
}

impl ObservationRecord {
    /// Build a record, stripping any whitespace embedded in the identifier.
    pub fn new(obsid: &str, time: Epoch, ra: Degree, dec: Degree) -> Self {
        ObservationRecord {
            obsid: normalize_obsid(obsid),
            time,
            ra,
            dec,
        }
    }

    /// Year and zero-padded month of the observation start.
    pub fn archive_month(&self) -> ArchiveMonth {
        ArchiveMonth::from(&self.time)
    }

    pub fn epoch_key(&self) -> Option<u64> {
        epoch_key(&self.obsid)
    }
}

/// Remove every whitespace character from a catalog identifier.
pub fn normalize_obsid(obsid: &str) -> ObsId {
    obsid.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Epoch ("cycle") key of an identifier: the identifier scaled by 10⁻⁹ and floored.
///
/// Arguments
/// -----------------
/// * `obsid`: a numeric identifier such as `"3013010102"`.
///
/// Return
/// ----------
/// * `Some(key)` for numeric identifiers, `None` otherwise.
pub fn epoch_key(obsid: &str) -> Option<u64> {
    obsid.parse::<u64>().ok().map(|id| id / EPOCH_DIVISOR)
}

/// All records resolved for one target.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Catalog {
    pub target: String,
    records: Vec<ObservationRecord>,
}

impl Catalog {
    pub fn new(target: impl Into<String>, records: Vec<ObservationRecord>) -> Self {
        Catalog {
            target: target.into(),
            records,
        }
    }

    pub fn records(&self) -> &[ObservationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First record carrying `obsid`.
    pub fn find(&self, obsid: &str) -> Option<&ObservationRecord> {
        self.records.iter().find(|r| r.obsid == obsid)
    }

    /// Lazily yield the records whose epoch key equals `key`.
    pub fn cycle(&self, key: u64) -> impl Iterator<Item = &ObservationRecord> + '_ {
        self.records
            .iter()
            .filter(move |r| r.epoch_key() == Some(key))
    }
}
