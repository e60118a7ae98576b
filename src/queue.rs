//! # Observation queue
//!
//! Ordered, duplicate-free selection of observations awaiting processing.
//!
//! Insertion order is preserved: `back` removes the most recently added
//! entry and the acquisition pipeline consumes entries front to back.
//! Recoverable conditions (unknown identifier, duplicate, nothing to remove)
//! are returned as [`AddOutcome`] / [`RemoveOutcome`] values, never as errors.
use std::fmt;

use crate::{
    catalog::{Catalog, ObservationRecord},
    constants::{Degree, ObsId},
    time::ArchiveMonth,
};

/// One observation selected for processing.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub obsid: ObsId,
    /// Archive folder of the observation; `None` for entries rebuilt from a
    /// dataset whose headers do not carry a start date.
    pub epoch: Option<ArchiveMonth>,
    pub ra: Degree,
    pub dec: Degree,
}

impl QueueEntry {
    pub fn new(obsid: impl Into<ObsId>, epoch: Option<ArchiveMonth>, ra: Degree, dec: Degree) -> Self {
        QueueEntry {
            obsid: obsid.into(),
            epoch,
            ra,
            dec,
        }
    }

    pub fn year(&self) -> Option<&str> {
        self.epoch.as_ref().map(|e| e.year.as_str())
    }

    pub fn month(&self) -> Option<&str> {
        self.epoch.as_ref().map(|e| e.month.as_str())
    }
}

impl From<&ObservationRecord> for QueueEntry {
    fn from(record: &ObservationRecord) -> Self {
        QueueEntry::new(
            record.obsid.clone(),
            Some(record.archive_month()),
            record.ra,
            record.dec,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added(ObsId),
    AlreadyQueued(ObsId),
    NotFound(ObsId),
}

/// Argument of a removal: a concrete identifier, `all` or `back`.
///
/// `all` and `back` are matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveTarget {
    All,
    Back,
    Id(ObsId),
}

impl From<&str> for RemoveTarget {
    fn from(arg: &str) -> Self {
        match arg.to_lowercase().as_str() {
            "all" => RemoveTarget::All,
            "back" => RemoveTarget::Back,
            _ => RemoveTarget::Id(arg.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed(ObsId),
    /// Number of entries dropped by `all`.
    Cleared(usize),
    NothingToRemove,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObservationQueue {
    entries: Vec<QueueEntry>,
}

impl ObservationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the catalog record carrying `obsid`.
    ///
    /// Arguments
    /// -----------------
    /// * `obsid`: identifier typed by the operator.
    /// * `catalog`: the resolved catalog used as lookup table.
    ///
    /// Return
    /// ----------
    /// * [`AddOutcome::AlreadyQueued`] when present (no change),
    ///   [`AddOutcome::NotFound`] when absent from the catalog (no change),
    ///   [`AddOutcome::Added`] otherwise.
    pub fn add(&mut self, obsid: &str, catalog: &Catalog) -> AddOutcome {
        if self.contains(obsid) {
            return AddOutcome::AlreadyQueued(obsid.to_string());
        }
        match catalog.find(obsid) {
            Some(record) => {
                self.entries.push(QueueEntry::from(record));
                AddOutcome::Added(obsid.to_string())
            }
            None => AddOutcome::NotFound(obsid.to_string()),
        }
    }

    /// Queue an already built entry, keeping identifiers unique.
    pub fn push(&mut self, entry: QueueEntry) -> AddOutcome {
        if self.contains(&entry.obsid) {
            return AddOutcome::AlreadyQueued(entry.obsid);
        }
        let obsid = entry.obsid.clone();
        self.entries.push(entry);
        AddOutcome::Added(obsid)
    }

    pub fn remove(&mut self, target: &RemoveTarget) -> RemoveOutcome {
        match target {
            RemoveTarget::All => {
                let count = self.entries.len();
                self.entries.clear();
                RemoveOutcome::Cleared(count)
            }
            RemoveTarget::Back => match self.entries.pop() {
                Some(entry) => RemoveOutcome::Removed(entry.obsid),
                None => RemoveOutcome::NothingToRemove,
            },
            RemoveTarget::Id(obsid) => match self.entries.iter().position(|e| &e.obsid == obsid) {
                Some(index) => RemoveOutcome::Removed(self.entries.remove(index).obsid),
                None => RemoveOutcome::NothingToRemove,
            },
        }
    }

    /// Queued identifiers in insertion order.
    pub fn list(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.obsid.as_str()).collect()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&QueueEntry> {
        self.entries.last()
    }

    pub fn contains(&self, obsid: &str) -> bool {
        self.entries.iter().any(|e| e.obsid == obsid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for AddOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddOutcome::Added(id) => write!(f, "Adding {id}"),
            AddOutcome::AlreadyQueued(id) => write!(f, "{id} is already queued up... ignoring"),
            AddOutcome::NotFound(id) => write!(f, "OBSID {id} NOT FOUND!"),
        }
    }
}

impl fmt::Display for RemoveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoveOutcome::Removed(id) => write!(f, "Removing {id}"),
            RemoveOutcome::Cleared(n) => write!(f, "Removed all {n} queued observations"),
            RemoveOutcome::NothingToRemove => write!(f, "Nothing found to Remove!"),
        }
    }
}

#[cfg(test)]
mod queue_test {
    use crate::time::mjd_to_epoch;

    use super::*;

    fn catalog() -> Catalog {
        let records = ["1013010101", "1013010102", "3013010102"]
            .iter()
            .map(|id| ObservationRecord::new(id, mjd_to_epoch(56307.5), 83.63308, 22.01449))
            .collect();
        Catalog::new("Crab", records)
    }

    #[test]
    fn test_add_derives_epoch() {
        let mut queue = ObservationQueue::new();
        assert_eq!(
            queue.add("3013010102", &catalog()),
            AddOutcome::Added("3013010102".into())
        );
        let entry = &queue.entries()[0];
        assert_eq!(entry.year(), Some("2013"));
        assert_eq!(entry.month(), Some("01"));
        assert_eq!(entry.ra, 83.63308);
    }

    #[test]
    fn test_add_unknown_and_duplicate() {
        let cat = catalog();
        let mut queue = ObservationQueue::new();
        assert_eq!(
            queue.add("1013010000", &cat),
            AddOutcome::NotFound("1013010000".into())
        );
        assert!(queue.is_empty());

        queue.add("1013010101", &cat);
        assert_eq!(
            queue.add("1013010101", &cat),
            AddOutcome::AlreadyQueued("1013010101".into())
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_remove_variants() {
        let cat = catalog();
        let mut queue = ObservationQueue::new();
        assert_eq!(queue.remove(&RemoveTarget::Back), RemoveOutcome::NothingToRemove);

        for id in ["1013010101", "1013010102", "3013010102"] {
            queue.add(id, &cat);
        }
        assert_eq!(
            queue.remove(&RemoveTarget::Back),
            RemoveOutcome::Removed("3013010102".into())
        );
        assert_eq!(
            queue.remove(&"1013010101".into()),
            RemoveOutcome::Removed("1013010101".into())
        );
        assert_eq!(
            queue.remove(&"1013010101".into()),
            RemoveOutcome::NothingToRemove
        );
        assert_eq!(queue.list(), vec!["1013010102"]);
        assert_eq!(queue.remove(&"ALL".into()), RemoveOutcome::Cleared(1));
        assert_eq!(queue.remove(&RemoveTarget::All), RemoveOutcome::Cleared(0));
        assert!(queue.is_empty());
    }
}
