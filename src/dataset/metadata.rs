//! # Dataset metadata
//!
//! Provenance of a reduced dataset, recovered from the headers of its result
//! files every time the dataset is inspected.
//!
//! | field        | keyword    | searched in          | when absent          |
//! |--------------|------------|----------------------|----------------------|
//! | obsid        | `OBS_ID`   | primary, extension   | blocks reprocessing  |
//! | ra / dec     | `RA_OBJ`, `DEC_OBJ` | primary     | blocks reprocessing  |
//! | target       | `OBJECT`   | primary, extension   | reported, tolerated  |
//! | epoch        | `DATE-OBS` | primary, extension   | tolerated            |
//! | calibration  | `CALDBVER` | extension, primary   | see [`super::calibration`] |
//!
//! Missing required fields are collected as [`MetadataIssue`]s instead of
//! being raised, so that the calibration check still runs on the dataset.
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use crate::{
    constants::{Degree, ObsId, GZ_EXTENSION},
    queue::QueueEntry,
    time::{parse_calendar, ArchiveMonth},
    tools::corrected_event,
    xtipipe_errors::XtiPipeError,
};

use super::{fits_header::FitsHeaders, Dataset};

/// Reason a dataset cannot be reprocessed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataIssue {
    NoResultFiles(Utf8PathBuf),
    Unreadable { path: Utf8PathBuf, reason: String },
    MissingObsId(Utf8PathBuf),
    MissingCoordinates(Utf8PathBuf),
}

impl fmt::Display for MetadataIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataIssue::NoResultFiles(dir) => write!(f, "no result file in {dir}"),
            MetadataIssue::Unreadable { path, reason } => write!(f, "cannot read {path}: {reason}"),
            MetadataIssue::MissingObsId(path) => write!(f, "CANNOT IDENTIFY OBS_ID in {path}"),
            MetadataIssue::MissingCoordinates(path) => {
                write!(f, "CANNOT IDENTIFY RA_OBJ/DEC_OBJ in {path}")
            }
        }
    }
}

/// One result file and the calibration version it records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultFile {
    pub path: Utf8PathBuf,
    pub caldb: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DatasetMetadata {
    pub obsid: Option<ObsId>,
    pub target: Option<String>,
    pub ra: Option<Degree>,
    pub dec: Option<Degree>,
    pub epoch: Option<ArchiveMonth>,
    /// A barycenter-corrected product is present.
    pub correction_applied: bool,
    pub files: Vec<ResultFile>,
    pub issues: Vec<MetadataIssue>,
}

impl DatasetMetadata {
    /// Read the metadata of every result file of `dataset`.
    ///
    /// The first value found for a field is kept; a later file disagreeing on
    /// the identifier is reported.
    pub fn extract(dataset: &Dataset) -> Result<Self, XtiPipeError> {
        let mut metadata = DatasetMetadata::default();
        let files = dataset.result_files()?;
        if files.is_empty() {
            metadata
                .issues
                .push(MetadataIssue::NoResultFiles(dataset.event_dir()));
            return Ok(metadata);
        }

        for path in files {
            match FitsHeaders::read(&path) {
                Ok(headers) => {
                    let caldb = headers.extension_then_primary("CALDBVER");
                    metadata.absorb(&path, &headers);
                    metadata.files.push(ResultFile { path, caldb });
                }
                Err(e) => {
                    warn!("Unable to read headers of {path}: {e}");
                    metadata.issues.push(MetadataIssue::Unreadable {
                        path: path.clone(),
                        reason: e.to_string(),
                    });
                    metadata.files.push(ResultFile { path, caldb: None });
                }
            }
        }

        if metadata.target.is_none() {
            info!("Target name unavailable in {}", dataset.root());
        }
        if let Some(obsid) = &metadata.obsid {
            metadata.correction_applied = has_corrected_product(dataset.root(), obsid);
        }
        Ok(metadata)
    }

    fn absorb(&mut self, path: &Utf8Path, headers: &FitsHeaders) {
        match headers.primary_then_extension("OBS_ID") {
            Some(obsid) => match &self.obsid {
                None => self.obsid = Some(obsid),
                Some(known) if *known != obsid => {
                    warn!("{path} belongs to OBS_ID {obsid}, dataset is {known}");
                }
                Some(_) => {}
            },
            None => self.issues.push(MetadataIssue::MissingObsId(path.to_path_buf())),
        }

        match (
            headers.primary.get_f64("RA_OBJ"),
            headers.primary.get_f64("DEC_OBJ"),
        ) {
            (Some(ra), Some(dec)) => {
                self.ra.get_or_insert(ra);
                self.dec.get_or_insert(dec);
            }
            _ => self
                .issues
                .push(MetadataIssue::MissingCoordinates(path.to_path_buf())),
        }

        if self.target.is_none() {
            self.target = headers.primary_then_extension("OBJECT");
        }
        if self.epoch.is_none() {
            self.epoch = headers
                .primary_then_extension("DATE-OBS")
                .and_then(|date| match parse_calendar(&date) {
                    Ok(epoch) => Some(ArchiveMonth::from(&epoch)),
                    Err(e) => {
                        debug!("Ignoring DATE-OBS of {path}: {e}");
                        None
                    }
                });
        }
    }

    /// Whether a recorded issue prevents reprocessing.
    pub fn is_blocked(&self) -> bool {
        !self.issues.is_empty()
    }

    /// Queue entry rebuilt from the recovered provenance.
    pub fn queue_entry(&self) -> Option<QueueEntry> {
        match (&self.obsid, self.ra, self.dec) {
            (Some(obsid), Some(ra), Some(dec)) => {
                Some(QueueEntry::new(obsid.clone(), self.epoch.clone(), ra, dec))
            }
            _ => None,
        }
    }

    /// Calibration version shared by every result file, if they agree.
    pub fn caldb(&self) -> Option<&str> {
        let first = self.files.first()?.caldb.as_deref()?;
        self.files
            .iter()
            .all(|f| f.caldb.as_deref() == Some(first))
            .then_some(first)
    }
}

fn has_corrected_product(dataset: &Utf8Path, obsid: &str) -> bool {
    let corrected = corrected_event(dataset, obsid);
    corrected.is_file() || Utf8PathBuf::from(format!("{corrected}{GZ_EXTENSION}")).is_file()
}
