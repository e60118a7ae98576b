//! # Calibration freshness
//!
//! Compares the `CALDBVER` recorded by each result file with the reference
//! version reported by the installed calibration database.
//!
//! Files are examined in name order. A file without a recorded version stops
//! the examination: the files after it are not checked.
//!
//! The dataset state requires unanimity: it is [`CalibrationState::Current`]
//! only when every result file was checked and is current, and
//! [`CalibrationState::Stale`] as soon as one checked file is stale. When
//! the state of the last file examined differs from that aggregate, both are
//! reported.
use std::fmt;

use camino::Utf8PathBuf;
use tracing::{error, info, warn};

use super::metadata::DatasetMetadata;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationState {
    /// Not checked, or nothing could be checked.
    #[default]
    Unknown,
    Current,
    Stale,
}

impl fmt::Display for CalibrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CalibrationState::Unknown => "unknown",
            CalibrationState::Current => "up to date",
            CalibrationState::Stale => "NOT up to date",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCalibration {
    pub path: Utf8PathBuf,
    pub version: String,
    pub state: CalibrationState,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CalibrationReport {
    pub reference: String,
    pub files: Vec<FileCalibration>,
    /// File whose version could not be identified, ending the examination.
    pub unreadable: Option<Utf8PathBuf>,
    pub state: CalibrationState,
}

impl CalibrationReport {
    /// State of the last file examined.
    pub fn last_examined(&self) -> CalibrationState {
        self.files.last().map(|f| f.state).unwrap_or_default()
    }
}

/// Check the result files of a dataset against `reference`.
///
/// Arguments
/// -----------------
/// * `metadata`: the dataset metadata, carrying the per-file versions.
/// * `reference`: version string given by the calibration version query.
///
/// Return
/// ----------
/// * The per-file comparison and the aggregated [`CalibrationState`].
pub fn check_calibration(metadata: &DatasetMetadata, reference: &str) -> CalibrationReport {
    let mut report = CalibrationReport {
        reference: reference.to_string(),
        ..Default::default()
    };

    for file in &metadata.files {
        let Some(version) = &file.caldb else {
            error!("CANNOT IDENTIFY CALDB in {}", file.path);
            report.unreadable = Some(file.path.clone());
            break;
        };
        let state = if version == reference {
            CalibrationState::Current
        } else {
            CalibrationState::Stale
        };
        info!(
            "CALDB for {}: {version} ({state}, reference {reference})",
            file.path.file_name().unwrap_or(file.path.as_str())
        );
        report.files.push(FileCalibration {
            path: file.path.clone(),
            version: version.clone(),
            state,
        });
    }

    report.state = if report
        .files
        .iter()
        .any(|f| f.state == CalibrationState::Stale)
    {
        CalibrationState::Stale
    } else if report.files.is_empty() || report.unreadable.is_some() {
        CalibrationState::Unknown
    } else {
        CalibrationState::Current
    };

    let last = report.last_examined();
    if last != report.state {
        warn!(
            "Dataset calibration is {} over all files, the last file examined alone is {}",
            report.state, last
        );
    }
    report
}
