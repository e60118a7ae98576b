//! # Dataset inspection
//!
//! Tools operating on a dataset that was already reduced on disk:
//!
//! * [`fits_header`]: header keywords of the result files,
//! * [`metadata`]: provenance recovered from those headers,
//! * [`calibration`]: calibration freshness against a reference version,
//! * [`reprocess`]: in-place reprocessing of stale datasets,
//! * [`batch`]: resolution of a list of datasets (`--inlist`).
//!
//! A dataset is a directory holding the reduced events in `xti/event_cl/`.
//! Its result files are the `*cl.evt` products, plain or gzip-compressed.
pub mod batch;
pub mod calibration;
pub mod fits_header;
pub mod metadata;
pub mod reprocess;

use camino::{Utf8Path, Utf8PathBuf};

use crate::{
    constants::{CLEANED_SUFFIX, GZ_EXTENSION},
    tools::event_dir,
    xtipipe_errors::XtiPipeError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    root: Utf8PathBuf,
}

impl Dataset {
    /// Open the dataset rooted at `root`.
    ///
    /// Return
    /// ------
    /// * The dataset, or [`XtiPipeError::MissingResultFiles`] when `root` has
    ///   no `xti/event_cl` directory.
    pub fn open(root: impl Into<Utf8PathBuf>) -> Result<Self, XtiPipeError> {
        let root = root.into();
        let events = event_dir(&root);
        if !events.is_dir() {
            return Err(XtiPipeError::MissingResultFiles(events));
        }
        Ok(Dataset { root })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn event_dir(&self) -> Utf8PathBuf {
        event_dir(&self.root)
    }

    /// Result files of the dataset, sorted by name.
    pub fn result_files(&self) -> Result<Vec<Utf8PathBuf>, XtiPipeError> {
        let gz_suffix = format!("{CLEANED_SUFFIX}{GZ_EXTENSION}");
        let mut files = Vec::new();
        for entry in self.event_dir().read_dir_utf8()? {
            let entry = entry?;
            let name = entry.file_name();
            if entry.file_type()?.is_file()
                && (name.ends_with(CLEANED_SUFFIX) || name.ends_with(&gz_suffix))
            {
                files.push(entry.into_path());
            }
        }
        files.sort();
        Ok(files)
    }
}
