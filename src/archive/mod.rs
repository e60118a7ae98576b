//! # Archive access
//!
//! The NICER archive stores every observation under
//! `{year}_{month}/{obsid}/{subpath}/` with three subpaths: `xti` (instrument
//! data), `log` and `auxil` (orbit and attitude files). An [`ArchiveSource`]
//! mirrors one such subtree into `<dest>/{obsid}/{subpath}/`.
//!
//! Implementations:
//!
//! | source                       | origin                                       |
//! |------------------------------|----------------------------------------------|
//! | [`http::HttpArchive`]        | recursive crawl of the HTTPS directory index |
//! | [`http::UrlListArchive`]     | explicit list of per-file URLs               |
//! | [`mirror::MirrorArchive`]    | local copy of the archive tree               |
//!
//! Individual file failures are collected in the [`DownloadReport`] and never
//! abort a fetch. [`verify_complete`] is run once all subpaths are fetched and
//! is the only check between download and reduction.
pub mod http;
pub mod mirror;

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};

use crate::{
    constants::{ObsId, ARCHIVE_SUBPATHS, AUXIL_DIR, GZ_EXTENSION},
    queue::QueueEntry,
    time::ArchiveMonth,
    xtipipe_errors::XtiPipeError,
};

/// Location of one observation subtree in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePath {
    pub epoch: ArchiveMonth,
    pub obsid: ObsId,
    pub subpath: String,
}

impl ArchivePath {
    pub fn new(epoch: ArchiveMonth, obsid: impl Into<ObsId>, subpath: impl Into<String>) -> Self {
        ArchivePath {
            epoch,
            obsid: obsid.into(),
            subpath: subpath.into(),
        }
    }

    /// The `xti`, `log` and `auxil` paths of a queued observation.
    ///
    /// Return
    /// ------
    /// * The three paths, or [`XtiPipeError::MissingArchiveEpoch`] when the
    ///   entry does not know its archive year and month.
    pub fn for_entry(entry: &QueueEntry) -> Result<Vec<ArchivePath>, XtiPipeError> {
        let epoch = entry
            .epoch
            .clone()
            .ok_or_else(|| XtiPipeError::MissingArchiveEpoch(entry.obsid.clone()))?;
        Ok(ARCHIVE_SUBPATHS
            .iter()
            .map(|subpath| ArchivePath::new(epoch.clone(), entry.obsid.clone(), *subpath))
            .collect())
    }

    /// Path relative to the archive root, with a trailing slash.
    pub fn relative(&self) -> String {
        format!("{}/{}/{}/", self.epoch.folder(), self.obsid, self.subpath)
    }

    pub fn url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.relative())
    }

    /// Local directory receiving this subtree under `dest`.
    pub fn local_dir(&self, dest: &Utf8Path) -> Utf8PathBuf {
        dest.join(&self.obsid).join(&self.subpath)
    }
}

impl fmt::Display for ArchivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.relative())
    }
}

/// One file to retrieve and where it lands, relative to the destination root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub url: String,
    pub relative: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadFailure {
    pub source: String,
    pub reason: String,
}

/// Outcome of fetching one archive subtree.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DownloadReport {
    /// Files written by this fetch.
    pub fetched: Vec<Utf8PathBuf>,
    /// Files already present with the expected size.
    pub kept: Vec<Utf8PathBuf>,
    pub failures: Vec<DownloadFailure>,
}

impl DownloadReport {
    /// Every local file the subtree now provides.
    pub fn files(&self) -> impl Iterator<Item = &Utf8PathBuf> {
        self.fetched.iter().chain(self.kept.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.fetched.is_empty() && self.kept.is_empty()
    }
}

pub trait ArchiveSource {
    /// Retrieve every file under `path` into `<dest>/{obsid}/{subpath}/`.
    fn fetch(&self, path: &ArchivePath, dest: &Utf8Path) -> Result<DownloadReport, XtiPipeError>;
}

/// Check that a fetched observation can be handed to the reduction tool.
///
/// Arguments
/// -----------------
/// * `obsid`: the observation identifier.
/// * `dest`: root the subtrees were fetched into.
/// * `reports`: one report per fetched subpath.
/// * `require_orbit`: whether `auxil/ni{obsid}.orb` (or its `.gz`) is needed (barycenter correction).
///
/// Return
/// ----------
/// * `Ok(())`, or [`XtiPipeError::IncompleteDownload`] naming the first missing input.
pub fn verify_complete(
    obsid: &str,
    dest: &Utf8Path,
    reports: &[(ArchivePath, DownloadReport)],
    require_orbit: bool,
) -> Result<(), XtiPipeError> {
    let incomplete = |reason: String| XtiPipeError::IncompleteDownload {
        obsid: obsid.to_string(),
        reason,
    };

    let mut has_instrument_data = false;
    for (path, report) in reports {
        for file in report.files() {
            let size = file.metadata().map(|m| m.len()).unwrap_or(0);
            if size == 0 {
                return Err(incomplete(format!("{file} is empty or missing")));
            }
            if path.subpath == "xti" {
                has_instrument_data = true;
            }
        }
    }
    if !has_instrument_data {
        return Err(incomplete("no xti file retrieved".to_string()));
    }

    if require_orbit {
        let orbit = orbit_file(&dest.join(obsid), obsid);
        let compressed = Utf8PathBuf::from(format!("{orbit}{GZ_EXTENSION}"));
        if !orbit.is_file() && !compressed.is_file() {
            return Err(incomplete(format!("orbit file {orbit} not found")));
        }
    }
    Ok(())
}

/// `<dataset>/auxil/ni{obsid}.orb`
///
/// The archive usually serves it as `ni{obsid}.orb.gz`; the correction tool
/// opens the compressed sibling when given this path.
pub fn orbit_file(dataset: &Utf8Path, obsid: &str) -> Utf8PathBuf {
    dataset.join(AUXIL_DIR).join(format!("ni{obsid}.orb"))
}
