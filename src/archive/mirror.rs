//! Local archive mirror.
//!
//! A directory laid out exactly like the remote archive
//! (`<root>/{year}_{month}/{obsid}/{subpath}/...`). Used offline and by the
//! integration tests.
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::warn;

use crate::{
    archive::{ArchivePath, ArchiveSource, DownloadFailure, DownloadReport},
    xtipipe_errors::XtiPipeError,
};

#[derive(Debug, Clone)]
pub struct MirrorArchive {
    root: Utf8PathBuf,
}

impl MirrorArchive {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        MirrorArchive { root: root.into() }
    }
}

impl ArchiveSource for MirrorArchive {
    fn fetch(&self, path: &ArchivePath, dest: &Utf8Path) -> Result<DownloadReport, XtiPipeError> {
        let source = self.root.join(path.relative());
        let mut report = DownloadReport::default();
        if !source.is_dir() {
            warn!("{path} not present in mirror {}", self.root);
            report.failures.push(DownloadFailure {
                source: source.to_string(),
                reason: "not present in mirror".to_string(),
            });
            return Ok(report);
        }

        let target_root = path.local_dir(dest);
        for file in list_files(&source)? {
            let Ok(rest) = file.strip_prefix(&source) else {
                continue;
            };
            let target = target_root.join(rest);
            match copy_file(&file, &target) {
                Ok(true) => report.fetched.push(target),
                Ok(false) => report.kept.push(target),
                Err(e) => {
                    warn!("Unable to copy {file}: {e}");
                    report.failures.push(DownloadFailure {
                        source: file.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }
}

/// Copy `source` to `target` unless a file of the same size is already there.
///
/// Returns `true` when a copy happened.
fn copy_file(source: &Utf8Path, target: &Utf8Path) -> Result<bool, XtiPipeError> {
    let size = source.metadata()?.len();
    if let Ok(existing) = target.metadata() {
        if existing.len() > 0 && existing.len() == size {
            return Ok(false);
        }
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, target)?;
    Ok(true)
}

/// Every regular file below `dir`, depth first.
pub(crate) fn list_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, XtiPipeError> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in current.read_dir_utf8()? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(entry.into_path());
            } else if file_type.is_file() {
                files.push(entry.into_path());
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod mirror_test {
    use crate::time::ArchiveMonth;

    use super::*;

    #[test]
    fn test_fetch_from_mirror() {
        let mirror_dir = tempfile::tempdir().unwrap();
        let mirror = Utf8Path::from_path(mirror_dir.path()).unwrap();
        let source = mirror.join("2013_01/3013010102/xti/event_uf");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("ni3013010102_0mpu0_uf.evt"), b"events").unwrap();

        let dest_dir = tempfile::tempdir().unwrap();
        let dest = Utf8Path::from_path(dest_dir.path()).unwrap();
        let archive = MirrorArchive::new(mirror);
        let path = ArchivePath::new(ArchiveMonth::new(2013, 1), "3013010102", "xti");

        let report = archive.fetch(&path, dest).unwrap();
        assert_eq!(
            report.fetched,
            vec![dest.join("3013010102/xti/event_uf/ni3013010102_0mpu0_uf.evt")]
        );

        let again = archive.fetch(&path, dest).unwrap();
        assert!(again.fetched.is_empty());
        assert_eq!(again.kept.len(), 1);

        let log = ArchivePath::new(ArchiveMonth::new(2013, 1), "3013010102", "log");
        let missing = archive.fetch(&log, dest).unwrap();
        assert!(missing.is_empty());
        assert_eq!(missing.failures.len(), 1);
    }
}
