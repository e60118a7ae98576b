//! # Product compression
//!
//! gzip handling of the reduced event files.
//!
//! Each file goes through its own sequence: the compressed stream is written
//! to `<name>.part`, renamed into place, and only then is the source removed.
//! A failure leaves the source untouched. Files of one directory are handled
//! on the bounded worker pool of [`XtiEnv`] and in no particular order.
//!
//! Product groups compressed after a reduction:
//!
//! * `*ufa.evt` (merged unfiltered events),
//! * `ni*cl.evt` (cleaned events before correction).
//!
//! The corrected `bc*cl.evt` science product stays uncompressed.
//!
//! Older datasets may carry their members as `*.tar.gz` archives; these are
//! unpacked in place before a reprocessing and the archive is removed.
use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use tracing::{info, warn};

use crate::{
    constants::{CLEANED_SUFFIX, GZ_EXTENSION, TAR_GZ_EXTENSION, UFA_SUFFIX},
    env_state::XtiEnv,
    xtipipe_errors::XtiPipeError,
};

fn with_suffix(path: &Utf8Path, suffix: &str) -> Utf8PathBuf {
    Utf8PathBuf::from(format!("{path}{suffix}"))
}

/// Compress `path` into `path.gz` and remove `path`.
pub fn gzip_file(path: &Utf8Path) -> Result<Utf8PathBuf, XtiPipeError> {
    let target = with_suffix(path, GZ_EXTENSION);
    let part = with_suffix(&target, ".part");

    let result = (|| -> Result<(), XtiPipeError> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut encoder = GzEncoder::new(BufWriter::new(File::create(&part)?), Compression::default());
        io::copy(&mut reader, &mut encoder)?;
        encoder.finish()?.flush()?;
        Ok(())
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&part);
        return Err(e);
    }

    fs::rename(&part, &target)?;
    fs::remove_file(path)?;
    Ok(target)
}

/// Decompress `path` (ending in `.gz`) next to it and remove `path`.
pub fn gunzip_file(path: &Utf8Path) -> Result<Utf8PathBuf, XtiPipeError> {
    let Some(stem) = path.as_str().strip_suffix(GZ_EXTENSION) else {
        return Err(XtiPipeError::IoError(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{path} is not a {GZ_EXTENSION} file"),
        )));
    };
    let target = Utf8PathBuf::from(stem);
    let part = with_suffix(&target, ".part");

    let result = (|| -> Result<(), XtiPipeError> {
        let mut decoder = GzDecoder::new(BufReader::new(File::open(path)?));
        let mut writer = BufWriter::new(File::create(&part)?);
        io::copy(&mut decoder, &mut writer)?;
        writer.flush()?;
        Ok(())
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&part);
        return Err(e);
    }

    fs::rename(&part, &target)?;
    fs::remove_file(path)?;
    Ok(target)
}

/// Unpack the gzip compressed tar archive `path` into its directory and
/// remove `path`.
///
/// The archive is kept when unpacking fails; members already written stay.
pub fn extract_tar(path: &Utf8Path) -> Result<Utf8PathBuf, XtiPipeError> {
    let dest = path.parent().unwrap_or(Utf8Path::new("."));
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(File::open(path)?)));
    archive.unpack(dest)?;
    fs::remove_file(path)?;
    Ok(path.to_path_buf())
}

/// Whether a file of an event directory belongs to a compressed product group.
pub fn is_compressible(name: &str) -> bool {
    name.ends_with(UFA_SUFFIX) || (name.starts_with("ni") && name.ends_with(CLEANED_SUFFIX))
}

fn dir_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, XtiPipeError> {
    let mut files = Vec::new();
    for entry in dir.read_dir_utf8()? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn run_jobs(
    env: &XtiEnv,
    files: Vec<Utf8PathBuf>,
    job: fn(&Utf8Path) -> Result<Utf8PathBuf, XtiPipeError>,
) -> Result<Vec<Utf8PathBuf>, XtiPipeError> {
    let jobs: Vec<_> = files
        .into_iter()
        .map(|file| move || (job(&file), file))
        .collect();

    let mut done = Vec::new();
    for (result, file) in env.run_bounded(jobs)? {
        match result {
            Ok(path) => done.push(path),
            Err(e) => warn!("Unable to process {file}: {e}"),
        }
    }
    done.sort();
    Ok(done)
}

/// Compress the product groups of an event directory.
///
/// Arguments
/// -----------------
/// * `env`: worker pool.
/// * `event_dir`: the `xti/event_cl` directory of a dataset.
///
/// Return
/// ----------
/// * The `.gz` files written; a file that fails is reported and kept as is.
pub fn compress_products(env: &XtiEnv, event_dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, XtiPipeError> {
    let files: Vec<_> = dir_files(event_dir)?
        .into_iter()
        .filter(|f| f.file_name().is_some_and(is_compressible))
        .collect();
    info!("Compressing {} files in {event_dir}", files.len());
    run_jobs(env, files, gzip_file)
}

/// Restore the compressed members of an event directory.
///
/// `*.tar.gz` archives are unpacked first, then every `*.evt.gz` member,
/// including those an archive held, is decompressed. A directory without
/// compressed members is not an error.
///
/// Return
/// ----------
/// * The archives unpacked followed by the files decompressed; a member that
///   fails is reported and kept as is.
pub fn decompress_members(
    env: &XtiEnv,
    event_dir: &Utf8Path,
) -> Result<Vec<Utf8PathBuf>, XtiPipeError> {
    let archives: Vec<_> = dir_files(event_dir)?
        .into_iter()
        .filter(|f| f.as_str().ends_with(TAR_GZ_EXTENSION))
        .collect();
    let mut restored = Vec::new();
    if !archives.is_empty() {
        info!("Extracting {} archives in {event_dir}", archives.len());
        restored = run_jobs(env, archives, extract_tar)?;
    }

    let members: Vec<_> = dir_files(event_dir)?
        .into_iter()
        .filter(|f| f.as_str().ends_with(".evt.gz"))
        .collect();
    if !members.is_empty() {
        info!("Decompressing {} files in {event_dir}", members.len());
        restored.extend(run_jobs(env, members, gunzip_file)?);
    }
    Ok(restored)
}

#[cfg(test)]
mod compress_test {
    use crate::settings::AppConfig;

    use super::*;

    #[test]
    fn test_gzip_roundtrip_removes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let base = Utf8Path::from_path(dir.path()).unwrap();
        let original = base.join("ni3013010102_0mpu7_cl.evt");
        let content: Vec<u8> = (0..20_000u32).flat_map(|i| i.to_le_bytes()).collect();
        fs::write(&original, &content).unwrap();

        let gz = gzip_file(&original).unwrap();
        assert!(!original.exists());
        assert!(gz.exists());

        let restored = gunzip_file(&gz).unwrap();
        assert_eq!(restored, original);
        assert!(!gz.exists());
        assert_eq!(fs::read(&restored).unwrap(), content);
        assert_eq!(dir_files(base).unwrap(), vec![original]);
    }

    #[test]
    fn test_gzip_missing_source_leaves_no_part() {
        let dir = tempfile::tempdir().unwrap();
        let base = Utf8Path::from_path(dir.path()).unwrap();
        assert!(gzip_file(&base.join("missing.evt")).is_err());
        assert!(dir_files(base).unwrap().is_empty());
    }

    #[test]
    fn test_compressible_groups() {
        assert!(is_compressible("ni3013010102_0mpu7_ufa.evt"));
        assert!(is_compressible("ni3013010102_0mpu7_cl.evt"));
        assert!(!is_compressible("bc3013010102_0mpu7_cl.evt"));
        assert!(!is_compressible("ni3013010102.mkf"));
        assert!(!is_compressible("ni3013010102_0mpu7_cl.evt.gz"));
    }

    #[test]
    fn test_compress_and_decompress_directory() {
        let env = XtiEnv::new(&AppConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let event_dir = Utf8Path::from_path(dir.path()).unwrap();
        for name in [
            "ni3013010102_0mpu7_ufa.evt",
            "ni3013010102_0mpu7_cl.evt",
            "bc3013010102_0mpu7_cl.evt",
        ] {
            fs::write(event_dir.join(name), name.as_bytes()).unwrap();
        }
        // not a gzip stream, reported and kept
        fs::write(event_dir.join("old_products.tar.gz"), b"tar").unwrap();

        let compressed = compress_products(&env, event_dir).unwrap();
        assert_eq!(compressed.len(), 2);
        assert!(event_dir.join("bc3013010102_0mpu7_cl.evt").exists());
        assert!(event_dir.join("ni3013010102_0mpu7_cl.evt.gz").exists());

        let restored = decompress_members(&env, event_dir).unwrap();
        assert_eq!(restored.len(), 2);
        assert!(event_dir.join("old_products.tar.gz").exists());
        assert!(decompress_members(&env, event_dir).unwrap().is_empty());
    }

    fn write_tar_gz(path: &Utf8Path, members: &[(&str, &[u8])]) {
        let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *content).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_tar_members_are_extracted() {
        let env = XtiEnv::new(&AppConfig::default()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let event_dir = Utf8Path::from_path(dir.path()).unwrap();
        let archive = event_dir.join("ni3013010102_0mpu7.tar.gz");

        let original = event_dir.join("ni3013010102_0mpu7_ufa.evt");
        fs::write(&original, b"merged").unwrap();
        let gz = gzip_file(&original).unwrap();
        let packed = fs::read(&gz).unwrap();
        fs::remove_file(&gz).unwrap();
        write_tar_gz(
            &archive,
            &[
                ("ni3013010102_0mpu7_cl.evt", &b"cleaned"[..]),
                ("ni3013010102_0mpu7_ufa.evt.gz", packed.as_slice()),
            ],
        );

        let restored = decompress_members(&env, event_dir).unwrap();
        assert_eq!(restored, vec![archive.clone(), original.clone()]);
        assert!(!archive.exists());
        assert_eq!(
            fs::read(event_dir.join("ni3013010102_0mpu7_cl.evt")).unwrap(),
            b"cleaned"
        );
        assert_eq!(fs::read(&original).unwrap(), b"merged");
        assert!(decompress_members(&env, event_dir).unwrap().is_empty());
    }
}
