//! # Dataset reprocessing
//!
//! Decision over one dataset directory:
//!
//! 1. calibration found current: explicit pass,
//! 2. metadata recorded a blocking issue: `CANNOT REPROCESS`, nothing runs,
//! 3. otherwise the compressed members are restored, the observation is
//!    rebuilt from the recovered metadata and reduced again in place.
//!
//! The correction is applied again when it had been applied before or is
//! requested now; compression likewise.
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use tracing::{error, info};

use crate::{
    compress::decompress_members,
    env_state::XtiEnv,
    pipeline::{reduce_dataset, EntryReport, PipelineOptions},
    tools::ToolRunner,
    xtipipe_errors::XtiPipeError,
};

use super::{
    calibration::{check_calibration, CalibrationReport, CalibrationState},
    metadata::{DatasetMetadata, MetadataIssue},
    Dataset,
};

/// What the operator asked for on top of the dataset history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatasetActions {
    pub check_calibration: bool,
    pub reprocess: bool,
    /// Correction requested for this run.
    pub barycorr: bool,
    /// Compression requested for this run.
    pub compress: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReprocessOutcome {
    Passed,
    CannotReprocess(Vec<MetadataIssue>),
    Reprocessed(EntryReport),
}

/// Result of inspecting one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetCheck {
    pub root: Utf8PathBuf,
    pub metadata: DatasetMetadata,
    pub calibration: Option<CalibrationReport>,
    pub reprocess: Option<ReprocessOutcome>,
}

/// Reprocess `dataset` unless its calibration is known to be current.
///
/// Arguments
/// -----------------
/// * `env`: worker pool for decompression and compression.
/// * `tools`: the external tool runner.
/// * `dataset`: the dataset, also working directory of the tools.
/// * `metadata`: metadata freshly extracted from `dataset`.
/// * `calibration`: outcome of the calibration check, if one ran.
/// * `actions`: the correction and compression requests.
///
/// Return
/// ----------
/// * The [`ReprocessOutcome`]; tool failures are returned as errors.
pub fn reprocess(
    env: &XtiEnv,
    tools: &ToolRunner,
    dataset: &Dataset,
    metadata: &DatasetMetadata,
    calibration: Option<&CalibrationReport>,
    actions: DatasetActions,
) -> Result<ReprocessOutcome, XtiPipeError> {
    let name = metadata.obsid.as_deref().unwrap_or(dataset.root().as_str());

    if calibration.is_some_and(|c| c.state == CalibrationState::Current) {
        info!("Passing reprocess of {name}: calibration up to date");
        return Ok(ReprocessOutcome::Passed);
    }

    let entry = match metadata.queue_entry() {
        Some(entry) if !metadata.is_blocked() => entry,
        _ => {
            error!("CANNOT REPROCESS {name}: {}", metadata.issues.iter().join("; "));
            info!("Consider downloading this observation again, or running the reduction manually");
            return Ok(ReprocessOutcome::CannotReprocess(metadata.issues.clone()));
        }
    };

    info!("Reprocessing {} in {}", entry.obsid, dataset.root());
    let restored = decompress_members(env, &dataset.event_dir())?;
    let options = PipelineOptions {
        barycorr: actions.barycorr || metadata.correction_applied,
        compress: actions.compress || !restored.is_empty(),
    };
    let report = reduce_dataset(env, tools, dataset.root(), &entry, options)?;
    info!("Reprocessed {} into {}", entry.obsid, report.product);
    Ok(ReprocessOutcome::Reprocessed(report))
}

/// Inspect one dataset directory: extract its metadata, check its
/// calibration when `reference` is given, and reprocess it when asked.
pub fn inspect_dataset(
    env: &XtiEnv,
    tools: &ToolRunner,
    root: &Utf8Path,
    reference: Option<&str>,
    actions: DatasetActions,
) -> Result<DatasetCheck, XtiPipeError> {
    let dataset = Dataset::open(root)?;
    let metadata = DatasetMetadata::extract(&dataset)?;
    if let Some(obsid) = &metadata.obsid {
        info!(
            "Dataset {root}: OBS_ID {obsid}, target {}",
            metadata.target.as_deref().unwrap_or("unavailable")
        );
    }

    let calibration = match (actions.check_calibration, reference) {
        (true, Some(reference)) => Some(check_calibration(&metadata, reference)),
        _ => None,
    };
    if let Some(report) = &calibration {
        info!("Calibration of {root} is {}", report.state);
    }

    let outcome = if actions.reprocess {
        Some(reprocess(
            env,
            tools,
            &dataset,
            &metadata,
            calibration.as_ref(),
            actions,
        )?)
    } else {
        None
    };

    Ok(DatasetCheck {
        root: root.to_path_buf(),
        metadata,
        calibration,
        reprocess: outcome,
    })
}

#[cfg(all(test, unix))]
mod reprocess_test {
    use std::fs;

    use flate2::{write::GzEncoder, Compression};

    use crate::{
        dataset::test_fits::{fits_bytes, write_fits},
        settings::{AppConfig, ToolCommand},
    };

    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        root: Utf8PathBuf,
        marker: Utf8PathBuf,
        env: XtiEnv,
        tools: ToolRunner,
    }

    /// Dataset with a fake reduction tool touching a marker file.
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let base = Utf8Path::from_path(dir.path()).unwrap().to_path_buf();
        let root = base.join("crab_2020");
        fs::create_dir_all(root.join("xti/event_cl")).unwrap();
        let marker = base.join("reduced");
        let script = base.join("reduce.sh");
        fs::write(&script, format!("echo \"$@\" > {marker}\n")).unwrap();

        let mut config = AppConfig::default();
        config.tools.reduction = ToolCommand::parse(&format!("sh {script}"));
        Fixture {
            _dir: dir,
            root,
            marker,
            env: XtiEnv::new(&config).unwrap(),
            tools: ToolRunner::new(&config),
        }
    }

    fn primary() -> Vec<(&'static str, &'static str)> {
        vec![
            ("OBS_ID", "'3013010102'"),
            ("RA_OBJ", "83.63308"),
            ("DEC_OBJ", "22.01450"),
        ]
    }

    fn all_actions() -> DatasetActions {
        DatasetActions {
            check_calibration: true,
            reprocess: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_current_dataset_passes() {
        let fx = fixture();
        write_fits(
            &fx.root.join("xti/event_cl/ni3013010102_0mpu7_cl.evt"),
            &primary(),
            &[("CALDBVER", "'xti20240206'")],
        );

        let check =
            inspect_dataset(&fx.env, &fx.tools, &fx.root, Some("xti20240206"), all_actions()).unwrap();
        assert_eq!(check.reprocess, Some(ReprocessOutcome::Passed));
        assert!(!fx.marker.exists());
    }

    #[test]
    fn test_missing_obsid_cannot_reprocess() {
        let fx = fixture();
        write_fits(
            &fx.root.join("xti/event_cl/ni3013010102_0mpu7_cl.evt"),
            &[("RA_OBJ", "83.63308"), ("DEC_OBJ", "22.01450")],
            &[("CALDBVER", "'xti20200722'")],
        );

        let check =
            inspect_dataset(&fx.env, &fx.tools, &fx.root, Some("xti20240206"), all_actions()).unwrap();
        assert!(matches!(
            check.reprocess,
            Some(ReprocessOutcome::CannotReprocess(_))
        ));
        assert!(!fx.marker.exists());
    }

    #[test]
    fn test_stale_compressed_dataset_is_reprocessed() {
        let fx = fixture();
        let gz = fx.root.join("xti/event_cl/ni3013010102_0mpu7_cl.evt.gz");
        let mut encoder = GzEncoder::new(fs::File::create(&gz).unwrap(), Compression::default());
        std::io::Write::write_all(
            &mut encoder,
            &fits_bytes(&primary(), &[("CALDBVER", "'xti20200722'")]),
        )
        .unwrap();
        encoder.finish().unwrap();

        let check =
            inspect_dataset(&fx.env, &fx.tools, &fx.root, Some("xti20240206"), all_actions()).unwrap();
        assert_eq!(
            check.calibration.map(|c| c.state),
            Some(CalibrationState::Stale)
        );
        let Some(ReprocessOutcome::Reprocessed(report)) = check.reprocess else {
            panic!("dataset not reprocessed: {:?}", check.reprocess);
        };
        assert_eq!(report.obsid, "3013010102");
        assert_eq!(
            fs::read_to_string(&fx.marker).unwrap().trim(),
            format!("indir={} clobber=yes", fx.root)
        );
        // restored, then compressed again
        assert!(gz.exists());
        assert_eq!(report.product, gz);
    }

    #[test]
    fn test_no_check_without_reference() {
        let fx = fixture();
        write_fits(
            &fx.root.join("xti/event_cl/ni3013010102_0mpu7_cl.evt"),
            &primary(),
            &[],
        );
        let actions = DatasetActions {
            check_calibration: true,
            ..Default::default()
        };
        let check = inspect_dataset(&fx.env, &fx.tools, &fx.root, None, actions).unwrap();
        assert!(check.calibration.is_none());
        assert!(check.reprocess.is_none());
        assert_eq!(check.metadata.obsid.as_deref(), Some("3013010102"));
    }
}
