#![cfg(unix)]

mod common;

use std::fs::File;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::{write::GzEncoder, Compression};
use xtipipe::{
    archive::mirror::MirrorArchive,
    catalog::resolver::TableFileResolver,
    dataset::{
        batch::resolve_inlist,
        calibration::CalibrationState,
        reprocess::{DatasetActions, ReprocessOutcome},
    },
    settings::{LogTarget, Settings, Toggle},
    xtipipe::XtiPipe,
};

use common::{
    fake_tools, names_ending, reduction_calls, utf8_root, write_catalog, write_crab_event,
    write_fits, write_mirror, CALDB, OBSID,
};

const NEW_CALDB: &str = "xti20250715";

fn check_and_reprocess() -> DatasetActions {
    DatasetActions {
        check_calibration: true,
        reprocess: true,
        ..Default::default()
    }
}

/// Inspection session whose version query answers `caldb`.
fn inspector(root: &Utf8Path, caldb: &str) -> XtiPipe {
    let config = fake_tools(&root.join("tools"), &root.join("template.evt"), caldb);
    XtiPipe::new(config, Settings::new(root.join("out"))).unwrap()
}

/// Download and reduce `OBSID` with compression on, logging to `out/crab_run.csv`.
fn processed_workspace() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_root(&dir);
    write_mirror(&root.join("mirror"), OBSID);
    write_catalog(&root.join("crab.csv"), &[(OBSID, 56300.5)]);
    write_crab_event(&root.join("template.evt"), CALDB);

    let config = fake_tools(&root.join("tools"), &root.join("template.evt"), CALDB);
    let mut settings = Settings::new(root.join("out"));
    settings.target = Some("PSR_B0531+21".into());
    settings.barycorr = Toggle::Disabled;
    settings.compress = Toggle::Enabled;
    settings.log = LogTarget::Create("crab_run".into());
    let pipe = XtiPipe::new(config, settings)
        .unwrap()
        .with_resolver(Box::new(TableFileResolver::new(root.join("crab.csv"))))
        .with_archive(Box::new(MirrorArchive::new(root.join("mirror"))));

    let mut interpreter = pipe.interpreter().unwrap();
    interpreter.dispatch(OBSID);
    let report = pipe.process_queue(interpreter.queue());
    assert!(report.is_success(), "{:?}", report.failed);
    (dir, root)
}

#[test]
fn test_logged_dataset_is_reprocessed_after_caldb_update() {
    let (_dir, root) = processed_workspace();
    let datasets = resolve_inlist(&[root.join("out/crab_run.csv").to_string()]).unwrap();
    assert_eq!(datasets, vec![root.join("out").join(OBSID)]);

    let pipe = inspector(&root, NEW_CALDB);
    let report = pipe.inspect(&datasets, check_and_reprocess()).unwrap();
    assert!(report.failed.is_empty());
    assert_eq!(report.checked.len(), 1);

    let check = &report.checked[0];
    assert_eq!(check.metadata.obsid.as_deref(), Some(OBSID));
    assert_eq!(check.metadata.caldb(), Some(CALDB));
    let calibration = check.calibration.as_ref().unwrap();
    assert_eq!(calibration.reference, NEW_CALDB);
    assert_eq!(calibration.state, CalibrationState::Stale);

    let Some(ReprocessOutcome::Reprocessed(entry)) = &check.reprocess else {
        panic!("dataset not reprocessed: {:?}", check.reprocess);
    };
    let event_dir = root.join("out").join(OBSID).join("xti/event_cl");
    assert_eq!(
        entry.product,
        event_dir.join(format!("ni{OBSID}_0mpu7_cl.evt.gz"))
    );
    // compressed members were restored, then compressed again
    assert!(names_ending(&event_dir, "cl.evt").is_empty());
    assert_eq!(names_ending(&event_dir, ".gz").len(), 2);
    assert_eq!(reduction_calls(&root.join("tools")), 2);
}

#[test]
fn test_current_dataset_is_passed() {
    let (_dir, root) = processed_workspace();
    let pipe = inspector(&root, CALDB);
    let report = pipe
        .inspect(&[root.join("out").join(OBSID)], check_and_reprocess())
        .unwrap();

    let check = &report.checked[0];
    assert_eq!(
        check.calibration.as_ref().map(|c| c.state),
        Some(CalibrationState::Current)
    );
    assert_eq!(check.reprocess, Some(ReprocessOutcome::Passed));
    assert_eq!(reduction_calls(&root.join("tools")), 1);
}

#[test]
fn test_check_only_never_reduces() {
    let (_dir, root) = processed_workspace();
    let pipe = inspector(&root, NEW_CALDB);
    let actions = DatasetActions {
        check_calibration: true,
        ..Default::default()
    };
    let report = pipe
        .inspect(&[root.join("out").join(OBSID)], actions)
        .unwrap();

    let check = &report.checked[0];
    assert_eq!(
        check.calibration.as_ref().map(|c| c.state),
        Some(CalibrationState::Stale)
    );
    assert!(check.reprocess.is_none());
    assert_eq!(reduction_calls(&root.join("tools")), 1);
}

#[test]
fn test_dataset_without_obsid_cannot_be_reprocessed() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_root(&dir);
    let dataset = root.join("unknown_obs");
    write_fits(
        &dataset.join("xti/event_cl/ni3013010102_0mpu7_cl.evt"),
        &[("RA_OBJ", "83.63308"), ("DEC_OBJ", "22.01450")],
        &[("CALDBVER", "'xti20200722'")],
    );
    write_crab_event(&root.join("template.evt"), CALDB);

    let pipe = inspector(&root, NEW_CALDB);
    let report = pipe
        .inspect(&[dataset.clone(), root.join("missing")], check_and_reprocess())
        .unwrap();
    assert_eq!(report.skipped, vec![root.join("missing")]);
    assert!(matches!(
        report.checked[0].reprocess,
        Some(ReprocessOutcome::CannotReprocess(_))
    ));
    assert_eq!(reduction_calls(&root.join("tools")), 0);
}

#[test]
fn test_unidentified_calibration_is_reprocessed() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_root(&dir);
    let dataset = root.join(OBSID);
    let event_dir = dataset.join("xti/event_cl");
    let unversioned = event_dir.join(format!("ni{OBSID}_0mpu7_cl.evt"));
    write_fits(
        &unversioned,
        &[
            ("OBS_ID", "'3013010102'"),
            ("RA_OBJ", "83.63308"),
            ("DEC_OBJ", "22.01450"),
            ("DATE-OBS", "'2013-01-20T03:10:00'"),
        ],
        &[],
    );
    // up to date, but never examined once the first file fails
    write_crab_event(&event_dir.join(format!("ni{OBSID}_0mpu8_cl.evt")), NEW_CALDB);
    write_crab_event(&root.join("template.evt"), CALDB);

    let pipe = inspector(&root, NEW_CALDB);
    let report = pipe.inspect(&[dataset], check_and_reprocess()).unwrap();
    assert!(report.failed.is_empty());

    let check = &report.checked[0];
    assert!(!check.metadata.is_blocked());
    let calibration = check.calibration.as_ref().unwrap();
    assert_eq!(calibration.state, CalibrationState::Unknown);
    assert_eq!(calibration.unreadable, Some(unversioned));
    assert!(calibration.files.is_empty());

    assert!(matches!(
        check.reprocess,
        Some(ReprocessOutcome::Reprocessed(_))
    ));
    assert_eq!(reduction_calls(&root.join("tools")), 1);
    // nothing was compressed before, nothing is compressed after
    assert!(names_ending(&event_dir, ".gz").is_empty());
}

#[test]
fn test_tar_members_count_as_compressed() {
    let dir = tempfile::tempdir().unwrap();
    let root = utf8_root(&dir);
    let dataset = root.join(OBSID);
    let event_dir = dataset.join("xti/event_cl");
    write_crab_event(&event_dir.join(format!("ni{OBSID}_0mpu7_cl.evt")), CALDB);
    write_crab_event(&root.join("template.evt"), NEW_CALDB);

    let archive = event_dir.join(format!("ni{OBSID}_0mpu7.tar.gz"));
    let encoder = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let content = b"merged";
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, format!("ni{OBSID}_0mpu7_ufa.evt"), &content[..])
        .unwrap();
    builder.into_inner().unwrap().finish().unwrap();

    let pipe = inspector(&root, NEW_CALDB);
    let report = pipe.inspect(&[dataset], check_and_reprocess()).unwrap();
    let check = &report.checked[0];
    assert_eq!(
        check.calibration.as_ref().map(|c| c.state),
        Some(CalibrationState::Stale)
    );
    assert!(matches!(
        check.reprocess,
        Some(ReprocessOutcome::Reprocessed(_))
    ));

    assert!(!archive.exists());
    assert_eq!(
        names_ending(&event_dir, ".gz"),
        vec![
            format!("ni{OBSID}_0mpu7_cl.evt.gz"),
            format!("ni{OBSID}_0mpu7_ufa.evt.gz"),
        ]
    );
}
