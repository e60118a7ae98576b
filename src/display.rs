//! # Tabular display of the queue and run settings
//!
//! Renderers used by the `sel` and `settings` commands and by the dataset
//! inspection summary. Each builds a [`comfy-table`] table and returns it as
//! a `String`, so the caller decides on which channel it goes.
//!
//! [`comfy-table`]: https://crates.io/crates/comfy-table
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Table};

use crate::{
    dataset::{batch::BatchReport, reprocess::ReprocessOutcome},
    queue::ObservationQueue,
    settings::Settings,
};

fn base_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.iter().map(|h| Cell::new(h)));
    table
}

/// Render the queued observations, one row per entry in processing order.
pub fn queue_table(queue: &ObservationQueue) -> String {
    let mut table = base_table(&["#", "OBSID", "Archive", "RA [deg]", "DEC [deg]"]);
    for (index, entry) in queue.entries().iter().enumerate() {
        let archive = entry
            .epoch
            .as_ref()
            .map(|e| e.folder())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(index + 1).set_alignment(CellAlignment::Right),
            Cell::new(&entry.obsid),
            Cell::new(archive),
            Cell::new(format!("{:.5}", entry.ra)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.5}", entry.dec)).set_alignment(CellAlignment::Right),
        ]);
    }
    table.to_string()
}

/// Render the current run configuration.
pub fn settings_table(settings: &Settings) -> String {
    let mut table = base_table(&["Setting", "Value"]);
    let target = settings.target.as_deref().unwrap_or("-");
    table.add_row(vec!["Target", target]);
    table.add_row(vec![
        "Barycenter Correction".to_string(),
        settings.barycorr.to_string(),
    ]);
    table.add_row(vec![".gz compression".to_string(), settings.compress.to_string()]);
    table.add_row(vec!["Output Log".to_string(), settings.log.to_string()]);
    table.add_row(vec!["Output Directory".to_string(), settings.out_dir.to_string()]);
    table.to_string()
}

/// One row per inspected dataset: identifier, recorded calibration, state and action.
pub fn batch_table(report: &BatchReport) -> String {
    let mut table = base_table(&["Dataset", "OBSID", "CALDB", "Calibration", "Reprocess"]);
    for check in &report.checked {
        let caldb = check.metadata.caldb().unwrap_or("-");
        let state = check
            .calibration
            .as_ref()
            .map(|c| c.state.to_string())
            .unwrap_or_else(|| "-".to_string());
        let action = match &check.reprocess {
            None => "-".to_string(),
            Some(ReprocessOutcome::Passed) => "passed".to_string(),
            Some(ReprocessOutcome::CannotReprocess(_)) => "CANNOT REPROCESS".to_string(),
            Some(ReprocessOutcome::Reprocessed(entry)) => format!("done: {}", entry.product),
        };
        table.add_row(vec![
            check.root.to_string(),
            check.metadata.obsid.clone().unwrap_or_else(|| "-".to_string()),
            caldb.to_string(),
            state,
            action,
        ]);
    }
    for path in &report.skipped {
        table.add_row(vec![path.to_string(), "-".into(), "-".into(), "-".into(), "skipped".into()]);
    }
    for (path, e) in &report.failed {
        table.add_row(vec![path.to_string(), "-".into(), "-".into(), "-".into(), format!("failed: {e}")]);
    }
    table.to_string()
}

#[cfg(test)]
mod display_test {
    use crate::{
        queue::QueueEntry,
        settings::{LogTarget, Toggle},
        time::ArchiveMonth,
    };

    use super::*;

    #[test]
    fn test_queue_table_rows() {
        let mut queue = ObservationQueue::new();
        queue.push(QueueEntry::new(
            "3013010102",
            Some(ArchiveMonth::new(2020, 1)),
            83.63308,
            22.01449,
        ));
        queue.push(QueueEntry::new("1013010112", None, 83.0, 22.0));
        let rendered = queue_table(&queue);
        assert!(rendered.contains("3013010102"));
        assert!(rendered.contains("2020_01"));
        assert!(rendered.contains("83.63308"));
        assert!(rendered.contains("1013010112"));
    }

    #[test]
    fn test_settings_table() {
        let mut settings = Settings::new("/data");
        settings.target = Some("PSR_B0531+21".into());
        settings.barycorr = Toggle::Enabled;
        settings.compress = Toggle::Disabled;
        settings.log = LogTarget::Create("crab".into());
        let rendered = settings_table(&settings);
        assert!(rendered.contains("PSR_B0531+21"));
        assert!(rendered.contains("new crab.csv"));
    }

    #[test]
    fn test_batch_table() {
        let report = BatchReport {
            skipped: vec!["/data/notes.txt".into()],
            ..Default::default()
        };
        let rendered = batch_table(&report);
        assert!(rendered.contains("/data/notes.txt"));
        assert!(rendered.contains("skipped"));
    }
}
