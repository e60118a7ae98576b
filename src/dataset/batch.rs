//! # Batch of datasets
//!
//! Resolution of the `--inlist` arguments into dataset directories, then
//! inspection of each of them.
//!
//! * A single argument naming a processing log (CSV with an `Input` column)
//!   gives one dataset per row, the part of `Input` before `/xti/event_cl/`.
//! * Any other argument is a directory, or a pattern with `*` / `?` in its
//!   last component matched against the entries of its parent directory.
//!
//! One dataset failing never stops the batch.
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use regex::Regex;
use tracing::{error, info, warn};

use crate::{
    env_state::XtiEnv, manifest::Manifest, tools::ToolRunner, xtipipe_errors::XtiPipeError,
};

use super::reprocess::{inspect_dataset, DatasetActions, DatasetCheck};

const EVENT_SEGMENT: &str = "/xti/event_cl/";

#[derive(Debug, Default)]
pub struct BatchReport {
    pub checked: Vec<DatasetCheck>,
    pub skipped: Vec<Utf8PathBuf>,
    pub failed: Vec<(Utf8PathBuf, XtiPipeError)>,
}

/// Dataset directory of a logged product path.
fn dataset_of(input: &str) -> Utf8PathBuf {
    match input.split_once(EVENT_SEGMENT) {
        Some((root, _)) => Utf8PathBuf::from(root),
        None => Utf8PathBuf::from(input),
    }
}

fn is_pattern(arg: &str) -> bool {
    Utf8Path::new(arg)
        .file_name()
        .is_some_and(|name| name.contains(['*', '?']))
}

/// Anchored regex equivalent of a `*` / `?` file name pattern.
pub(crate) fn pattern_regex(pattern: &str) -> Result<Regex, XtiPipeError> {
    let body: String = pattern
        .chars()
        .map(|c| match c {
            '*' => "[^/]*".to_string(),
            '?' => "[^/]".to_string(),
            c => regex::escape(&c.to_string()),
        })
        .collect();
    Ok(Regex::new(&format!("^{body}$"))?)
}

/// Entries of the parent directory of `pattern` matching its last component.
fn expand_pattern(pattern: &str) -> Result<Vec<Utf8PathBuf>, XtiPipeError> {
    let path = Utf8Path::new(pattern);
    let name = path.file_name().unwrap_or_default();
    let parent = match path.parent() {
        Some(p) if !p.as_str().is_empty() => p,
        _ => Utf8Path::new("."),
    };
    if !parent.is_dir() {
        return Ok(Vec::new());
    }

    let matcher = pattern_regex(name)?;
    let mut matches = Vec::new();
    for entry in parent.read_dir_utf8()? {
        let entry = entry?;
        if matcher.is_match(entry.file_name()) {
            matches.push(entry.into_path());
        }
    }
    Ok(matches.into_iter().sorted().collect())
}

/// Resolve the `--inlist` arguments.
///
/// Return
/// ------
/// * The candidate dataset directories, empty when nothing matched, or
///   [`XtiPipeError::ManifestFormat`] for a CSV without an `Input` column.
pub fn resolve_inlist(args: &[String]) -> Result<Vec<Utf8PathBuf>, XtiPipeError> {
    if let [single] = args {
        let path = Utf8Path::new(single);
        if path.is_file() {
            let rows = Manifest::load(path)?;
            info!("{} datasets listed in {path}", rows.len());
            return Ok(rows.iter().map(|row| dataset_of(&row.input)).collect());
        }
    }

    let mut candidates = Vec::new();
    for arg in args {
        if is_pattern(arg) {
            candidates.extend(expand_pattern(arg)?);
        } else if Utf8Path::new(arg).exists() {
            candidates.push(Utf8PathBuf::from(arg));
        } else {
            warn!("{arg} not found");
        }
    }
    if candidates.is_empty() {
        error!("DATASETS NOT FOUND");
    }
    Ok(candidates)
}

/// Inspect every dataset of a batch.
///
/// Arguments
/// -----------------
/// * `env`, `tools`: shared by every dataset.
/// * `datasets`: the resolved candidates; non-directories are skipped.
/// * `reference`: the calibration version, queried once for the batch.
/// * `actions`: what to do with each dataset.
pub fn run_batch(
    env: &XtiEnv,
    tools: &ToolRunner,
    datasets: &[Utf8PathBuf],
    reference: Option<&str>,
    actions: DatasetActions,
) -> BatchReport {
    let mut report = BatchReport::default();
    for root in datasets {
        if !root.is_dir() {
            warn!("{root} is not a directory! Passing...");
            report.skipped.push(root.clone());
            continue;
        }
        info!("{}", "-".repeat(60));
        info!("Inspecting {root}");
        match inspect_dataset(env, tools, root, reference, actions) {
            Ok(check) => report.checked.push(check),
            Err(e) => {
                error!("Unable to inspect {root}: {e}");
                report.failed.push((root.clone(), e));
            }
        }
    }
    report
}
