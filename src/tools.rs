//! # External tools
//!
//! Blocking invocations of the HEASoft tools doing the scientific work:
//!
//! * reduction (`nicerl2 indir=<dataset> clobber=yes`),
//! * barycenter correction (`barycorr infile=... outfile=... orbitfiles=...`),
//! * calibration database version query (`nicaldbver`).
//!
//! Every call gets the dataset directory as explicit working directory; the
//! process working directory is never changed. Only the exit status is
//! consulted, except for the version query whose first stdout line is the
//! answer.
use std::process;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::info;

use crate::{
    archive::orbit_file,
    constants::EVENT_CL_DIR,
    queue::QueueEntry,
    settings::{AppConfig, ToolCommand, ToolConfig},
    xtipipe_errors::XtiPipeError,
};

/// `<dataset>/xti/event_cl`
pub fn event_dir(dataset: &Utf8Path) -> Utf8PathBuf {
    dataset.join(EVENT_CL_DIR)
}

/// Cleaned event file written by the reduction.
pub fn cleaned_event(dataset: &Utf8Path, obsid: &str) -> Utf8PathBuf {
    event_dir(dataset).join(format!("ni{obsid}_0mpu7_cl.evt"))
}

/// Barycenter-corrected copy of [`cleaned_event`].
pub fn corrected_event(dataset: &Utf8Path, obsid: &str) -> Utf8PathBuf {
    event_dir(dataset).join(format!("bc{obsid}_0mpu7_cl.evt"))
}

#[derive(Debug, Clone)]
pub struct ToolRunner {
    tools: ToolConfig,
    ephemeris: String,
    refframe: String,
}

impl ToolRunner {
    pub fn new(config: &AppConfig) -> Self {
        ToolRunner {
            tools: config.tools.clone(),
            ephemeris: config.ephemeris.clone(),
            refframe: config.refframe.clone(),
        }
    }

    /// Run the reduction over one dataset directory.
    pub fn reduce(&self, dataset: &Utf8Path) -> Result<(), XtiPipeError> {
        let indir = format!("indir={dataset}");
        info!("Running {} on {dataset}", self.tools.reduction.display_name());
        run_cmd(&self.tools.reduction, &[indir.as_str(), "clobber=yes"], dataset)
    }

    /// Apply the barycenter correction to the cleaned events of `entry`.
    ///
    /// Arguments
    /// -----------------
    /// * `dataset`: the dataset directory.
    /// * `entry`: provides the identifier and the source coordinates.
    ///
    /// Return
    /// ----------
    /// * The path of the corrected event file, distinct from the input.
    pub fn barycorr(
        &self,
        dataset: &Utf8Path,
        entry: &QueueEntry,
    ) -> Result<Utf8PathBuf, XtiPipeError> {
        let obsid = entry.obsid.as_str();
        let outfile = corrected_event(dataset, obsid);
        let args = [
            format!("infile={}", cleaned_event(dataset, obsid)),
            format!("outfile={outfile}"),
            format!("orbitfiles={}", orbit_file(dataset, obsid)),
            format!("refframe={}", self.refframe),
            format!("ra={}", entry.ra),
            format!("dec={}", entry.dec),
            format!("ephem={}", self.ephemeris),
            "clobber=yes".to_string(),
        ];
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        info!("Running {} on {obsid}", self.tools.correction.display_name());
        run_cmd(&self.tools.correction, &args, dataset)?;
        Ok(outfile)
    }

    /// Currently installed calibration database version.
    pub fn caldb_version(&self) -> Result<String, XtiPipeError> {
        let stdout = run_cmd_output(&self.tools.caldb_query, &[])?;
        let tool = self.tools.caldb_query.display_name();
        stdout
            .lines()
            .map(str::trim)
            .next()
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or(XtiPipeError::ToolOutput {
                tool,
                reason: "empty version output".to_string(),
            })
    }
}

fn command(tool: &ToolCommand, args: &[&str]) -> process::Command {
    let mut cmd = process::Command::new(&tool.program);
    cmd.args(&tool.args).args(args);
    cmd
}

fn spawn_error(tool: &ToolCommand, e: std::io::Error) -> XtiPipeError {
    XtiPipeError::ToolOutput {
        tool: tool.display_name(),
        reason: format!("failed to run {}: {e}", tool.program),
    }
}

/// Run a tool in `cwd`, returning an error if it fails.
fn run_cmd(tool: &ToolCommand, args: &[&str], cwd: &Utf8Path) -> Result<(), XtiPipeError> {
    let status = command(tool, args)
        .current_dir(cwd)
        .status()
        .map_err(|e| spawn_error(tool, e))?;

    if status.success() {
        Ok(())
    } else {
        Err(XtiPipeError::ToolFailed {
            tool: tool.display_name(),
            code: status.code().unwrap_or(-1),
        })
    }
}

/// Run a tool, capturing its stdout.
fn run_cmd_output(tool: &ToolCommand, args: &[&str]) -> Result<String, XtiPipeError> {
    let output = command(tool, args)
        .output()
        .map_err(|e| spawn_error(tool, e))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        Err(XtiPipeError::ToolFailed {
            tool: tool.display_name(),
            code: output.status.code().unwrap_or(-1),
        })
    }
}
