//! # Acquisition pipeline
//!
//! Sequential processing of a queue of observations. For each entry, in
//! queue order:
//!
//! 1. fetch the `xti`, `log` and `auxil` subtrees into `<base>/<obsid>`,
//! 2. check the download is complete ([`verify_complete`]),
//! 3. run the reduction,
//! 4. run the barycenter correction when enabled,
//! 5. compress the product groups when enabled,
//! 6. append a row to the processing log when one is configured.
//!
//! One observation is fully processed before the next starts. A failure is
//! fatal to its entry only: it is reported and recorded in the
//! [`PipelineReport`], and the next entry is processed.
//!
//! Steps 3 to 5 are exposed as [`reduce_dataset`] for the reprocessing of a
//! dataset already on disk.
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{error, info, warn};

use crate::{
    archive::{verify_complete, ArchivePath, ArchiveSource},
    compress::compress_products,
    constants::{ObsId, GZ_EXTENSION},
    env_state::XtiEnv,
    manifest::{LogRow, Manifest},
    queue::{ObservationQueue, QueueEntry},
    time::now_iso,
    tools::{cleaned_event, event_dir, ToolRunner},
    xtipipe_errors::XtiPipeError,
};

/// Optional stages, resolved from the run settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineOptions {
    pub barycorr: bool,
    pub compress: bool,
}

/// Result of processing one observation.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryReport {
    pub obsid: ObsId,
    /// Final path of the science product (corrected file when the correction ran).
    pub product: Utf8PathBuf,
    pub compressed: Vec<Utf8PathBuf>,
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub processed: Vec<EntryReport>,
    pub failed: Vec<(ObsId, XtiPipeError)>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct AcquisitionPipeline<'a> {
    env: &'a XtiEnv,
    archive: &'a dyn ArchiveSource,
    tools: &'a ToolRunner,
    base_dir: Utf8PathBuf,
    options: PipelineOptions,
    manifest: Option<Manifest>,
}

impl<'a> AcquisitionPipeline<'a> {
    pub fn new(
        env: &'a XtiEnv,
        archive: &'a dyn ArchiveSource,
        tools: &'a ToolRunner,
        base_dir: impl Into<Utf8PathBuf>,
        options: PipelineOptions,
    ) -> Self {
        AcquisitionPipeline {
            env,
            archive,
            tools,
            base_dir: base_dir.into(),
            options,
            manifest: None,
        }
    }

    pub fn with_manifest(mut self, manifest: Option<Manifest>) -> Self {
        self.manifest = manifest;
        self
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    /// Process every queued observation, in order.
    pub fn run(&mut self, queue: &ObservationQueue) -> PipelineReport {
        let mut report = PipelineReport::default();
        for entry in queue.entries() {
            info!("{}", "-".repeat(60));
            info!("Processing OBSID: {}", entry.obsid);
            info!("{}", "-".repeat(60));
            match self.process_entry(entry) {
                Ok(done) => report.processed.push(done),
                Err(e) => {
                    error!("OBSID {} not processed: {e}", entry.obsid);
                    report.failed.push((entry.obsid.clone(), e));
                }
            }
        }
        report
    }

    /// Fetch, reduce, correct, compress and log one observation.
    pub fn process_entry(&mut self, entry: &QueueEntry) -> Result<EntryReport, XtiPipeError> {
        self.fetch(entry)?;

        let dataset = self.base_dir.join(&entry.obsid);
        let report = reduce_dataset(self.env, self.tools, &dataset, entry, self.options)?;

        if let Some(manifest) = self.manifest.as_mut() {
            let caldb = self.tools.caldb_version()?;
            manifest.append(LogRow::new(&report.product, &entry.obsid, &caldb, &now_iso()?))?;
        }
        Ok(report)
    }

    fn fetch(&self, entry: &QueueEntry) -> Result<(), XtiPipeError> {
        let mut reports = Vec::new();
        for path in ArchivePath::for_entry(entry)? {
            info!("Downloading {} data...", path.subpath);
            let report = self.archive.fetch(&path, &self.base_dir)?;
            for failure in &report.failures {
                warn!("{}: {}", failure.source, failure.reason);
            }
            reports.push((path, report));
        }
        verify_complete(&entry.obsid, &self.base_dir, &reports, self.options.barycorr)
    }
}

/// Reduce a dataset in place, then correct and compress it as requested.
///
/// Arguments
/// -----------------
/// * `env`: worker pool used for the compression batch.
/// * `tools`: the external tool runner.
/// * `dataset`: dataset directory, also the working directory of the tools.
/// * `entry`: identifier and coordinates of the observation.
/// * `options`: which optional stages run.
///
/// Return
/// ----------
/// * The [`EntryReport`] naming the final science product.
pub fn reduce_dataset(
    env: &XtiEnv,
    tools: &ToolRunner,
    dataset: &Utf8Path,
    entry: &QueueEntry,
    options: PipelineOptions,
) -> Result<EntryReport, XtiPipeError> {
    tools.reduce(dataset)?;

    let mut product = cleaned_event(dataset, &entry.obsid);
    if options.barycorr {
        product = tools.barycorr(dataset, entry)?;
    }

    let compressed = if options.compress {
        compress_products(env, &event_dir(dataset))?
    } else {
        Vec::new()
    };
    let gz_product = Utf8PathBuf::from(format!("{product}{GZ_EXTENSION}"));
    if compressed.contains(&gz_product) {
        product = gz_product;
    }

    Ok(EntryReport {
        obsid: entry.obsid.clone(),
        product,
        compressed,
    })
}
