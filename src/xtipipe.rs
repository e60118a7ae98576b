//! # XtiPipe: session façade
//!
//! [`XtiPipe`] wires the pieces of one run together:
//!
//! 1. **Environment** ([`XtiEnv`]): HTTP client, runtime and worker pool bound.
//! 2. **Catalog**: resolved once for the settings target through a
//!    [`CatalogResolver`], then cached for the whole session.
//! 3. **Archive source** ([`ArchiveSource`]): where observations are fetched from.
//! 4. **Tools** ([`ToolRunner`]): reduction, correction and version query.
//!
//! The catalog is only resolved when the queue interaction starts, so the
//! dataset inspection modes never touch the catalog service.
//!
//! ## Typical usage
//!
//! ```rust, no_run
//! use xtipipe::settings::{AppConfig, Settings};
//! use xtipipe::xtipipe::XtiPipe;
//!
//! let mut settings = Settings::new("/data/nicer");
//! settings.target = Some("PSR_B0531+21".into());
//! let pipe = XtiPipe::new(AppConfig::default(), settings).unwrap();
//!
//! let mut interpreter = pipe.interpreter().unwrap();
//! interpreter.dispatch("3013010102");
//! let report = pipe.process_queue(interpreter.queue());
//! assert!(report.is_success());
//! ```
use camino::Utf8PathBuf;
use once_cell::sync::OnceCell;
use tracing::info;

use crate::{
    archive::{http::HttpArchive, ArchiveSource},
    catalog::{
        resolver::{CatalogResolver, HeasarcResolver, Target},
        Catalog,
    },
    dataset::{
        batch::{run_batch, BatchReport},
        reprocess::DatasetActions,
    },
    env_state::XtiEnv,
    interpreter::CommandInterpreter,
    manifest::Manifest,
    pipeline::{AcquisitionPipeline, PipelineOptions, PipelineReport},
    queue::ObservationQueue,
    settings::{AppConfig, Settings},
    tools::ToolRunner,
    xtipipe_errors::XtiPipeError,
};

pub struct XtiPipe {
    env: XtiEnv,
    config: AppConfig,
    settings: Settings,
    resolver: Box<dyn CatalogResolver>,
    archive: Box<dyn ArchiveSource>,
    tools: ToolRunner,
    catalog: OnceCell<Catalog>,
}

impl XtiPipe {
    /// Build a session querying HEASARC and downloading from the HTTPS archive.
    ///
    /// Arguments
    /// -----------------
    /// * `config`: the loaded [`AppConfig`].
    /// * `settings`: the per-run choices, prompts already resolved.
    ///
    /// Return
    /// ----------
    /// * The session, or an error if the environment cannot be built.
    pub fn new(config: AppConfig, settings: Settings) -> Result<Self, XtiPipeError> {
        let env = XtiEnv::new(&config)?;
        let resolver = HeasarcResolver::new(
            env.clone(),
            config.catalog_url.clone(),
            config.catalog_table.clone(),
        );
        let archive = HttpArchive::new(env.clone(), config.archive_url.clone());
        let tools = ToolRunner::new(&config);
        Ok(XtiPipe {
            env,
            config,
            settings,
            resolver: Box::new(resolver),
            archive: Box::new(archive),
            tools,
            catalog: OnceCell::new(),
        })
    }

    pub fn with_resolver(mut self, resolver: Box<dyn CatalogResolver>) -> Self {
        self.resolver = resolver;
        self.catalog = OnceCell::new();
        self
    }

    pub fn with_archive(mut self, archive: Box<dyn ArchiveSource>) -> Self {
        self.archive = archive;
        self
    }

    pub fn env(&self) -> &XtiEnv {
        &self.env
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn tools(&self) -> &ToolRunner {
        &self.tools
    }

    /// Catalog of the settings target, resolved on first use.
    pub fn catalog(&self) -> Result<&Catalog, XtiPipeError> {
        self.catalog.get_or_try_init(|| {
            let target: Target = self
                .settings
                .target
                .as_deref()
                .ok_or_else(|| XtiPipeError::InvalidTarget("no target given".into()))?
                .parse()?;
            info!("Resolving {target}...");
            let catalog = self.resolver.resolve(&target)?;
            info!("{} observations found for {target}", catalog.len());
            Ok(catalog)
        })
    }

    /// A command interpreter over the resolved catalog, with an empty queue.
    pub fn interpreter(&self) -> Result<CommandInterpreter<'_>, XtiPipeError> {
        Ok(CommandInterpreter::new(self.catalog()?, &self.settings))
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            barycorr: self.settings.barycorr.is_enabled(),
            compress: self.settings.compress.is_enabled(),
        }
    }

    /// Fetch and reduce every queued observation into the output directory.
    pub fn process_queue(&self, queue: &ObservationQueue) -> PipelineReport {
        let manifest = Manifest::from_target(&self.settings.log, &self.settings.out_dir);
        let mut pipeline = AcquisitionPipeline::new(
            &self.env,
            self.archive.as_ref(),
            &self.tools,
            self.settings.out_dir.clone(),
            self.pipeline_options(),
        )
        .with_manifest(manifest);
        let report = pipeline.run(queue);
        info!(
            "{} observations processed, {} failed",
            report.processed.len(),
            report.failed.len()
        );
        report
    }

    /// Inspect datasets already on disk.
    ///
    /// The reference calibration version is queried once, and only when the
    /// calibration check is requested.
    pub fn inspect(
        &self,
        datasets: &[Utf8PathBuf],
        actions: DatasetActions,
    ) -> Result<BatchReport, XtiPipeError> {
        let reference = if actions.check_calibration {
            let version = self.tools.caldb_version()?;
            info!("Current CALDB: {version}");
            Some(version)
        } else {
            None
        };
        Ok(run_batch(
            &self.env,
            &self.tools,
            datasets,
            reference.as_deref(),
            actions,
        ))
    }
}
