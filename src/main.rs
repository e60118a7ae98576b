//! `xtipipe` command line.
//!
//! Two modes:
//!
//! - queue mode (default): resolve the target, select observations with the
//!   command interpreter, then download and reduce them;
//! - dataset mode (`--checkcal` and/or `--reprocess`): inspect datasets
//!   already on disk, the current directory unless `--dataset` or `--inlist`
//!   says otherwise.
use std::{
    io::{self, BufRead, Write},
    process::ExitCode,
};

use camino::Utf8PathBuf;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use xtipipe::{
    archive::{http::UrlListArchive, mirror::MirrorArchive},
    catalog::resolver::TableFileResolver,
    dataset::{batch::resolve_inlist, reprocess::DatasetActions},
    display::batch_table,
    interpreter::{CommandInterpreter, CommandResult},
    settings::{AppConfig, LogTarget, Settings, Toggle},
    xtipipe::XtiPipe,
    xtipipe_errors::XtiPipeError,
};

/// Queue, download, reduce and re-calibrate NICER XTI observations.
#[derive(Debug, Parser)]
#[command(name = "xtipipe", version)]
struct Cli {
    /// Target name or position (`ra,dec` in degrees).
    #[arg(long)]
    src: Option<String>,

    /// Apply the barycenter correction.
    #[arg(long, conflicts_with = "no_bc")]
    bc: bool,

    #[arg(long)]
    no_bc: bool,

    /// Compress the reduced products (.gz).
    #[arg(long, conflicts_with = "no_compress")]
    compress: bool,

    #[arg(long)]
    no_compress: bool,

    /// Append processed observations to an existing log.
    #[arg(long, value_name = "CSV", conflicts_with = "log_new")]
    log_append: Option<Utf8PathBuf>,

    /// Create `<out-dir>/<NAME>.csv` for processed observations.
    #[arg(long, value_name = "NAME")]
    log_new: Option<String>,

    /// Compare the calibration of datasets with the installed CALDB.
    #[arg(long)]
    checkcal: bool,

    /// Reprocess datasets whose calibration is not current.
    #[arg(long)]
    reprocess: bool,

    /// Datasets for --checkcal/--reprocess: a log file, directories or patterns.
    #[arg(short, long, num_args = 1.., conflicts_with = "dataset")]
    inlist: Option<Vec<String>>,

    /// Single dataset for --checkcal/--reprocess.
    #[arg(long, value_name = "DIR")]
    dataset: Option<Utf8PathBuf>,

    /// Dispatch this line instead of prompting (repeatable, in order).
    #[arg(short = 'c', long = "command", value_name = "LINE")]
    commands: Vec<String>,

    /// Read the catalog from a local `OBSID,TIME,RA,DEC` file.
    #[arg(long, value_name = "CSV")]
    catalog_file: Option<Utf8PathBuf>,

    /// Fetch observations from a local copy of the archive.
    #[arg(long, value_name = "DIR", conflicts_with = "url_list")]
    mirror: Option<Utf8PathBuf>,

    /// Fetch observations from an explicit list of file URLs.
    #[arg(long, value_name = "FILE")]
    url_list: Option<Utf8PathBuf>,

    /// Directory receiving datasets and new logs (default: current directory).
    #[arg(long, value_name = "DIR")]
    out_dir: Option<Utf8PathBuf>,

    /// Configuration file (default: `<config_dir>/xtipipe/config.toml`).
    #[arg(long, value_name = "TOML")]
    config: Option<Utf8PathBuf>,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .without_time()
        .with_target(false)
        .with_writer(io::stdout)
        .with_env_filter(env_filter)
        .init();
}

fn current_dir() -> Result<Utf8PathBuf, XtiPipeError> {
    Utf8PathBuf::from_path_buf(std::env::current_dir()?)
        .map_err(|p| XtiPipeError::Utf8PathError(p.display().to_string()))
}

fn settings_from(cli: &Cli, config: &AppConfig) -> Result<Settings, XtiPipeError> {
    let out_dir = match &cli.out_dir {
        Some(dir) => dir.clone(),
        None => current_dir()?,
    };
    let mut settings = Settings::new(out_dir);
    settings.target = cli.src.clone();
    settings.barycorr = Toggle::from_flags(cli.bc, cli.no_bc).or(config.barycorr);
    settings.compress = Toggle::from_flags(cli.compress, cli.no_compress).or(config.compress);
    settings.log = match (&cli.log_append, &cli.log_new) {
        (Some(path), _) => LogTarget::Append(path.clone()),
        (None, Some(name)) => LogTarget::Create(name.clone()),
        (None, None) => LogTarget::PromptIfUnset,
    };
    Ok(settings)
}

fn build_pipe(cli: &Cli, config: AppConfig, settings: Settings) -> Result<XtiPipe, XtiPipeError> {
    let mut pipe = XtiPipe::new(config, settings)?;
    if let Some(path) = &cli.catalog_file {
        pipe = pipe.with_resolver(Box::new(TableFileResolver::new(path)));
    }
    if let Some(root) = &cli.mirror {
        pipe = pipe.with_archive(Box::new(MirrorArchive::new(root.clone())));
    } else if let Some(list) = &cli.url_list {
        let archive = UrlListArchive::from_file(pipe.env().clone(), list)?;
        pipe = pipe.with_archive(Box::new(archive));
    }
    Ok(pipe)
}

/// Dispatch the `-c` lines in order, stopping at the first terminal one.
fn dispatch_lines(interpreter: &mut CommandInterpreter<'_>, lines: &[String]) -> CommandResult {
    for line in lines {
        let result = interpreter.dispatch(line).result;
        if result != CommandResult::Continue {
            return result;
        }
    }
    warn!("No `done` among the given commands, nothing processed");
    CommandResult::Terminate
}

fn run_queue<R: BufRead, W: Write>(
    cli: &Cli,
    config: AppConfig,
    mut settings: Settings,
    input: &mut R,
    output: &mut W,
) -> Result<ExitCode, XtiPipeError> {
    settings.prompt_unset(input, output)?;
    let pipe = build_pipe(cli, config, settings)?;

    let mut interpreter = pipe.interpreter()?;
    let result = if cli.commands.is_empty() {
        interpreter.run_interactive(input, output)?
    } else {
        dispatch_lines(&mut interpreter, &cli.commands)
    };
    if result != CommandResult::StopLoop {
        info!("Exiting without processing");
        return Ok(ExitCode::SUCCESS);
    }

    let queue = interpreter.into_queue();
    if queue.is_empty() {
        warn!("No observation selected");
        return Ok(ExitCode::SUCCESS);
    }
    let report = pipe.process_queue(&queue);
    for (obsid, e) in &report.failed {
        error!("{obsid}: {e}");
    }
    Ok(ExitCode::SUCCESS)
}

fn run_datasets(cli: &Cli, config: AppConfig, settings: Settings) -> Result<ExitCode, XtiPipeError> {
    let datasets = match (&cli.inlist, &cli.dataset) {
        (Some(args), _) => resolve_inlist(args)?,
        (None, Some(dir)) => vec![dir.clone()],
        (None, None) => vec![current_dir()?],
    };
    if datasets.is_empty() {
        return Ok(ExitCode::FAILURE);
    }

    let actions = DatasetActions {
        check_calibration: cli.checkcal,
        reprocess: cli.reprocess,
        barycorr: settings.barycorr.is_enabled(),
        compress: settings.compress.is_enabled(),
    };
    let pipe = build_pipe(cli, config, settings)?;
    let report = pipe.inspect(&datasets, actions)?;
    info!("Dataset summary:\n{}", batch_table(&report));
    Ok(ExitCode::SUCCESS)
}

fn run(cli: &Cli) -> Result<ExitCode, XtiPipeError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let settings = settings_from(cli, &config)?;

    if cli.checkcal || cli.reprocess {
        return run_datasets(cli, config, settings);
    }
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    run_queue(cli, config, settings, &mut input, &mut output)
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
