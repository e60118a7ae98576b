//! # Run settings and configuration file
//!
//! Two layers feed a run:
//!
//! 1. [`AppConfig`]: static configuration loaded from an optional TOML file
//!    (archive/catalog locations, worker pool bound, per-file timeout and the
//!    command lines of the external tools).
//! 2. [`Settings`]: per-run choices: target, barycenter correction,
//!    compression and the output log. Each choice is an explicit
//!    [`Toggle`] / [`LogTarget`]; `PromptIfUnset` values are resolved by
//!    [`Settings::prompt_unset`] before the queue interaction starts.
//!
//! ## Configuration file
//!
//! ```toml
//! archive_url = "https://heasarc.gsfc.nasa.gov/FTP/nicer/data/obs/"
//! download_timeout_secs = 300
//! max_concurrent = 4
//!
//! [tools]
//! reduction = "nicerl2"
//! correction = "barycorr"
//! caldb_query = "nicaldbver"
//! ```
//!
//! Missing keys fall back to the defaults of [`crate::constants`]; a missing
//! file is not an error.
use std::{
    fmt,
    io::{BufRead, Write},
    str::FromStr,
    time::Duration,
};

use camino::{Utf8Path, Utf8PathBuf};
use directories::ProjectDirs;
use serde::Deserialize;

use crate::{
    constants::{
        ARCHIVE_URL, CALDB_QUERY_TOOL, CATALOG_TABLE, CATALOG_URL, CORRECTION_TOOL,
        DEFAULT_DOWNLOAD_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENT, EPHEMERIS, REDUCTION_TOOL,
        REFERENCE_FRAME,
    },
    xtipipe_errors::XtiPipeError,
};

/// Tri-state switch for optional pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum Toggle {
    Enabled,
    Disabled,
    #[default]
    PromptIfUnset,
}

impl Toggle {
    /// `true` only for [`Toggle::Enabled`]; an unresolved prompt counts as off.
    pub fn is_enabled(&self) -> bool {
        matches!(self, Toggle::Enabled)
    }

    /// Build a toggle from a pair of mutually exclusive CLI flags.
    pub fn from_flags(on: bool, off: bool) -> Self {
        match (on, off) {
            (true, _) => Toggle::Enabled,
            (false, true) => Toggle::Disabled,
            (false, false) => Toggle::PromptIfUnset,
        }
    }

    /// Keep `self` unless it is unset, in which case `fallback` applies.
    pub fn or(self, fallback: Toggle) -> Toggle {
        match self {
            Toggle::PromptIfUnset => fallback,
            set => set,
        }
    }

    /// Interpret a prompt answer where an empty answer means `default`.
    fn from_answer(answer: &str, default: bool) -> Self {
        let enabled = match answer.trim().to_lowercase().as_str() {
            "" => default,
            "y" | "yes" => true,
            _ => false,
        };
        if enabled {
            Toggle::Enabled
        } else {
            Toggle::Disabled
        }
    }
}

impl FromStr for Toggle {
    type Err = XtiPipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "enabled" | "yes" | "y" | "true" => Ok(Toggle::Enabled),
            "disabled" | "no" | "n" | "false" => Ok(Toggle::Disabled),
            "prompt" | "unset" => Ok(Toggle::PromptIfUnset),
            other => Err(XtiPipeError::InvalidToggle(other.to_string())),
        }
    }
}

impl TryFrom<String> for Toggle {
    type Error = XtiPipeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Toggle::Enabled => write!(f, "y"),
            Toggle::Disabled => write!(f, "n"),
            Toggle::PromptIfUnset => write!(f, "unset"),
        }
    }
}

/// Where manifest rows go once an observation is processed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogTarget {
    #[default]
    Disabled,
    /// Append to an existing log file.
    Append(Utf8PathBuf),
    /// Create `<out-dir>/<name>.csv` on the first processed observation.
    Create(String),
    PromptIfUnset,
}

impl LogTarget {
    pub fn is_enabled(&self) -> bool {
        matches!(self, LogTarget::Append(_) | LogTarget::Create(_))
    }
}

impl fmt::Display for LogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogTarget::Disabled => write!(f, "n"),
            LogTarget::Append(path) => write!(f, "append to {path}"),
            LogTarget::Create(name) => write!(f, "new {name}.csv"),
            LogTarget::PromptIfUnset => write!(f, "unset"),
        }
    }
}

/// Per-run choices shown by the `settings` command.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub target: Option<String>,
    pub barycorr: Toggle,
    pub compress: Toggle,
    pub log: LogTarget,
    /// Directory receiving the downloaded datasets and new log files.
    pub out_dir: Utf8PathBuf,
}

impl Settings {
    pub fn new(out_dir: impl Into<Utf8PathBuf>) -> Self {
        Settings {
            target: None,
            barycorr: Toggle::PromptIfUnset,
            compress: Toggle::PromptIfUnset,
            log: LogTarget::PromptIfUnset,
            out_dir: out_dir.into(),
        }
    }

    /// Ask the operator for every unset choice.
    ///
    /// The log questions are only asked when target, correction and
    /// compression were all unset on entry; otherwise an unset log is
    /// disabled. Correction and compression default to enabled on an empty
    /// answer, the log defaults to disabled.
    ///
    /// Arguments
    /// -----------------
    /// * `input`: source of answers (stdin in the binary).
    /// * `output`: where the questions are written.
    ///
    /// Return
    /// ----------
    /// * `Ok(())` once every field is resolved, or an I/O error.
    pub fn prompt_unset<R: BufRead, W: Write>(
        &mut self,
        input: &mut R,
        output: &mut W,
    ) -> Result<(), XtiPipeError> {
        let ask_log = self.target.is_none()
            && self.barycorr == Toggle::PromptIfUnset
            && self.compress == Toggle::PromptIfUnset
            && self.log == LogTarget::PromptIfUnset;

        if self.target.is_none() {
            let answer = ask(input, output, "Target: ")?;
            self.target = Some(answer.trim().to_string());
        }
        if self.barycorr == Toggle::PromptIfUnset {
            let answer = ask(input, output, "Apply Bary-Center Correction: [y] ")?;
            self.barycorr = Toggle::from_answer(&answer, true);
        }
        if self.compress == Toggle::PromptIfUnset {
            let answer = ask(input, output, "Compress XTI files (.gz): [y] ")?;
            self.compress = Toggle::from_answer(&answer, true);
        }

        if self.log == LogTarget::PromptIfUnset {
            self.log = LogTarget::Disabled;
            let wants_log = ask_log
                && Toggle::from_answer(&ask(input, output, "Write Output Log: [n] ")?, false)
                    .is_enabled();
            if wants_log {
                let mode = ask(input, output, "New or Add to existing Log: ")?;
                match mode.trim().to_lowercase().as_str() {
                    "add" => {
                        let path = ask(input, output, "Input log: ")?;
                        let cleaned: String = path
                            .trim()
                            .chars()
                            .filter(|c| *c != '\'' && *c != '"')
                            .collect();
                        self.log = LogTarget::Append(Utf8PathBuf::from(cleaned.trim()));
                    }
                    "new" => {
                        let name = ask(input, output, "Name of log file (no .csv): ")?;
                        self.log = LogTarget::Create(name.trim().to_string());
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

fn ask<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
) -> Result<String, XtiPipeError> {
    write!(output, "{question}")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

/// A program plus optional leading arguments, e.g. `nicerl2` or `sh fake_nicerl2.sh`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next().unwrap_or_default();
        ToolCommand {
            program,
            args: parts.collect(),
        }
    }

    /// Name used in messages: the last path component of the program, or of
    /// the first argument when the program is an interpreter.
    pub fn display_name(&self) -> String {
        let shown = match (self.program.as_str(), self.args.first()) {
            ("sh" | "bash", Some(script)) => script.as_str(),
            (program, _) => program,
        };
        Utf8Path::new(shown)
            .file_name()
            .unwrap_or(shown)
            .to_string()
    }
}

impl From<String> for ToolCommand {
    fn from(line: String) -> Self {
        ToolCommand::parse(&line)
    }
}

/// Command lines of the external tools.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub reduction: ToolCommand,
    pub correction: ToolCommand,
    pub caldb_query: ToolCommand,
}

impl Default for ToolConfig {
    fn default() -> Self {
        ToolConfig {
            reduction: ToolCommand::parse(REDUCTION_TOOL),
            correction: ToolCommand::parse(CORRECTION_TOOL),
            caldb_query: ToolCommand::parse(CALDB_QUERY_TOOL),
        }
    }
}

/// Static configuration, usually read from `config.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub archive_url: String,
    pub catalog_url: String,
    pub catalog_table: String,
    pub download_timeout_secs: u64,
    pub max_concurrent: usize,
    pub ephemeris: String,
    pub refframe: String,
    /// Used when neither `--bc` nor `--no-bc` is given.
    pub barycorr: Toggle,
    /// Used when neither `--compress` nor `--no-compress` is given.
    pub compress: Toggle,
    pub tools: ToolConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            archive_url: ARCHIVE_URL.to_string(),
            catalog_url: CATALOG_URL.to_string(),
            catalog_table: CATALOG_TABLE.to_string(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            ephemeris: EPHEMERIS.to_string(),
            refframe: REFERENCE_FRAME.to_string(),
            barycorr: Toggle::PromptIfUnset,
            compress: Toggle::PromptIfUnset,
            tools: ToolConfig::default(),
        }
    }
}

impl AppConfig {
    /// Default location: `<config_dir>/xtipipe/config.toml`.
    pub fn default_path() -> Option<Utf8PathBuf> {
        let dirs = ProjectDirs::from("", "", "xtipipe")?;
        Utf8PathBuf::from_path_buf(dirs.config_dir().join("config.toml")).ok()
    }

    /// Load the configuration from `path`, or from [`AppConfig::default_path`].
    ///
    /// An explicitly given path must exist; the default path may be absent.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self, XtiPipeError> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => return Ok(AppConfig::default()),
            },
        };

        if !path.exists() && !required {
            return Ok(AppConfig::default());
        }
        let contents = std::fs::read_to_string(&path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, XtiPipeError> {
        let mut config: AppConfig = toml::from_str(contents)?;
        if config.max_concurrent == 0 {
            config.max_concurrent = 1;
        }
        if !config.archive_url.ends_with('/') {
            config.archive_url.push('/');
        }
        Ok(config)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

#[cfg(test)]
mod settings_test {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_toggle_parse() {
        assert_eq!("yes".parse::<Toggle>().unwrap(), Toggle::Enabled);
        assert_eq!("N".parse::<Toggle>().unwrap(), Toggle::Disabled);
        assert_eq!("prompt".parse::<Toggle>().unwrap(), Toggle::PromptIfUnset);
        assert_eq!(
            "maybe".parse::<Toggle>(),
            Err(XtiPipeError::InvalidToggle("maybe".into()))
        );
    }

    #[test]
    fn test_toggle_from_flags() {
        assert_eq!(Toggle::from_flags(true, false), Toggle::Enabled);
        assert_eq!(Toggle::from_flags(false, true), Toggle::Disabled);
        assert_eq!(Toggle::from_flags(false, false), Toggle::PromptIfUnset);
        assert_eq!(Toggle::PromptIfUnset.or(Toggle::Disabled), Toggle::Disabled);
        assert_eq!(Toggle::Enabled.or(Toggle::Disabled), Toggle::Enabled);
    }

    #[test]
    fn test_prompt_all_unset_with_new_log() {
        let mut settings = Settings::new("/data");
        let mut input = Cursor::new("PSR_B0531+21\n\nn\ny\nnew\nrun1\n");
        let mut output = Vec::new();
        settings.prompt_unset(&mut input, &mut output).unwrap();

        assert_eq!(settings.target.as_deref(), Some("PSR_B0531+21"));
        assert_eq!(settings.barycorr, Toggle::Enabled);
        assert_eq!(settings.compress, Toggle::Disabled);
        assert_eq!(settings.log, LogTarget::Create("run1".into()));
        let asked = String::from_utf8(output).unwrap();
        assert!(asked.contains("Write Output Log: [n] "));
    }

    #[test]
    fn test_prompt_append_log_strips_quotes() {
        let mut settings = Settings::new("/data");
        let mut input = Cursor::new("Crab\ny\ny\ny\nadd\n'/tmp/my log.csv'\n");
        let mut output = Vec::new();
        settings.prompt_unset(&mut input, &mut output).unwrap();
        assert_eq!(settings.log, LogTarget::Append("/tmp/my log.csv".into()));
    }

    #[test]
    fn test_prompt_skips_log_when_target_given() {
        let mut settings = Settings::new("/data");
        settings.target = Some("Crab".into());
        let mut input = Cursor::new("\n\n");
        let mut output = Vec::new();
        settings.prompt_unset(&mut input, &mut output).unwrap();

        assert_eq!(settings.log, LogTarget::Disabled);
        let asked = String::from_utf8(output).unwrap();
        assert!(!asked.contains("Target: "));
        assert!(!asked.contains("Write Output Log"));
    }

    #[test]
    fn test_config_from_toml() {
        let config = AppConfig::from_toml(
            r#"
archive_url = "http://localhost/obs"
max_concurrent = 0
compress = "no"

[tools]
reduction = "sh /tmp/fake_nicerl2.sh"
"#,
        )
        .unwrap();
        assert_eq!(config.archive_url, "http://localhost/obs/");
        assert_eq!(config.max_concurrent, 1);
        assert_eq!(config.tools.reduction.program, "sh");
        assert_eq!(config.tools.reduction.args, vec!["/tmp/fake_nicerl2.sh"]);
        assert_eq!(config.tools.reduction.display_name(), "fake_nicerl2.sh");
        assert_eq!(config.tools.correction, ToolCommand::parse("barycorr"));
        assert_eq!(config.download_timeout(), Duration::from_secs(300));
        assert_eq!(config.compress, Toggle::Disabled);
        assert_eq!(config.barycorr, Toggle::PromptIfUnset);
    }
}
