use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XtiPipeError {
    #[error("Unable to resolve {0} in HEASARC")]
    TargetResolution(String),

    #[error("Invalid target specification: {0}")]
    InvalidTarget(String),

    #[error("Observation {0} has no archive year/month")]
    MissingArchiveEpoch(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid configuration file: {0}")]
    ConfigError(#[from] toml::de::Error),

    #[error("Invalid pattern: {0}")]
    RegexError(#[from] regex::Error),

    #[error("Download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("Download of {0} timed out")]
    DownloadTimeout(String),

    #[error("Incomplete download for {obsid}: {reason}")]
    IncompleteDownload { obsid: String, reason: String },

    #[error("{tool} exited with status {code}")]
    ToolFailed { tool: String, code: i32 },

    #[error("Unexpected output from {tool}: {reason}")]
    ToolOutput { tool: String, reason: String },

    #[error("Invalid FITS header in {path}: {reason}")]
    FitsHeader { path: Utf8PathBuf, reason: String },

    #[error("No reduced result files found in {0}")]
    MissingResultFiles(Utf8PathBuf),

    #[error("Log file {0} format not readable")]
    ManifestFormat(Utf8PathBuf),

    #[error("Time conversion error: {0}")]
    TimeError(String),

    #[error("Invalid toggle value: {0}")]
    InvalidToggle(String),

    #[error("UTF-8 Path error: {0}")]
    Utf8PathError(String),

    #[error("Worker pool error: {0}")]
    WorkerPool(String),
}

impl PartialEq for XtiPipeError {
    fn eq(&self, other: &Self) -> bool {
        use XtiPipeError::*;
        match (self, other) {
            (TargetResolution(a), TargetResolution(b)) => a == b,
            (InvalidTarget(a), InvalidTarget(b)) => a == b,
            (MissingArchiveEpoch(a), MissingArchiveEpoch(b)) => a == b,

            // foreign errors only compare by variant
            (IoError(_), IoError(_)) => true,
            (ReqwestError(_), ReqwestError(_)) => true,
            (CsvError(_), CsvError(_)) => true,
            (ConfigError(_), ConfigError(_)) => true,
            (RegexError(_), RegexError(_)) => true,

            (Download { url: a, .. }, Download { url: b, .. }) => a == b,
            (DownloadTimeout(a), DownloadTimeout(b)) => a == b,
            (
                IncompleteDownload { obsid: a, .. },
                IncompleteDownload { obsid: b, .. },
            ) => a == b,
            (ToolFailed { tool: a, code: ca }, ToolFailed { tool: b, code: cb }) => {
                a == b && ca == cb
            }
            (ToolOutput { tool: a, .. }, ToolOutput { tool: b, .. }) => a == b,
            (FitsHeader { path: a, .. }, FitsHeader { path: b, .. }) => a == b,
            (MissingResultFiles(a), MissingResultFiles(b)) => a == b,
            (ManifestFormat(a), ManifestFormat(b)) => a == b,
            (TimeError(a), TimeError(b)) => a == b,
            (InvalidToggle(a), InvalidToggle(b)) => a == b,
            (Utf8PathError(a), Utf8PathError(b)) => a == b,
            (WorkerPool(a), WorkerPool(b)) => a == b,

            _ => false,
        }
    }
}
