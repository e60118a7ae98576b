//! # Constants and type definitions for xtipipe
//!
//! This module centralizes the **archive layout**, **naming conventions** of the
//! reduced XTI products, **external tool defaults** and the **common type aliases**
//! used throughout the crate.
//!
//! ## Overview
//!
//! - HEASARC archive and catalog locations
//! - Archive subpaths fetched for every observation
//! - Identifier heuristics (full identifier threshold, epoch/cycle scaling)
//! - Fixed arguments of the barycenter correction
//! - Worker pool and timeout defaults

// -------------------------------------------------------------------------------------------------
// Remote services
// -------------------------------------------------------------------------------------------------

/// Root of the NICER observation archive, organised as `{year}_{month}/{obsid}/{subpath}/`.
pub const ARCHIVE_URL: &str = "https://heasarc.gsfc.nasa.gov/FTP/nicer/data/obs/";

/// HEASARC batch query interface used to resolve a target into catalog rows.
pub const CATALOG_URL: &str = "https://heasarc.gsfc.nasa.gov/db-perl/W3Browse/w3query.pl";

/// NICER master catalog table name.
pub const CATALOG_TABLE: &str = "nicermastr";

/// Subpaths fetched for each observation: instrument data, logs and auxiliary files.
pub const ARCHIVE_SUBPATHS: [&str; 3] = ["xti", "log", "auxil"];

// -------------------------------------------------------------------------------------------------
// Identifier heuristics
// -------------------------------------------------------------------------------------------------

/// Any numeric entry at or below this value is too short to be an observation identifier.
pub const OBSID_MIN_VALUE: u64 = 100_000_000;

/// An identifier divided by this value (floored) gives its epoch ("cycle") key.
pub const EPOCH_DIVISOR: u64 = 1_000_000_000;

// -------------------------------------------------------------------------------------------------
// Dataset layout
// -------------------------------------------------------------------------------------------------

/// Directory (relative to a dataset root) holding the cleaned event files.
pub const EVENT_CL_DIR: &str = "xti/event_cl";

/// Directory (relative to a dataset root) holding the orbit file.
pub const AUXIL_DIR: &str = "auxil";

/// Suffix shared by every reduced result file.
pub const CLEANED_SUFFIX: &str = "cl.evt";

/// Suffix of the unfiltered, merged event files produced by the reduction.
pub const UFA_SUFFIX: &str = "ufa.evt";

/// Extension appended to compressed members.
pub const GZ_EXTENSION: &str = ".gz";

/// Legacy tarball members produced by older tool versions.
pub const TAR_GZ_EXTENSION: &str = ".tar.gz";

// -------------------------------------------------------------------------------------------------
// External tools
// -------------------------------------------------------------------------------------------------

/// Default standardized reduction tool.
pub const REDUCTION_TOOL: &str = "nicerl2";

/// Default barycenter correction tool.
pub const CORRECTION_TOOL: &str = "barycorr";

/// Default calibration database version query.
pub const CALDB_QUERY_TOOL: &str = "nicaldbver";

/// Reference frame passed to the correction tool.
pub const REFERENCE_FRAME: &str = "ICRS";

/// Solar system ephemeris passed to the correction tool.
pub const EPHEMERIS: &str = "JPLEPH.430";

// -------------------------------------------------------------------------------------------------
// Worker pool
// -------------------------------------------------------------------------------------------------

/// Maximum number of concurrent downloads or compressions within one batch.
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Per-file download timeout in seconds.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;

/// Modified Julian Date (days)
pub type MJD = f64;

/// Observation identifier, a fixed-width numeric string such as `"3013010102"`.
pub type ObsId = String;
