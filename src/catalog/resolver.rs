//! Target resolution against the NICER master catalog.
//!
//! Two resolvers implement [`CatalogResolver`]:
//!
//! * [`HeasarcResolver`] queries the HEASARC batch interface and parses the
//!   pipe-delimited table it returns.
//! * [`TableFileResolver`] reads a local CSV export (`OBSID,TIME,RA,DEC`),
//!   which is handy offline and in tests.
//!
//! Both normalise identifiers to plain strings and convert the catalog time
//! (MJD or calendar text) to an [`hifitime::Epoch`].
use std::{fmt, str::FromStr};

use camino::{Utf8Path, Utf8PathBuf};
use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use crate::{
    catalog::{Catalog, ObservationRecord},
    constants::Degree,
    env_state::XtiEnv,
    time::parse_catalog_time,
    xtipipe_errors::XtiPipeError,
};

/// What the operator asked for: a name resolved by the service, or a sky position.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String),
    Position { ra: Degree, dec: Degree },
}

impl FromStr for Target {
    type Err = XtiPipeError;

    /// `"83.633,22.014"` or `"83.633 22.014"` → position, anything else → name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(XtiPipeError::InvalidTarget("empty target".into()));
        }

        let parts: Vec<&str> = trimmed
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .collect();
        if let [ra, dec] = parts.as_slice() {
            if let (Ok(ra), Ok(dec)) = (ra.parse::<f64>(), dec.parse::<f64>()) {
                if !(0.0..360.0).contains(&ra) || !(-90.0..=90.0).contains(&dec) {
                    return Err(XtiPipeError::InvalidTarget(format!(
                        "position out of range: {trimmed}"
                    )));
                }
                return Ok(Target::Position { ra, dec });
            }
        }
        Ok(Target::Name(trimmed.to_string()))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Name(name) => write!(f, "{name}"),
            Target::Position { ra, dec } => write!(f, "{ra}, {dec}"),
        }
    }
}

pub trait CatalogResolver {
    /// Resolve `target` into the full set of catalog records.
    ///
    /// An unknown target, or a target with no observation, is a
    /// [`XtiPipeError::TargetResolution`].
    fn resolve(&self, target: &Target) -> Result<Catalog, XtiPipeError>;
}

/// HEASARC batch query client.
#[derive(Debug, Clone)]
pub struct HeasarcResolver {
    env: XtiEnv,
    url: String,
    table: String,
}

impl HeasarcResolver {
    pub fn new(env: XtiEnv, url: impl Into<String>, table: impl Into<String>) -> Self {
        HeasarcResolver {
            env,
            url: url.into(),
            table: table.into(),
        }
    }

    fn query(&self, target: &Target) -> Result<String, XtiPipeError> {
        let tablehead = format!("name=heasarc_{}", self.table);
        let entry = target.to_string();
        let params = [
            ("tablehead", tablehead.as_str()),
            ("Entry", entry.as_str()),
            ("Coordinates", "Equatorial"),
            ("Equinox", "2000"),
            ("Radius", "Default"),
            ("NR", "CheckCaches/GRB/SIMBAD+Sesame/NED"),
            ("GIFsize", "0"),
            ("Fields", "Standard"),
            ("varon", "obsid"),
            ("varon", "time"),
            ("varon", "ra"),
            ("varon", "dec"),
            ("sortvar", "obsid"),
            ("ResultMax", "0"),
            ("displaymode", "BatchDisplay"),
        ];
        self.env.get_text(&self.url, &params)
    }
}

impl CatalogResolver for HeasarcResolver {
    fn resolve(&self, target: &Target) -> Result<Catalog, XtiPipeError> {
        let response = self
            .query(target)
            .map_err(|e| XtiPipeError::TargetResolution(format!("{target} ({e})")))?;
        let records = parse_batch_table(&response)
            .ok_or_else(|| XtiPipeError::TargetResolution(target.to_string()))??;
        if records.is_empty() {
            return Err(XtiPipeError::TargetResolution(target.to_string()));
        }
        debug!("{} catalog rows for {target}", records.len());
        Ok(Catalog::new(target.to_string(), records))
    }
}

/// Catalog read from a local CSV file with `OBSID,TIME,RA,DEC` columns.
#[derive(Debug, Clone)]
pub struct TableFileResolver {
    path: Utf8PathBuf,
}

impl TableFileResolver {
    pub fn new(path: impl AsRef<Utf8Path>) -> Self {
        TableFileResolver {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl CatalogResolver for TableFileResolver {
    /// The file holds the observations of one target, so `target` only names the catalog.
    fn resolve(&self, target: &Target) -> Result<Catalog, XtiPipeError> {
        let data = std::fs::read_to_string(&self.path)?;
        let records = parse_table(data.as_bytes(), b',')?;
        if records.is_empty() {
            return Err(XtiPipeError::TargetResolution(target.to_string()));
        }
        Ok(Catalog::new(target.to_string(), records))
    }
}

/// Extract the pipe-delimited table from a batch query response.
///
/// Return
/// ------
/// * `None` when the response holds no table at all (service error page,
///   unresolved name), otherwise the parsed rows
pub(crate) fn parse_batch_table(
    response: &str,
) -> Option<Result<Vec<ObservationRecord>, XtiPipeError>> {
    let table: String = response
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('|'))
        .map(|line| format!("{}\n", line.trim_matches('|')))
        .collect();
    if table.is_empty() {
        return None;
    }
    Some(parse_table(table.as_bytes(), b'|'))
}

/// Parse a delimited table whose header names `obsid`, `time`, `ra` and `dec`
/// in any order and case.
pub(crate) fn parse_table(
    data: &[u8],
    delimiter: u8,
) -> Result<Vec<ObservationRecord>, XtiPipeError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(data);

    let headers = reader.headers()?.clone();
    let column = |name: &str| -> Result<usize, XtiPipeError> {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| XtiPipeError::TargetResolution(format!("catalog has no {name} column")))
    };
    let (obsid_col, time_col, ra_col, dec_col) =
        (column("obsid")?, column("time")?, column("ra")?, column("dec")?);

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let obsid = field(&row, obsid_col);
        if obsid.is_empty() {
            continue;
        }
        let parse_deg = |col: usize| -> Result<f64, XtiPipeError> {
            field(&row, col).parse::<f64>().map_err(|_| {
                XtiPipeError::TargetResolution(format!("invalid coordinate in row {obsid}"))
            })
        };
        records.push(ObservationRecord::new(
            obsid,
            parse_catalog_time(field(&row, time_col))?,
            parse_deg(ra_col)?,
            parse_deg(dec_col)?,
        ));
    }
    Ok(records)
}

fn field(row: &StringRecord, index: usize) -> &str {
    row.get(index).unwrap_or("")
}
