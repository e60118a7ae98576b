//! # Processing log
//!
//! CSV manifest of processed observations with the columns
//! `Input,OBSID,CALDB,DateTime`. The whole table is loaded before each
//! append and written back in full; rows are never deduplicated.
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{settings::LogTarget, xtipipe_errors::XtiPipeError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRow {
    /// Final path of the science product.
    #[serde(rename = "Input")]
    pub input: String,
    /// Display identifier, `NI<obsid>`.
    #[serde(rename = "OBSID")]
    pub obsid: String,
    #[serde(rename = "CALDB")]
    pub caldb: String,
    #[serde(rename = "DateTime")]
    pub date_time: String,
}

impl LogRow {
    pub fn new(input: &Utf8Path, obsid: &str, caldb: &str, date_time: &str) -> Self {
        LogRow {
            input: input.to_string(),
            obsid: format!("NI{obsid}"),
            caldb: caldb.to_string(),
            date_time: date_time.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    path: Utf8PathBuf,
    /// Next append starts a new table instead of loading the file.
    fresh: bool,
}

impl Manifest {
    /// Manifest selected by the run settings, `None` when logging is off.
    ///
    /// `Create(name)` maps to `<out_dir>/<name>.csv`.
    pub fn from_target(target: &LogTarget, out_dir: &Utf8Path) -> Option<Self> {
        match target {
            LogTarget::Append(path) => Some(Manifest {
                path: path.clone(),
                fresh: false,
            }),
            LogTarget::Create(name) => Some(Manifest {
                path: out_dir.join(format!("{name}.csv")),
                fresh: true,
            }),
            LogTarget::Disabled | LogTarget::PromptIfUnset => None,
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Read every row of a log file.
    ///
    /// Return
    /// ------
    /// * The rows, or [`XtiPipeError::ManifestFormat`] when the file has no
    ///   `Input` column
    pub fn load(path: &Utf8Path) -> Result<Vec<LogRow>, XtiPipeError> {
        let mut reader = ReaderBuilder::new().from_path(path)?;
        if !reader.headers()?.iter().any(|h| h == "Input") {
            return Err(XtiPipeError::ManifestFormat(path.to_path_buf()));
        }
        reader
            .deserialize()
            .map(|row| row.map_err(|_| XtiPipeError::ManifestFormat(path.to_path_buf())))
            .collect()
    }

    /// Append one row, rewriting the whole file.
    pub fn append(&mut self, row: LogRow) -> Result<(), XtiPipeError> {
        let mut rows = if self.fresh {
            Vec::new()
        } else if self.path.exists() {
            Self::load(&self.path)?
        } else {
            warn!("Log {} does not exist, creating it", self.path);
            Vec::new()
        };
        rows.push(row);
        self.write(&rows)?;
        self.fresh = false;
        info!("Log {} updated ({} rows)", self.path, rows.len());
        Ok(())
    }

    fn write(&self, rows: &[LogRow]) -> Result<(), XtiPipeError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let part = Utf8PathBuf::from(format!("{}.part", self.path));
        let mut writer = WriterBuilder::new().from_path(&part)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        drop(writer);
        fs::rename(&part, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod manifest_test {
    use super::*;

    fn row(obsid: &str) -> LogRow {
        LogRow::new(
            Utf8Path::new(&format!("/data/{obsid}/xti/event_cl/bc{obsid}_0mpu7_cl.evt")),
            obsid,
            "xti20240206",
            "2024-03-01T10:00:00 UTC",
        )
    }

    #[test]
    fn test_create_then_append() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = Utf8Path::from_path(dir.path()).unwrap();
        fs::write(out_dir.join("crab.csv"), "stale content\n").unwrap();

        let mut manifest = Manifest::from_target(&LogTarget::Create("crab".into()), out_dir).unwrap();
        manifest.append(row("3013010102")).unwrap();
        manifest.append(row("3013010102")).unwrap();

        let rows = Manifest::load(manifest.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].obsid, "NI3013010102");
        assert_eq!(rows[0], rows[1]);

        let header = fs::read_to_string(manifest.path()).unwrap();
        assert!(header.starts_with("Input,OBSID,CALDB,DateTime"));
    }

    #[test]
    fn test_append_to_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(dir.path()).unwrap().join("log.csv");
        fs::write(
            &path,
            "Input,OBSID,CALDB,DateTime\n/a/ni1_cl.evt.gz,NI1013010101,xti20200722,2021-01-01\n",
        )
        .unwrap();

        let mut manifest =
            Manifest::from_target(&LogTarget::Append(path.clone()), Utf8Path::new("/unused"))
                .unwrap();
        manifest.append(row("1013010102")).unwrap();
        let rows = Manifest::load(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].caldb, "xti20200722");
    }

    #[test]
    fn test_unreadable_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(dir.path()).unwrap().join("other.csv");
        fs::write(&path, "Name,Value\nx,1\n").unwrap();
        assert_eq!(
            Manifest::load(&path),
            Err(XtiPipeError::ManifestFormat(path.clone()))
        );
    }

    #[test]
    fn test_disabled_target() {
        assert!(Manifest::from_target(&LogTarget::Disabled, Utf8Path::new("/data")).is_none());
    }
}
