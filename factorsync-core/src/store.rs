//! Per-code CSV store.
//!
//! Layout: `{dir}/{CODE}.csv`, one file per security code holding every
//! factor fetched so far. Files are overwritten whole on each update via a
//! `.tmp` sibling and a rename.

use crate::fields::{FieldGroup, FieldPresence};
use crate::table::{FactorTable, TableError};
use chrono::NaiveDate;
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Table {
        path: PathBuf,
        #[source]
        source: TableError,
    },

    #[error("code {0:?} cannot name a file in the store")]
    InvalidCode(String),
}

pub struct FactorStore {
    dir: PathBuf,
}

impl FactorStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, code: &str) -> PathBuf {
        self.dir.join(format!("{code}.csv"))
    }

    pub fn exists(&self, code: &str) -> bool {
        self.checked_path(code).is_ok_and(|p| p.is_file())
    }

    /// `path_for`, refusing codes that would resolve outside `dir`.
    fn checked_path(&self, code: &str) -> Result<PathBuf, StoreError> {
        if code.is_empty() || code.contains(['/', '\\']) || code.contains("..") {
            return Err(StoreError::InvalidCode(code.to_string()));
        }
        Ok(self.path_for(code))
    }

    /// Load the cached table for `code`. A missing file is `Ok(None)`.
    pub fn load(&self, code: &str) -> Result<Option<FactorTable>, StoreError> {
        let path = self.checked_path(code)?;
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        FactorTable::read_csv(BufReader::new(file))
            .map(Some)
            .map_err(|source| StoreError::Table { path, source })
    }

    /// Overwrite the file for `code` with `table`.
    pub fn save(&self, code: &str, table: &FactorTable) -> Result<PathBuf, StoreError> {
        let path = self.checked_path(code)?;
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let tmp_path = path.with_extension("csv.tmp");

        let file = fs::File::create(&tmp_path).map_err(|source| StoreError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        if let Err(source) = table.write_csv(BufWriter::new(file)) {
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::Table {
                path: tmp_path,
                source,
            });
        }

        fs::rename(&tmp_path, &path).map_err(|source| {
            let _ = fs::remove_file(&tmp_path);
            StoreError::Io {
                path: path.clone(),
                source,
            }
        })?;

        Ok(path)
    }

    /// Summarise what is cached for `code` against the configured groups.
    pub fn status(&self, code: &str, groups: &[FieldGroup]) -> Result<CodeStatus, StoreError> {
        let table = self.load(code)?;
        let presence = match &table {
            Some(t) => FieldPresence::evaluate(groups, t.field_names()),
            None => FieldPresence::evaluate(groups, std::iter::empty()),
        };
        let missing = groups
            .iter()
            .map(|g| (g.name.clone(), g.missing(&presence).len()))
            .collect();

        Ok(CodeStatus {
            code: code.to_string(),
            cached: table.is_some(),
            rows: table.as_ref().map_or(0, |t| t.height()),
            start_date: table.as_ref().and_then(|t| t.first_date()),
            end_date: table.as_ref().and_then(|t| t.last_date()),
            missing,
        })
    }
}

/// Cache state of one code.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeStatus {
    pub code: String,
    pub cached: bool,
    pub rows: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Missing field count per group name, in group order.
    pub missing: Vec<(String, usize)>,
}

impl CodeStatus {
    pub fn is_complete(&self) -> bool {
        self.missing.iter().all(|(_, n)| *n == 0)
    }
}
