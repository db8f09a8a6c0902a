//! Roster of security codes to process.
//!
//! The roster is a spreadsheet (`.xlsx`/`.xls`, first worksheet) or a CSV
//! export of one, with a header row. Codes are taken from one named column,
//! in file order.

use calamine::{open_workbook_auto, Data, Reader};
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Column holding the security code in the sample-stock roster.
pub const DEFAULT_CODE_COLUMN: &str = "证券代码";

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("read roster {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("roster has no column '{0}'")]
    MissingColumn(String),

    #[error("roster csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("roster workbook: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("roster workbook {0} has no worksheet")]
    NoWorksheet(String),
}

const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    codes: Vec<String>,
}

impl Roster {
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            codes: codes
                .into_iter()
                .map(Into::into)
                .map(|c: String| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    /// Read `column` from a workbook or CSV file, chosen by extension.
    pub fn from_file(path: &Path, column: &str) -> Result<Self, RosterError> {
        let is_workbook = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| WORKBOOK_EXTENSIONS.iter().any(|w| e.eq_ignore_ascii_case(w)));
        if is_workbook {
            return Self::from_workbook(path, column);
        }

        let file = std::fs::File::open(path).map_err(|source| RosterError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_reader(file, column)
    }

    /// First worksheet; the first row of its used range is the header.
    pub fn from_workbook(path: &Path, column: &str) -> Result<Self, RosterError> {
        let mut workbook = open_workbook_auto(path)?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| RosterError::NoWorksheet(path.display().to_string()))??;

        let mut rows = range.rows();
        let idx = rows
            .next()
            .and_then(|header| {
                header
                    .iter()
                    .position(|cell| cell.to_string().trim() == column)
            })
            .ok_or_else(|| RosterError::MissingColumn(column.to_string()))?;

        let codes = rows
            .filter_map(|row| match row.get(idx) {
                None | Some(Data::Empty) => None,
                Some(cell) => Some(cell.to_string().trim().to_string()),
            })
            .filter(|c| !c.is_empty())
            .collect();

        Ok(Self { codes })
    }

    pub fn from_reader<R: Read>(reader: R, column: &str) -> Result<Self, RosterError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let idx = rdr
            .headers()?
            .iter()
            .position(|h| h.trim().trim_start_matches('\u{feff}') == column)
            .ok_or_else(|| RosterError::MissingColumn(column.to_string()))?;

        let mut codes = Vec::new();
        for record in rdr.records() {
            let record = record?;
            if let Some(code) = record.get(idx).map(str::trim).filter(|c| !c.is_empty()) {
                codes.push(code.to_string());
            }
        }

        Ok(Self { codes })
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}
