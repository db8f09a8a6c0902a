//! Date-indexed factor table.
//!
//! Rows are keyed by date and kept sorted; columns carry the spelling they
//! were first seen with but are matched by canonical [`FieldName`]. A cell is
//! `None` when its source had no value for that date.

use crate::fields::FieldName;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("invalid date '{0}'")]
    InvalidDate(String),

    #[error("invalid value '{value}' in column '{column}' on {date}")]
    InvalidCell {
        date: NaiveDate,
        column: String,
        value: String,
    },

    #[error("series '{column}' has {got} values for {expected} dates")]
    ShapeMismatch {
        column: String,
        expected: usize,
        got: usize,
    },

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactorTable {
    columns: Vec<String>,
    keys: Vec<FieldName>,
    rows: BTreeMap<NaiveDate, Vec<Option<f64>>>,
}

impl FactorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from field-major series aligned to `dates`.
    pub fn from_series(
        columns: &[String],
        dates: &[NaiveDate],
        series: &[Vec<Option<f64>>],
    ) -> Result<Self, TableError> {
        let mut table = Self::new();
        let positions: Vec<usize> = columns.iter().map(|c| table.ensure_column(c)).collect();

        for (column, values) in columns.iter().zip(series) {
            if values.len() != dates.len() {
                return Err(TableError::ShapeMismatch {
                    column: column.clone(),
                    expected: dates.len(),
                    got: values.len(),
                });
            }
        }

        for (i, date) in dates.iter().enumerate() {
            let width = table.width();
            let row = table.rows.entry(*date).or_insert_with(|| vec![None; width]);
            for (pos, values) in positions.iter().zip(series) {
                if let Some(v) = values[i] {
                    row[*pos] = Some(v);
                }
            }
        }

        Ok(table)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Column names as stored.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Canonical column names, same order as [`columns`](Self::columns).
    pub fn field_names(&self) -> &[FieldName] {
        &self.keys
    }

    pub fn has_field(&self, field: &FieldName) -> bool {
        self.position(field).is_some()
    }

    pub fn dates(&self) -> impl Iterator<Item = &NaiveDate> {
        self.rows.keys()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.keys().next_back().copied()
    }

    pub fn get(&self, date: NaiveDate, field: &FieldName) -> Option<f64> {
        let pos = self.position(field)?;
        self.rows.get(&date).and_then(|row| row[pos])
    }

    /// Set one cell, adding the row or column when absent.
    pub fn set(&mut self, date: NaiveDate, column: &str, value: Option<f64>) {
        let pos = self.ensure_column(column);
        let width = self.width();
        let row = self.rows.entry(date).or_insert_with(|| vec![None; width]);
        row[pos] = value;
    }

    /// Outer-join `other` into `self` by date.
    ///
    /// New columns are appended in `other`'s order. Where both tables hold a
    /// column, `other`'s values win on the dates it has a value for.
    pub fn merge(&mut self, other: &FactorTable) {
        let positions: Vec<usize> = other.columns.iter().map(|c| self.ensure_column(c)).collect();
        let width = self.width();

        for (date, other_row) in &other.rows {
            let row = self.rows.entry(*date).or_insert_with(|| vec![None; width]);
            for (pos, value) in positions.iter().zip(other_row) {
                if value.is_some() {
                    row[*pos] = *value;
                }
            }
        }
    }

    /// Write as CSV: an unnamed row-label column of dates, then one column per field.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), TableError> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header = Vec::with_capacity(self.width() + 1);
        header.push(String::new());
        header.extend(self.columns.iter().cloned());
        wtr.write_record(&header)?;

        for (date, row) in &self.rows {
            let mut record = Vec::with_capacity(row.len() + 1);
            record.push(date.format("%Y-%m-%d").to_string());
            record.extend(row.iter().map(|v| v.map(|x| x.to_string()).unwrap_or_default()));
            wtr.write_record(&record)?;
        }

        wtr.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    /// Read the format produced by [`write_csv`](Self::write_csv).
    pub fn read_csv<R: Read>(reader: R) -> Result<Self, TableError> {
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);

        let mut table = Self::new();
        let positions: Vec<usize> = rdr
            .headers()?
            .iter()
            .skip(1)
            .map(|name| table.ensure_column(name))
            .collect();

        for record in rdr.records() {
            let record = record?;
            let Some(label) = record.get(0) else {
                continue;
            };
            let date = parse_date(label)?;
            let width = table.width();
            let row = table.rows.entry(date).or_insert_with(|| vec![None; width]);

            for (pos, raw) in positions.iter().zip(record.iter().skip(1)) {
                let value = parse_cell(raw).ok_or_else(|| TableError::InvalidCell {
                    date,
                    column: table.columns[*pos].clone(),
                    value: raw.to_string(),
                })?;
                if value.is_some() {
                    row[*pos] = value;
                }
            }
        }

        Ok(table)
    }

    fn position(&self, field: &FieldName) -> Option<usize> {
        self.keys.iter().position(|k| k == field)
    }

    fn ensure_column(&mut self, name: &str) -> usize {
        let key = FieldName::new(name);
        if let Some(pos) = self.position(&key) {
            return pos;
        }
        self.columns.push(name.trim().to_string());
        self.keys.push(key);
        for row in self.rows.values_mut() {
            row.push(None);
        }
        self.columns.len() - 1
    }
}

/// Parse a row label as a date. A trailing time part is accepted and dropped.
pub fn parse_date(s: &str) -> Result<NaiveDate, TableError> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y%m%d") {
        return Ok(d);
    }
    Err(TableError::InvalidDate(s.to_string()))
}

/// `Some(None)` for an empty marker, `None` when the text is not a number.
fn parse_cell(raw: &str) -> Option<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("na") {
        return Some(None);
    }
    let v: f64 = raw.parse().ok()?;
    Some(if v.is_nan() { None } else { Some(v) })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn f(s: &str) -> FieldName {
        FieldName::new(s)
    }

    #[test]
    fn merge_unions_rows_and_columns() {
        let mut cached = FactorTable::new();
        cached.set(d("2020-03-31"), "A", Some(1.0));
        cached.set(d("2020-03-31"), "B", Some(2.0));
        cached.set(d("2020-06-30"), "A", Some(3.0));
        cached.set(d("2020-06-30"), "B", Some(4.0));

        let mut batch = FactorTable::new();
        batch.set(d("2020-06-30"), "C", Some(5.0));
        batch.set(d("2020-09-30"), "C", Some(6.0));

        cached.merge(&batch);

        assert_eq!(cached.columns(), &["A", "B", "C"]);
        let dates: Vec<_> = cached.dates().copied().collect();
        assert_eq!(dates, vec![d("2020-03-31"), d("2020-06-30"), d("2020-09-30")]);

        assert_eq!(cached.get(d("2020-03-31"), &f("c")), None);
        assert_eq!(cached.get(d("2020-06-30"), &f("c")), Some(5.0));
        assert_eq!(cached.get(d("2020-09-30"), &f("a")), None);
        assert_eq!(cached.get(d("2020-09-30"), &f("b")), None);
        assert_eq!(cached.get(d("2020-06-30"), &f("a")), Some(3.0));
    }

    #[test]
    fn merge_matches_existing_column_case_insensitively() {
        let mut cached = FactorTable::new();
        cached.set(d("2020-03-31"), "PE_TTM", Some(10.0));

        let mut batch = FactorTable::new();
        batch.set(d("2020-03-31"), "pe_ttm", None);
        batch.set(d("2020-06-30"), "pe_ttm", Some(11.0));

        cached.merge(&batch);

        assert_eq!(cached.columns(), &["PE_TTM"]);
        assert_eq!(cached.get(d("2020-03-31"), &f("pe_ttm")), Some(10.0));
        assert_eq!(cached.get(d("2020-06-30"), &f("pe_ttm")), Some(11.0));
    }

    #[test]
    fn merging_empty_table_is_a_no_op() {
        let mut cached = FactorTable::new();
        cached.set(d("2020-03-31"), "A", Some(1.0));
        let before = cached.clone();

        cached.merge(&FactorTable::new());
        assert_eq!(cached, before);
    }

    #[test]
    fn csv_layout_has_unnamed_label_column() {
        let mut t = FactorTable::new();
        t.set(d("2020-03-31"), "pe_ttm", Some(12.5));
        t.set(d("2020-06-30"), "fcfe", Some(-3.0));

        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with(",pe_ttm,fcfe"));
        assert_eq!(lines[1], "2020-03-31,12.5,");
        assert_eq!(lines[2], "2020-06-30,,-3");
    }

    #[test]
    fn read_accepts_timestamps_and_nan_markers() {
        let text = ",PE_TTM,fcfe\n2020-03-31 00:00:00,12.5,nan\n2020-06-30,NaN,\n";
        let t = FactorTable::read_csv(text.as_bytes()).unwrap();

        assert_eq!(t.height(), 2);
        assert_eq!(t.columns(), &["PE_TTM", "fcfe"]);
        assert_eq!(t.get(d("2020-03-31"), &f("pe_ttm")), Some(12.5));
        assert_eq!(t.get(d("2020-03-31"), &f("fcfe")), None);
        assert_eq!(t.get(d("2020-06-30"), &f("pe_ttm")), None);
    }

    #[test]
    fn read_rejects_text_cells() {
        let text = ",pe_ttm\n2020-03-31,abc\n";
        match FactorTable::read_csv(text.as_bytes()) {
            Err(TableError::InvalidCell { column, value, .. }) => {
                assert_eq!(column, "pe_ttm");
                assert_eq!(value, "abc");
            }
            other => panic!("expected InvalidCell, got {other:?}"),
        }
    }

    #[test]
    fn written_table_reads_back_equal() {
        let mut t = FactorTable::new();
        t.set(d("2019-12-31"), "pb_mrq", Some(1.25));
        t.set(d("2020-03-31"), "pb_mrq", None);
        t.set(d("2020-03-31"), "mkt_cap_ard", Some(1.5e10));

        let mut buf = Vec::new();
        t.write_csv(&mut buf).unwrap();
        let back = FactorTable::read_csv(buf.as_slice()).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn from_series_rejects_ragged_input() {
        let cols = vec!["a".to_string()];
        let dates = vec![d("2020-01-01"), d("2020-01-02")];
        let series = vec![vec![Some(1.0)]];
        assert!(matches!(
            FactorTable::from_series(&cols, &dates, &series),
            Err(TableError::ShapeMismatch { expected: 2, got: 1, .. })
        ));
    }

    #[test]
    fn parse_date_formats() {
        assert_eq!(parse_date("2020-03-31").unwrap(), d("2020-03-31"));
        assert_eq!(parse_date("2020-03-31T00:00:00").unwrap(), d("2020-03-31"));
        assert_eq!(parse_date("20200331").unwrap(), d("2020-03-31"));
        assert!(parse_date("31/03/2020").is_err());
    }
}
