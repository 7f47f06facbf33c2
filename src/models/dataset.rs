//! In-memory tabular data parsed from downloaded CSV or spreadsheet files.

use std::io::Cursor;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::NaiveDateTime;

use crate::error::{AppError, Result};

/// Canonical ISO-8601 layout for date/time cells, both on disk and when comparing.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Tokens read as a missing value.
const MISSING_TOKENS: &[&str] = &[
    "", "nan", "NaN", "NAN", "NA", "N/A", "n/a", "#N/A", "NULL", "null", "None", "NaT",
];

/// Whether a raw token stands for a missing value.
pub fn is_missing_token(s: &str) -> bool {
    MISSING_TOKENS.contains(&s.trim())
}

/// A single typed cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    DateTime(NaiveDateTime),
    Text(String),
}

impl Cell {
    /// Text form used when writing CSV.
    pub fn to_field(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Number(n) if n.is_nan() => String::new(),
            Cell::Number(n) => n.to_string(),
            Cell::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
            Cell::Text(s) => s.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<f64> for Cell {
    fn from(n: f64) -> Self {
        Cell::Number(n)
    }
}

/// Dominant type of a column, inferred from its non-empty cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    DateTime,
    Text,
}

/// Supported download formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Spreadsheet,
}

impl FileFormat {
    /// Pick a parser from the URL's extension. Anything not CSV is read as a spreadsheet.
    pub fn from_url(url: &str) -> Self {
        let path = url::Url::parse(url)
            .map(|u| u.path().to_lowercase())
            .unwrap_or_else(|_| url.to_lowercase());

        if path.ends_with(".csv") {
            FileFormat::Csv
        } else if path.ends_with(".xlsx") || path.ends_with(".xls") {
            FileFormat::Spreadsheet
        } else if url.to_lowercase().contains(".csv") {
            FileFormat::Csv
        } else {
            FileFormat::Spreadsheet
        }
    }
}

/// A rectangular table: ordered header names and ordered rows of cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularDataset {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl TabularDataset {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { headers, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.headers.len()
    }

    /// Infer a column's kind. Empty columns count as numeric.
    pub fn column_kind(&self, column: usize) -> ColumnKind {
        let mut kind: Option<ColumnKind> = None;
        for cell in self.rows.iter().filter_map(|r| r.get(column)) {
            let cell_kind = match cell {
                Cell::Empty => continue,
                Cell::Number(_) => ColumnKind::Numeric,
                Cell::DateTime(_) => ColumnKind::DateTime,
                Cell::Text(_) => return ColumnKind::Text,
            };
            match kind {
                None => kind = Some(cell_kind),
                Some(k) if k != cell_kind => return ColumnKind::Text,
                _ => {}
            }
        }
        kind.unwrap_or(ColumnKind::Numeric)
    }

    /// Parse downloaded bytes according to `format`.
    pub fn parse(bytes: &[u8], format: FileFormat, context: &str) -> Result<Self> {
        match format {
            FileFormat::Csv => Self::from_csv(bytes, context),
            FileFormat::Spreadsheet => Self::from_spreadsheet(bytes, context),
        }
    }

    /// Parse CSV text. The first record is the header row; columns whose
    /// non-missing values all parse as numbers become numeric.
    pub fn from_csv(bytes: &[u8], context: &str) -> Result<Self> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(bytes);

        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
        if headers.is_empty() {
            return Err(AppError::parse(context, "no header row"));
        }

        let mut rows: Vec<Vec<Cell>> = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            if record.len() > headers.len() {
                return Err(AppError::parse(
                    context,
                    format!(
                        "row {} has {} fields, expected {}",
                        line + 1,
                        record.len(),
                        headers.len()
                    ),
                ));
            }
            let mut row: Vec<Cell> = record
                .iter()
                .map(|field| {
                    if is_missing_token(field) {
                        Cell::Empty
                    } else {
                        Cell::from(field)
                    }
                })
                .collect();
            row.resize(headers.len(), Cell::Empty);
            rows.push(row);
        }
        promote_numeric_text(&mut rows, headers.len());

        Ok(Self { headers, rows })
    }

    /// Parse the first worksheet of an xls/xlsx workbook.
    pub fn from_spreadsheet(bytes: &[u8], context: &str) -> Result<Self> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| AppError::parse(context, "workbook has no sheets"))??;

        let mut rows_iter = range.rows();
        let headers: Vec<String> = match rows_iter.next() {
            Some(header_row) => header_row.iter().map(header_text).collect(),
            None => return Err(AppError::parse(context, "worksheet is empty")),
        };

        let mut rows: Vec<Vec<Cell>> = rows_iter
            .map(|row| {
                let mut cells: Vec<Cell> = row.iter().map(spreadsheet_cell).collect();
                cells.resize(headers.len(), Cell::Empty);
                cells
            })
            .filter(|cells| !cells.iter().all(Cell::is_empty))
            .collect();
        // Text-typed numbers must read the same as the CSV snapshot written from them.
        promote_numeric_text(&mut rows, headers.len());

        Ok(Self { headers, rows })
    }

    /// Serialize as CSV with a header row.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(Cell::to_field))?;
        }
        writer
            .into_inner()
            .map_err(|e| AppError::parse("csv writer", e.error()))
    }
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Turn text cells into numbers in every column whose non-empty cells are
/// all numbers or numeric text.
fn promote_numeric_text(rows: &mut [Vec<Cell>], width: usize) {
    for col in 0..width {
        let numeric = rows
            .iter()
            .filter_map(|r| r.get(col))
            .all(|cell| match cell {
                Cell::Empty | Cell::Number(_) => true,
                Cell::Text(s) => parse_number(s).is_some(),
                Cell::DateTime(_) => false,
            });
        if !numeric {
            continue;
        }
        for cell in rows.iter_mut().filter_map(|r| r.get_mut(col)) {
            let parsed = match cell {
                Cell::Text(s) => parse_number(s),
                _ => None,
            };
            if let Some(n) = parsed {
                *cell = Cell::Number(n);
            }
        }
    }
}

fn header_text(data: &Data) -> String {
    match data {
        Data::Empty => String::new(),
        Data::Float(f) if f.fract() == 0.0 => format!("{f:.0}"),
        other => other.to_string(),
    }
}

fn spreadsheet_cell(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Text(if *b { "True".into() } else { "False".into() }),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map_or_else(|| Cell::Number(dt.as_f64()), Cell::DateTime),
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
            .map_or_else(|_| Cell::Text(s.clone()), Cell::DateTime),
        Data::DurationIso(s) => Cell::Text(s.clone()),
        Data::String(s) if is_missing_token(s) => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::diff::is_equal;
    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook, Worksheet};

    fn workbook(fill: impl FnOnce(&mut Worksheet)) -> Vec<u8> {
        let mut workbook = Workbook::new();
        fill(workbook.add_worksheet());
        workbook.save_to_buffer().unwrap()
    }

    /// The dataset as it reads back from its saved CSV snapshot.
    fn reloaded(ds: &TabularDataset) -> TabularDataset {
        TabularDataset::from_csv(&ds.to_csv_bytes().unwrap(), "snapshot").unwrap()
    }

    #[test]
    fn test_csv_numeric_inference() {
        let csv = b"name,beds\nA,1.00000\nB,2\n";
        let ds = TabularDataset::from_csv(csv, "test").unwrap();
        assert_eq!(ds.headers, vec!["name", "beds"]);
        assert_eq!(ds.rows[0], vec![Cell::from("A"), Cell::Number(1.0)]);
        assert_eq!(ds.column_kind(0), ColumnKind::Text);
        assert_eq!(ds.column_kind(1), ColumnKind::Numeric);
    }

    #[test]
    fn test_csv_mixed_column_stays_text() {
        let csv = b"code\n12\nX7\n";
        let ds = TabularDataset::from_csv(csv, "test").unwrap();
        assert_eq!(ds.rows[0][0], Cell::from("12"));
        assert_eq!(ds.column_kind(0), ColumnKind::Text);
    }

    #[test]
    fn test_csv_missing_tokens_and_short_rows() {
        let csv = b"a,b,c\n1,NaN\n2,3,\n";
        let ds = TabularDataset::from_csv(csv, "test").unwrap();
        assert_eq!(ds.rows[0], vec![Cell::Number(1.0), Cell::Empty, Cell::Empty]);
        assert_eq!(ds.rows[1][1], Cell::Number(3.0));
    }

    #[test]
    fn test_csv_too_many_fields_is_parse_error() {
        let csv = b"a,b\n1,2,3\n";
        let err = TabularDataset::from_csv(csv, "bad.csv").unwrap_err();
        assert!(matches!(err, AppError::Parse { .. }));
    }

    #[test]
    fn test_csv_strips_bom() {
        let csv = b"\xEF\xBB\xBFname\nA\n";
        let ds = TabularDataset::from_csv(csv, "test").unwrap();
        assert_eq!(ds.headers, vec!["name"]);
    }

    #[test]
    fn test_csv_write_then_read_keeps_values() {
        let ds = TabularDataset::new(
            vec!["name".into(), "opened".into(), "beds".into()],
            vec![vec![
                Cell::from("Hospital, North"),
                Cell::DateTime(
                    NaiveDateTime::parse_from_str("2024-03-01T00:00:00", DATETIME_FORMAT).unwrap(),
                ),
                Cell::Number(12.5),
            ]],
        );
        let bytes = ds.to_csv_bytes().unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"Hospital, North\",2024-03-01T00:00:00,12.5"));

        let back = TabularDataset::from_csv(&bytes, "test").unwrap();
        assert_eq!(back.rows[0][2], Cell::Number(12.5));
        assert_eq!(back.rows[0][1], Cell::from("2024-03-01T00:00:00"));
    }

    #[test]
    fn test_spreadsheet_numbers_and_dates() {
        let bytes = workbook(|sheet| {
            let date = Format::new().set_num_format("yyyy-mm-dd");
            sheet.write_string(0, 0, "Hospital").unwrap();
            sheet.write_string(0, 1, "Beds").unwrap();
            sheet.write_string(0, 2, "Opened").unwrap();
            sheet.write_number(0, 3, 2024.0).unwrap();

            sheet.write_string(1, 0, "Auckland City").unwrap();
            sheet.write_number(1, 1, 1000.0).unwrap();
            let opened = ExcelDateTime::from_ymd(1990, 1, 1).unwrap();
            sheet.write_datetime_with_format(1, 2, &opened, &date).unwrap();
            sheet.write_number(1, 3, 1.5).unwrap();

            // Row 2 left blank.
            sheet.write_string(3, 0, "Wellington").unwrap();
            sheet.write_number(3, 1, 450.0).unwrap();
            let opened = ExcelDateTime::from_ymd(1995, 6, 30).unwrap();
            sheet.write_datetime_with_format(3, 2, &opened, &date).unwrap();
            sheet.write_number(3, 3, 2.25).unwrap();
        });

        let ds = TabularDataset::from_spreadsheet(&bytes, "hospitals.xlsx").unwrap();
        assert_eq!(ds.headers, vec!["Hospital", "Beds", "Opened", "2024"]);
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.rows[0][1], Cell::Number(1000.0));
        assert_eq!(
            ds.rows[1][2],
            Cell::DateTime(
                NaiveDateTime::parse_from_str("1995-06-30T00:00:00", DATETIME_FORMAT).unwrap()
            )
        );
        assert_eq!(ds.column_kind(1), ColumnKind::Numeric);
        assert_eq!(ds.column_kind(2), ColumnKind::DateTime);

        assert!(is_equal(&ds, Some(&reloaded(&ds))));
    }

    #[test]
    fn test_spreadsheet_text_digits_read_as_numbers() {
        let bytes = workbook(|sheet| {
            sheet.write_string(0, 0, "Facility Code").unwrap();
            sheet.write_string(0, 1, "Ward").unwrap();
            sheet.write_string(1, 0, "0123").unwrap();
            sheet.write_string(1, 1, "0456").unwrap();
            sheet.write_string(2, 0, " 12 ").unwrap();
            sheet.write_string(2, 1, "B7").unwrap();
        });

        let ds = TabularDataset::from_spreadsheet(&bytes, "codes.xlsx").unwrap();
        assert_eq!(ds.rows[0][0], Cell::Number(123.0));
        assert_eq!(ds.rows[1][0], Cell::Number(12.0));
        assert_eq!(ds.column_kind(0), ColumnKind::Numeric);
        assert_eq!(ds.rows[0][1], Cell::from("0456"));
        assert_eq!(ds.column_kind(1), ColumnKind::Text);

        let again = TabularDataset::from_spreadsheet(&bytes, "codes.xlsx").unwrap();
        assert!(is_equal(&again, Some(&reloaded(&ds))));
    }

    #[test]
    fn test_large_float_header_is_not_clamped() {
        assert_eq!(header_text(&Data::Float(1e20)), "100000000000000000000");
        assert_eq!(header_text(&Data::Float(2.5)), "2.5");
    }

    #[test]
    fn test_spreadsheet_garbage_is_error() {
        assert!(TabularDataset::from_spreadsheet(b"not a workbook", "x.xlsx").is_err());
    }

    #[test]
    fn test_format_from_url() {
        assert_eq!(FileFormat::from_url("https://a.org/f.CSV"), FileFormat::Csv);
        assert_eq!(FileFormat::from_url("https://a.org/f.xlsx"), FileFormat::Spreadsheet);
        assert_eq!(FileFormat::from_url("https://a.org/f.xls?dl=1"), FileFormat::Spreadsheet);
        assert_eq!(
            FileFormat::from_url("https://a.org/download?file=list.csv"),
            FileFormat::Csv
        );
    }
}
