use crate::error::{DbError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Sheet name used when a table is written out without one
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";

/// In-memory contact table: one header row plus data rows of text cells.
///
/// Every row is kept exactly as wide as the header row. Rows are padded with
/// empty strings or truncated on the way in, so code reading a `Table` can
/// index any row by a header position without bounds checks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

/// Pad `values` on the right with empty strings, or truncate it, to `width`.
pub fn fit_row(mut values: Vec<String>, width: usize) -> Vec<String> {
    values.resize(width, String::new());
    values
}

impl Table {
    /// Build a table, aligning every row to the header width.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows.into_iter().map(|row| fit_row(row, width)).collect();
        Table { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    /// Number of data rows (the header is not counted).
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Last valid sheet row (1-based, header at 1). Equals 1 for a table with no data.
    pub fn last_sheet_row(&self) -> usize {
        self.rows.len() + 1
    }

    /// Translate a 1-based sheet row into an index into [`Table::rows`].
    ///
    /// Row 1 is the header and is rejected with [`DbError::HeaderRow`].
    pub fn data_index(&self, sheet_row: usize) -> Result<usize> {
        if sheet_row == 1 {
            return Err(DbError::HeaderRow);
        }
        if sheet_row < 2 || sheet_row > self.last_sheet_row() {
            return Err(DbError::RowOutOfRange {
                row: sheet_row,
                last: self.last_sheet_row(),
            });
        }
        Ok(sheet_row - 2)
    }

    /// Data row at a 1-based sheet position.
    pub fn sheet_row(&self, sheet_row: usize) -> Result<&[String]> {
        let index = self.data_index(sheet_row)?;
        Ok(&self.rows[index])
    }

    pub(crate) fn sheet_row_mut(&mut self, sheet_row: usize) -> Result<&mut Vec<String>> {
        let index = self.data_index(sheet_row)?;
        Ok(&mut self.rows[index])
    }

    /// Append a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, values: Vec<String>) {
        let row = fit_row(values, self.width());
        self.rows.push(row);
    }

    pub(crate) fn remove_data_row(&mut self, index: usize) -> Vec<String> {
        self.rows.remove(index)
    }
}

/// Decode a raw grid (first row = headers) into a [`Table`].
///
/// Missing cells become empty strings and data rows are aligned to the header
/// width. A grid without any row has no header and is rejected.
///
/// # Arguments
/// * `grid` - Rows of optional cell text, as produced by a spreadsheet reader
///
/// # Returns
/// * `Result<Table>` - The decoded table, or [`DbError::Malformed`] for an empty grid
pub fn decode<I, R>(grid: I) -> Result<Table>
where
    I: IntoIterator<Item = R>,
    R: IntoIterator<Item = Option<String>>,
{
    let mut rows = grid
        .into_iter()
        .map(|row| row.into_iter().map(Option::unwrap_or_default).collect::<Vec<_>>());

    let headers = rows
        .next()
        .ok_or_else(|| DbError::Malformed("sheet has no header row".to_string()))?;

    Ok(Table::new(headers, rows.collect()))
}

/// Encode a table as a grid: headers first, then every data row, column-aligned.
pub fn encode(table: &Table) -> Vec<Vec<String>> {
    let mut grid = Vec::with_capacity(table.row_count() + 1);
    grid.push(table.headers.clone());
    grid.extend(table.rows.iter().cloned());
    grid
}

/// Persisted form of one sheet
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SheetData {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub headers: Vec<Option<String>>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub rows: Vec<Vec<Option<String>>>,
}

// A missing key and an explicit `null` both read as no cells
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Serialize a table as the JSON sheet document `{ <sheet>: {headers, rows} }`.
pub fn to_json(table: &Table, sheet_name: &str) -> Result<String> {
    let sheet = SheetData {
        headers: table.headers.iter().cloned().map(Some).collect(),
        rows: table
            .rows
            .iter()
            .map(|row| row.iter().cloned().map(Some).collect())
            .collect(),
    };
    let mut document = Map::new();
    document.insert(sheet_name.to_string(), serde_json::to_value(sheet)?);
    Ok(serde_json::to_string(&Value::Object(document))?)
}

/// Parse a JSON sheet document. Only the first sheet is read.
pub fn from_json(json: &str) -> Result<Table> {
    let document: Map<String, Value> = serde_json::from_str(json)?;
    let (_, first) = document
        .into_iter()
        .next()
        .ok_or_else(|| DbError::Malformed("sheet document holds no sheet".to_string()))?;
    let sheet: SheetData = serde_json::from_value(first)?;

    let headers = sheet.headers.into_iter().map(Option::unwrap_or_default).collect();
    let rows = sheet
        .rows
        .into_iter()
        .map(|row| row.into_iter().map(Option::unwrap_or_default).collect())
        .collect();
    Ok(Table::new(headers, rows))
}
