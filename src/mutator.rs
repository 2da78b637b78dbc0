use crate::column::{COL_CONVERTITA, COL_NON_CONV, find_column, require_column};
use crate::error::Result;
use crate::table::Table;
use serde::{Deserialize, Serialize};

/// Token written into a status column to mark it active
pub const MARKER: &str = "X";

/// Disposition of a contact row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowStatus {
    #[serde(rename = "convertita")]
    Converted,
    #[serde(rename = "non_conv")]
    NotConverted,
    #[serde(rename = "clear")]
    Cleared,
}

/// Convert a 0-based data index, as used by the web client, into the 1-based
/// sheet row used by the engine (header at row 1, first data row at 2).
pub fn sheet_row(data_index: usize) -> usize {
    data_index + 2
}

fn status_columns(table: &Table) -> Result<(usize, usize)> {
    let converted = require_column(table.headers(), COL_CONVERTITA)?;
    let not_converted = require_column(table.headers(), COL_NON_CONV)?;
    Ok((converted, not_converted))
}

/// Set the disposition of one row
///
/// Both status columns must exist. Afterwards at most one of them holds the
/// marker: `Converted` marks the first and clears the second, `NotConverted`
/// the reverse, `Cleared` empties both.
///
/// # Arguments
/// * `table` - Table to update
/// * `sheet_row` - 1-based sheet row (header is row 1)
/// * `status` - New disposition
///
/// # Errors
/// * [`DbError::MissingColumn`](crate::DbError::MissingColumn) if a status column is absent
/// * [`DbError::HeaderRow`](crate::DbError::HeaderRow) / [`DbError::RowOutOfRange`](crate::DbError::RowOutOfRange) for a bad row
pub fn set_status(table: &mut Table, sheet_row: usize, status: RowStatus) -> Result<()> {
    let (converted, not_converted) = status_columns(table)?;
    let row = table.sheet_row_mut(sheet_row)?;

    let (conv_value, non_conv_value) = match status {
        RowStatus::Converted => (MARKER, ""),
        RowStatus::NotConverted => ("", MARKER),
        RowStatus::Cleared => ("", ""),
    };
    row[converted] = conv_value.to_string();
    row[not_converted] = non_conv_value.to_string();
    Ok(())
}

/// Read back the disposition of one row.
///
/// Any non-blank "converted" cell counts as converted, the same test the
/// template renderer uses; otherwise a non-blank "not converted" cell counts.
pub fn row_status(table: &Table, sheet_row: usize) -> Result<RowStatus> {
    let (converted, not_converted) = status_columns(table)?;
    let row = table.sheet_row(sheet_row)?;
    Ok(status_of(row, converted, not_converted))
}

/// Disposition of every data row, or `None` when the status columns are absent.
pub fn statuses(table: &Table) -> Option<Vec<RowStatus>> {
    let converted = find_column(table.headers(), COL_CONVERTITA)?;
    let not_converted = find_column(table.headers(), COL_NON_CONV)?;
    Some(
        table
            .rows()
            .iter()
            .map(|row| status_of(row, converted, not_converted))
            .collect(),
    )
}

fn status_of(row: &[String], converted: usize, not_converted: usize) -> RowStatus {
    if !row[converted].trim().is_empty() {
        RowStatus::Converted
    } else if !row[not_converted].trim().is_empty() {
        RowStatus::NotConverted
    } else {
        RowStatus::Cleared
    }
}

/// Append a row built from `values`, padded or truncated to the header width.
pub fn append_row<I>(table: &mut Table, values: I)
where
    I: IntoIterator,
    I::Item: Into<String>,
{
    table.push_row(values.into_iter().map(Into::into).collect());
}

/// Remove exactly one data row, returning it.
///
/// `sheet_row` is 1-based; deleting row 1 (the header) is an error.
pub fn delete_row(table: &mut Table, sheet_row: usize) -> Result<Vec<String>> {
    let index = table.data_index(sheet_row)?;
    Ok(table.remove_data_row(index))
}

/// Rows whose `column` cell contains `needle`, ignoring case.
///
/// Returns `(data_index, row)` pairs. A blank needle keeps every row.
pub fn filter_rows<'a>(
    table: &'a Table,
    column: &str,
    needle: &str,
) -> Result<Vec<(usize, &'a [String])>> {
    let col = require_column(table.headers(), column)?;
    let needle = needle.trim().to_lowercase();

    Ok(table
        .rows()
        .iter()
        .enumerate()
        .filter(|(_, row)| needle.is_empty() || row[col].to_lowercase().contains(&needle))
        .map(|(index, row)| (index, row.as_slice()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;

    fn leads() -> Table {
        let headers = ["NOME", "COGNOME", "CONVERTITA", "PASSATA NON CONVERTITA"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let rows = vec![
            vec!["Mario".to_string(), "Rossi".to_string()],
            vec!["Anna".to_string(), "Bianchi".to_string()],
            vec!["Luca".to_string(), "Neri".to_string()],
        ];
        Table::new(headers, rows)
    }

    #[test]
    fn status_columns_are_mutually_exclusive() {
        let mut table = leads();
        set_status(&mut table, 2, RowStatus::NotConverted).unwrap();
        assert_eq!(table.rows()[0][2..], ["", "X"]);
        set_status(&mut table, 2, RowStatus::Converted).unwrap();
        assert_eq!(table.rows()[0][2..], ["X", ""]);
        assert_eq!(row_status(&table, 2).unwrap(), RowStatus::Converted);
    }

    #[test]
    fn clearing_twice_matches_clearing_once() {
        let mut table = leads();
        set_status(&mut table, 3, RowStatus::Converted).unwrap();
        set_status(&mut table, 3, RowStatus::Cleared).unwrap();
        let once = table.clone();
        set_status(&mut table, 3, RowStatus::Cleared).unwrap();
        assert_eq!(table, once);
        assert_eq!(row_status(&table, 3).unwrap(), RowStatus::Cleared);
    }

    #[test]
    fn missing_status_column_is_reported() {
        let mut table = Table::new(vec!["NOME".to_string(), "CONVERTITA".to_string()], vec![vec![]]);
        let before = table.clone();
        let err = set_status(&mut table, 2, RowStatus::Converted).unwrap_err();
        assert!(matches!(err, DbError::MissingColumn { ref column } if column == COL_NON_CONV));
        assert_eq!(table, before);
        assert!(statuses(&table).is_none());
    }

    #[test]
    fn status_update_rejects_header_and_out_of_range_rows() {
        let mut table = leads();
        assert!(matches!(
            set_status(&mut table, 1, RowStatus::Converted),
            Err(DbError::HeaderRow)
        ));
        assert!(matches!(
            set_status(&mut table, 5, RowStatus::Converted),
            Err(DbError::RowOutOfRange { row: 5, last: 4 })
        ));
    }

    #[test]
    fn append_pads_short_rows() {
        let mut table = Table::new(
            ["A", "B", "C", "D", "E"].iter().map(|s| s.to_string()).collect(),
            Vec::new(),
        );
        append_row(&mut table, ["Mario", "Rossi"]);
        assert_eq!(table.rows()[0], vec!["Mario", "Rossi", "", "", ""]);
    }

    #[test]
    fn delete_uses_sheet_rows() {
        let mut table = leads();
        let removed = delete_row(&mut table, sheet_row(0)).unwrap();
        assert_eq!(removed[0], "Mario");
        assert_eq!(table.row_count(), 2);
        assert!(matches!(delete_row(&mut table, 1), Err(DbError::HeaderRow)));
    }

    #[test]
    fn filter_is_case_insensitive() {
        let table = leads();
        let hits = filter_rows(&table, "cognome", "ROSS").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, 0);
        assert_eq!(filter_rows(&table, "NOME", "  ").unwrap().len(), 3);
        assert!(filter_rows(&table, "ZONA", "x").is_err());
    }
}
