use crate::error::{DbError, Result};
use crate::table::{self, Table};
use std::path::Path;

/// Decode CSV text into a table
///
/// The first line holds the headers. Fields may be quoted with `"` and a
/// doubled quote inside a quoted field stands for one quote. A UTF-8 byte
/// order mark is ignored.
///
/// # Arguments
/// * `bytes` - Raw file content
///
/// # Returns
/// * `Result<Table>` - The decoded table or [`DbError::Malformed`]
///
/// # Examples
/// ```
/// use dexcel::loader::from_csv;
///
/// let table = from_csv(b"NOME,COGNOME\nMario,\"Rossi, jr\"\n").unwrap();
/// assert_eq!(table.rows()[0][1], "Rossi, jr");
/// ```
pub fn from_csv(bytes: &[u8]) -> Result<Table> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| DbError::Malformed(format!("CSV is not valid UTF-8: {}", e)))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    // Headers go through the same codec as data, so read every record raw
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_reader(text.as_bytes());

    let mut grid = Vec::new();
    for (line_number, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            DbError::Malformed(format!("Failed to parse CSV record {}: {}", line_number + 1, e))
        })?;
        if is_blank_line(&record) {
            continue;
        }
        grid.push(record.iter().map(|field| Some(field.to_string())).collect::<Vec<_>>());
    }

    if grid.is_empty() {
        return Err(DbError::Malformed("CSV file is empty".to_string()));
    }
    table::decode(grid)
}

// A line holding only whitespace reads as a single blank field
fn is_blank_line(record: &csv::StringRecord) -> bool {
    record.len() == 1 && record[0].trim().is_empty()
}

/// Decode a spreadsheet (xlsx, xlsm, xlsb, xls, ods) into a table
///
/// Only the first worksheet is read. Numbers, dates and booleans become
/// their text form; empty cells become empty strings.
///
/// # Arguments
/// * `bytes` - Raw workbook content
///
/// # Returns
/// * `Result<Table>` - The decoded table or [`DbError::Malformed`]
#[cfg(feature = "web")]
pub fn from_excel(bytes: &[u8]) -> Result<Table> {
    use calamine::{Reader, open_workbook_auto_from_rs};
    use std::io::Cursor;

    let malformed = |e: calamine::Error| DbError::Malformed(e.to_string());

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(malformed)?;

    // Get the first worksheet
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| DbError::Malformed("No sheets found in workbook".to_string()))?;

    let range = workbook.worksheet_range(&sheet_name).map_err(malformed)?;

    if range.is_empty() {
        return Err(DbError::Malformed("Excel sheet is empty".to_string()));
    }

    let grid = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
    table::decode(grid)
}

#[cfg(feature = "web")]
fn cell_text(cell: &calamine::Data) -> Option<String> {
    use calamine::Data;

    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        Data::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::DateTime(dt) => Some(match dt.as_datetime() {
            Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => dt.as_f64().to_string(),
        }),
        // Floats print without a trailing ".0", so phone numbers stay readable
        other => Some(other.to_string()),
    }
}

/// Decode an uploaded file, choosing the format from its extension.
///
/// Files without a recognised extension are tried as spreadsheets.
pub fn load_table(filename: &str, bytes: &[u8]) -> Result<Table> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("csv") => from_csv(bytes),
        #[cfg(feature = "web")]
        _ => from_excel(bytes),
        #[cfg(not(feature = "web"))]
        _ => Err(DbError::Malformed(
            "Excel support requires the 'web' feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_quotes_and_escapes() {
        let table = from_csv(b"A,B,C,D,E\na,\"b,c\",\"say \"\"hi\"\"\",,\n").unwrap();
        assert_eq!(table.rows()[0], vec!["a", "b,c", r#"say "hi""#, "", ""]);
    }

    #[test]
    fn quoted_line_breaks_stay_in_one_cell() {
        let table = Table::new(
            vec!["NOME".to_string(), "NOTE".to_string()],
            vec![vec!["Mario".to_string(), "riga1\nriga2".to_string()]],
        );
        let reloaded = from_csv(crate::downloader::to_csv(&table).as_bytes()).unwrap();
        assert_eq!(reloaded, table);
    }

    #[test]
    fn csv_rows_align_to_headers() {
        let table = from_csv("\u{feff}NOME,COGNOME,ZONA\r\nMario\r\n\r\nAnna,Bianchi,Sud,extra\r\n".as_bytes())
            .unwrap();
        assert_eq!(table.headers()[0], "NOME");
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows()[0], vec!["Mario", "", ""]);
        assert_eq!(table.rows()[1], vec!["Anna", "Bianchi", "Sud"]);
    }

    #[test]
    fn empty_csv_is_malformed() {
        assert!(matches!(from_csv(b"\n\n"), Err(DbError::Malformed(_))));
        assert!(matches!(from_csv(&[0xff, 0xfe]), Err(DbError::Malformed(_))));
    }

    #[cfg(feature = "web")]
    #[test]
    fn garbage_is_not_a_workbook() {
        assert!(matches!(
            load_table("leads.xlsx", b"definitely not a zip"),
            Err(DbError::Malformed(_))
        ));
    }
}
