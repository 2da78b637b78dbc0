use crate::table::{self, Table};

/// Convert a table to CSV format
///
/// Headers go on the first line, then one line per data row. Fields holding
/// commas, quotes or newlines are quoted and inner quotes doubled.
///
/// # Arguments
/// * `table` - Reference to the table to convert
///
/// # Returns
/// * `String` - CSV content
///
/// # Examples
/// ```
/// use dexcel::downloader::to_csv;
/// use dexcel::table::Table;
///
/// let table = Table::new(vec!["NOME".into()], vec![vec!["Rossi, Mario".into()]]);
/// assert_eq!(to_csv(&table), "NOME\n\"Rossi, Mario\"\n");
/// ```
pub fn to_csv(table: &Table) -> String {
    let mut csv_content = String::new();

    for row in table::encode(table) {
        for (c, value) in row.iter().enumerate() {
            if c > 0 {
                csv_content.push(',');
            }
            // Handle value - escape commas, quotes, newlines as needed
            if value.contains(',') || value.contains('"') || value.contains('\n') {
                let escaped = value.replace('"', "\"\"");
                csv_content.push_str(&format!("\"{}\"", escaped));
            } else {
                csv_content.push_str(value);
            }
        }
        csv_content.push('\n');
    }

    csv_content
}

/// Convert a table to XLSX format
///
/// Writes the headers to row 1 and each data row below it, every cell as a
/// string. Numbers and dates that were read as text stay text.
///
/// # Arguments
/// * `table` - Reference to the table to convert
///
/// # Returns
/// * `Result<Vec<u8>>` - XLSX file content as bytes or an error
#[cfg(feature = "web")]
pub fn to_xlsx(table: &Table) -> crate::error::Result<Vec<u8>> {
    use rust_xlsxwriter::{Workbook, Worksheet};

    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    worksheet.set_name(table::DEFAULT_SHEET_NAME)?;

    for (r, row) in table::encode(table).iter().enumerate() {
        for (c, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            worksheet.write_string(r as u32, c as u16, value)?;
        }
    }

    workbook.push_worksheet(worksheet);
    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_escapes_special_characters() {
        let table = Table::new(
            vec!["NOME".to_string(), "NOTE".to_string()],
            vec![vec!["Mario".to_string(), "dice \"ciao\"\nbis".to_string()]],
        );
        assert_eq!(to_csv(&table), "NOME,NOTE\nMario,\"dice \"\"ciao\"\"\nbis\"\n");
    }

    #[cfg(feature = "web")]
    #[test]
    fn xlsx_round_trips_through_the_loader() {
        let table = Table::new(
            vec!["NOME".to_string(), "COGNOME".to_string(), "CONVERTITA".to_string()],
            vec![
                vec!["Mario".to_string(), "Rossi".to_string(), "X".to_string()],
                vec!["Anna".to_string(), String::new(), "3331234567".to_string()],
            ],
        );
        let bytes = to_xlsx(&table).unwrap();
        let loaded = crate::loader::from_excel(&bytes).unwrap();
        assert_eq!(loaded, table);
    }
}
