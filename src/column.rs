use crate::error::{DbError, Result};

/// Header of the "converted" status column
pub const COL_CONVERTITA: &str = "CONVERTITA";
/// Header of the "passed, not converted" status column
pub const COL_NON_CONV: &str = "PASSATA NON CONVERTITA";
/// Default merge key columns
pub const MERGE_KEY_COLS: [&str; 3] = ["NOME", "COGNOME", "ZONA"];

/// Normalize a header name for lookup: trimmed and upper-cased.
pub fn normalize_header(name: &str) -> String {
    name.trim().to_uppercase()
}

/// Find the 0-based position of a column by header name
///
/// The comparison ignores case and surrounding whitespace. When several
/// headers match, the first one wins.
///
/// # Arguments
/// * `headers` - Header row to scan
/// * `name` - Column to look for
///
/// # Returns
/// * `Option<usize>` - Index of the first matching header, `None` if nothing matches
///
/// # Examples
/// ```
/// use dexcel::column::find_column;
///
/// let headers = vec![" Nome ".to_string(), "COGNOME".to_string()];
/// assert_eq!(find_column(&headers, "cognome"), Some(1));
/// assert_eq!(find_column(&headers, "ZONA"), None);
/// ```
pub fn find_column<S: AsRef<str>>(headers: &[S], name: &str) -> Option<usize> {
    let target = normalize_header(name);
    headers
        .iter()
        .position(|header| normalize_header(header.as_ref()) == target)
}

/// Like [`find_column`] but a missing column is a configuration error.
pub fn require_column<S: AsRef<str>>(headers: &[S], name: &str) -> Result<usize> {
    find_column(headers, name).ok_or_else(|| DbError::missing_column(name))
}
