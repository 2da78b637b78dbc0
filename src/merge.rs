use crate::column::{find_column, require_column};
use crate::error::Result;
use crate::table::Table;
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashSet;

/// Separator between key parts; not expected to occur in contact data
const KEY_SEPARATOR: char = '|';

/// Composite identity of a row: trimmed, upper-cased key cells joined by `|`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeKey(String);

impl MergeKey {
    /// Build the key of `row` from pre-resolved column positions.
    ///
    /// An unresolved column, or a position past the end of the row, counts as
    /// an empty part. Returns `None` when every part is empty.
    pub fn from_row(row: &[String], columns: &[Option<usize>]) -> Option<Self> {
        let parts: Vec<String> = columns
            .iter()
            .map(|col| {
                col.and_then(|idx| row.get(idx))
                    .map(|value| value.trim().to_uppercase())
                    .unwrap_or_default()
            })
            .collect();

        if parts.iter().all(String::is_empty) {
            return None;
        }

        let mut key = String::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                key.push(KEY_SEPARATOR);
            }
            key.push_str(part);
        }
        Some(MergeKey(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_blank(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}

/// Merge source tables into `master`, skipping rows already present
///
/// Key columns are resolved by name on every table separately, so sources may
/// order their columns differently. Rows are copied positionally and aligned
/// to the master width. Within and across sources the first occurrence of a
/// key wins; rows with an all-blank key are never imported.
///
/// # Arguments
/// * `master` - Table receiving new rows
/// * `sources` - Tables to import, processed in order
/// * `key_columns` - Header names forming the merge key
///
/// # Returns
/// * `Result<usize>` - Number of rows appended to `master`
///
/// # Errors
/// * [`DbError::MissingColumn`](crate::DbError::MissingColumn) if `master` lacks a key column; `master` is left untouched
pub fn merge<S: AsRef<str>>(
    master: &mut Table,
    sources: &[Table],
    key_columns: &[S],
) -> Result<usize> {
    let master_columns = key_columns
        .iter()
        .map(|name| require_column(master.headers(), name.as_ref()).map(Some))
        .collect::<Result<Vec<_>>>()?;

    let mut keys: HashSet<MergeKey> = master
        .rows()
        .iter()
        .filter_map(|row| MergeKey::from_row(row, &master_columns))
        .collect();

    let mut imported = 0;

    for source in sources {
        let source_columns: Vec<Option<usize>> = key_columns
            .iter()
            .map(|name| find_column(source.headers(), name.as_ref()))
            .collect();

        for row in source.rows() {
            if is_blank(row) {
                continue;
            }
            let Some(key) = MergeKey::from_row(row, &source_columns) else {
                continue;
            };
            if keys.contains(&key) {
                debug!("skipping duplicate key {}", key.as_str());
                continue;
            }
            master.push_row(row.clone());
            keys.insert(key);
            imported += 1;
        }
    }

    Ok(imported)
}

/// A source file that could not be decoded
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub file: String,
    pub reason: String,
}

/// Outcome of merging a batch of uploaded files
#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    /// Rows appended to the master
    pub imported: usize,
    /// Files that decoded and took part in the merge
    pub merged_files: usize,
    pub failed: Vec<FileFailure>,
}

/// Merge a batch of already-decoded files, tolerating undecodable ones.
///
/// Each entry pairs a file name with its decode result. Failed files are
/// recorded in the report and skipped; the remaining ones are merged in order.
pub fn merge_files<S: AsRef<str>>(
    master: &mut Table,
    files: Vec<(String, Result<Table>)>,
    key_columns: &[S],
) -> Result<MergeReport> {
    let mut report = MergeReport::default();
    let mut sources = Vec::with_capacity(files.len());

    for (file, decoded) in files {
        match decoded {
            Ok(table) => sources.push(table),
            Err(e) => {
                warn!("skipping '{}' during merge: {}", file, e);
                report.failed.push(FileFailure {
                    file,
                    reason: e.to_string(),
                });
            }
        }
    }

    report.merged_files = sources.len();
    report.imported = merge(master, &sources, key_columns)?;
    info!(
        "merged {} file(s), imported {} row(s), {} file(s) failed",
        report.merged_files,
        report.imported,
        report.failed.len()
    );
    Ok(report)
}
