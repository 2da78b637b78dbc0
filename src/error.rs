use thiserror::Error;

/// Errors raised by the table engine and the layers built on top of it.
///
/// Every variant is local to one operation: a failing call never leaves the
/// table it was given half-mutated.
#[derive(Error, Debug)]
pub enum DbError {
    /// A column the operation depends on is absent from the header row.
    #[error("missing required column '{column}'")]
    MissingColumn { column: String },

    /// Uploaded or persisted data could not be read as a table.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// Sheet row outside `2..=last`.
    #[error("row {row} is out of range (data rows are 2..={last})")]
    RowOutOfRange { row: usize, last: usize },

    #[error("the header row cannot be modified or deleted")]
    HeaderRow,

    #[error("unknown placeholder '{{{0}}}' in template")]
    UnknownPlaceholder(String),

    #[error("malformed template: {0}")]
    MalformedTemplate(String),

    #[error("template '{0}' cannot be empty")]
    EmptyTemplate(&'static str),

    #[error("no DB loaded")]
    NoTable,

    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    JsonError(#[from] serde_json::Error),

    #[cfg(feature = "web")]
    #[error("{0}")]
    XlsxError(#[from] rust_xlsxwriter::XlsxError),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    pub fn missing_column(column: &str) -> Self {
        DbError::MissingColumn {
            column: column.to_string(),
        }
    }
}
