/*!
# Dexcel

A small web application for working through a contact/lead spreadsheet ("DB").

## Overview

Upload an Excel file, view it as a table, mark each lead as converted or
passed-not-converted, copy a templated text snippet for a row, add or delete
rows, merge more spreadsheets into the master without duplicating contacts,
and download the result.

## Architecture

### Table engine
- **column**: Header lookup by name, ignoring case and surrounding whitespace
- **table**: The `Table` model, grid codec and JSON sheet document
- **mutator**: Row status updates, row append/delete and filtering
- **merge**: Merge/deduplication on a composite key (`NOME`, `COGNOME`, `ZONA` by default)
- **template**: Snippet rendering for a row, chosen by its status

The engine is synchronous and storage-free: it receives decoded tables and
returns mutated ones.

### Around the engine
- **store**: `TableStore` capability with in-memory and gzip-file backends
- **config**: Environment configuration and the persisted templates file
- **loader**: Decode uploaded xlsx/xls/ods (via calamine) and CSV files
- **downloader**: Export to XLSX and CSV
- **app**: axum routes, session cookie and per-table locking (feature `web`)

## Row addressing

The web client counts data rows from 0. The engine counts sheet rows from 1
with the header at row 1, so data row `i` is sheet row `i + 2`
(see [`mutator::sheet_row`]).

## REST API Endpoints

- `POST /api/upload` - Replace the DB with an uploaded spreadsheet
- `POST /api/import` - Merge one uploaded spreadsheet into the DB
- `POST /api/merge` - Merge several spreadsheets, skipping unreadable ones
- `GET /api/table`, `GET /api/filter` - Read the DB
- `POST /api/mark_row`, `POST /api/add_row`, `POST /api/delete_row/{idx}` - Edit rows
- `GET /api/copy_text/{idx}` - Render the snippet for a row
- `GET|POST /api/templates` - Read or save the snippet templates
- `GET /download`, `GET /download/csv` - Download the DB as XLSX or CSV
*/

pub mod column;
pub mod config;
pub mod downloader;
pub mod error;
pub mod loader;
pub mod merge;
pub mod mutator;
pub mod store;
pub mod table;
pub mod template;

#[cfg(feature = "web")]
pub mod app;

pub use error::{DbError, Result};
pub use merge::{MergeKey, MergeReport, merge, merge_files};
pub use mutator::{RowStatus, append_row, delete_row, set_status, sheet_row};
pub use store::{FileStore, MemoryStore, TableStore};
pub use table::{Table, decode, encode};
pub use template::{Templates, render};
