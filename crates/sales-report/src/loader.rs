//! Raw table loading.
//!
//! Delimited files are read with every column as a string so that type
//! coercion happens in one place, the [`Validator`](crate::validator::Validator),
//! where a bad cell becomes a row-level violation instead of a load failure.
//! Spreadsheets follow the same rule: the first sheet is read cell by cell
//! into string columns, with its first row as the header.

use crate::error::{ReportError, Result, ResultExt};
use calamine::{Data, Reader, open_workbook_auto};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Supported input formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Tsv,
    Parquet,
    Excel,
}

impl TableFormat {
    /// Format for `path`, or `None` when the extension is not supported.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "txt" => Some(Self::Csv),
            "tsv" | "tab" => Some(Self::Tsv),
            "parquet" | "pq" => Some(Self::Parquet),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(Self::Excel),
            _ => None,
        }
    }
}

/// Load the table at `path` and normalize its header names.
pub fn load_table(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ReportError::InvalidInput(format!(
            "input file '{}' does not exist",
            path.display()
        )));
    }

    let format = TableFormat::from_path(path).ok_or_else(|| {
        ReportError::InvalidInput(format!(
            "unsupported input format '{}' (expected .csv, .tsv, .parquet or .xlsx)",
            path.display()
        ))
    })?;

    let mut df = match format {
        TableFormat::Csv => read_delimited(path, b',')?,
        TableFormat::Tsv => read_delimited(path, b'\t')?,
        TableFormat::Parquet => {
            let file = File::open(path).context(format!("Failed to open '{}'", path.display()))?;
            ParquetReader::new(file)
                .finish()
                .context(format!("Failed to read parquet '{}'", path.display()))?
        }
        TableFormat::Excel => read_workbook(path)?,
    };

    normalize_headers(&mut df)?;
    info!(
        path = %path.display(),
        rows = df.height(),
        columns = df.width(),
        "Loaded input table"
    );
    Ok(df)
}

fn read_delimited(path: &Path, separator: u8) -> Result<DataFrame> {
    // schema length 0 reads every column as String
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(separator)
                .with_quote_char(Some(b'"')),
        )
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))
        .context(format!("Failed to open '{}'", path.display()))?
        .finish()
        .context(format!("Failed to parse '{}'", path.display()))
}

fn read_workbook(path: &Path) -> Result<DataFrame> {
    let unreadable = |e: calamine::Error| {
        ReportError::InvalidInput(format!("cannot read workbook '{}': {e}", path.display()))
    };
    let mut workbook = open_workbook_auto(path).map_err(unreadable)?;
    let sheet = workbook.sheet_names().first().cloned().ok_or_else(|| {
        ReportError::InvalidInput(format!("workbook '{}' has no sheets", path.display()))
    })?;
    let range = workbook.worksheet_range(&sheet).map_err(unreadable)?;
    debug!(sheet = %sheet, "Reading first worksheet");

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(DataFrame::empty());
    };
    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); header.len()];
    for row in rows {
        for (column, cell) in cells.iter_mut().zip(row) {
            column.push(cell_text(cell));
        }
    }

    let columns: Vec<Column> = header
        .iter()
        .enumerate()
        .zip(cells)
        .map(|((i, name), values)| {
            let name = cell_text(name).unwrap_or_else(|| format!("column_{}", i + 1));
            Column::from(Series::new(name.as_str().into(), values))
        })
        .collect();
    DataFrame::new(columns).context(format!("Failed to build table from '{}'", path.display()))
}

/// Cell contents as text; empty and error cells are missing.
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) if s.trim().is_empty() => None,
        other => Some(other.to_string()),
    }
}

/// Lower-case header names and turn spaces and dashes into underscores.
pub fn normalize_headers(df: &mut DataFrame) -> Result<()> {
    let normalized: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| normalize_header(name.as_str()))
        .collect();
    debug!(columns = ?normalized, "Normalized headers");
    df.set_column_names(normalized)
        .context("Failed to rename columns")
}

/// Normalized form of one header name.
pub fn normalize_header(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}
