//! Header-only schema inference
//!
//! Scans the header row of every source file (never the data rows) and
//! unions the canonical column keys into one sorted, deduplicated set.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::normalize::{canonical_key, IDENTITY_COLUMN};
use crate::{Error, Result};

/// Open a CSV reader with the pipeline's dialect (comma, header row, strict widths)
pub fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(b',')
        .double_quote(true)
        .flexible(false)
        .from_reader(reader)
}

/// Read the raw header row of a file
pub fn read_header(path: &Path) -> Result<Vec<String>> {
    if !path.is_file() {
        return Err(Error::NotFound(format!(
            "Source file not found: {}",
            path.display()
        )));
    }
    let file = std::fs::File::open(path)?;
    read_header_from(file)
}

/// Read the raw header row from any reader
pub fn read_header_from<R: Read>(reader: R) -> Result<Vec<String>> {
    let mut rdr = csv_reader(reader);
    let headers = rdr.headers()?;
    Ok(headers.iter().map(str::to_string).collect())
}

/// Union canonical column keys from a sequence of header rows.
///
/// Fails with [`Error::EmptyInput`] for an empty sequence, and when the
/// headers yield no usable column at all.
pub fn union_headers<I, H>(headers: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = H>,
    H: IntoIterator,
    H::Item: AsRef<str>,
{
    let mut seen_any = false;
    let mut columns = BTreeSet::new();

    for header in headers {
        seen_any = true;
        for raw in header {
            let key = canonical_key(raw.as_ref());
            // Blank names never become columns; the loader drops or checks them
            if key.is_empty() {
                continue;
            }
            if key == IDENTITY_COLUMN {
                warn!(
                    "Column '{}' is reserved for the synthetic key and is not inferred",
                    raw.as_ref()
                );
                continue;
            }
            columns.insert(key);
        }
    }

    if !seen_any {
        return Err(Error::EmptyInput("no source files given".to_string()));
    }
    if columns.is_empty() {
        return Err(Error::EmptyInput(
            "source files carry no usable header columns".to_string(),
        ));
    }

    Ok(columns.into_iter().collect())
}

/// Infer the unified column set for a group of source files
pub fn infer_columns<P: AsRef<Path>>(files: &[P]) -> Result<Vec<String>> {
    let mut headers = Vec::with_capacity(files.len());
    for path in files {
        let path = path.as_ref();
        info!("Scanning {}...", path.display());
        let header = read_header(path)?;
        debug!(file = %path.display(), columns = header.len(), "Header read");
        headers.push(header);
    }

    let columns = union_headers(headers)?;
    info!("Inferred {} columns from {} files", columns.len(), files.len());
    Ok(columns)
}

/// List `*.csv` files directly under `root`, sorted by path
pub fn discover_source_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::NotFound(format!(
            "Source directory not found: {}",
            root.display()
        )));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
