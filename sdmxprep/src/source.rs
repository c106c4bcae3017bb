//! Data-source provider: fetches documents from URLs or the filesystem and reads them as tables.

use std::io::Cursor;
use std::path::Path;

use log::{debug, info};
use polars::prelude::*;
use serde_json::Value;

use crate::error::{Result, SdmxPrepError};
use crate::COL;

pub(crate) fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Fetches the raw bytes at `location`, a `http(s)` URL or a filesystem path.
pub async fn fetch_bytes(location: &str) -> Result<Vec<u8>> {
    info!("Attempting to fetch {location}");
    if is_url(location) {
        let response = reqwest::get(location)
            .await
            .map_err(|e| SdmxPrepError::source(location, e))?;
        let response = response
            .error_for_status()
            .map_err(|e| SdmxPrepError::source(location, e))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SdmxPrepError::source(location, e))?;
        Ok(bytes.to_vec())
    } else {
        tokio::fs::read(location)
            .await
            .map_err(|e| SdmxPrepError::source(location, e))
    }
}

/// Builds a table from a JSON object keyed by indicator ID, keeping `columns` only.
///
/// The key becomes the `indicator_id` column. Non-string values are kept as their JSON text and
/// `null` as missing. A column absent from every record is an error.
pub fn read_index_json(location: &str, bytes: &[u8], columns: &[String]) -> Result<DataFrame> {
    let document: Value =
        serde_json::from_slice(bytes).map_err(|e| SdmxPrepError::source(location, e))?;
    let Value::Object(records) = document else {
        return Err(SdmxPrepError::source(
            location,
            "expected a JSON object keyed by indicator ID",
        ));
    };

    let ids: Vec<&str> = records.keys().map(|k| k.as_str()).collect();
    let mut series = vec![Series::new(COL::INDICATOR_ID, ids)];
    for column in columns {
        let mut seen = false;
        let values: Vec<Option<String>> = records
            .values()
            .map(|record| match record.get(column) {
                Some(value) => {
                    seen = true;
                    json_to_text(value)
                }
                None => None,
            })
            .collect();
        if !seen && !records.is_empty() {
            return Err(SdmxPrepError::source(
                location,
                format!("required column `{column}` is absent"),
            ));
        }
        series.push(Series::new(column, values));
    }
    let df = DataFrame::new(series)?;
    debug!("Read {location} with shape {:?}", df.shape());
    Ok(df)
}

fn json_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Reads a delimited table with a header row, every column as text.
pub fn read_delimited(
    location: &str,
    bytes: Vec<u8>,
    separator: u8,
    skip_rows: usize,
) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_skip_rows(skip_rows)
        .with_infer_schema_length(Some(0))
        .map_parse_options(|options| {
            options
                .with_separator(separator)
                .with_truncate_ragged_lines(true)
        })
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .map_err(|e| SdmxPrepError::source(location, e))
}

/// Separator implied by a file name: tab for `.tsv`/`.txt`, comma otherwise.
pub fn separator_for(location: &str) -> u8 {
    match Path::new(location).extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") || ext.eq_ignore_ascii_case("txt") => b'\t',
        _ => b',',
    }
}

/// Fetches and reads a delimited table, choosing the separator from the location.
pub async fn fetch_table(location: &str) -> Result<DataFrame> {
    let bytes = fetch_bytes(location).await?;
    read_delimited(location, bytes, separator_for(location), 0)
}

/// Reads a human-edited table from the filesystem, explaining what to do if it is missing.
pub async fn read_manual_table(path: &str) -> Result<DataFrame> {
    match tokio::fs::read(path).await {
        Ok(bytes) => read_delimited(path, bytes, separator_for(path), 0),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SdmxPrepError::source(
            path,
            "manual mapping file not found; check the file is named exactly as configured \
             and has been created from the candidate table written by an earlier stage",
        )),
        Err(e) => Err(SdmxPrepError::source(path, e)),
    }
}

/// Returns the text values of `column`, failing with the table location if it is absent.
pub fn text_column<'a>(
    location: &str,
    df: &'a DataFrame,
    column: &str,
) -> Result<&'a StringChunked> {
    let series = df.column(column).map_err(|_| {
        SdmxPrepError::source(location, format!("required column `{column}` is absent"))
    })?;
    Ok(series.str()?)
}
