//! Response decoding, dot-path extraction, and output formatting
//!
//! The response body is decoded as JSON opportunistically; anything that
//! fails to parse passes through as a raw string. The dot-path accessor is
//! deliberately minimal: keys descend into objects, the literal `[]` token
//! returns a whole sequence, and nothing else. No wildcards, no
//! predicates, no numeric indexing.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

use log::{info, warn};
use serde_json::{Map, Value};

use crate::error::Error;

/// Output format tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
    Csv,
    Text,
    Table,
}

impl Format {
    /// Parse a format tag; unknown tags fail here, never later.
    pub fn parse(s: &str) -> Result<Format, Error> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            "csv" => Ok(Format::Csv),
            "text" | "txt" => Ok(Format::Text),
            "table" => Ok(Format::Table),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Decode a response body: JSON when possible, raw string otherwise,
/// null when empty.
pub fn decode_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => Value::String(String::from_utf8_lossy(body).into_owned()),
    }
}

/// Walk one dot-path into a decoded value.
pub fn extract_path(data: &Value, path: &str) -> Result<Value, Error> {
    let mut current = data;
    for segment in path.split('.') {
        match current {
            Value::Object(map) => {
                current = map.get(segment).ok_or_else(|| Error::PathNotFound {
                    path: path.to_string(),
                    segment: segment.to_string(),
                })?;
            }
            Value::Array(_) if segment == "[]" => {
                // The whole sequence; deeper segments are not descended.
                return Ok(current.clone());
            }
            _ => {
                return Err(Error::PathNotFound {
                    path: path.to_string(),
                    segment: segment.to_string(),
                });
            }
        }
    }
    Ok(current.clone())
}

/// Apply dot-path extraction per field, keyed by field path. A field that
/// misses is logged and omitted; extraction never hard-fails.
pub fn extract_fields(data: &Value, fields: &[String]) -> Value {
    let mut result = Map::new();
    for field in fields {
        match extract_path(data, field) {
            Ok(value) => {
                result.insert(field.clone(), value);
            }
            Err(err) => warn!("failed to extract field {field}: {err}"),
        }
    }
    Value::Object(result)
}

/// Apply one dot-path as the primary filter. A miss propagates to the
/// caller, which decides whether to fall back to the unfiltered value.
pub fn filter_value(data: &Value, filter: &str) -> Result<Value, Error> {
    extract_path(data, filter)
}

/// Render a decoded value in the requested format.
pub fn format_value(data: &Value, format: Format) -> Result<Vec<u8>, Error> {
    match format {
        Format::Json => {
            let mut bytes = serde_json::to_vec_pretty(data).map_err(Error::Serialize)?;
            bytes.push(b'\n');
            Ok(bytes)
        }
        Format::Yaml => {
            let text = serde_yaml::to_string(data)
                .map_err(|e| Error::UnsupportedFormat(format!("yaml: {e}")))?;
            Ok(text.into_bytes())
        }
        Format::Csv => format_delimited(data, ','),
        Format::Table => format_delimited(data, '|'),
        Format::Text => match data {
            Value::String(s) => Ok(format!("{s}\n").into_bytes()),
            other => {
                let mut bytes = serde_json::to_vec(other).map_err(Error::Serialize)?;
                bytes.push(b'\n');
                Ok(bytes)
            }
        },
    }
}

/// CSV-style rendering with a header row. Tables are the same rendering
/// with a pipe delimiter.
fn format_delimited(data: &Value, delimiter: char) -> Result<Vec<u8>, Error> {
    let rows: Vec<Map<String, Value>> = match data {
        Value::Object(map) => vec![map.clone()],
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => map.clone(),
                other => {
                    let mut row = Map::new();
                    row.insert("value".to_string(), other.clone());
                    row
                }
            })
            .collect(),
        other => {
            return Err(Error::UnsupportedFormat(format!(
                "csv: unsupported data shape {other:?}"
            )))
        }
    };

    let columns: BTreeSet<&String> = rows.iter().flat_map(|row| row.keys()).collect();
    let mut out = String::new();

    let header: Vec<String> = columns
        .iter()
        .map(|c| escape_cell(c, delimiter))
        .collect();
    out.push_str(&header.join(&delimiter.to_string()));
    out.push('\n');

    for row in &rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|col| {
                let rendered = match row.get(*col) {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                escape_cell(&rendered, delimiter)
            })
            .collect();
        out.push_str(&cells.join(&delimiter.to_string()));
        out.push('\n');
    }

    Ok(out.into_bytes())
}

fn escape_cell(cell: &str, delimiter: char) -> String {
    if cell.contains(delimiter) || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

/// Write formatted bytes to stdout or a file.
pub fn write_output(bytes: &[u8], save: Option<&Path>) -> Result<(), Error> {
    match save {
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(bytes)
                .map_err(|source| Error::OutputWrite {
                    path: "-".to_string(),
                    source,
                })
        }
        Some(path) => {
            std::fs::write(path, bytes).map_err(|source| Error::OutputWrite {
                path: path.display().to_string(),
                source,
            })?;
            info!("output written to {}", path.display());
            Ok(())
        }
    }
}
