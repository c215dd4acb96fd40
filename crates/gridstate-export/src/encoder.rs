//! Byte encoders
//!
//! The pipeline resolves *what* to export (headers, rows, order); encoders
//! only turn that resolved sheet into bytes. Format details beyond the
//! built-in CSV/JSON encoders are a collaborator concern.

use gridstate_core::{GridError, Result};

/// Fully resolved export payload handed to an encoder
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSheet {
    pub filename: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Turns a resolved sheet into a downloadable artifact
pub trait ByteEncoder: Send + Sync {
    /// File extension without the dot, e.g. "csv"
    fn extension(&self) -> &'static str;

    fn encode(&self, sheet: &ExportSheet) -> Result<Vec<u8>>;
}

pub(crate) fn escape_csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// RFC-4180-style CSV with a header line
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvEncoder;

impl ByteEncoder for CsvEncoder {
    fn extension(&self) -> &'static str {
        "csv"
    }

    fn encode(&self, sheet: &ExportSheet) -> Result<Vec<u8>> {
        let mut csv = String::new();
        let header: Vec<String> = sheet.headers.iter().map(|n| escape_csv_field(n)).collect();
        csv.push_str(&header.join(","));
        csv.push('\n');

        for row in &sheet.rows {
            let escaped: Vec<String> = row.iter().map(|v| escape_csv_field(v)).collect();
            csv.push_str(&escaped.join(","));
            csv.push('\n');
        }

        Ok(csv.into_bytes())
    }
}

/// JSON array of objects keyed by header
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl ByteEncoder for JsonEncoder {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn encode(&self, sheet: &ExportSheet) -> Result<Vec<u8>> {
        let objects: Vec<serde_json::Map<String, serde_json::Value>> = sheet
            .rows
            .iter()
            .map(|row| {
                sheet
                    .headers
                    .iter()
                    .zip(row.iter())
                    .map(|(h, v)| (h.clone(), serde_json::Value::String(v.clone())))
                    .collect()
            })
            .collect();

        serde_json::to_vec_pretty(&objects).map_err(|e| GridError::Export {
            message: e.to_string(),
            processed_rows: 0,
        })
    }
}
