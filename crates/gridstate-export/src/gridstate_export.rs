//! gridstate-export - Export pipeline for the gridstate table engine
//!
//! Decides *what* rows and columns to export and in what order, resolving
//! the current filter/sort/selection state; byte encoding is delegated to
//! a [`ByteEncoder`] (CSV and JSON encoders are provided). Supports chunk
//! progress reporting and cooperative cancellation.

pub mod encoder;
pub mod pipeline;

pub use encoder::{ByteEncoder, CsvEncoder, ExportSheet, JsonEncoder};
pub use pipeline::{
    ExportBatch, ExportData, ExportFormat, ExportOutcome, ExportPipeline, ExportProgress,
    ExportRequest, ExportResult, ExportScope, ExportSource, ProgressFn,
};
