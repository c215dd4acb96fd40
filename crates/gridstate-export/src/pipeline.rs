//! Export pipeline
//!
//! Assembles export rows and columns from the current table state,
//! delegates byte encoding, reports progress at chunk boundaries and
//! supports cooperative cancellation. At most one export lifecycle may be
//! active per pipeline (and so per table instance).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gridstate_core::{
    CellValue, ColumnDef, FilterDescriptor, GridError, Result, Row, SelectionState, SortState,
    TableState, apply_filters, apply_sort, build_filter_descriptor,
};

use crate::encoder::{ByteEncoder, CsvEncoder, ExportSheet, JsonEncoder};

/// Built-in output formats. Other formats plug in through [`ByteEncoder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    fn encoder(&self) -> &'static dyn ByteEncoder {
        static CSV: CsvEncoder = CsvEncoder;
        static JSON: JsonEncoder = JsonEncoder;
        match self {
            ExportFormat::Csv => &CSV,
            ExportFormat::Json => &JSON,
        }
    }
}

/// Which rows the export covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExportScope {
    /// Export the selected rows; falls back to the full filtered set when
    /// nothing is selected.
    #[default]
    Selected,
    /// Export every row matching current filters, ignoring selection
    AllFiltered,
}

/// Caller's export request. Export is never page-limited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExportRequest {
    pub filename: Option<String>,
    pub scope: ExportScope,
    pub format: ExportFormat,
}

/// Progress snapshot fired at chunk boundaries and on completion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportProgress {
    pub processed_rows: u64,
    pub total_rows: u64,
    pub percentage: f32,
}

impl ExportProgress {
    pub fn new(processed_rows: u64, total_rows: u64) -> Self {
        let percentage = if total_rows == 0 {
            100.0
        } else {
            (processed_rows as f32 / total_rows as f32) * 100.0
        };
        Self {
            processed_rows,
            total_rows,
            percentage,
        }
    }
}

/// Successful export artifact. The caller decides where the bytes go;
/// the pipeline performs no file I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportResult {
    pub filename: String,
    pub total_rows: u64,
    pub bytes: Vec<u8>,
}

/// Terminal outcome of an export. Cancellation is a normal outcome, not
/// an error, and still settles the future.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Completed(ExportResult),
    Cancelled(ExportProgress),
}

pub type ProgressFn = Arc<dyn Fn(ExportProgress) + Send + Sync>;

/// Rows returned by a remote export handler. `total` matches the filtered
/// set on the remote side.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportBatch {
    pub data: Vec<Row>,
    pub total: u64,
}

/// Remote export collaborator. Receives the same declarative filter shape
/// as page fetches plus the selection snapshot; the rows it returns are
/// authoritative (the pipeline does not re-filter them).
#[async_trait]
pub trait ExportSource: Send + Sync {
    async fn export_rows(
        &self,
        descriptor: &FilterDescriptor,
        sorting: &SortState,
        selection: &SelectionState,
    ) -> Result<ExportBatch>;
}

/// Where export rows come from
#[derive(Clone)]
pub enum ExportData {
    /// Full local dataset; the pipeline applies filter and sort itself
    Local(Vec<Row>),
    /// Delegated to a remote export handler
    Remote(Arc<dyn ExportSource>),
}

impl std::fmt::Debug for ExportData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportData::Local(rows) => f.debug_tuple("Local").field(&rows.len()).finish(),
            ExportData::Remote(_) => f.write_str("Remote"),
        }
    }
}

const DEFAULT_CHUNK_SIZE: usize = 500;

/// Drives one export lifecycle at a time
#[derive(Clone)]
pub struct ExportPipeline {
    chunk_size: usize,
    active: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
}

impl Default for ExportPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ExportPipeline {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            active: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_exporting(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Request cancellation of the running export. Cooperative: observed
    /// at the next chunk boundary. No-op when nothing is running.
    pub fn cancel(&self) {
        if self.is_exporting() {
            self.cancel.store(true, Ordering::SeqCst);
            tracing::info!("export cancellation requested");
        }
    }

    /// Run one export. Fails with `ExportInProgress` if another export is
    /// still active on this pipeline.
    pub async fn export(
        &self,
        request: &ExportRequest,
        defs: &[ColumnDef],
        state: &TableState,
        data: ExportData,
        progress: Option<ProgressFn>,
    ) -> Result<ExportOutcome> {
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(GridError::ExportInProgress);
        }
        let _guard = ActiveGuard(self.active.clone());
        self.cancel.store(false, Ordering::SeqCst);

        let rows = self.resolve_rows(request, defs, state, data).await?;
        let total_rows = rows.len() as u64;
        tracing::debug!(total_rows, scope = ?request.scope, "export row set resolved");

        let columns: Vec<&ColumnDef> = export_columns(defs, state);
        let headers: Vec<String> = columns.iter().map(|c| c.header.clone()).collect();

        // Resolve cell values chunk by chunk; each boundary is a cancel
        // checkpoint and a progress report.
        let mut resolved: Vec<Vec<String>> = Vec::with_capacity(rows.len());
        for chunk in rows.chunks(self.chunk_size) {
            if self.cancel.load(Ordering::SeqCst) {
                let at = ExportProgress::new(resolved.len() as u64, total_rows);
                tracing::info!(processed = at.processed_rows, "export cancelled");
                return Ok(ExportOutcome::Cancelled(at));
            }

            for row in chunk {
                resolved.push(columns.iter().map(|c| resolve_cell(c, row)).collect());
            }

            if let Some(cb) = &progress {
                cb(ExportProgress::new(resolved.len() as u64, total_rows));
            }
            tokio::task::yield_now().await;
        }

        let filename = resolve_filename(request);
        let sheet = ExportSheet {
            filename: filename.clone(),
            headers,
            rows: resolved,
        };

        let bytes = request.format.encoder().encode(&sheet).map_err(|e| match e {
            GridError::Export { message, .. } => GridError::Export {
                message,
                processed_rows: total_rows,
            },
            other => other,
        })?;

        if let Some(cb) = &progress {
            cb(ExportProgress::new(total_rows, total_rows));
        }
        tracing::info!(total_rows, filename = %filename, "export completed");

        Ok(ExportOutcome::Completed(ExportResult {
            filename,
            total_rows,
            bytes,
        }))
    }

    async fn resolve_rows(
        &self,
        request: &ExportRequest,
        defs: &[ColumnDef],
        state: &TableState,
        data: ExportData,
    ) -> Result<Vec<Row>> {
        match data {
            ExportData::Local(all_rows) => {
                // Fixed order, never paginated: filter then sort over the
                // full dataset.
                let mut rows = apply_filters(
                    &all_rows,
                    &state.column_filter.filters,
                    state.column_filter.logic,
                    state.global_filter.as_deref(),
                    defs,
                )?;
                apply_sort(&mut rows, &state.sorting, defs);

                if request.scope == ExportScope::Selected {
                    let total = rows.len() as u64;
                    if !state.row_selection.is_empty(total) {
                        rows.retain(|r| state.row_selection.is_selected(&r.id));
                    }
                }
                Ok(rows)
            }
            ExportData::Remote(source) => {
                let descriptor =
                    build_filter_descriptor(&state.column_filter, state.global_filter.as_deref());
                let batch = source
                    .export_rows(&descriptor, &state.sorting, &state.row_selection)
                    .await?;
                Ok(batch.data)
            }
        }
    }
}

/// Columns included in an export: visible display order, minus columns
/// flagged exclude-from-export (the flag wins over visibility).
fn export_columns<'a>(defs: &'a [ColumnDef], state: &TableState) -> Vec<&'a ColumnDef> {
    state
        .ordered_visible_columns(defs)
        .into_iter()
        .filter_map(|id| defs.iter().find(|d| d.id == id))
        .filter(|d| !d.exclude_from_export)
        .collect()
}

/// Value resolution priority: explicit export-value function, then the raw
/// cell value, then the header label as a last resort.
fn resolve_cell(def: &ColumnDef, row: &Row) -> String {
    if let Some(f) = &def.export_value {
        return f(row);
    }
    match row.get(&def.id) {
        CellValue::Null => def.header.clone(),
        value => value.to_string(),
    }
}

fn resolve_filename(request: &ExportRequest) -> String {
    let ext = request.format.encoder().extension();
    let base = request.filename.as_deref().unwrap_or("export");
    if base.ends_with(&format!(".{}", ext)) {
        base.to_string()
    } else {
        format!("{}.{}", base, ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridstate_core::ColumnType;

    fn defs() -> Vec<ColumnDef> {
        vec![
            ColumnDef::text("name", "Name"),
            ColumnDef::number("age", "Age"),
            ColumnDef::new("secret", "Secret", ColumnType::Text).exclude_from_export(),
        ]
    }

    fn rows() -> Vec<Row> {
        (0..4)
            .map(|i| {
                Row::new(format!("r{}", i))
                    .with_cell("name", format!("user-{}", i))
                    .with_cell("age", 20 + i as i64)
                    .with_cell("secret", "hidden")
            })
            .collect()
    }

    fn run(
        pipeline: &ExportPipeline,
        request: &ExportRequest,
        state: &TableState,
        data: ExportData,
        progress: Option<ProgressFn>,
    ) -> Result<ExportOutcome> {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(pipeline.export(request, &defs(), state, data, progress))
    }

    fn completed(outcome: ExportOutcome) -> ExportResult {
        match outcome {
            ExportOutcome::Completed(result) => result,
            ExportOutcome::Cancelled(p) => panic!("unexpected cancellation at {:?}", p),
        }
    }

    #[test]
    fn test_excluded_column_is_omitted() {
        let pipeline = ExportPipeline::default();
        let outcome = run(
            &pipeline,
            &ExportRequest::default(),
            &TableState::default(),
            ExportData::Local(rows()),
            None,
        )
        .unwrap();
        let result = completed(outcome);
        let csv = String::from_utf8(result.bytes).unwrap();
        assert!(csv.starts_with("Name,Age\n"));
        assert!(!csv.contains("hidden"));
        assert_eq!(result.total_rows, 4);
        assert_eq!(result.filename, "export.csv");
    }

    #[test]
    fn test_export_value_fn_beats_raw_cell() {
        let mut defs = defs();
        defs[0] = ColumnDef::text("name", "Name")
            .with_export_value(|row| format!("<{}>", row.get("name")));
        let pipeline = ExportPipeline::default();
        let outcome = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(pipeline.export(
                &ExportRequest::default(),
                &defs,
                &TableState::default(),
                ExportData::Local(rows()),
                None,
            ))
            .unwrap();
        let csv = String::from_utf8(completed(outcome).bytes).unwrap();
        assert!(csv.contains("<user-0>"));
        assert!(!csv.contains("\nuser-0,"));
    }

    #[test]
    fn test_missing_cell_falls_back_to_header() {
        let pipeline = ExportPipeline::default();
        let data = vec![Row::new("r0").with_cell("age", 30i64)];
        let outcome = run(
            &pipeline,
            &ExportRequest::default(),
            &TableState::default(),
            ExportData::Local(data),
            None,
        )
        .unwrap();
        let csv = String::from_utf8(completed(outcome).bytes).unwrap();
        assert!(csv.contains("Name,30"));
    }

    #[test]
    fn test_selected_scope_resolves_exclude_selection() {
        let mut state = TableState::default();
        state.row_selection.select_all();
        state.row_selection.deselect("r1");
        state.row_selection.deselect("r3");

        let pipeline = ExportPipeline::default();
        let outcome = run(
            &pipeline,
            &ExportRequest::default(),
            &state,
            ExportData::Local(rows()),
            None,
        )
        .unwrap();
        let result = completed(outcome);
        assert_eq!(result.total_rows, 2);
        let csv = String::from_utf8(result.bytes).unwrap();
        assert!(csv.contains("user-0") && csv.contains("user-2"));
        assert!(!csv.contains("user-1") && !csv.contains("user-3"));
    }

    #[test]
    fn test_all_filtered_scope_ignores_selection_and_pagination() {
        let mut state = TableState::default();
        state.pagination.page_size = 2;
        state.row_selection.select("r0");

        let request = ExportRequest {
            scope: ExportScope::AllFiltered,
            ..Default::default()
        };
        let pipeline = ExportPipeline::default();
        let result = completed(
            run(&pipeline, &request, &state, ExportData::Local(rows()), None).unwrap(),
        );
        assert_eq!(result.total_rows, 4, "export is never page-limited");
    }

    #[test]
    fn test_progress_fires_per_chunk_and_on_completion() {
        let pipeline = ExportPipeline::new(1);
        let seen: Arc<std::sync::Mutex<Vec<u64>>> = Arc::default();
        let seen_cb = seen.clone();
        let progress: ProgressFn = Arc::new(move |p: ExportProgress| {
            seen_cb.lock().unwrap().push(p.processed_rows);
        });
        run(
            &pipeline,
            &ExportRequest::default(),
            &TableState::default(),
            ExportData::Local(rows()),
            Some(progress),
        )
        .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 4]);
    }

    #[test]
    fn test_cancel_settles_with_cancelled_outcome() {
        let pipeline = ExportPipeline::new(1);
        let cancel_after = pipeline.clone();
        let progress: ProgressFn = Arc::new(move |p: ExportProgress| {
            if p.processed_rows == 2 {
                cancel_after.cancel();
            }
        });
        let outcome = run(
            &pipeline,
            &ExportRequest::default(),
            &TableState::default(),
            ExportData::Local(rows()),
            Some(progress),
        )
        .unwrap();
        match outcome {
            ExportOutcome::Cancelled(at) => {
                assert_eq!(at.processed_rows, 2);
                assert_eq!(at.total_rows, 4);
            }
            ExportOutcome::Completed(_) => panic!("expected cancellation"),
        }
        assert!(!pipeline.is_exporting(), "active flag resets after settle");
    }
}
