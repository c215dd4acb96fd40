//! Imperative API surface
//!
//! `TableHandle` is a cheap-clone facade over one orchestrator, exposing
//! namespaced operation groups (`filtering()`, `sorting()`, `pagination()`,
//! `selection()`, `columns()`, `data()`, `export()`, `state()`). Every
//! mutator routes through the orchestrator's single state-update entry
//! point, so imperative and controlled-mode usage can never diverge or
//! lose updates. Async methods never hold the lock across an await:
//! state is snapshotted under the lock, the collaborator is awaited, and
//! the result is committed under a fresh lock through the sequence guard.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use gridstate_core::{
    CellValue, ColumnDef, ColumnFilterState, FilterClause, FilterLogic, GridError, PinSide,
    Result, Row, RowId, SelectionScope, SortDescriptor, TableState,
};
use gridstate_export::{
    ExportData, ExportFormat, ExportOutcome, ExportPipeline, ExportRequest, ExportScope,
    ExportSource, ProgressFn,
};

use crate::orchestrator::{
    DataOrchestrator, FetchPhase, PreparedFetch, RefreshOptions, StateListener, StateUpdate,
};
use crate::source::DataMode;

/// What the render layer consumes
#[derive(Debug, Clone)]
pub struct DataSnapshot {
    pub rows: Vec<Row>,
    pub total_row: u64,
    pub loading: bool,
    pub error: Option<String>,
}

struct Shared {
    orchestrator: Mutex<DataOrchestrator>,
    pipeline: ExportPipeline,
    export_source: Option<Arc<dyn ExportSource>>,
}

impl Shared {
    fn apply(&self, update: StateUpdate) -> Result<bool> {
        self.orchestrator.lock().apply(update)
    }

    /// Drive derived rows back in sync with state. Local mode recomputes
    /// synchronously; remote mode issues a fetch outside the lock and
    /// commits the response through the stale-response guard. Fetch
    /// failures become state (`error` field), not an `Err` here.
    async fn sync(&self, options: RefreshOptions) -> Result<()> {
        let mut options = options;
        loop {
            let prepared = self.orchestrator.lock().prepare_fetch(&options);
            match prepared {
                PreparedFetch::Skip => return Ok(()),
                PreparedFetch::Local => return self.orchestrator.lock().recompute_local(),
                PreparedFetch::Remote { request, source } => {
                    let result = source.fetch_page(&request).await;
                    let mut orch = self.orchestrator.lock();
                    orch.complete_fetch(request, result);
                    if orch.take_needs_refetch() {
                        // Accepted total pulled the page index back into
                        // range; fetch the clamped page.
                        options = RefreshOptions::forced("page index clamped");
                        continue;
                    }
                    return Ok(());
                }
            }
        }
    }

    async fn apply_and_sync(&self, update: StateUpdate) -> Result<()> {
        if self.apply(update)? {
            self.sync(RefreshOptions::default()).await
        } else {
            Ok(())
        }
    }
}

/// Builder for a table instance
pub struct TableBuilder {
    defs: Vec<ColumnDef>,
    mode: DataMode,
    initial_state: Option<TableState>,
    selection_scope: SelectionScope,
    listener: Option<StateListener>,
    export_source: Option<Arc<dyn ExportSource>>,
    export_chunk_size: Option<usize>,
}

impl TableBuilder {
    pub fn new(defs: Vec<ColumnDef>, mode: DataMode) -> Self {
        Self {
            defs,
            mode,
            initial_state: None,
            selection_scope: SelectionScope::default(),
            listener: None,
            export_source: None,
            export_chunk_size: None,
        }
    }

    /// Restore a previously persisted state
    pub fn initial_state(mut self, state: TableState) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn selection_scope(mut self, scope: SelectionScope) -> Self {
        self.selection_scope = scope;
        self
    }

    /// Controlled-mode adapter: every applied update is pushed outward
    pub fn on_state_change(mut self, listener: impl Fn(&TableState) + Send + Sync + 'static) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Remote export handler, required for exporting in remote mode
    pub fn export_source(mut self, source: Arc<dyn ExportSource>) -> Self {
        self.export_source = Some(source);
        self
    }

    pub fn export_chunk_size(mut self, chunk_size: usize) -> Self {
        self.export_chunk_size = Some(chunk_size);
        self
    }

    pub fn build(self) -> Result<TableHandle> {
        let mut orchestrator = DataOrchestrator::new(Arc::new(self.defs), self.mode)
            .with_selection_scope(self.selection_scope);
        if let Some(state) = self.initial_state {
            orchestrator = orchestrator.with_initial_state(state)?;
        }
        if let Some(listener) = self.listener {
            orchestrator.set_listener(listener);
        }
        let pipeline = match self.export_chunk_size {
            Some(size) => ExportPipeline::new(size),
            None => ExportPipeline::default(),
        };
        Ok(TableHandle {
            shared: Arc::new(Shared {
                orchestrator: Mutex::new(orchestrator),
                pipeline,
                export_source: self.export_source,
            }),
        })
    }
}

/// Stable handle to one table instance. Clones share the instance;
/// independent tables need independent handles.
#[derive(Clone)]
pub struct TableHandle {
    shared: Arc<Shared>,
}

impl TableHandle {
    pub fn builder(defs: Vec<ColumnDef>, mode: DataMode) -> TableBuilder {
        TableBuilder::new(defs, mode)
    }

    pub fn filtering(&self) -> FilteringHandle {
        FilteringHandle { shared: self.shared.clone() }
    }

    pub fn sorting(&self) -> SortingHandle {
        SortingHandle { shared: self.shared.clone() }
    }

    pub fn pagination(&self) -> PaginationHandle {
        PaginationHandle { shared: self.shared.clone() }
    }

    pub fn selection(&self) -> SelectionHandle {
        SelectionHandle { shared: self.shared.clone() }
    }

    pub fn columns(&self) -> ColumnsHandle {
        ColumnsHandle { shared: self.shared.clone() }
    }

    pub fn data(&self) -> DataHandle {
        DataHandle { shared: self.shared.clone() }
    }

    pub fn export(&self) -> ExportHandle {
        ExportHandle { shared: self.shared.clone() }
    }

    pub fn state(&self) -> StateHandle {
        StateHandle { shared: self.shared.clone() }
    }
}

impl std::fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.shared.orchestrator.lock().fmt(f)
    }
}

#[derive(Clone)]
pub struct FilteringHandle {
    shared: Arc<Shared>,
}

impl FilteringHandle {
    pub async fn set_global_filter(&self, text: Option<String>) -> Result<()> {
        self.shared.apply_and_sync(StateUpdate::SetGlobalFilter(text)).await
    }

    /// Edit the draft without touching the applied filters
    pub fn edit_pending(&self, filters: Vec<FilterClause>, logic: FilterLogic) -> Result<()> {
        self.shared.apply(StateUpdate::EditPendingFilters { filters, logic })?;
        Ok(())
    }

    /// Promote the draft to the applied filter set and re-query
    pub async fn apply_pending(&self) -> Result<()> {
        self.shared.apply_and_sync(StateUpdate::ApplyPendingFilters).await
    }

    pub async fn set_filters(&self, filters: Vec<FilterClause>, logic: FilterLogic) -> Result<()> {
        self.shared.apply_and_sync(StateUpdate::SetFilters { filters, logic }).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.shared.apply_and_sync(StateUpdate::ClearFilters).await
    }
}

#[derive(Clone)]
pub struct SortingHandle {
    shared: Arc<Shared>,
}

impl SortingHandle {
    pub async fn set_sorting(&self, descriptors: Vec<SortDescriptor>) -> Result<()> {
        self.shared.apply_and_sync(StateUpdate::SetSorting(descriptors)).await
    }

    /// Plain-click cycle: none -> asc -> desc -> none, single key
    pub async fn toggle(&self, column_id: impl Into<String>) -> Result<()> {
        self.shared.apply_and_sync(StateUpdate::ToggleSort(column_id.into())).await
    }

    /// Shift-click: add or cycle this column as an extra sort key
    pub async fn push(&self, column_id: impl Into<String>) -> Result<()> {
        self.shared.apply_and_sync(StateUpdate::PushSort(column_id.into())).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.shared.apply_and_sync(StateUpdate::ClearSorting).await
    }
}

#[derive(Clone)]
pub struct PaginationHandle {
    shared: Arc<Shared>,
}

impl PaginationHandle {
    pub async fn go_to_page(&self, page_index: usize) -> Result<()> {
        self.shared.apply_and_sync(StateUpdate::GoToPage(page_index)).await
    }

    pub async fn next_page(&self) -> Result<()> {
        self.shared.apply_and_sync(StateUpdate::NextPage).await
    }

    pub async fn prev_page(&self) -> Result<()> {
        self.shared.apply_and_sync(StateUpdate::PrevPage).await
    }

    pub async fn set_page_size(&self, page_size: usize) -> Result<()> {
        self.shared.apply_and_sync(StateUpdate::SetPageSize(page_size)).await
    }

    pub fn page_count(&self) -> usize {
        let orch = self.shared.orchestrator.lock();
        orch.state().pagination.page_count(orch.total_row())
    }
}

#[derive(Clone)]
pub struct SelectionHandle {
    shared: Arc<Shared>,
}

impl SelectionHandle {
    pub fn select_row(&self, id: impl Into<RowId>) -> Result<()> {
        self.shared.apply(StateUpdate::SelectRow(id.into())).map(|_| ())
    }

    pub fn deselect_row(&self, id: impl Into<RowId>) -> Result<()> {
        self.shared.apply(StateUpdate::DeselectRow(id.into())).map(|_| ())
    }

    pub fn toggle_row(&self, id: impl Into<RowId>) -> Result<()> {
        self.shared.apply(StateUpdate::ToggleRow(id.into())).map(|_| ())
    }

    /// Select-all honoring the configured scope: `Page` covers only the
    /// loaded rows, `All` flips to an exclude-mode dataset selection.
    pub fn select_all(&self) -> Result<()> {
        self.shared.apply(StateUpdate::SelectAll).map(|_| ())
    }

    pub fn clear(&self) -> Result<()> {
        self.shared.apply(StateUpdate::ClearSelection).map(|_| ())
    }

    pub fn set_scope(&self, scope: SelectionScope) -> Result<()> {
        self.shared.apply(StateUpdate::SetSelectionScope(scope)).map(|_| ())
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.shared.orchestrator.lock().state().row_selection.is_selected(id)
    }

    pub fn selected_count(&self) -> u64 {
        self.shared.orchestrator.lock().selected_count()
    }
}

#[derive(Clone)]
pub struct ColumnsHandle {
    shared: Arc<Shared>,
}

impl ColumnsHandle {
    pub fn set_visible(&self, column_id: impl Into<String>, visible: bool) -> Result<()> {
        self.shared
            .apply(StateUpdate::SetColumnVisibility { column_id: column_id.into(), visible })
            .map(|_| ())
    }

    pub fn toggle_visibility(&self, column_id: impl Into<String>) -> Result<()> {
        self.shared
            .apply(StateUpdate::ToggleColumnVisibility(column_id.into()))
            .map(|_| ())
    }

    pub fn pin(&self, column_id: impl Into<String>, side: PinSide) -> Result<()> {
        self.shared
            .apply(StateUpdate::PinColumn { column_id: column_id.into(), side: Some(side) })
            .map(|_| ())
    }

    pub fn unpin(&self, column_id: impl Into<String>) -> Result<()> {
        self.shared
            .apply(StateUpdate::PinColumn { column_id: column_id.into(), side: None })
            .map(|_| ())
    }

    pub fn set_order(&self, order: Vec<String>) -> Result<()> {
        self.shared.apply(StateUpdate::SetColumnOrder(order)).map(|_| ())
    }

    pub fn move_to(&self, column_id: impl Into<String>, index: usize) -> Result<()> {
        self.shared
            .apply(StateUpdate::MoveColumn { column_id: column_id.into(), index })
            .map(|_| ())
    }

    pub fn set_width(&self, column_id: impl Into<String>, width: f32) -> Result<()> {
        self.shared
            .apply(StateUpdate::SetColumnWidth { column_id: column_id.into(), width })
            .map(|_| ())
    }

    /// Display order after visibility, pinning and explicit order
    pub fn ordered_visible(&self) -> Vec<String> {
        let orch = self.shared.orchestrator.lock();
        orch.state().ordered_visible_columns(orch.defs())
    }
}

#[derive(Clone)]
pub struct DataHandle {
    shared: Arc<Shared>,
}

impl DataHandle {
    /// Re-issue the last request snapshot. `force` bypasses the
    /// unchanged-request shortcut and always re-fetches.
    pub async fn refresh(&self, options: RefreshOptions) -> Result<()> {
        self.shared.sync(options).await
    }

    pub fn snapshot(&self) -> DataSnapshot {
        let orch = self.shared.orchestrator.lock();
        DataSnapshot {
            rows: orch.rows().to_vec(),
            total_row: orch.total_row(),
            loading: orch.is_loading(),
            error: orch.error().map(String::from),
        }
    }

    pub fn phase(&self) -> FetchPhase {
        self.shared.orchestrator.lock().phase()
    }

    // Optimistic row-buffer edits for externally-driven data management;
    // never trigger a remote re-fetch.

    pub fn update_row(&self, id: &str, cells: HashMap<String, CellValue>) -> Result<bool> {
        self.shared.orchestrator.lock().update_row(id, cells)
    }

    pub fn insert_row(&self, row: Row) -> Result<()> {
        self.shared.orchestrator.lock().insert_row(row)
    }

    pub fn delete_row(&self, id: &str) -> Result<bool> {
        self.shared.orchestrator.lock().delete_row(id)
    }
}

#[derive(Clone)]
pub struct ExportHandle {
    shared: Arc<Shared>,
}

impl ExportHandle {
    /// Run one export lifecycle against the current state. Local mode
    /// resolves rows from the full dataset (filter -> sort, never
    /// paginated); remote mode delegates to the configured export source.
    pub async fn export(
        &self,
        request: ExportRequest,
        progress: Option<ProgressFn>,
    ) -> Result<ExportOutcome> {
        let (defs, state, data) = {
            let orch = self.shared.orchestrator.lock();
            let data = match orch.mode() {
                DataMode::Local(rows) => ExportData::Local(rows.clone()),
                DataMode::Remote(_) => match &self.shared.export_source {
                    Some(source) => ExportData::Remote(source.clone()),
                    None => {
                        return Err(GridError::Export {
                            message: "no remote export handler configured".to_string(),
                            processed_rows: 0,
                        });
                    }
                },
            };
            (orch.defs().clone(), orch.state().clone(), data)
        };
        self.shared
            .pipeline
            .export(&request, &defs, &state, data, progress)
            .await
    }

    pub async fn export_csv(&self, filename: Option<String>) -> Result<ExportOutcome> {
        self.export(
            ExportRequest {
                filename,
                scope: ExportScope::Selected,
                format: ExportFormat::Csv,
            },
            None,
        )
        .await
    }

    pub async fn export_json(&self, filename: Option<String>) -> Result<ExportOutcome> {
        self.export(
            ExportRequest {
                filename,
                scope: ExportScope::Selected,
                format: ExportFormat::Json,
            },
            None,
        )
        .await
    }

    pub fn is_exporting(&self) -> bool {
        self.shared.pipeline.is_exporting()
    }

    pub fn cancel(&self) {
        self.shared.pipeline.cancel()
    }
}

#[derive(Clone)]
pub struct StateHandle {
    shared: Arc<Shared>,
}

impl StateHandle {
    pub fn get(&self) -> TableState {
        self.shared.orchestrator.lock().state().clone()
    }

    /// Controlled-mode push: replace the whole state through the same
    /// entry point the imperative mutators use.
    pub async fn set(&self, state: TableState) -> Result<()> {
        self.shared.apply_and_sync(StateUpdate::SetState(state)).await
    }

    pub fn to_json(&self) -> Result<String> {
        self.get().to_json()
    }

    pub async fn restore_json(&self, json: &str) -> Result<()> {
        self.set(TableState::from_json(json)?).await
    }

    pub fn current_filters(&self) -> ColumnFilterState {
        self.shared.orchestrator.lock().state().column_filter.clone()
    }
}
