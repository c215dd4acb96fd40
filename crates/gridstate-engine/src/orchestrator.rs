//! Data orchestrator
//!
//! The central coordinator: owns the canonical `TableState`, the derived
//! "current rows + total count" view, and the fetch state machine. Every
//! state mutation, whether it comes from the imperative handle or a
//! controlled-prop push, goes through [`DataOrchestrator::apply`]; row-
//! affecting mutations mark the engine dirty and the next sync either
//! recomputes locally (filter -> sort -> paginate, always in that order)
//! or issues a sequence-numbered remote fetch. Responses carrying a stale
//! sequence number are discarded, which is the correctness property that
//! keeps rapid consecutive interactions (fast typing in the global
//! search) from flickering between old and new result sets.

use std::collections::HashMap;
use std::sync::Arc;

use gridstate_core::{
    CellValue, ColumnDef, FilterClause, FilterLogic, GridError, PinSide, Result, Row, RowId,
    SelectionScope, SortDescriptor, TableState, apply_filters, apply_sort, validate_clauses,
};

use crate::source::{DataMode, DataSource, PageRequest, PageResponse};

/// Fetch lifecycle: idle -> fetching -> (success | error | cancelled),
/// where "cancelled" means the request was superseded by a newer one
/// before its response was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPhase {
    #[default]
    Idle,
    Fetching,
    Success,
    Error,
    Cancelled,
}

/// Options for an explicit refresh
#[derive(Debug, Clone, Default)]
pub struct RefreshOptions {
    /// Bypass the unchanged-request shortcut and always re-fetch
    pub force: bool,
    /// Free-form reason, logged with the fetch
    pub reason: Option<String>,
}

impl RefreshOptions {
    pub fn forced(reason: impl Into<String>) -> Self {
        Self {
            force: true,
            reason: Some(reason.into()),
        }
    }
}

/// A state mutation. Both the imperative handle and controlled-mode
/// pushes normalize into this, so the two usage styles can never diverge.
#[derive(Debug, Clone)]
pub enum StateUpdate {
    /// Wholesale state replacement (controlled-mode push / restore)
    SetState(TableState),

    GoToPage(usize),
    NextPage,
    PrevPage,
    SetPageSize(usize),

    SetSorting(Vec<SortDescriptor>),
    ToggleSort(String),
    PushSort(String),
    ClearSorting,

    SetGlobalFilter(Option<String>),
    EditPendingFilters {
        filters: Vec<FilterClause>,
        logic: FilterLogic,
    },
    ApplyPendingFilters,
    SetFilters {
        filters: Vec<FilterClause>,
        logic: FilterLogic,
    },
    ClearFilters,

    SelectRow(RowId),
    DeselectRow(RowId),
    ToggleRow(RowId),
    SelectAll,
    ClearSelection,
    SetSelectionScope(SelectionScope),

    SetColumnVisibility { column_id: String, visible: bool },
    ToggleColumnVisibility(String),
    PinColumn { column_id: String, side: Option<PinSide> },
    SetColumnOrder(Vec<String>),
    MoveColumn { column_id: String, index: usize },
    SetColumnWidth { column_id: String, width: f32 },
}

/// What a prepared sync has to do
pub(crate) enum PreparedFetch {
    /// Request is unchanged and not forced; nothing to do
    Skip,
    /// Local mode: recompute synchronously
    Local,
    /// Remote mode: a fetch ticket was issued
    Remote {
        request: PageRequest,
        source: Arc<dyn DataSource>,
    },
}

pub type StateListener = Arc<dyn Fn(&TableState) + Send + Sync>;

/// Central coordinator for one table instance. Not shared across tables;
/// independent tables get independent orchestrators.
pub struct DataOrchestrator {
    defs: Arc<Vec<ColumnDef>>,
    mode: DataMode,
    state: TableState,
    selection_scope: SelectionScope,

    // Derived view, exclusively owned here
    rows: Vec<Row>,
    total_row: u64,
    phase: FetchPhase,
    error: Option<String>,

    sequence: u64,
    last_applied: Option<PageRequest>,
    dirty: bool,
    needs_refetch: bool,

    listener: Option<StateListener>,
}

impl DataOrchestrator {
    pub fn new(defs: Arc<Vec<ColumnDef>>, mode: DataMode) -> Self {
        Self {
            defs,
            mode,
            state: TableState::default(),
            selection_scope: SelectionScope::default(),
            rows: Vec::new(),
            total_row: 0,
            phase: FetchPhase::Idle,
            error: None,
            sequence: 0,
            last_applied: None,
            dirty: true,
            needs_refetch: false,
            listener: None,
        }
    }

    pub fn with_initial_state(mut self, state: TableState) -> Result<Self> {
        validate_clauses(&state.column_filter.filters, &self.defs)?;
        self.state = state;
        Ok(self)
    }

    pub fn with_selection_scope(mut self, scope: SelectionScope) -> Self {
        self.selection_scope = scope;
        self
    }

    /// Controlled-mode adapter: called with the new state after every
    /// applied update.
    pub fn set_listener(&mut self, listener: StateListener) {
        self.listener = Some(listener);
    }

    pub fn defs(&self) -> &Arc<Vec<ColumnDef>> {
        &self.defs
    }

    pub fn mode(&self) -> &DataMode {
        &self.mode
    }

    pub fn state(&self) -> &TableState {
        &self.state
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn total_row(&self) -> u64 {
        self.total_row
    }

    pub fn phase(&self) -> FetchPhase {
        self.phase
    }

    pub fn is_loading(&self) -> bool {
        self.phase == FetchPhase::Fetching
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn selection_scope(&self) -> SelectionScope {
        self.selection_scope
    }

    pub fn selected_count(&self) -> u64 {
        self.state.row_selection.selected_count(self.total_row)
    }

    /// Single state-update entry point. Returns whether the update was
    /// row-affecting, i.e. whether the derived rows must be recomputed or
    /// re-fetched.
    pub fn apply(&mut self, update: StateUpdate) -> Result<bool> {
        use StateUpdate::*;

        let row_affecting = match update {
            SetState(new_state) => {
                validate_clauses(&new_state.column_filter.filters, &self.defs)?;
                self.state = new_state;
                true
            }

            GoToPage(index) => {
                self.state.pagination.page_index = index;
                self.clamp_known_total();
                true
            }
            NextPage => {
                if self.state.pagination.can_go_next(self.total_row) {
                    self.state.pagination.page_index += 1;
                    true
                } else {
                    false
                }
            }
            PrevPage => {
                if self.state.pagination.can_go_prev() {
                    self.state.pagination.page_index -= 1;
                    true
                } else {
                    false
                }
            }
            SetPageSize(size) => {
                self.state.pagination.page_size = size.max(1);
                self.clamp_known_total();
                true
            }

            SetSorting(descriptors) => {
                self.state.sorting.set(descriptors);
                true
            }
            ToggleSort(column_id) => {
                self.state.sorting.toggle(&column_id);
                true
            }
            PushSort(column_id) => {
                self.state.sorting.push(&column_id);
                true
            }
            ClearSorting => {
                self.state.sorting.clear();
                true
            }

            SetGlobalFilter(text) => {
                self.state.global_filter = text.filter(|t| !t.is_empty());
                self.reset_page();
                true
            }
            EditPendingFilters { filters, logic } => {
                self.state.column_filter.edit_pending(filters, logic);
                false
            }
            ApplyPendingFilters => {
                validate_clauses(&self.state.column_filter.pending_filters, &self.defs)?;
                self.state.column_filter.apply_pending();
                self.reset_page();
                true
            }
            SetFilters { filters, logic } => {
                validate_clauses(&filters, &self.defs)?;
                self.state.column_filter.edit_pending(filters, logic);
                self.state.column_filter.apply_pending();
                self.reset_page();
                true
            }
            ClearFilters => {
                self.state.column_filter.clear();
                self.reset_page();
                true
            }

            SelectRow(id) => {
                self.state.row_selection.select(&id);
                false
            }
            DeselectRow(id) => {
                self.state.row_selection.deselect(&id);
                false
            }
            ToggleRow(id) => {
                self.state.row_selection.toggle(&id);
                false
            }
            SelectAll => {
                match self.selection_scope {
                    SelectionScope::Page => {
                        let visible = self.rows.iter().map(|r| r.id.clone());
                        self.state.row_selection.select_all_visible(visible);
                    }
                    SelectionScope::All => self.state.row_selection.select_all(),
                }
                false
            }
            ClearSelection => {
                self.state.row_selection.clear();
                false
            }
            SetSelectionScope(scope) => {
                // Policy: switching scope mid-session clears the selection
                if scope != self.selection_scope {
                    self.selection_scope = scope;
                    self.state.row_selection.clear();
                }
                false
            }

            SetColumnVisibility { column_id, visible } => {
                self.state.column_visibility.set_visible(&column_id, visible);
                false
            }
            ToggleColumnVisibility(column_id) => {
                self.state.column_visibility.toggle(&column_id);
                false
            }
            PinColumn { column_id, side } => {
                match side {
                    Some(side) => self.state.column_pinning.pin(&column_id, side),
                    None => self.state.column_pinning.unpin(&column_id),
                }
                false
            }
            SetColumnOrder(order) => {
                self.state.column_order.set(order);
                false
            }
            MoveColumn { column_id, index } => {
                self.state.column_order.move_to(&column_id, index);
                false
            }
            SetColumnWidth { column_id, width } => {
                self.state.column_sizing.set_width(&column_id, width);
                false
            }
        };

        if row_affecting {
            self.dirty = true;
        }
        if let Some(listener) = &self.listener {
            listener(&self.state);
        }
        Ok(row_affecting)
    }

    /// Automatic page-reset policy: filter changes send the user back to
    /// the first page so they never land on an out-of-range empty page.
    fn reset_page(&mut self) {
        self.state.pagination.page_index = 0;
    }

    /// Clamp page navigation against the known total. Skipped before the
    /// first fetch/recompute so a restored page index survives until data
    /// arrives; the next sync clamps against the authoritative total.
    fn clamp_known_total(&mut self) {
        if self.last_applied.is_some() {
            self.state.pagination.clamp(self.total_row);
        }
    }

    /// Local-mode pipeline, fixed order: filter -> sort -> paginate.
    /// The order never varies with which features are enabled.
    pub fn recompute_local(&mut self) -> Result<()> {
        let DataMode::Local(dataset) = &self.mode else {
            return Ok(());
        };

        let mut rows = apply_filters(
            dataset,
            &self.state.column_filter.filters,
            self.state.column_filter.logic,
            self.state.global_filter.as_deref(),
            &self.defs,
        )?;
        apply_sort(&mut rows, &self.state.sorting, &self.defs);

        let total = rows.len() as u64;
        self.state.pagination.clamp(total);
        let offset = self.state.pagination.offset().min(rows.len());
        let end = (offset + self.state.pagination.page_size).min(rows.len());

        self.rows = rows[offset..end].to_vec();
        self.total_row = total;
        self.error = None;
        self.phase = FetchPhase::Idle;
        self.sequence += 1;
        self.last_applied = Some(PageRequest::from_state(&self.state, self.sequence));
        self.dirty = false;

        tracing::debug!(
            total,
            page = self.state.pagination.page_index,
            shown = self.rows.len(),
            "local pipeline recomputed"
        );
        Ok(())
    }

    /// Decide what the next sync has to do. Remote mode issues a new
    /// fetch ticket, logically cancelling any in-flight request: its
    /// response will carry a stale sequence number and be discarded.
    #[tracing::instrument(level = "debug", skip_all, fields(force = options.force))]
    pub(crate) fn prepare_fetch(&mut self, options: &RefreshOptions) -> PreparedFetch {
        let source = match &self.mode {
            DataMode::Local(_) => return PreparedFetch::Local,
            DataMode::Remote(source) => source.clone(),
        };

        let request = PageRequest::from_state(&self.state, self.sequence + 1);
        if !options.force && !self.dirty {
            if let Some(last) = &self.last_applied {
                if last.same_query(&request) {
                    tracing::debug!("request unchanged, skipping fetch");
                    return PreparedFetch::Skip;
                }
            }
        }

        if self.phase == FetchPhase::Fetching {
            tracing::debug!(superseded = self.sequence, "cancelling in-flight fetch");
            self.phase = FetchPhase::Cancelled;
        }
        self.sequence += 1;
        self.phase = FetchPhase::Fetching;
        tracing::debug!(
            sequence = self.sequence,
            reason = options.reason.as_deref().unwrap_or("state change"),
            "issuing fetch"
        );
        PreparedFetch::Remote { request, source }
    }

    /// Apply a fetch response. Responses whose sequence number is not the
    /// latest issued are discarded regardless of arrival order
    /// (last-writer-wins by sequence, not by arrival). On error the
    /// previously known-good rows and total stay in place.
    #[tracing::instrument(level = "debug", skip_all, fields(sequence = request.sequence))]
    pub fn complete_fetch(&mut self, request: PageRequest, result: Result<PageResponse>) -> bool {
        if request.sequence != self.sequence {
            tracing::debug!(
                stale = request.sequence,
                latest = self.sequence,
                "discarding stale fetch response"
            );
            return false;
        }

        match result {
            Ok(response) => {
                self.rows = response.data;
                self.total_row = response.total;
                self.error = None;
                self.phase = FetchPhase::Success;
                self.dirty = false;
                if self.state.pagination.clamp(response.total) {
                    // The accepted page is now out of range; fetch again
                    // with the clamped index.
                    self.needs_refetch = true;
                    tracing::debug!(
                        page = self.state.pagination.page_index,
                        "page index clamped after response"
                    );
                }
                self.last_applied = Some(request);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "fetch failed, keeping previous rows");
                self.error = Some(e.to_string());
                self.phase = FetchPhase::Error;
                true
            }
        }
    }

    pub(crate) fn take_needs_refetch(&mut self) -> bool {
        std::mem::take(&mut self.needs_refetch)
    }

    // --- Row buffer management -------------------------------------------
    //
    // Optimistic local edits for externally-driven data management. These
    // never trigger a remote re-fetch. In local mode the edit lands in the
    // master dataset and the pipeline recomputes synchronously; in remote
    // mode the current buffer is patched in place.

    pub fn update_row(&mut self, id: &str, cells: HashMap<String, CellValue>) -> Result<bool> {
        let mut found = false;
        if let DataMode::Local(dataset) = &mut self.mode {
            if let Some(row) = dataset.iter_mut().find(|r| r.id == id) {
                row.cells.extend(cells.clone());
                found = true;
            }
            if found {
                self.recompute_local()?;
            }
            return Ok(found);
        }
        if let Some(row) = self.rows.iter_mut().find(|r| r.id == id) {
            row.cells.extend(cells);
            found = true;
        }
        Ok(found)
    }

    pub fn insert_row(&mut self, row: Row) -> Result<()> {
        if let DataMode::Local(dataset) = &mut self.mode {
            dataset.push(row);
            return self.recompute_local();
        }
        self.rows.push(row);
        self.total_row += 1;
        Ok(())
    }

    pub fn delete_row(&mut self, id: &str) -> Result<bool> {
        if let DataMode::Local(dataset) = &mut self.mode {
            let before = dataset.len();
            dataset.retain(|r| r.id != id);
            let removed = dataset.len() != before;
            if removed {
                self.state.row_selection.deselect(id);
                self.recompute_local()?;
            }
            return Ok(removed);
        }
        let before = self.rows.len();
        self.rows.retain(|r| r.id != id);
        let removed = self.rows.len() != before;
        if removed {
            self.total_row = self.total_row.saturating_sub(1);
            self.state.row_selection.deselect(id);
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for DataOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataOrchestrator")
            .field("mode", &self.mode)
            .field("phase", &self.phase)
            .field("rows", &self.rows.len())
            .field("total_row", &self.total_row)
            .field("sequence", &self.sequence)
            .finish()
    }
}
