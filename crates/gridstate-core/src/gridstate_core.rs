//! gridstate-core - State models for the gridstate table engine
//!
//! This crate holds the pure, serializable state models the engine and
//! export pipeline are built on:
//!
//! - `TableState` - root canonical feature state (round-trips via serde)
//! - Filter / sort / pagination / selection / column layout sub-models
//! - `Row`, `CellValue`, `ColumnDef` - data and column contracts
//! - `GridError` - the shared error taxonomy
//!
//! Nothing here performs I/O; local-mode computation (filter, sort) lives
//! here as pure functions so the engine can keep a fixed pipeline order.

pub mod column;
pub mod error;
pub mod filter;
pub mod pagination;
pub mod selection;
pub mod sort;
pub mod state;
pub mod value;

pub use column::{
    ColumnDef, ColumnOrderState, ColumnPinningState, ColumnSizingState, ColumnType,
    ColumnVisibilityState, ExportValueFn, PinSide,
};
pub use error::{GridError, Result};
pub use filter::{
    ColumnFilterState, FilterClause, FilterDescriptor, FilterLogic, FilterOperator, FilterValue,
    apply_filters, build_filter_descriptor, clause_matches, global_filter_matches, row_matches,
    validate_clauses,
};
pub use pagination::{DEFAULT_PAGE_SIZE, PaginationState};
pub use selection::{SelectionMode, SelectionScope, SelectionState};
pub use sort::{SortDescriptor, SortState, apply_sort};
pub use state::TableState;
pub use value::{CellValue, Row, RowId};
