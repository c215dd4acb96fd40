//! Root serializable table state
//!
//! Every sub-state is independently valid with the others at default, and
//! the whole structure round-trips through serde without loss. Callers in
//! controlled mode persist and restore this across sessions.

use serde::{Deserialize, Serialize};

use crate::column::{
    ColumnDef, ColumnOrderState, ColumnPinningState, ColumnSizingState, ColumnVisibilityState,
};
use crate::error::Result;
use crate::filter::ColumnFilterState;
use crate::pagination::PaginationState;
use crate::selection::SelectionState;
use crate::sort::SortState;

/// Canonical feature state for one table instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TableState {
    pub pagination: PaginationState,
    pub sorting: SortState,
    pub global_filter: Option<String>,
    pub column_filter: ColumnFilterState,
    pub column_visibility: ColumnVisibilityState,
    pub column_pinning: ColumnPinningState,
    pub column_order: ColumnOrderState,
    pub column_sizing: ColumnSizingState,
    pub row_selection: SelectionState,
}

impl TableState {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Final display order of visible column ids: pinned-left first, then
    /// unpinned in order, then pinned-right. Hidden columns are dropped.
    /// Columns missing from the explicit order keep definition order.
    pub fn ordered_visible_columns(&self, defs: &[ColumnDef]) -> Vec<String> {
        let explicit = &self.column_order.order;
        let mut base: Vec<&str> = explicit
            .iter()
            .map(String::as_str)
            .filter(|id| defs.iter().any(|d| d.id == *id))
            .collect();
        for def in defs {
            if !base.contains(&def.id.as_str()) {
                base.push(&def.id);
            }
        }

        let mut left = Vec::new();
        let mut center = Vec::new();
        let mut right = Vec::new();
        for id in base {
            if !self.column_visibility.is_visible(id) {
                continue;
            }
            if self.column_pinning.left.iter().any(|p| p == id) {
                left.push(id.to_string());
            } else if self.column_pinning.right.iter().any(|p| p == id) {
                right.push(id.to_string());
            } else {
                center.push(id.to_string());
            }
        }
        left.extend(center);
        left.extend(right);
        left
    }
}
