//! Column definitions and column layout state
//!
//! `ColumnDef` is the externally-supplied description of a column: data
//! type, header label and export behavior. The layout states (visibility,
//! pinning, order, sizing) are plain serializable data owned by
//! `TableState`; only `ColumnDef` may carry function values.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::value::Row;

/// Data type of a column, which fixes its filter operator set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[default]
    Text,
    Number,
    Select,
    Boolean,
    Date,
}

/// Resolver producing the exported string for a row, taking priority over
/// the raw cell value.
pub type ExportValueFn = Arc<dyn Fn(&Row) -> String + Send + Sync>;

/// Externally-supplied column definition
#[derive(Clone)]
pub struct ColumnDef {
    /// Column id, also the cell key in `Row`
    pub id: String,
    /// Header label shown to the user and used as the export fallback
    pub header: String,
    pub column_type: ColumnType,
    /// Explicit export resolver; when present it always wins over the raw
    /// cell value.
    pub export_value: Option<ExportValueFn>,
    /// Omit this column from exports entirely, regardless of visibility
    pub exclude_from_export: bool,
    /// Whether the global search matches against this column
    pub global_filterable: bool,
}

impl ColumnDef {
    pub fn new(id: impl Into<String>, header: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            id: id.into(),
            header: header.into(),
            column_type,
            export_value: None,
            exclude_from_export: false,
            global_filterable: true,
        }
    }

    pub fn text(id: impl Into<String>, header: impl Into<String>) -> Self {
        Self::new(id, header, ColumnType::Text)
    }

    pub fn number(id: impl Into<String>, header: impl Into<String>) -> Self {
        Self::new(id, header, ColumnType::Number)
    }

    pub fn with_export_value(
        mut self,
        f: impl Fn(&Row) -> String + Send + Sync + 'static,
    ) -> Self {
        self.export_value = Some(Arc::new(f));
        self
    }

    pub fn exclude_from_export(mut self) -> Self {
        self.exclude_from_export = true;
        self
    }

    pub fn not_global_filterable(mut self) -> Self {
        self.global_filterable = false;
        self
    }
}

impl std::fmt::Debug for ColumnDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnDef")
            .field("id", &self.id)
            .field("header", &self.header)
            .field("column_type", &self.column_type)
            .field("export_value", &self.export_value.is_some())
            .field("exclude_from_export", &self.exclude_from_export)
            .finish()
    }
}

/// Which columns are hidden. Absent means visible, so a default state
/// shows everything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ColumnVisibilityState {
    pub hidden: BTreeSet<String>,
}

impl ColumnVisibilityState {
    pub fn is_visible(&self, column_id: &str) -> bool {
        !self.hidden.contains(column_id)
    }

    pub fn set_visible(&mut self, column_id: &str, visible: bool) {
        if visible {
            self.hidden.remove(column_id);
        } else {
            self.hidden.insert(column_id.to_string());
        }
    }

    pub fn toggle(&mut self, column_id: &str) {
        let visible = self.is_visible(column_id);
        self.set_visible(column_id, !visible);
    }
}

/// Pin side for a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinSide {
    Left,
    Right,
}

/// Pinned columns per side.
///
/// Invariant: a column id appears in at most one of `left`/`right`, and at
/// most once there. `pin` removes the id from both sides before inserting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ColumnPinningState {
    pub left: Vec<String>,
    pub right: Vec<String>,
}

impl ColumnPinningState {
    pub fn pin(&mut self, column_id: &str, side: PinSide) {
        self.unpin(column_id);
        match side {
            PinSide::Left => self.left.push(column_id.to_string()),
            PinSide::Right => self.right.push(column_id.to_string()),
        }
    }

    pub fn unpin(&mut self, column_id: &str) {
        self.left.retain(|id| id != column_id);
        self.right.retain(|id| id != column_id);
    }

    pub fn side_of(&self, column_id: &str) -> Option<PinSide> {
        if self.left.iter().any(|id| id == column_id) {
            Some(PinSide::Left)
        } else if self.right.iter().any(|id| id == column_id) {
            Some(PinSide::Right)
        } else {
            None
        }
    }
}

/// Explicit column display order. Columns absent from the list keep their
/// definition order after the listed ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ColumnOrderState {
    pub order: Vec<String>,
}

impl ColumnOrderState {
    pub fn set(&mut self, order: Vec<String>) {
        self.order = order;
    }

    pub fn move_to(&mut self, column_id: &str, index: usize) {
        self.order.retain(|id| id != column_id);
        let index = index.min(self.order.len());
        self.order.insert(index, column_id.to_string());
    }
}

/// Column widths in pixels, keyed by column id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ColumnSizingState {
    pub widths: BTreeMap<String, f32>,
}

impl ColumnSizingState {
    pub fn set_width(&mut self, column_id: &str, width: f32) {
        self.widths.insert(column_id.to_string(), width);
    }

    pub fn width(&self, column_id: &str) -> Option<f32> {
        self.widths.get(column_id).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_moves_between_sides() {
        let mut pinning = ColumnPinningState::default();
        pinning.pin("a", PinSide::Left);
        pinning.pin("b", PinSide::Left);
        assert_eq!(pinning.side_of("a"), Some(PinSide::Left));

        // Re-pinning to the other side must remove the stale entry
        pinning.pin("a", PinSide::Right);
        assert_eq!(pinning.left, vec!["b".to_string()]);
        assert_eq!(pinning.right, vec!["a".to_string()]);

        pinning.unpin("a");
        assert_eq!(pinning.side_of("a"), None);
    }

    #[test]
    fn test_visibility_defaults_to_visible() {
        let mut vis = ColumnVisibilityState::default();
        assert!(vis.is_visible("anything"));
        vis.toggle("anything");
        assert!(!vis.is_visible("anything"));
    }

    #[test]
    fn test_order_move_to() {
        let mut order = ColumnOrderState::default();
        order.set(vec!["a".into(), "b".into(), "c".into()]);
        order.move_to("c", 0);
        assert_eq!(order.order, vec!["c", "a", "b"]);
    }
}
