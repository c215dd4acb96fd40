//! Sort model
//!
//! Ordered list of (column, direction) descriptors; the first entry is the
//! primary key. Local sorting is a stable multi-key comparator, so ties
//! keep the original row order — the basis for the "shift-click adds a
//! sort key" contract. Remote mode sends the descriptors verbatim.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::column::{ColumnDef, ColumnType};
use crate::value::{CellValue, Row};

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescriptor {
    /// Column id
    pub id: String,
    /// Descending when true
    #[serde(default)]
    pub desc: bool,
}

impl SortDescriptor {
    pub fn asc(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            desc: false,
        }
    }

    pub fn desc(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            desc: true,
        }
    }
}

/// Ordered sort keys. Invariant: a column id appears at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct SortState {
    pub descriptors: Vec<SortDescriptor>,
}

impl SortState {
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Replace the whole sort, dropping duplicate column ids (first wins)
    pub fn set(&mut self, descriptors: Vec<SortDescriptor>) {
        let mut seen = Vec::new();
        self.descriptors = descriptors
            .into_iter()
            .filter(|d| {
                if seen.contains(&d.id) {
                    false
                } else {
                    seen.push(d.id.clone());
                    true
                }
            })
            .collect();
    }

    /// Single-column cycle: none -> asc -> desc -> removed. Clears any
    /// other sort keys (plain click semantics).
    pub fn toggle(&mut self, column_id: &str) {
        let current = self
            .descriptors
            .iter()
            .find(|d| d.id == column_id)
            .map(|d| d.desc);
        self.descriptors = match current {
            None => vec![SortDescriptor::asc(column_id)],
            Some(false) => vec![SortDescriptor::desc(column_id)],
            Some(true) => Vec::new(),
        };
    }

    /// Multi-sort append (shift-click semantics): cycles the column's
    /// direction in place, keeping the other keys and their order.
    pub fn push(&mut self, column_id: &str) {
        if let Some(pos) = self.descriptors.iter().position(|d| d.id == column_id) {
            if self.descriptors[pos].desc {
                self.descriptors.remove(pos);
            } else {
                self.descriptors[pos].desc = true;
            }
        } else {
            self.descriptors.push(SortDescriptor::asc(column_id));
        }
    }

    pub fn clear(&mut self) {
        self.descriptors.clear();
    }
}

/// Compare two cell values of the same column. Cross-type comparisons fall
/// back to string ordering so the comparator stays total.
fn compare_cells(a: &CellValue, b: &CellValue, column_type: ColumnType) -> Ordering {
    match column_type {
        ColumnType::Number => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.to_string().cmp(&b.to_string()),
        },
        ColumnType::Boolean => match (a.as_bool(), b.as_bool()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => a.to_string().cmp(&b.to_string()),
        },
        ColumnType::Date => match (a.as_date(), b.as_date()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => a.to_string().cmp(&b.to_string()),
        },
        ColumnType::Text | ColumnType::Select => a.to_string().cmp(&b.to_string()),
    }
}

/// Stable multi-key sort. Nulls sort last regardless of direction.
pub fn apply_sort(rows: &mut Vec<Row>, state: &SortState, defs: &[ColumnDef]) {
    if state.is_empty() {
        return;
    }

    let keys: Vec<(&SortDescriptor, ColumnType)> = state
        .descriptors
        .iter()
        .map(|d| {
            let ty = defs
                .iter()
                .find(|c| c.id == d.id)
                .map(|c| c.column_type)
                .unwrap_or_default();
            (d, ty)
        })
        .collect();

    // Vec::sort_by is stable, which gives the original-order tie-break
    rows.sort_by(|a, b| {
        for (descriptor, column_type) in &keys {
            let va = a.get(&descriptor.id);
            let vb = b.get(&descriptor.id);
            let ord = match (va.is_null(), vb.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    let ord = compare_cells(va, vb, *column_type);
                    if descriptor.desc { ord.reverse() } else { ord }
                }
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}
