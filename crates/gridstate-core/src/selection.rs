//! Selection model
//!
//! Selected rows are an include/exclude set over stable row ids. Exclude
//! mode represents "everything matching the current filter, minus these
//! ids", which is what lets "select all across 10,000 server rows" work
//! without ever materializing the full id set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::value::RowId;

/// How the id set is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// `ids` are exactly the selected rows
    #[default]
    Include,
    /// All rows matching the current filter are selected except `ids`
    Exclude,
}

/// Scope policy for select-all, a caller configuration the engine honors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionScope {
    /// Select-all covers only the currently loaded rows
    #[default]
    Page,
    /// Select-all covers the whole (possibly unfetched) filtered dataset
    All,
}

/// Include/exclude row selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SelectionState {
    pub ids: BTreeSet<RowId>,
    #[serde(rename = "type")]
    pub mode: SelectionMode,
}

impl SelectionState {
    /// True when nothing is selected. In exclude mode the selection is
    /// only empty if the exceptions cover the entire dataset.
    pub fn is_empty(&self, total_row: u64) -> bool {
        match self.mode {
            SelectionMode::Include => self.ids.is_empty(),
            SelectionMode::Exclude => self.ids.len() as u64 >= total_row,
        }
    }

    /// Membership test without enumerating rows
    pub fn is_selected(&self, id: &str) -> bool {
        match self.mode {
            SelectionMode::Include => self.ids.contains(id),
            SelectionMode::Exclude => !self.ids.contains(id),
        }
    }

    /// Number of selected rows given the filtered total
    pub fn selected_count(&self, total_row: u64) -> u64 {
        match self.mode {
            SelectionMode::Include => self.ids.len() as u64,
            SelectionMode::Exclude => total_row.saturating_sub(self.ids.len() as u64),
        }
    }

    pub fn select(&mut self, id: &str) {
        match self.mode {
            SelectionMode::Include => {
                self.ids.insert(id.to_string());
            }
            // Removing the last exception leaves {Exclude, []}: "all
            // selected, zero exceptions". Never re-derived as an include
            // set, which could be enormous.
            SelectionMode::Exclude => {
                self.ids.remove(id);
            }
        }
    }

    pub fn deselect(&mut self, id: &str) {
        match self.mode {
            SelectionMode::Include => {
                self.ids.remove(id);
            }
            SelectionMode::Exclude => {
                self.ids.insert(id.to_string());
            }
        }
    }

    pub fn toggle(&mut self, id: &str) {
        if self.is_selected(id) {
            self.deselect(id);
        } else {
            self.select(id);
        }
    }

    /// Select every row matching the current filter, across the whole
    /// dataset. Flips to exclude mode with zero exceptions.
    pub fn select_all(&mut self) {
        self.mode = SelectionMode::Exclude;
        self.ids.clear();
    }

    /// Select exactly the given (currently loaded) rows. Page-scope
    /// select-all goes through here.
    pub fn select_all_visible<I, S>(&mut self, visible_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<RowId>,
    {
        self.mode = SelectionMode::Include;
        self.ids = visible_ids.into_iter().map(Into::into).collect();
    }

    pub fn clear(&mut self) {
        self.mode = SelectionMode::Include;
        self.ids.clear();
    }

    /// Resolve the selection against a materialized filtered row id list,
    /// preserving the list's order. Used by the export pipeline.
    pub fn resolve<'a>(&self, filtered_ids: impl IntoIterator<Item = &'a RowId>) -> Vec<RowId> {
        filtered_ids
            .into_iter()
            .filter(|id| self.is_selected(id))
            .cloned()
            .collect()
    }
}
