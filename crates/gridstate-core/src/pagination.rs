//! Pagination model

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Page index/size bookkeeping. `page_index` is 0-based; the derived page
/// count comes from the total row count the data source reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationState {
    pub page_index: usize,
    pub page_size: usize,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            page_index: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PaginationState {
    pub fn new(page_index: usize, page_size: usize) -> Self {
        Self {
            page_index,
            page_size: page_size.max(1),
        }
    }

    /// Number of pages for a total row count. Zero rows means zero pages.
    pub fn page_count(&self, total_row: u64) -> usize {
        let size = self.page_size.max(1) as u64;
        (total_row.saturating_add(size - 1) / size) as usize
    }

    /// Row offset of the current page
    pub fn offset(&self) -> usize {
        self.page_index * self.page_size
    }

    /// Pull `page_index` back into `[0, max(0, page_count - 1)]`.
    /// Returns true when the index moved. Called whenever `total_row` or
    /// `page_size` changes, e.g. after a filter narrows the results.
    pub fn clamp(&mut self, total_row: u64) -> bool {
        let max_index = self.page_count(total_row).saturating_sub(1);
        if self.page_index > max_index {
            self.page_index = max_index;
            true
        } else {
            false
        }
    }

    pub fn can_go_next(&self, total_row: u64) -> bool {
        self.page_index + 1 < self.page_count(total_row)
    }

    pub fn can_go_prev(&self) -> bool {
        self.page_index > 0
    }
}
