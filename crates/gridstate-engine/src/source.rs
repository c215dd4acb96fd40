//! Data source collaborators
//!
//! The orchestrator never talks to storage directly. In local mode it owns
//! the full dataset and computes rows in-process; in remote mode it hands a
//! declarative request descriptor to a caller-supplied [`DataSource`] and
//! treats the response as authoritative.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use gridstate_core::{
    FilterDescriptor, PaginationState, Result, Row, SortState, TableState,
    build_filter_descriptor,
};

/// Snapshot of row-affecting state sent to a remote source. The sequence
/// number is internal bookkeeping for the stale-response guard; remote
/// sides may ignore it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    pub pagination: PaginationState,
    pub sorting: SortState,
    pub filter: FilterDescriptor,
    pub sequence: u64,
}

impl PageRequest {
    pub fn from_state(state: &TableState, sequence: u64) -> Self {
        Self {
            pagination: state.pagination,
            sorting: state.sorting.clone(),
            filter: build_filter_descriptor(&state.column_filter, state.global_filter.as_deref()),
            sequence,
        }
    }

    /// Whether two requests ask for the same data, ignoring the sequence
    /// number. Basis for the memoized-result shortcut `refresh` can skip.
    pub fn same_query(&self, other: &PageRequest) -> bool {
        self.pagination == other.pagination
            && self.sorting == other.sorting
            && self.filter == other.filter
    }
}

/// One page of rows plus the total count of the *filtered* set, which
/// drives page-count derivation and exclude-mode selection math.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResponse {
    pub data: Vec<Row>,
    pub total: u64,
}

/// Remote data collaborator. Filter/sort semantics are advisory: the
/// implementation chooses how to satisfy the descriptor and its results
/// are authoritative. Timeout policy belongs here, not in the engine.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResponse>;
}

/// Where rows come from
#[derive(Clone)]
pub enum DataMode {
    /// Full dataset held in memory; filter/sort/paginate run in-process
    Local(Vec<Row>),
    /// Row computation delegated to a remote source per state change
    Remote(Arc<dyn DataSource>),
}

impl DataMode {
    pub fn is_remote(&self) -> bool {
        matches!(self, DataMode::Remote(_))
    }
}

impl std::fmt::Debug for DataMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataMode::Local(rows) => f.debug_tuple("Local").field(&rows.len()).finish(),
            DataMode::Remote(_) => f.write_str("Remote"),
        }
    }
}
