//! gridstate-engine - Data orchestration for the gridstate table engine
//!
//! Owns the canonical `TableState`, decides per-operation whether to
//! compute locally or delegate to a remote data source, deduplicates and
//! discards stale in-flight fetches by sequence number, and exposes a
//! namespaced imperative handle plus controlled-mode state interchange.
//!
//! One orchestrator serves one table instance; state mutations and fetch
//! completions are serialized through the handle, and fetches are the
//! only suspension points.

pub mod handle;
pub mod orchestrator;
pub mod source;

pub use handle::{
    ColumnsHandle, DataHandle, DataSnapshot, ExportHandle, FilteringHandle, PaginationHandle,
    SelectionHandle, SortingHandle, StateHandle, TableBuilder, TableHandle,
};
pub use orchestrator::{
    DataOrchestrator, FetchPhase, RefreshOptions, StateListener, StateUpdate,
};
pub use source::{DataMode, DataSource, PageRequest, PageResponse};
