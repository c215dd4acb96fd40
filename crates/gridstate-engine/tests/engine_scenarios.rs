//! End-to-end scenarios driving a table through the public handle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use gridstate_core::{
    CellValue, ColumnDef, FilterClause, FilterDescriptor, FilterLogic, FilterOperator,
    FilterValue, GridError, Result, Row, SelectionMode, SelectionScope, SelectionState,
    SortDescriptor, SortState, TableState, apply_filters, apply_sort,
};
use gridstate_engine::{
    DataMode, DataSource, FetchPhase, PageRequest, PageResponse, RefreshOptions, TableHandle,
};
use gridstate_export::{ExportBatch, ExportOutcome, ExportSource};

fn defs() -> Vec<ColumnDef> {
    vec![
        ColumnDef::text("name", "Name"),
        ColumnDef::number("score", "Score"),
    ]
}

fn dataset(n: usize) -> Vec<Row> {
    (0..n)
        .map(|i| {
            Row::new(format!("r{}", i))
                .with_cell("name", format!("user-{:03}", i))
                .with_cell("score", i as i64)
        })
        .collect()
}

/// In-memory stand-in for a paginating server: honors the request
/// descriptor the way a real backend would and counts calls.
struct ServerSource {
    defs: Vec<ColumnDef>,
    rows: Mutex<Vec<Row>>,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl ServerSource {
    fn new(rows: Vec<Row>) -> Self {
        Self {
            defs: defs(),
            rows: Mutex::new(rows),
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn truncate(&self, len: usize) {
        self.rows.lock().unwrap().truncate(len);
    }

    fn answer(&self, request: &PageRequest) -> Result<PageResponse> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(GridError::Fetch("connection reset".to_string()));
        }
        let dataset = self.rows.lock().unwrap();
        let mut rows = apply_filters(
            &dataset,
            &request.filter.filters,
            request.filter.logic,
            request.filter.global_filter.as_deref(),
            &self.defs,
        )?;
        apply_sort(&mut rows, &request.sorting, &self.defs);
        let total = rows.len() as u64;
        let offset = request.pagination.offset().min(rows.len());
        let end = (offset + request.pagination.page_size).min(rows.len());
        Ok(PageResponse {
            data: rows[offset..end].to_vec(),
            total,
        })
    }
}

#[async_trait]
impl DataSource for ServerSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer(request)
    }
}

/// Wrapper that makes unfiltered queries slow and filtered ones fast, so
/// a fast response can overtake a slow one in flight.
struct SlowUnfiltered {
    inner: ServerSource,
}

#[async_trait]
impl DataSource for SlowUnfiltered {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResponse> {
        let delay = if request.filter.global_filter.is_none() {
            Duration::from_millis(80)
        } else {
            Duration::from_millis(10)
        };
        tokio::time::sleep(delay).await;
        self.inner.fetch_page(request).await
    }
}

fn score_below(limit: i64) -> FilterClause {
    FilterClause::new(
        "f1",
        "score",
        FilterOperator::LessThan,
        FilterValue::single(limit),
    )
}

#[tokio::test]
async fn local_pipeline_filters_sorts_then_paginates() {
    let table = TableHandle::builder(defs(), DataMode::Local(dataset(100)))
        .build()
        .unwrap();
    table.data().refresh(RefreshOptions::default()).await.unwrap();

    table.pagination().set_page_size(4).await.unwrap();
    table
        .filtering()
        .set_filters(vec![score_below(10)], FilterLogic::And)
        .await
        .unwrap();
    table
        .sorting()
        .set_sorting(vec![SortDescriptor::desc("score")])
        .await
        .unwrap();

    let snapshot = table.data().snapshot();
    assert_eq!(snapshot.total_row, 10);
    let ids: Vec<&str> = snapshot.rows.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["r9", "r8", "r7", "r6"]);

    table.pagination().next_page().await.unwrap();
    let snapshot = table.data().snapshot();
    let ids: Vec<&str> = snapshot.rows.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["r5", "r4", "r3", "r2"]);
    assert_eq!(table.pagination().page_count(), 3);
}

#[tokio::test]
async fn filter_change_clamps_page_back_to_range() {
    // Page 5 of 10 becomes invalid once the filter shrinks the set to 3
    let table = TableHandle::builder(defs(), DataMode::Local(dataset(100)))
        .build()
        .unwrap();
    table.pagination().set_page_size(10).await.unwrap();
    table.pagination().go_to_page(5).await.unwrap();
    assert_eq!(table.state().get().pagination.page_index, 5);

    table
        .filtering()
        .set_filters(vec![score_below(3)], FilterLogic::And)
        .await
        .unwrap();

    let snapshot = table.data().snapshot();
    assert_eq!(snapshot.total_row, 3);
    assert_eq!(table.state().get().pagination.page_index, 0);
    assert_eq!(table.pagination().page_count(), 1);
    assert_eq!(snapshot.rows.len(), 3);
}

#[tokio::test]
async fn remote_clamp_refetches_the_pulled_back_page() {
    let source = Arc::new(ServerSource::new(dataset(100)));
    let table = TableHandle::builder(defs(), DataMode::Remote(source.clone()))
        .build()
        .unwrap();
    table.pagination().set_page_size(10).await.unwrap();
    table.pagination().go_to_page(5).await.unwrap();

    // The dataset shrinks server-side while the client sits on page 5
    source.truncate(3);
    let before = source.call_count();
    table
        .data()
        .refresh(RefreshOptions::forced("external change"))
        .await
        .unwrap();

    // First response lands out of range, the follow-up fetches the
    // clamped page
    assert_eq!(source.call_count() - before, 2);
    let snapshot = table.data().snapshot();
    assert_eq!(snapshot.total_row, 3);
    assert_eq!(snapshot.rows.len(), 3);
    assert_eq!(table.state().get().pagination.page_index, 0);
}

#[tokio::test(start_paused = true)]
async fn stale_response_loses_to_newer_request() {
    let source = Arc::new(SlowUnfiltered {
        inner: ServerSource::new(dataset(100)),
    });
    let table = TableHandle::builder(defs(), DataMode::Remote(source))
        .build()
        .unwrap();

    // Slow unfiltered fetch goes out first
    let background = {
        let table = table.clone();
        tokio::spawn(async move { table.data().refresh(RefreshOptions::default()).await })
    };
    tokio::task::yield_now().await;

    // Fast filtered fetch overtakes it
    table
        .filtering()
        .set_global_filter(Some("user-007".to_string()))
        .await
        .unwrap();
    background.await.unwrap().unwrap();

    // The late unfiltered response must not clobber the filtered rows
    let snapshot = table.data().snapshot();
    assert_eq!(snapshot.total_row, 1);
    assert_eq!(snapshot.rows[0].id, "r7");
    assert_eq!(table.data().phase(), FetchPhase::Success);
}

#[tokio::test]
async fn unchanged_refresh_is_memoized_unless_forced() {
    let source = Arc::new(ServerSource::new(dataset(20)));
    let table = TableHandle::builder(defs(), DataMode::Remote(source.clone()))
        .build()
        .unwrap();

    table.data().refresh(RefreshOptions::default()).await.unwrap();
    assert_eq!(source.call_count(), 1);

    table.data().refresh(RefreshOptions::default()).await.unwrap();
    assert_eq!(source.call_count(), 1, "identical request is not re-sent");

    table
        .data()
        .refresh(RefreshOptions::forced("user pressed refresh"))
        .await
        .unwrap();
    assert_eq!(source.call_count(), 2);
}

#[tokio::test]
async fn fetch_error_keeps_last_good_rows() {
    let source = Arc::new(ServerSource::new(dataset(5)));
    let table = TableHandle::builder(defs(), DataMode::Remote(source.clone()))
        .build()
        .unwrap();
    table.data().refresh(RefreshOptions::default()).await.unwrap();
    assert_eq!(table.data().snapshot().rows.len(), 5);

    source.fail.store(true, Ordering::SeqCst);
    table
        .data()
        .refresh(RefreshOptions::forced("retry"))
        .await
        .unwrap();

    let snapshot = table.data().snapshot();
    assert_eq!(snapshot.rows.len(), 5, "stale rows beat no rows");
    assert!(snapshot.error.unwrap().contains("connection reset"));
    assert_eq!(table.data().phase(), FetchPhase::Error);

    // Recovery clears the error
    source.fail.store(false, Ordering::SeqCst);
    table
        .data()
        .refresh(RefreshOptions::forced("retry"))
        .await
        .unwrap();
    assert!(table.data().snapshot().error.is_none());
}

#[tokio::test]
async fn select_all_across_dataset_uses_exclude_mode() {
    let source = Arc::new(ServerSource::new(dataset(500)));
    let table = TableHandle::builder(defs(), DataMode::Remote(source))
        .selection_scope(SelectionScope::All)
        .build()
        .unwrap();
    table.data().refresh(RefreshOptions::default()).await.unwrap();

    table.selection().select_all().unwrap();
    let state = table.state().get();
    assert_eq!(state.row_selection.mode, SelectionMode::Exclude);
    assert!(state.row_selection.ids.is_empty());
    assert_eq!(table.selection().selected_count(), 500);

    table.selection().deselect_row("r42").unwrap();
    assert_eq!(table.selection().selected_count(), 499);
    assert!(!table.selection().is_selected("r42"));
    assert!(table.selection().is_selected("r7"));
}

#[tokio::test]
async fn state_round_trip_reproduces_the_same_view() {
    let rows = dataset(57);
    let table = TableHandle::builder(defs(), DataMode::Local(rows.clone()))
        .build()
        .unwrap();
    table.pagination().set_page_size(5).await.unwrap();
    table
        .filtering()
        .set_filters(vec![score_below(30)], FilterLogic::And)
        .await
        .unwrap();
    table
        .sorting()
        .set_sorting(vec![SortDescriptor::desc("score")])
        .await
        .unwrap();
    table.pagination().go_to_page(1).await.unwrap();
    table.columns().set_visible("score", false).unwrap();

    let json = table.state().to_json().unwrap();

    let restored = TableHandle::builder(defs(), DataMode::Local(rows))
        .initial_state(TableState::from_json(&json).unwrap())
        .build()
        .unwrap();
    restored.data().refresh(RefreshOptions::default()).await.unwrap();

    let a = table.data().snapshot();
    let b = restored.data().snapshot();
    assert_eq!(a.rows, b.rows);
    assert_eq!(a.total_row, b.total_row);
    assert_eq!(restored.columns().ordered_visible(), vec!["name".to_string()]);
}

#[tokio::test]
async fn controlled_state_push_goes_through_the_same_path() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let table = TableHandle::builder(defs(), DataMode::Local(dataset(30)))
        .on_state_change(move |_state| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();
    table.data().refresh(RefreshOptions::default()).await.unwrap();

    let mut state = table.state().get();
    state.pagination.page_size = 10;
    state.pagination.page_index = 2;
    table.state().set(state).await.unwrap();

    let snapshot = table.data().snapshot();
    let ids: Vec<&str> = snapshot.rows.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids[0], "r20");
    assert_eq!(ids.len(), 10);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_filter_is_rejected_without_state_damage() {
    let table = TableHandle::builder(defs(), DataMode::Local(dataset(10)))
        .build()
        .unwrap();

    let err = table
        .filtering()
        .set_filters(
            vec![FilterClause::new(
                "f1",
                "score",
                FilterOperator::Contains,
                FilterValue::single("3"),
            )],
            FilterLogic::And,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GridError::InvalidFilterOperator { .. }));
    assert!(!table.state().get().column_filter.is_active());

    let err = table
        .filtering()
        .set_filters(
            vec![FilterClause::new(
                "f1",
                "ghost",
                FilterOperator::Equals,
                FilterValue::single("x"),
            )],
            FilterLogic::And,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, GridError::UnknownColumn(_)));
}

#[tokio::test]
async fn pending_filters_stay_inert_until_applied() {
    let table = TableHandle::builder(defs(), DataMode::Local(dataset(20)))
        .build()
        .unwrap();
    table.data().refresh(RefreshOptions::default()).await.unwrap();

    table
        .filtering()
        .edit_pending(vec![score_below(5)], FilterLogic::And)
        .unwrap();
    assert_eq!(table.data().snapshot().total_row, 20, "draft edits do not query");

    table.filtering().apply_pending().await.unwrap();
    assert_eq!(table.data().snapshot().total_row, 5);
}

#[tokio::test]
async fn row_edits_patch_the_buffer_without_refetching() {
    let source = Arc::new(ServerSource::new(dataset(5)));
    let table = TableHandle::builder(defs(), DataMode::Remote(source.clone()))
        .build()
        .unwrap();
    table.data().refresh(RefreshOptions::default()).await.unwrap();
    let before = source.call_count();

    table
        .data()
        .update_row(
            "r1",
            HashMap::from([("name".to_string(), CellValue::from("renamed"))]),
        )
        .unwrap();
    table.data().insert_row(Row::new("r90").with_cell("score", 90i64)).unwrap();
    assert!(table.data().delete_row("r0").unwrap());

    let snapshot = table.data().snapshot();
    assert_eq!(snapshot.total_row, 5);
    assert_eq!(snapshot.rows[0].get("name"), &CellValue::from("renamed"));
    assert_eq!(source.call_count(), before, "buffer edits never re-fetch");
}

#[tokio::test]
async fn local_export_honors_exclude_selection() {
    let table = TableHandle::builder(defs(), DataMode::Local(dataset(10)))
        .selection_scope(SelectionScope::All)
        .build()
        .unwrap();
    table.data().refresh(RefreshOptions::default()).await.unwrap();
    table.selection().select_all().unwrap();
    table.selection().deselect_row("r3").unwrap();

    let outcome = table.export().export_csv(None).await.unwrap();
    let ExportOutcome::Completed(result) = outcome else {
        panic!("expected a completed export");
    };
    assert_eq!(result.total_rows, 9);
    let csv = String::from_utf8(result.bytes).unwrap();
    assert!(csv.starts_with("Name,Score"));
    assert!(csv.contains("user-002"));
    assert!(!csv.contains("user-003"));
    assert!(result.filename.ends_with(".csv"));
}

struct StubExportSource;

#[async_trait]
impl ExportSource for StubExportSource {
    async fn export_rows(
        &self,
        _descriptor: &FilterDescriptor,
        _sorting: &SortState,
        selection: &SelectionState,
    ) -> Result<ExportBatch> {
        // Server resolves the selection; two survivors come back
        assert_eq!(selection.mode, SelectionMode::Exclude);
        let data = vec![
            Row::new("r1").with_cell("name", "user-001"),
            Row::new("r2").with_cell("name", "user-002"),
        ];
        let total = data.len() as u64;
        Ok(ExportBatch { data, total })
    }
}

#[tokio::test]
async fn remote_export_delegates_to_the_export_source() {
    let source = Arc::new(ServerSource::new(dataset(100)));
    let table = TableHandle::builder(defs(), DataMode::Remote(source))
        .selection_scope(SelectionScope::All)
        .export_source(Arc::new(StubExportSource))
        .build()
        .unwrap();
    table.data().refresh(RefreshOptions::default()).await.unwrap();
    table.selection().select_all().unwrap();

    let outcome = table.export().export_json(Some("rows.json".to_string())).await.unwrap();
    let ExportOutcome::Completed(result) = outcome else {
        panic!("expected a completed export");
    };
    assert_eq!(result.total_rows, 2);
    assert_eq!(result.filename, "rows.json");
    let parsed: serde_json::Value = serde_json::from_slice(&result.bytes).unwrap();
    assert_eq!(parsed.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn remote_export_without_a_source_is_an_error() {
    let source = Arc::new(ServerSource::new(dataset(10)));
    let table = TableHandle::builder(defs(), DataMode::Remote(source))
        .build()
        .unwrap();

    let err = table.export().export_csv(None).await.unwrap_err();
    assert!(matches!(err, GridError::Export { .. }));
}
