//! End-to-end ingest: mock service → Parquet → DuckDB

use crate::support::{transfer_columns, transfer_row, MockApi, PageBehavior};
use solana_transfers_ingest::cli::ingest::{run_ingest, IngestPlan};
use solana_transfers_ingest::cli::store::summarize;
use solana_transfers_ingest::session::SessionOptions;
use solana_transfers_ingest::store::Store;
use solana_transfers_ingest::TRANSFERS;
use std::sync::Arc;
use tempfile::TempDir;

fn plan(dir: &TempDir) -> IngestPlan {
    IngestPlan {
        sql: "SELECT 1".to_string(),
        schema: &TRANSFERS,
        options: SessionOptions {
            page_size: 100,
            ..SessionOptions::default()
        },
        parquet_file: dir.path().join("out").join("transfers.parquet"),
        db_file: dir.path().join("solana.duckdb"),
        show_progress: false,
    }
}

#[tokio::test]
async fn test_ingest_loads_every_row() {
    let dir = TempDir::new().unwrap();
    let plan = plan(&dir);

    let summary = run_ingest(Arc::new(MockApi::transfers(250)), &plan).await.unwrap();
    assert!(summary.report.is_complete());
    assert_eq!(summary.rows_assembled, 250);
    assert_eq!(summary.write.rows, 250);
    assert!(plan.parquet_file.exists());
    assert_eq!(summary.load.rows_offered, 250);
    assert_eq!(summary.load.rows_inserted, 250);
    assert_eq!(summary.load.rows_skipped, 0);

    let store = Store::open(&plan.db_file).unwrap();
    assert_eq!(store.row_count(&TRANSFERS).unwrap(), 250);
}

#[tokio::test]
async fn test_repeated_ingest_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let plan = plan(&dir);

    run_ingest(Arc::new(MockApi::transfers(250)), &plan).await.unwrap();
    let second = run_ingest(Arc::new(MockApi::transfers(250)), &plan).await.unwrap();

    assert_eq!(second.load.rows_offered, 250);
    assert_eq!(second.load.rows_inserted, 0);
    assert_eq!(second.load.rows_skipped, 250);

    let store = Store::open(&plan.db_file).unwrap();
    assert_eq!(store.row_count(&TRANSFERS).unwrap(), 250);
}

#[tokio::test]
async fn test_partial_run_is_completed_by_a_later_run() {
    let dir = TempDir::new().unwrap();
    let plan = plan(&dir);

    let api = MockApi::transfers(250).with_page(2, PageBehavior::RateLimited(u32::MAX));
    let first = run_ingest(Arc::new(api), &plan).await.unwrap();
    assert_eq!(first.report.abandoned_pages, vec![2]);
    assert_eq!(first.load.rows_inserted, 150);

    let second = run_ingest(Arc::new(MockApi::transfers(250)), &plan).await.unwrap();
    assert_eq!(second.load.rows_inserted, 100);
    assert_eq!(second.load.rows_skipped, 150);

    let store = Store::open(&plan.db_file).unwrap();
    assert_eq!(store.row_count(&TRANSFERS).unwrap(), 250);
}

#[tokio::test]
async fn test_store_summaries_after_ingest() {
    let dir = TempDir::new().unwrap();
    let plan = plan(&dir);
    run_ingest(Arc::new(MockApi::transfers(40)), &plan).await.unwrap();

    let store = Store::open(&plan.db_file).unwrap();
    let top = store.top_values(&TRANSFERS, "mint", 10).unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top.iter().map(|(_, n)| n).sum::<i64>(), 40);
    assert!(store.top_values(&TRANSFERS, "no_such_column", 10).is_err());
}

#[tokio::test]
async fn test_hourly_counts_after_ingest() {
    let dir = TempDir::new().unwrap();
    let plan = plan(&dir);

    let timestamps = [
        "2024-01-01T00:05:00.000Z",
        "2024-01-01T00:59:59.999Z",
        "2024-01-01 02:30:00+02:00",
        "2024-01-01T01:00:00.000Z",
        "2024-01-01T01:45:10.000Z",
        "2024-01-01T03:00:00.000Z",
    ];
    let rows = timestamps
        .iter()
        .enumerate()
        .map(|(i, ts)| {
            let mut row = transfer_row(i as u64, timestamps.len() as u64);
            row[1] = Some(ts.to_string());
            row
        })
        .collect();
    run_ingest(Arc::new(MockApi::new(transfer_columns(), rows)), &plan)
        .await
        .unwrap();

    let expected = vec![
        ("2024-01-01 03:00".to_string(), 1),
        ("2024-01-01 01:00".to_string(), 2),
        ("2024-01-01 00:00".to_string(), 3),
    ];
    let store = Store::open(&plan.db_file).unwrap();
    assert_eq!(store.hourly_counts(&TRANSFERS).unwrap(), expected);
    drop(store);

    let summary = summarize(&plan.db_file, 10).unwrap();
    assert_eq!(summary.row_count, 6);
    assert_eq!(summary.hourly, Some(expected));
}
